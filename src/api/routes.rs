use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{web, Error, HttpRequest, HttpResponse};

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .content_type_required(false)
            .error_handler(json_error_handler),
    )
    .route("/", web::get().to(handlers::info))
    .service(
        web::resource("/blocks")
            .route(web::get().to(handlers::list_blocks))
            .route(web::post().to(handlers::append_block)),
    )
    .route("/blocks/{index}", web::get().to(handlers::get_block))
    .route("/validate", web::get().to(handlers::validate_chain));
}

/// Turns body extraction failures into a JSON 400
fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> Error {
    let response = HttpResponse::BadRequest().json(serde_json::json!({
        "error": format!("Invalid request body: {}", err)
    }));
    InternalError::from_response(err, response).into()
}
