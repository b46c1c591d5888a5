use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{Block, Blockchain, Difficulty, Payload};

/// Data structure for the blockchain state
pub type BlockchainData = web::Data<Blockchain>;

/// Response for the root endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct InfoResponse {
    /// Name of the service
    pub name: String,

    /// Mining difficulty (number of leading zeros required in hash)
    #[schema(value_type = u8)]
    pub difficulty: Difficulty,

    /// The length of the chain
    pub length: usize,

    /// Whether the chain is valid
    pub valid: bool,
}

/// Request for the append endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct AppendRequest {
    /// Payload to record: a string, number, boolean, list or object
    #[schema(value_type = Object)]
    pub data: Payload,
}

/// Response for the append endpoint
#[derive(Serialize, ToSchema)]
pub struct AppendResponse {
    /// The newly mined block
    #[serde(flatten)]
    pub block: Block,

    /// Set when the block was appended but the chain could not be saved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Response for the validate endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    /// Whether the chain is valid
    pub valid: bool,

    /// Description of the first violation, if any
    pub error: Option<String>,
}

/// Describe the ledger
///
/// Returns the difficulty, chain length and validity
#[utoipa::path(
    get,
    tag = "ledger",
    path = "/",
    responses(
        (status = 200, description = "Ledger summary", body = InfoResponse)
    )
)]
pub async fn info(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(InfoResponse {
        name: "Central Ledger".to_string(),
        difficulty: blockchain.difficulty(),
        length: blockchain.len(),
        valid: blockchain.is_valid(),
    })
}

/// Get the full blockchain
///
/// Returns every block in index order
#[utoipa::path(
    get,
    tag = "ledger",
    path = "/blocks",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = Vec<Block>)
    )
)]
pub async fn list_blocks(blockchain: BlockchainData) -> impl Responder {
    HttpResponse::Ok().json(blockchain.explorer())
}

/// Get a block by index
#[utoipa::path(
    get,
    tag = "ledger",
    path = "/blocks/{index}",
    params(
        ("index" = i64, Path, description = "Position of the block in the chain")
    ),
    responses(
        (status = 200, description = "Block retrieved successfully", body = Block),
        (status = 404, description = "No block at this index")
    )
)]
pub async fn get_block(blockchain: BlockchainData, index: web::Path<i64>) -> impl Responder {
    let block = usize::try_from(index.into_inner())
        .ok()
        .and_then(|index| blockchain.get_block(index));

    match block {
        Some(block) => HttpResponse::Ok().json(block),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": "not found"
        })),
    }
}

/// Mine a new block
///
/// Mines a block carrying the submitted payload and appends it to the chain
#[utoipa::path(
    post,
    tag = "ledger",
    path = "/blocks",
    request_body = AppendRequest,
    responses(
        (status = 201, description = "Block mined and appended", body = AppendResponse),
        (status = 400, description = "Missing or invalid data"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn append_block(
    blockchain: BlockchainData,
    append_req: web::Json<AppendRequest>,
) -> impl Responder {
    let ledger = blockchain.get_ref().clone();
    let data = append_req.into_inner().data;

    // Mining blocks the thread, so keep it off the request workers
    match web::block(move || ledger.append(data)).await {
        Ok(outcome) => HttpResponse::Created().json(AppendResponse {
            block: outcome.block,
            warning: outcome
                .persisted
                .err()
                .map(|err| format!("Block appended but not saved: {}", err)),
        }),
        Err(err) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Failed to mine block: {}", err)
        })),
    }
}

/// Check if the blockchain is valid
///
/// Validates the entire blockchain and reports the first violation
#[utoipa::path(
    get,
    tag = "ledger",
    path = "/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = ValidateResponse)
    )
)]
pub async fn validate_chain(blockchain: BlockchainData) -> impl Responder {
    let response = match blockchain.validate() {
        Ok(()) => ValidateResponse {
            valid: true,
            error: None,
        },
        Err(err) => ValidateResponse {
            valid: false,
            error: Some(err.to_string()),
        },
    };

    HttpResponse::Ok().json(response)
}
