use std::io;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use central_ledger::api;
use central_ledger::blockchain::{self, Block, Blockchain, Payload};
use central_ledger::config::Config;

#[derive(Parser)]
#[command(author, version, about = "Central proof-of-work ledger")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mine a block carrying DATA and append it to the chain
    Add {
        data: String,
        /// Parse DATA as JSON instead of taking it as a string
        #[arg(long)]
        json: bool,
    },
    /// Print the block at INDEX
    Get {
        #[arg(allow_negative_numbers = true)]
        index: i64,
    },
    /// Print every block in the chain
    List,
    /// Mine a block carrying DATA without appending it
    Mine {
        data: String,
        /// Parse DATA as JSON instead of taking it as a string
        #[arg(long)]
        json: bool,
    },
    /// Check the integrity of the whole chain
    Validate,
    /// Run the ledger as an HTTP service
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 5000)]
        port: u16,
    },
}

// Open the configured store, or fall back to an in-memory chain
fn initialize_blockchain(config: &Config) -> anyhow::Result<Blockchain> {
    let difficulty = config.difficulty()?;

    match config.open_store() {
        Ok(store) => Ok(Blockchain::with_storage(difficulty, store)),
        Err(err) => {
            warn!(
                "Failed to open storage at {}: {}",
                config.store.display(),
                err
            );
            warn!("Creating in-memory blockchain instead");
            Ok(Blockchain::new(difficulty))
        }
    }
}

fn parse_payload(data: String, json: bool) -> anyhow::Result<Payload> {
    if json {
        serde_json::from_str(&data)
            .context("DATA must be a JSON string, number, boolean, array or object without nulls")
    } else {
        Ok(Payload::from(data))
    }
}

fn print_block(block: &Block) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(block)?);
    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::info,
        api::handlers::list_blocks,
        api::handlers::get_block,
        api::handlers::append_block,
        api::handlers::validate_chain
    ),
    components(
        schemas(
            blockchain::Block,
            api::handlers::InfoResponse,
            api::handlers::AppendRequest,
            api::handlers::AppendResponse,
            api::handlers::ValidateResponse
        )
    ),
    tags(
        (name = "ledger", description = "Central ledger API endpoints")
    ),
    info(
        title = "Central Ledger API",
        version = "1.0.0",
        description = "A single-authority proof-of-work ledger",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

async fn serve(blockchain: Blockchain, host: String, port: u16) -> io::Result<()> {
    let blockchain = web::Data::new(blockchain);

    info!("Starting HTTP server at http://{}:{}", host, port);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(blockchain.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let blockchain = initialize_blockchain(&cli.config)?;

    match cli.cmd {
        Command::Add { data, json } => {
            let outcome = blockchain.append(parse_payload(data, json)?);
            println!("Mined & appended block:");
            print_block(&outcome.block)?;
            if let Err(err) = outcome.persisted {
                eprintln!("warning: block was appended but not saved: {}", err);
            }
        }
        Command::Get { index } => {
            let block = usize::try_from(index)
                .ok()
                .and_then(|index| blockchain.get_block(index));
            match block {
                Some(block) => print_block(&block)?,
                None => println!("Block {} not found.", index),
            }
        }
        Command::List => {
            println!("{}", serde_json::to_string_pretty(&blockchain.explorer())?);
        }
        Command::Mine { data, json } => {
            print_block(&blockchain.preview(parse_payload(data, json)?))?;
        }
        Command::Validate => match blockchain.validate() {
            Ok(()) => println!("Chain of {} blocks is valid", blockchain.len()),
            Err(err) => bail!("Chain is invalid: {}", err),
        },
        Command::Serve { host, port } => {
            actix_web::rt::System::new()
                .block_on(serve(blockchain.clone(), host, port))
                .context("HTTP server failed")?;
            blockchain
                .flush()
                .context("Failed to save the chain on shutdown")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use central_ledger::config::StoreBackend;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("central-ledger").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert!(matches!(
            parse(&["add", "Hello"]).cmd,
            Command::Add { ref data, json: false } if data == "Hello"
        ));
        assert!(matches!(parse(&["get", "2"]).cmd, Command::Get { index: 2 }));
        assert!(matches!(parse(&["get", "-1"]).cmd, Command::Get { index: -1 }));
        assert!(matches!(parse(&["list"]).cmd, Command::List));
        assert!(matches!(
            parse(&["mine", "{\"a\":1}", "--json"]).cmd,
            Command::Mine { json: true, .. }
        ));
        assert!(matches!(
            parse(&["serve", "--port", "8080"]).cmd,
            Command::Serve { port: 8080, ref host } if host == "127.0.0.1"
        ));
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = parse(&["list", "--difficulty", "5", "--backend", "sled"]);

        assert_eq!(cli.config.difficulty, 5);
        assert_eq!(cli.config.backend, StoreBackend::Sled);
    }

    #[test]
    fn test_parse_payload() {
        assert_eq!(
            parse_payload("Pay 10 to Alice".to_string(), false).unwrap(),
            Payload::from("Pay 10 to Alice")
        );
        assert_eq!(
            parse_payload("42".to_string(), true).unwrap(),
            Payload::from(42i64)
        );
        assert_eq!(
            parse_payload("42".to_string(), false).unwrap(),
            Payload::from("42")
        );
        assert!(parse_payload("null".to_string(), true).is_err());
        assert!(parse_payload("{oops".to_string(), true).is_err());
    }

    #[test]
    fn test_initialize_blockchain_persists_between_runs() {
        let dir = tempdir().unwrap();
        let config = Config {
            difficulty: 1,
            store: dir.path().join("chain.json"),
            backend: StoreBackend::Json,
        };

        let first = initialize_blockchain(&config).unwrap();
        first.append(Payload::from("a"));
        first.append(Payload::from("b"));

        let second = initialize_blockchain(&config).unwrap();
        assert_eq!(second.explorer(), first.explorer());
        assert!(second.is_valid());
    }
}
