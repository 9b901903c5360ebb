use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::{info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod api;
mod blockchain;
mod config;

use blockchain::{KeyPair, Node, Wallet};
use config::NodeConfig;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::get_blocks,
        api::handlers::post_blocks,
        api::handlers::mine_block,
        api::handlers::mine_transactions,
        api::handlers::transact,
        api::handlers::post_transaction,
        api::handlers::get_transaction_pool_map,
        api::handlers::post_transaction_pool_map,
        api::handlers::get_wallet_info,
        api::handlers::validate_chain
    ),
    components(
        schemas(
            blockchain::Block,
            blockchain::Transaction,
            blockchain::TransactionInput,
            blockchain::Address,
            blockchain::DigitalSignature,
            api::handlers::MineRequest,
            api::handlers::TransactRequest,
            api::handlers::TransactResponse,
            api::handlers::WalletInfoResponse
        )
    ),
    tags(
        (name = "cryptochain", description = "Ledger node API endpoints")
    ),
    info(
        title = "Cryptochain API",
        version = "0.1.0",
        description = "A proof-of-work ledger node",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
struct ApiDoc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = NodeConfig::from_env()?;

    let wallet = match &config.wallet_secret_key {
        Some(secret_key) => Wallet::from_key_pair(KeyPair::from_secret_key(secret_key)?),
        None => Wallet::new(),
    };

    let node = web::Data::new(Node::new(wallet));
    info!("Node wallet address: {}", node.address());

    if let Some(root_address) = &config.root_address {
        info!("Running as a peer, syncing with root node at {}", root_address);
        if let Err(err) = api::sync::sync_with_root(&node, root_address).await {
            warn!("Sync with root node failed: {}", err);
        }
    }

    info!("Starting HTTP server at http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        // Configure CORS
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        let openapi = ApiDoc::openapi();

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(node.clone())
            .configure(api::configure_routes)
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi.clone())
            )
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
