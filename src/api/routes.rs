use actix_web::web;

use super::handlers;

/// Configures the API routes
///
/// # Arguments
///
/// * `cfg` - The service configuration
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/blocks", web::get().to(handlers::get_blocks))
            .route("/blocks", web::post().to(handlers::post_blocks))
            .route("/mine", web::post().to(handlers::mine_block))
            .route("/mine-transactions", web::get().to(handlers::mine_transactions))
            .route("/transact", web::post().to(handlers::transact))
            .route("/transactions", web::post().to(handlers::post_transaction))
            .route("/transaction-pool-map", web::get().to(handlers::get_transaction_pool_map))
            .route("/transaction-pool-map", web::post().to(handlers::post_transaction_pool_map))
            .route("/wallet-info", web::get().to(handlers::get_wallet_info))
            .route("/validate", web::get().to(handlers::validate_chain))
    );
}
