use actix_web::{web, HttpResponse, Responder};
use log::{error, info};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{Address, Block, Node, NodeError, Transaction, TransactionMap};

/// Data structure for the node state
pub type NodeData = web::Data<Node>;

/// Request for the mine endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct MineRequest {
    /// Transactions to put in the block as they are
    pub data: Vec<Transaction>,
}

/// Request for the transact endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactRequest {
    /// The recipient's address
    pub recipient: String,

    /// The amount to transfer
    pub amount: u64,
}

/// Response for the transact endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct TransactResponse {
    /// Always "success"
    #[serde(rename = "type")]
    pub kind: String,

    /// The new or amended pending transaction
    pub transaction: Transaction,
}

/// Response for the wallet info endpoint
#[derive(Serialize, Deserialize, ToSchema)]
pub struct WalletInfoResponse {
    /// The node wallet's address
    pub address: String,

    /// Balance derived from the local chain
    pub balance: u64,
}

fn error_response(status: actix_web::http::StatusCode, message: String) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({
        "type": "error",
        "message": message
    }))
}

/// Runs a mining round on the blocking pool so the search never stalls the
/// HTTP workers, then answers with the resulting chain
async fn run_mining<F>(node: NodeData, mine: F) -> HttpResponse
where
    F: FnOnce(&Node) -> Result<Block, NodeError> + Send + 'static,
{
    let worker = node.clone();

    match tokio::task::spawn_blocking(move || mine(&worker)).await {
        Ok(Ok(block)) => {
            info!("New block {} mined", block.hash);
            HttpResponse::Ok().json(node.chain())
        }
        Ok(Err(err)) => error_response(
            actix_web::http::StatusCode::CONFLICT,
            format!("Failed to mine block: {}", err),
        ),
        Err(err) => {
            error!("Mining task failed: {}", err);
            error_response(
                actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
                "Mining task failed".to_string(),
            )
        }
    }
}

/// Get the full blockchain
///
/// Returns the local chain in its wire format
#[utoipa::path(
    get,
    path = "/api/blocks",
    responses(
        (status = 200, description = "Blockchain retrieved successfully", body = Vec<Block>)
    )
)]
pub async fn get_blocks(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.chain())
}

/// Offer a chain from a peer
///
/// Replaces the local chain if the incoming one is longer and fully valid,
/// and drops its transactions from the pool
#[utoipa::path(
    post,
    path = "/api/blocks",
    request_body = Vec<Block>,
    responses(
        (status = 200, description = "Chain replaced"),
        (status = 400, description = "Chain rejected, local chain unchanged")
    )
)]
pub async fn post_blocks(node: NodeData, chain: web::Json<Vec<Block>>) -> impl Responder {
    match node.receive_chain(chain.into_inner()) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "type": "success",
            "length": node.chain().len()
        })),
        Err(err) => error_response(actix_web::http::StatusCode::BAD_REQUEST, err.to_string()),
    }
}

/// Mine a block with the given data
///
/// Mines the data as is, without a reward or pool selection
#[utoipa::path(
    post,
    path = "/api/mine",
    request_body = MineRequest,
    responses(
        (status = 200, description = "Block mined, returns the chain", body = Vec<Block>),
        (status = 409, description = "Mining was cancelled or the chain moved on"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_block(node: NodeData, mine_req: web::Json<MineRequest>) -> impl Responder {
    let data = mine_req.into_inner().data;
    run_mining(node, move |node| node.add_block(data)).await
}

/// Mine the pending transactions
///
/// Mines every valid pending transaction plus a reward for this node, then
/// drops the mined transactions from the pool
#[utoipa::path(
    get,
    path = "/api/mine-transactions",
    responses(
        (status = 200, description = "Block mined, returns the chain", body = Vec<Block>),
        (status = 409, description = "Mining was cancelled or the chain moved on"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn mine_transactions(node: NodeData) -> impl Responder {
    run_mining(node, |node| node.mine_transactions()).await
}

/// Send funds from the node wallet
///
/// Amends the wallet's pending transaction if there is one, otherwise creates
/// a new one
#[utoipa::path(
    post,
    path = "/api/transact",
    request_body = TransactRequest,
    responses(
        (status = 200, description = "Transaction added to the pool", body = TransactResponse),
        (status = 400, description = "Amount exceeds balance")
    )
)]
pub async fn transact(node: NodeData, transact_req: web::Json<TransactRequest>) -> impl Responder {
    let TransactRequest { recipient, amount } = transact_req.into_inner();

    match node.transact(Address(recipient), amount) {
        Ok(transaction) => HttpResponse::Ok().json(TransactResponse {
            kind: "success".to_string(),
            transaction,
        }),
        Err(err) => error_response(actix_web::http::StatusCode::BAD_REQUEST, err.to_string()),
    }
}

/// Offer a transaction from a peer
#[utoipa::path(
    post,
    path = "/api/transactions",
    request_body = Transaction,
    responses(
        (status = 200, description = "Transaction stored in the pool")
    )
)]
pub async fn post_transaction(node: NodeData, transaction: web::Json<Transaction>) -> impl Responder {
    node.receive_transaction(transaction.into_inner());
    HttpResponse::Ok().json(serde_json::json!({ "type": "success" }))
}

/// Get the transaction pool
///
/// Returns the pending transactions keyed by id
#[utoipa::path(
    get,
    path = "/api/transaction-pool-map",
    responses(
        (status = 200, description = "Pending transactions keyed by id")
    )
)]
pub async fn get_transaction_pool_map(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.transaction_map())
}

/// Replace the transaction pool with a peer's
///
/// Takes the pending transactions keyed by id
#[utoipa::path(
    post,
    path = "/api/transaction-pool-map",
    responses(
        (status = 200, description = "Transaction pool replaced")
    )
)]
pub async fn post_transaction_pool_map(
    node: NodeData,
    transaction_map: web::Json<TransactionMap>,
) -> impl Responder {
    node.receive_transaction_map(transaction_map.into_inner());
    HttpResponse::Ok().json(serde_json::json!({ "type": "success" }))
}

/// Get the node wallet
///
/// Returns the node wallet's address and its balance derived from the chain
#[utoipa::path(
    get,
    path = "/api/wallet-info",
    responses(
        (status = 200, description = "Wallet info retrieved successfully", body = WalletInfoResponse)
    )
)]
pub async fn get_wallet_info(node: NodeData) -> impl Responder {
    let address = node.address();
    let balance = node.balance_of(&address);

    HttpResponse::Ok().json(WalletInfoResponse {
        address: address.0,
        balance,
    })
}

/// Check if the blockchain is valid
#[utoipa::path(
    get,
    path = "/api/validate",
    responses(
        (status = 200, description = "Blockchain validation status", body = bool)
    )
)]
pub async fn validate_chain(node: NodeData) -> impl Responder {
    HttpResponse::Ok().json(node.is_valid())
}
