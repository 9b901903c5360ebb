use log::{info, warn};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::blockchain::{Block, Node, TransactionMap};

/// Errors that can occur while syncing with the root node
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Request to root node failed: {0}")]
    Request(#[from] reqwest::Error),
}

async fn fetch<T: DeserializeOwned>(client: &reqwest::Client, url: String) -> Result<T, SyncError> {
    let value = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(value)
}

/// Pulls the chain and the pending transactions of the root node
///
/// The root chain is adopted without input amount checks, since a fresh peer
/// has no history of its own. A root chain that is not longer is ignored.
pub async fn sync_with_root(node: &Node, root_address: &str) -> Result<(), SyncError> {
    let client = reqwest::Client::new();

    let chain: Vec<Block> = fetch(&client, format!("{}/api/blocks", root_address)).await?;
    info!("Replacing chain on sync with root chain of length {}", chain.len());
    if let Err(err) = node.sync_chain(chain) {
        warn!("Root chain not adopted: {}", err);
    }

    let transaction_map: TransactionMap =
        fetch(&client, format!("{}/api/transaction-pool-map", root_address)).await?;
    info!(
        "Replacing transaction pool map on sync with {} transactions",
        transaction_map.len()
    );
    node.receive_transaction_map(transaction_map);

    Ok(())
}
