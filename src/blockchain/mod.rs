// Blockchain module
//
// This module contains the ledger and consensus engine:
// - Hash commitment and proof-of-work helpers
// - Signatures and addresses
// - Transactions and the pool of pending ones
// - Blocks, mining and the chain with its replacement rule
// - Wallet balance derivation
// - The node that ties them together behind locks

pub mod block;
pub mod chain;
pub mod crypto;
pub mod hash;
pub mod node;
pub mod pool;
pub mod transaction;
pub mod wallet;

// Re-export main components for easier access
pub use block::Block;
pub use chain::Blockchain;
pub use crypto::{Address, DigitalSignature, KeyPair};
pub use node::{Node, NodeError};
pub use pool::{TransactionMap, TransactionPool};
pub use transaction::{Transaction, TransactionInput};
pub use wallet::Wallet;
