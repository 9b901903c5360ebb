use log::info;

use std::collections::{BTreeMap, HashSet};

use super::block::Block;
use super::crypto::Address;
use super::transaction::Transaction;

/// Pending transactions keyed by id, as exchanged between nodes
pub type TransactionMap = BTreeMap<String, Transaction>;

/// Transactions that have been authored or received but not yet mined
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionPool {
    transaction_map: TransactionMap,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a transaction, replacing any entry with the same id
    pub fn set_transaction(&mut self, transaction: Transaction) {
        self.transaction_map.insert(transaction.id.clone(), transaction);
    }

    /// Replaces the whole pool with one received from a peer
    pub fn set_map(&mut self, transaction_map: TransactionMap) {
        info!("Replacing transaction pool with {} transactions", transaction_map.len());
        self.transaction_map = transaction_map;
    }

    /// Gets the pending transaction signed by `address`, if any
    ///
    /// Callers amend this transaction instead of authoring a second one. If
    /// a peer sent several, the first in id order wins. Entries that merely
    /// name `address` without a valid signature are never returned.
    pub fn existing_transaction(&self, address: &Address) -> Option<&Transaction> {
        self.transaction_map
            .values()
            .find(|transaction| transaction.input.address == *address && transaction.is_valid())
    }

    /// Gets the transactions that pass [`Transaction::is_valid`]
    ///
    /// Invalid entries are logged and skipped but stay in the pool.
    pub fn valid_transactions(&self) -> Vec<Transaction> {
        self.transaction_map
            .values()
            .filter(|transaction| transaction.is_valid())
            .cloned()
            .collect()
    }

    /// Empties the pool
    pub fn clear(&mut self) {
        self.transaction_map.clear();
    }

    /// Removes every transaction that is confirmed by a block of `chain`
    pub fn clear_blockchain_transactions(&mut self, chain: &[Block]) {
        let confirmed: HashSet<&str> = chain
            .iter()
            .flat_map(|block| block.data.iter())
            .map(|transaction| transaction.id.as_str())
            .collect();

        let before = self.transaction_map.len();
        self.transaction_map
            .retain(|id, _| !confirmed.contains(id.as_str()));

        let removed = before - self.transaction_map.len();
        if removed > 0 {
            info!("Removed {} confirmed transactions from the pool", removed);
        }
    }

    pub fn transaction_map(&self) -> &TransactionMap {
        &self.transaction_map
    }

    pub fn len(&self) -> usize {
        self.transaction_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transaction_map.is_empty()
    }
}
