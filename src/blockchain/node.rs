use log::{info, warn};
use thiserror::Error;

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::block::{Block, CancellationToken, MiningError};
use super::chain::{Blockchain, ReplaceChainError};
use super::crypto::Address;
use super::pool::{TransactionMap, TransactionPool};
use super::transaction::{Transaction, TransactionError};
use super::wallet::Wallet;

/// Errors that can occur during node operations
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Transaction error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Mining error: {0}")]
    MiningError(#[from] MiningError),

    #[error("Chain tip moved from {expected} while mining")]
    StaleTip { expected: String },

    #[error("Chain replacement rejected: {0}")]
    ReplaceChainError(#[from] ReplaceChainError),
}

/// A ledger node: one chain, one pool of pending transactions and the
/// wallet that authors transactions and collects mining rewards
///
/// Lock order is chain, pool, wallet, mining round. Mining itself runs
/// without holding any of them.
#[derive(Debug)]
pub struct Node {
    blockchain: RwLock<Blockchain>,
    transaction_pool: Mutex<TransactionPool>,
    wallet: Mutex<Wallet>,
    mining_round: Mutex<Option<CancellationToken>>,
}

impl Default for Node {
    fn default() -> Self {
        Self::new(Wallet::new())
    }
}

impl Node {
    /// Creates a node with a genesis-only chain and an empty pool
    pub fn new(wallet: Wallet) -> Self {
        Node {
            blockchain: RwLock::new(Blockchain::new()),
            transaction_pool: Mutex::new(TransactionPool::new()),
            wallet: Mutex::new(wallet),
            mining_round: Mutex::new(None),
        }
    }

    // A panic in another request must not take the ledger down with it
    fn read_chain(&self) -> RwLockReadGuard<'_, Blockchain> {
        self.blockchain.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_chain(&self) -> RwLockWriteGuard<'_, Blockchain> {
        self.blockchain.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn pool(&self) -> MutexGuard<'_, TransactionPool> {
        self.transaction_pool.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wallet(&self) -> MutexGuard<'_, Wallet> {
        self.wallet.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mining_round(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.mining_round.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Gets a snapshot of the chain
    pub fn chain(&self) -> Vec<Block> {
        self.read_chain().chain().to_vec()
    }

    /// Gets a snapshot of the pending transactions
    pub fn transaction_map(&self) -> TransactionMap {
        self.pool().transaction_map().clone()
    }

    /// Checks the local chain with the same rules applied to peers' chains
    pub fn is_valid(&self) -> bool {
        Blockchain::is_valid_chain(self.read_chain().chain())
    }

    /// Gets the node wallet's address
    pub fn address(&self) -> Address {
        self.wallet().address().clone()
    }

    /// Derives the balance of `address` from the current chain
    pub fn balance_of(&self, address: &Address) -> u64 {
        Wallet::calculate_balance(self.read_chain().chain(), address)
    }

    /// Sends `amount` from the node wallet to `recipient`
    ///
    /// Amends the wallet's pending transaction when there is one, otherwise
    /// authors a new transaction against the current chain.
    pub fn transact(&self, recipient: Address, amount: u64) -> Result<Transaction, NodeError> {
        let blockchain = self.read_chain();
        let mut pool = self.pool();
        let mut wallet = self.wallet();

        let transaction = match pool.existing_transaction(wallet.address()).cloned() {
            Some(mut transaction) => {
                transaction.update(&wallet, recipient, amount)?;
                transaction
            }
            None => wallet.create_transaction(recipient, amount, blockchain.chain())?,
        };

        pool.set_transaction(transaction.clone());
        Ok(transaction)
    }

    /// Accepts a transaction gossiped by a peer
    pub fn receive_transaction(&self, transaction: Transaction) {
        self.pool().set_transaction(transaction);
    }

    /// Accepts a peer's whole pool
    pub fn receive_transaction_map(&self, transaction_map: TransactionMap) {
        self.pool().set_map(transaction_map);
    }

    /// Adopts a peer's chain if it is longer and fully valid
    ///
    /// Confirmed transactions leave the pool under the same locks as the
    /// swap, and a mining round on the old tip is cancelled.
    pub fn receive_chain(&self, chain: Vec<Block>) -> Result<(), NodeError> {
        self.adopt_chain(chain, true)
    }

    /// Adopts the root node's chain at startup
    ///
    /// Input amounts are not checked: a fresh node has no history to derive
    /// the spenders' balances from.
    pub fn sync_chain(&self, chain: Vec<Block>) -> Result<(), NodeError> {
        self.adopt_chain(chain, false)
    }

    fn adopt_chain(&self, chain: Vec<Block>, validate_transactions: bool) -> Result<(), NodeError> {
        let mut blockchain = self.write_chain();
        let mut pool = self.pool();

        blockchain.replace_chain(chain, validate_transactions, |adopted| {
            pool.clear_blockchain_transactions(adopted)
        })?;

        if let Some(token) = self.mining_round().take() {
            info!("Cancelling mining round on the replaced chain");
            token.cancel();
        }

        Ok(())
    }

    /// Mines `data` into a new block on the current tip
    pub fn add_block(&self, data: Vec<Transaction>) -> Result<Block, NodeError> {
        let tip = self.read_chain().last_block().clone();
        self.mine_on(&tip, data, false)
    }

    /// Mines every valid pending transaction plus a reward for the node
    /// wallet, then drops the mined transactions from the pool
    pub fn mine_transactions(&self) -> Result<Block, NodeError> {
        let (tip, data) = {
            let blockchain = self.read_chain();
            let pool = self.pool();
            let wallet = self.wallet();

            let mut data = pool.valid_transactions();
            data.push(Transaction::reward_transaction(wallet.address()));

            (blockchain.last_block().clone(), data)
        };

        self.mine_on(&tip, data, true)
    }

    fn mine_on(&self, tip: &Block, data: Vec<Transaction>, prune_pool: bool) -> Result<Block, NodeError> {
        let token = CancellationToken::new();
        if let Some(previous) = self.mining_round().replace(token.clone()) {
            previous.cancel();
        }

        let mined = Block::mine_block_cancellable(tip, data, &token);

        {
            let mut round = self.mining_round();
            if round.as_ref().is_some_and(|current| current.is_same(&token)) {
                *round = None;
            }
        }

        let block = mined.map_err(|err| {
            warn!("{}", err);
            err
        })?;

        let mut blockchain = self.write_chain();
        if blockchain.append_mined_block(block).is_err() {
            warn!("Discarding block mined on stale tip {}", tip.hash);
            return Err(NodeError::StaleTip {
                expected: tip.hash.clone(),
            });
        }

        let block = blockchain.last_block().clone();

        // Transactions received while mining stay pending
        if prune_pool {
            self.pool()
                .clear_blockchain_transactions(std::slice::from_ref(&block));
        }

        info!("Mined block {} at height {}", block.hash, blockchain.len() - 1);

        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::transaction::{OutputMap, TransactionInput};
    use crate::config::{MINING_REWARD, STARTING_BALANCE};

    use chrono::Utc;

    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    /// A transaction that names `address` as its signer but carries no signature
    fn unsigned_spend(address: &Address, outputs: &[(&str, u64)], amount: u64) -> Transaction {
        let output_map: OutputMap = outputs
            .iter()
            .map(|(recipient, value)| (Address::from(*recipient), *value))
            .collect();

        Transaction::from_parts(
            output_map,
            TransactionInput {
                timestamp: 0,
                amount,
                address: address.clone(),
                signature: None,
            },
        )
    }

    #[test]
    fn test_new_node() {
        let node = Node::default();

        assert_eq!(node.chain(), vec![Block::genesis()]);
        assert!(node.transaction_map().is_empty());
        assert_eq!(node.balance_of(&node.address()), STARTING_BALANCE);
        assert!(node.is_valid());
    }

    #[test]
    fn test_transact_creates_then_amends() {
        let node = Node::default();

        let first = node.transact(Address::from("alice"), 100).unwrap();
        let second = node.transact(Address::from("bob"), 50).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(node.transaction_map().len(), 1);
        assert_eq!(second.output_map[&Address::from("alice")], 100);
        assert_eq!(second.output_map[&Address::from("bob")], 50);
        assert_eq!(second.output_map[&node.address()], STARTING_BALANCE - 150);
        assert!(second.is_valid());
    }

    #[test]
    fn test_transact_insufficient_balance() {
        let node = Node::default();

        let result = node.transact(Address::from("alice"), STARTING_BALANCE + 1);

        assert!(matches!(
            result,
            Err(NodeError::TransactionError(TransactionError::InsufficientBalance { .. }))
        ));
        assert!(node.transaction_map().is_empty());
    }

    #[test]
    fn test_transact_never_amends_an_unsigned_entry() {
        let node = Node::default();
        let me = node.address();
        let attacker = Address::from("attacker");

        let mut forged = unsigned_spend(&me, &[("attacker", 990)], STARTING_BALANCE);
        forged.output_map.insert(me.clone(), 10);
        node.receive_transaction(forged.clone());

        let transaction = node.transact(Address::from("bob"), 5).unwrap();

        assert_ne!(transaction.id, forged.id);
        assert!(!transaction.output_map.contains_key(&attacker));
        assert!(transaction.is_valid());
        assert_eq!(node.transaction_map()[&forged.id], forged);

        node.mine_transactions().unwrap();

        assert_eq!(node.balance_of(&attacker), STARTING_BALANCE);
        assert_eq!(
            node.balance_of(&me),
            STARTING_BALANCE - 5 + MINING_REWARD
        );
    }

    #[test]
    fn test_transact_next_to_overflowing_entry() {
        let node = Node::default();
        let me = node.address();

        let mut forged = unsigned_spend(&me, &[("bob", u64::MAX)], STARTING_BALANCE);
        forged.output_map.insert(me.clone(), u64::MAX);
        node.receive_transaction(forged);

        let transaction = node.transact(Address::from("bob"), 5).unwrap();

        assert_eq!(transaction.output_map[&Address::from("bob")], 5);
        assert_eq!(transaction.output_map[&me], STARTING_BALANCE - 5);
    }

    #[test]
    fn test_mine_transactions() {
        let node = Node::default();
        let transaction = node.transact(Address::from("alice"), 100).unwrap();

        let block = node.mine_transactions().unwrap();

        assert_eq!(block.data.len(), 2);
        assert_eq!(block.data[0], transaction);
        assert!(block.data[1].is_reward());
        assert_eq!(node.chain().len(), 2);
        assert!(node.transaction_map().is_empty());
        assert!(node.is_valid());
        assert_eq!(
            node.balance_of(&node.address()),
            STARTING_BALANCE - 100 + MINING_REWARD
        );
        assert_eq!(node.balance_of(&Address::from("alice")), STARTING_BALANCE + 100);
    }

    #[test]
    fn test_mine_transactions_skips_invalid_pool_entries() {
        let node = Node::default();
        let mut forged = Transaction::new(&Wallet::new(), Address::from("mallory"), 10).unwrap();
        forged.input.amount += 1;
        node.receive_transaction(forged);

        let block = node.mine_transactions().unwrap();

        assert_eq!(block.data.len(), 1);
        assert!(block.data[0].is_reward());
        // Never mined, so it stays pending
        assert_eq!(node.transaction_map().len(), 1);
    }

    #[test]
    fn test_receive_longer_chain_prunes_pool() {
        let node = Node::default();
        let peer = Node::default();

        let confirmed = Transaction::new(&Wallet::new(), Address::from("alice"), 10).unwrap();
        let pending = Transaction::new(&Wallet::new(), Address::from("bob"), 10).unwrap();
        node.receive_transaction(confirmed.clone());
        node.receive_transaction(pending.clone());
        peer.receive_transaction(confirmed.clone());
        peer.mine_transactions().unwrap();

        node.receive_chain(peer.chain()).unwrap();

        assert_eq!(node.chain(), peer.chain());
        let remaining = node.transaction_map();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.contains_key(&pending.id));
    }

    #[test]
    fn test_sync_chain_skips_balance_checks() {
        let root = Node::default();
        root.transact(Address::from("alice"), 40).unwrap();
        root.mine_transactions().unwrap();
        root.transact(Address::from("bob"), 10).unwrap();
        root.mine_transactions().unwrap();

        // A fresh node cannot derive the root wallet's second balance
        let node = Node::default();
        assert!(matches!(
            node.receive_chain(root.chain()),
            Err(NodeError::ReplaceChainError(ReplaceChainError::InvalidTransactionData(_)))
        ));

        node.sync_chain(root.chain()).unwrap();

        assert_eq!(node.chain(), root.chain());
        assert_eq!(
            node.balance_of(&root.address()),
            root.balance_of(&root.address())
        );
    }

    #[test]
    fn test_receive_shorter_chain_is_rejected() {
        let node = Node::default();
        node.add_block(vec![Transaction::reward_transaction(&node.address())]).unwrap();
        let before = node.chain();

        let result = node.receive_chain(vec![Block::genesis()]);

        assert!(matches!(
            result,
            Err(NodeError::ReplaceChainError(ReplaceChainError::NotLonger { .. }))
        ));
        assert_eq!(node.chain(), before);
    }

    #[test]
    fn test_receive_transaction_map() {
        let node = Node::default();
        let transaction = Transaction::new(&Wallet::new(), Address::from("alice"), 10).unwrap();
        let mut map = TransactionMap::new();
        map.insert(transaction.id.clone(), transaction);

        node.receive_transaction_map(map.clone());

        assert_eq!(node.transaction_map(), map);
    }

    #[test]
    fn test_concurrent_reads_while_mining() {
        let node = Arc::new(Node::default());

        let miner = {
            let node = Arc::clone(&node);
            thread::spawn(move || node.mine_transactions())
        };

        // Reads and pool writes are never blocked by the search
        let mut received = Vec::new();
        for _ in 0..10 {
            assert!(!node.chain().is_empty());
            let transaction = Transaction::new(&Wallet::new(), Address::from("alice"), 1).unwrap();
            node.receive_transaction(transaction.clone());
            received.push(transaction);
        }

        let block = miner.join().unwrap().unwrap();
        assert_eq!(node.chain().last(), Some(&block));
        assert!(node.is_valid());

        // Every transaction is either mined or still pending
        let pending = node.transaction_map();
        for transaction in &received {
            assert_ne!(
                block.data.contains(transaction),
                pending.contains_key(&transaction.id)
            );
        }
    }

    #[test]
    fn test_transactions_received_while_mining_stay_pending() {
        let node = Node::default();
        let late = Transaction::new(&Wallet::new(), Address::from("alice"), 1).unwrap();
        let tip = node.chain()[0].clone();
        let data = vec![Transaction::reward_transaction(&node.address())];

        // Arrives after the block contents were picked
        node.receive_transaction(late.clone());
        let block = node.mine_on(&tip, data, true).unwrap();

        assert!(!block.data.contains(&late));
        assert_eq!(node.transaction_map().get(&late.id), Some(&late));
    }

    #[test]
    fn test_receive_chain_cancels_mining_round() {
        let node = Arc::new(Node::default());
        let peer = Node::default();
        peer.mine_transactions().unwrap();

        // Difficulty 200 will never be reached, only cancellation ends the round
        let out_of_reach = Block {
            timestamp: Utc::now().timestamp_millis() + 60_000,
            difficulty: 199,
            ..Block::genesis()
        };
        let miner = {
            let node = Arc::clone(&node);
            thread::spawn(move || node.mine_on(&out_of_reach, Vec::new(), true))
        };

        while node.mining_round().is_none() {
            thread::sleep(Duration::from_millis(1));
        }
        node.receive_chain(peer.chain()).unwrap();

        let result = miner.join().unwrap();
        assert!(matches!(
            result,
            Err(NodeError::MiningError(MiningError::Cancelled { .. }))
        ));
        assert_eq!(node.chain(), peer.chain());
        assert!(node.mining_round().is_none());
    }

    #[test]
    fn test_block_on_stale_tip_is_discarded() {
        let node = Node::default();
        let stale_tip = node.chain()[0].clone();
        node.add_block(vec![Transaction::reward_transaction(&node.address())]).unwrap();
        let before = node.chain();

        let result = node.mine_on(
            &stale_tip,
            vec![Transaction::reward_transaction(&node.address())],
            false,
        );

        assert!(matches!(
            result,
            Err(NodeError::StaleTip { expected }) if expected == stale_tip.hash
        ));
        assert_eq!(node.chain(), before);
    }
}
