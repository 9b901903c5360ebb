use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use utoipa::ToSchema;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::hash::{crypto_hash, meets_difficulty};
use super::transaction::Transaction;
use crate::config::{
    GENESIS_HASH, GENESIS_LAST_HASH, GENESIS_TIMESTAMP, INITIAL_DIFFICULTY, MINE_RATE,
};

/// Errors that can occur while mining
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MiningError {
    #[error("Mining cancelled after {attempts} attempts")]
    Cancelled { attempts: u64 },
}

/// Shared flag that stops a running proof-of-work search
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every search holding this token to stop
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Checks whether both tokens control the same search
    pub fn is_same(&self, other: &CancellationToken) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Represents a block in the blockchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Milliseconds since the Unix epoch when the block was mined
    pub timestamp: i64,

    /// Hash of the previous block
    pub last_hash: String,

    /// Hash of this block
    pub hash: String,

    /// Transactions in mining order
    pub data: Vec<Transaction>,

    /// Proof of work counter
    pub nonce: u64,

    /// Number of leading zero bits required of `hash`
    pub difficulty: u32,
}

impl Block {
    /// The hard-coded first block shared by every node
    pub fn genesis() -> Self {
        Block {
            timestamp: GENESIS_TIMESTAMP,
            last_hash: GENESIS_LAST_HASH.to_string(),
            hash: GENESIS_HASH.to_string(),
            data: Vec::new(),
            nonce: 0,
            difficulty: INITIAL_DIFFICULTY,
        }
    }

    /// Calculates the hash of the block from its header fields and data
    pub fn calculate_hash(&self) -> String {
        crypto_hash(&[
            json!(self.timestamp),
            json!(self.last_hash),
            json!(self.data),
            json!(self.nonce),
            json!(self.difficulty),
        ])
    }

    /// Checks that the stored hash carries the work its difficulty asks for
    pub fn has_valid_proof(&self) -> bool {
        meets_difficulty(&self.hash, self.difficulty)
    }

    /// Mines a block on top of `last_block`
    ///
    /// Runs until a nonce is found; use [`Block::mine_block_cancellable`]
    /// when the search has to be interruptible.
    pub fn mine_block(last_block: &Block, data: Vec<Transaction>) -> Block {
        // Nobody else holds the token, so the search only ends with a block
        Self::mine_block_cancellable(last_block, data, &CancellationToken::new())
            .unwrap_or_else(|err| panic!("Uncancellable mining stopped: {}", err))
    }

    /// Mines a block on top of `last_block`, checking `token` before every
    /// attempt
    ///
    /// Each attempt bumps the nonce, takes a fresh timestamp and retargets
    /// the difficulty against it before hashing.
    pub fn mine_block_cancellable(
        last_block: &Block,
        data: Vec<Transaction>,
        token: &CancellationToken,
    ) -> Result<Block, MiningError> {
        let last_hash = last_block.hash.clone();

        // Timestamp, nonce and difficulty change between attempts, the rest is fixed
        let mut fields: [Value; 5] = [
            Value::Null,
            json!(last_hash),
            json!(data),
            Value::Null,
            Value::Null,
        ];

        let mut nonce: u64 = 0;
        loop {
            if token.is_cancelled() {
                debug!("Mining on {} cancelled after {} attempts", last_hash, nonce);
                return Err(MiningError::Cancelled { attempts: nonce });
            }

            nonce += 1;
            let timestamp = Utc::now().timestamp_millis();
            let difficulty = Self::adjust_difficulty(last_block, timestamp);

            fields[0] = json!(timestamp);
            fields[3] = json!(nonce);
            fields[4] = json!(difficulty);
            let hash = crypto_hash(&fields);

            if meets_difficulty(&hash, difficulty) {
                debug!("Mined block {} after {} attempts", hash, nonce);
                return Ok(Block {
                    timestamp,
                    last_hash,
                    hash,
                    data,
                    nonce,
                    difficulty,
                });
            }

            if nonce % 100_000 == 0 {
                debug!("Mining attempts: {} (difficulty {})", nonce, difficulty);
            }
        }
    }

    /// Retargets the difficulty for a block mined at `timestamp` on top of
    /// `original_block`
    ///
    /// Slower than `MINE_RATE` lowers the difficulty by one, anything else
    /// raises it by one. The result is never below 1.
    pub fn adjust_difficulty(original_block: &Block, timestamp: i64) -> u32 {
        let difficulty = original_block.difficulty;

        if difficulty < 1 {
            return 1;
        }

        if timestamp - original_block.timestamp > MINE_RATE {
            return (difficulty - 1).max(1);
        }

        difficulty + 1
    }
}
