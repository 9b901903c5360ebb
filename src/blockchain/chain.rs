use log::{error, info};
use thiserror::Error;

use std::collections::HashSet;

use super::block::Block;
use super::transaction::{InvalidTransaction, Transaction};
use super::wallet::Wallet;
use crate::config::MINING_REWARD;

/// Reasons a chain fails structural validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainValidationError {
    #[error("Chain does not start with the genesis block")]
    InvalidGenesis,

    #[error("Block {index} does not link to the hash of its predecessor")]
    BrokenLink { index: usize },

    #[error("Block {index} hash does not match its contents")]
    HashMismatch { index: usize },

    #[error("Block {index} hash does not satisfy difficulty {difficulty}")]
    InsufficientWork { index: usize, difficulty: u32 },

    #[error("Block {index} difficulty jumps from {previous} to {difficulty}")]
    DifficultyJump {
        index: usize,
        previous: u32,
        difficulty: u32,
    },
}

/// Reasons the transactions of a chain are rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionDataError {
    #[error("Block {block} has more than one mining reward")]
    ExcessRewards { block: usize },

    #[error("Block {block} has an invalid mining reward amount")]
    InvalidRewardAmount { block: usize },

    #[error("Block {block} has an invalid transaction: {source}")]
    InvalidTransaction {
        block: usize,
        source: InvalidTransaction,
    },

    #[error("Block {block} transaction {id} has input amount {got}, expected balance {expected}")]
    InvalidInputAmount {
        block: usize,
        id: String,
        expected: u64,
        got: u64,
    },

    #[error("Block {block} contains transaction {id} more than once")]
    DuplicateTransaction { block: usize, id: String },
}

/// Reasons an incoming chain does not replace the local one
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplaceChainError {
    #[error("The incoming chain must be longer: incoming {incoming}, local {local}")]
    NotLonger { incoming: usize, local: usize },

    #[error("The incoming chain must be valid: {0}")]
    InvalidChain(#[from] ChainValidationError),

    #[error("The incoming chain has invalid data: {0}")]
    InvalidTransactionData(#[from] TransactionDataError),
}

/// Represents the blockchain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blockchain {
    /// The chain of blocks, genesis first
    chain: Vec<Block>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Creates a new blockchain holding only the genesis block
    pub fn new() -> Self {
        Blockchain {
            chain: vec![Block::genesis()],
        }
    }

    /// Gets the entire chain
    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    /// Gets the last block in the chain
    pub fn last_block(&self) -> &Block {
        // The chain always holds at least the genesis block
        &self.chain[self.chain.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Mines a block with `data` on top of the current tip and appends it
    pub fn add_block(&mut self, data: Vec<Transaction>) -> &Block {
        let block = Block::mine_block(self.last_block(), data);
        self.chain.push(block);
        self.last_block()
    }

    /// Appends a block that was mined elsewhere on top of the current tip
    ///
    /// Fails with `BrokenLink` when the tip moved while the block was being
    /// mined; the chain is left unchanged in that case.
    pub fn append_mined_block(&mut self, block: Block) -> Result<&Block, ChainValidationError> {
        if block.last_hash != self.last_block().hash {
            return Err(ChainValidationError::BrokenLink {
                index: self.chain.len(),
            });
        }

        self.chain.push(block);
        Ok(self.last_block())
    }

    /// Validates the structure of a chain without consulting local state
    ///
    /// Checks the genesis block, the hash links, every block's hash against
    /// its contents, the proof of work for the stored difficulty, and that
    /// the difficulty moves by at most one between neighbours.
    pub fn validate_chain(chain: &[Block]) -> Result<(), ChainValidationError> {
        match chain.first() {
            Some(first) if *first == Block::genesis() => {}
            _ => return Err(ChainValidationError::InvalidGenesis),
        }

        for (index, pair) in chain.windows(2).enumerate() {
            let (previous, block) = (&pair[0], &pair[1]);
            let index = index + 1;

            if block.last_hash != previous.hash {
                return Err(ChainValidationError::BrokenLink { index });
            }

            if block.hash != block.calculate_hash() {
                return Err(ChainValidationError::HashMismatch { index });
            }

            if !block.has_valid_proof() {
                return Err(ChainValidationError::InsufficientWork {
                    index,
                    difficulty: block.difficulty,
                });
            }

            if block.difficulty.abs_diff(previous.difficulty) > 1 {
                return Err(ChainValidationError::DifficultyJump {
                    index,
                    previous: previous.difficulty,
                    difficulty: block.difficulty,
                });
            }
        }

        Ok(())
    }

    /// Boolean form of [`Blockchain::validate_chain`]
    pub fn is_valid_chain(chain: &[Block]) -> bool {
        Self::validate_chain(chain).is_ok()
    }

    /// Validates the transactions of every block in `chain` after genesis
    ///
    /// Input amounts are checked against balances derived from this
    /// (local) chain, not from the candidate, so a candidate cannot supply
    /// its own justifying history.
    pub fn validate_transaction_data(&self, chain: &[Block]) -> Result<(), TransactionDataError> {
        for (block_index, block) in chain.iter().enumerate().skip(1) {
            let mut seen = HashSet::new();
            let mut reward_count = 0;

            for transaction in &block.data {
                if transaction.is_reward() {
                    reward_count += 1;
                    if reward_count > 1 {
                        return Err(TransactionDataError::ExcessRewards { block: block_index });
                    }

                    let mut outputs = transaction.output_map.values();
                    if outputs.next() != Some(&MINING_REWARD) || outputs.next().is_some() {
                        return Err(TransactionDataError::InvalidRewardAmount { block: block_index });
                    }
                } else {
                    transaction
                        .validate()
                        .map_err(|source| TransactionDataError::InvalidTransaction {
                            block: block_index,
                            source,
                        })?;

                    let true_balance =
                        Wallet::calculate_balance(&self.chain, &transaction.input.address);
                    if transaction.input.amount != true_balance {
                        return Err(TransactionDataError::InvalidInputAmount {
                            block: block_index,
                            id: transaction.id.clone(),
                            expected: true_balance,
                            got: transaction.input.amount,
                        });
                    }
                }

                if !seen.insert(transaction.id.as_str()) {
                    return Err(TransactionDataError::DuplicateTransaction {
                        block: block_index,
                        id: transaction.id.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Boolean form of [`Blockchain::validate_transaction_data`]; the reason
    /// is logged
    pub fn valid_transaction_data(&self, chain: &[Block]) -> bool {
        match self.validate_transaction_data(chain) {
            Ok(()) => true,
            Err(err) => {
                error!("{}", err);
                false
            }
        }
    }

    /// Replaces the local chain with a longer, valid incoming chain
    ///
    /// `on_success` runs with the adopted chain right before the swap. On any
    /// rejection the local chain is left untouched and the reason is logged.
    pub fn replace_chain<F>(
        &mut self,
        chain: Vec<Block>,
        validate_transactions: bool,
        on_success: F,
    ) -> Result<(), ReplaceChainError>
    where
        F: FnOnce(&[Block]),
    {
        if let Err(err) = self.check_replacement(&chain, validate_transactions) {
            error!("{}", err);
            return Err(err);
        }

        on_success(&chain);

        info!(
            "Replacing chain of length {} with incoming chain of length {}",
            self.chain.len(),
            chain.len()
        );
        self.chain = chain;

        Ok(())
    }

    fn check_replacement(
        &self,
        chain: &[Block],
        validate_transactions: bool,
    ) -> Result<(), ReplaceChainError> {
        if chain.len() <= self.chain.len() {
            return Err(ReplaceChainError::NotLonger {
                incoming: chain.len(),
                local: self.chain.len(),
            });
        }

        Self::validate_chain(chain)?;

        if validate_transactions {
            self.validate_transaction_data(chain)?;
        }

        Ok(())
    }
}
