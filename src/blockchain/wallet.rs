use serde::Serialize;

use super::block::Block;
use super::crypto::{Address, CryptoError, DigitalSignature, KeyPair};
use super::transaction::{Transaction, TransactionError};
use crate::config::STARTING_BALANCE;

/// A key pair together with the balance it last derived from the chain
#[derive(Debug, Clone)]
pub struct Wallet {
    key_pair: KeyPair,
    balance: u64,
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl Wallet {
    /// Creates a wallet with a fresh key pair and the starting balance
    pub fn new() -> Self {
        Self::from_key_pair(KeyPair::generate())
    }

    /// Wraps an existing key pair
    pub fn from_key_pair(key_pair: KeyPair) -> Self {
        Wallet {
            key_pair,
            balance: STARTING_BALANCE,
        }
    }

    /// Gets the wallet's address
    pub fn address(&self) -> &Address {
        self.key_pair.address()
    }

    /// Balance as of the last derivation from the chain
    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Signs data with the wallet's private key
    pub fn sign<T: Serialize + ?Sized>(&self, data: &T) -> Result<DigitalSignature, CryptoError> {
        self.key_pair.sign(data)
    }

    /// Creates a transaction against the balance derived from `chain`
    ///
    /// # Arguments
    ///
    /// * `recipient` - The address receiving the funds
    /// * `amount` - The amount to transfer
    /// * `chain` - The chain the balance is derived from
    pub fn create_transaction(
        &mut self,
        recipient: Address,
        amount: u64,
        chain: &[Block],
    ) -> Result<Transaction, TransactionError> {
        self.balance = Self::calculate_balance(chain, self.address());

        Transaction::new(self, recipient, amount)
    }

    /// Derives the balance of `address` from chain history
    ///
    /// Blocks are scanned from the tip backwards, adding up every output to
    /// `address`. The most recent block in which `address` itself spent ends
    /// the scan: that spend's change output already carries everything
    /// before it, so the starting balance is no longer added.
    pub fn calculate_balance(chain: &[Block], address: &Address) -> u64 {
        let mut has_conducted_transaction = false;
        let mut outputs_total: u64 = 0;

        for block in chain.iter().skip(1).rev() {
            for transaction in &block.data {
                if transaction.input.address == *address {
                    has_conducted_transaction = true;
                }

                if let Some(amount) = transaction.output_map.get(address) {
                    outputs_total = outputs_total.saturating_add(*amount);
                }
            }

            if has_conducted_transaction {
                break;
            }
        }

        if has_conducted_transaction {
            outputs_total
        } else {
            STARTING_BALANCE.saturating_add(outputs_total)
        }
    }
}
