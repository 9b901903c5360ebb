use chrono::Utc;
use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use std::collections::BTreeMap;

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature};
use super::wallet::Wallet;
use crate::config::{MINING_REWARD, REWARD_INPUT_ADDRESS};

/// Amount owed to each recipient of a transaction, including the sender's change
pub type OutputMap = BTreeMap<Address, u64>;

/// Errors that can occur while authoring a transaction
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Amount exceeds balance: requested {amount}, available {balance}")]
    InsufficientBalance { amount: u64, balance: u64 },

    #[error("Transaction was signed by {signer}, not {sender}")]
    SenderMismatch { signer: Address, sender: Address },

    #[error("Output for {0} would overflow")]
    OutputOverflow(Address),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// Reasons a transaction fails its self-consistency check
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTransaction {
    #[error("Invalid transaction from {address}: outputs total {output_total}, input amount {input_amount}")]
    UnbalancedOutputs {
        address: Address,
        output_total: u128,
        input_amount: u64,
    },

    #[error("Invalid signature from {0}")]
    BadSignature(Address),
}

/// Signed statement of who spends and how much they held when signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TransactionInput {
    /// Milliseconds since the Unix epoch at signing time
    pub timestamp: i64,

    /// Balance of the signer when the transaction was signed
    pub amount: u64,

    /// Address (public key) of the signer
    pub address: Address,

    /// Signature over the output map; absent on reward transactions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<DigitalSignature>,
}

impl TransactionInput {
    /// Signs `output_map` with the sender's key, recording `amount` as the
    /// sender's balance
    pub fn sign(sender: &Wallet, amount: u64, output_map: &OutputMap) -> Result<Self, CryptoError> {
        Ok(TransactionInput {
            timestamp: Utc::now().timestamp_millis(),
            amount,
            address: sender.address().clone(),
            signature: Some(sender.sign(output_map)?),
        })
    }

    /// The well-known input of every reward transaction
    pub fn reward() -> Self {
        TransactionInput {
            timestamp: 0,
            amount: 0,
            address: Address::from(REWARD_INPUT_ADDRESS),
            signature: None,
        }
    }
}

/// Represents a transfer of funds between addresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique identifier for the transaction
    pub id: String,

    /// Amount credited to each address, including the sender's change
    #[schema(value_type = Object)]
    pub output_map: OutputMap,

    /// The signed input
    pub input: TransactionInput,
}

impl Transaction {
    /// Creates a transaction spending `amount` of the sender's balance
    ///
    /// The sender keeps `balance - amount` as change. The wallet's balance
    /// must already reflect the chain; see [`Wallet::create_transaction`].
    ///
    /// # Returns
    ///
    /// The signed transaction, or `InsufficientBalance` when `amount`
    /// exceeds the sender's balance
    pub fn new(sender: &Wallet, recipient: Address, amount: u64) -> Result<Self, TransactionError> {
        let balance = sender.balance();
        if amount > balance {
            return Err(TransactionError::InsufficientBalance { amount, balance });
        }

        let mut output_map = OutputMap::new();
        output_map.insert(recipient, amount);
        output_map.insert(sender.address().clone(), balance - amount);

        let input = TransactionInput::sign(sender, balance, &output_map)?;

        Ok(Self::from_parts(output_map, input))
    }

    /// Assembles a transaction from an existing output map and input
    pub fn from_parts(output_map: OutputMap, input: TransactionInput) -> Self {
        Transaction {
            id: Uuid::new_v4().to_string(),
            output_map,
            input,
        }
    }

    /// Creates the transaction that pays the mining reward to `miner_address`
    pub fn reward_transaction(miner_address: &Address) -> Self {
        let mut output_map = OutputMap::new();
        output_map.insert(miner_address.clone(), MINING_REWARD);

        Self::from_parts(output_map, TransactionInput::reward())
    }

    /// Adds `amount` for `recipient` to a pending transaction and re-signs it
    ///
    /// The amount is taken from the sender's change output, so the sum of the
    /// outputs keeps matching the input amount. Must not be called on a
    /// transaction that is already part of a block. Only the original signer
    /// may amend it, and the transaction is left untouched on any error.
    pub fn update(
        &mut self,
        sender: &Wallet,
        recipient: Address,
        amount: u64,
    ) -> Result<(), TransactionError> {
        if *sender.address() != self.input.address {
            return Err(TransactionError::SenderMismatch {
                signer: self.input.address.clone(),
                sender: sender.address().clone(),
            });
        }

        let change = self
            .output_map
            .get(sender.address())
            .copied()
            .unwrap_or(0);

        if amount > change {
            return Err(TransactionError::InsufficientBalance {
                amount,
                balance: change,
            });
        }

        let mut output_map = self.output_map.clone();

        let credited = output_map
            .get(&recipient)
            .copied()
            .unwrap_or(0)
            .checked_add(amount)
            .ok_or_else(|| TransactionError::OutputOverflow(recipient.clone()))?;
        output_map.insert(recipient, credited);

        // Re-read the change: the recipient may be the sender
        let change = output_map
            .get(sender.address())
            .copied()
            .unwrap_or(0)
            .checked_sub(amount)
            .ok_or_else(|| TransactionError::InsufficientBalance {
                amount,
                balance: change,
            })?;
        output_map.insert(sender.address().clone(), change);

        self.input = TransactionInput::sign(sender, self.input.amount, &output_map)?;
        self.output_map = output_map;

        Ok(())
    }

    /// Checks whether this is a mining reward
    pub fn is_reward(&self) -> bool {
        self.input.address.0 == REWARD_INPUT_ADDRESS
    }

    /// Sum of all outputs
    pub fn output_total(&self) -> u128 {
        self.output_map.values().map(|amount| u128::from(*amount)).sum()
    }

    /// Checks that the outputs add up to the input amount and that the
    /// signer signed exactly this output map
    ///
    /// No chain lookups happen here: whether the signer really owned
    /// `input.amount` is decided against chain history by the blockchain.
    pub fn validate(&self) -> Result<(), InvalidTransaction> {
        let output_total = self.output_total();
        if output_total != u128::from(self.input.amount) {
            return Err(InvalidTransaction::UnbalancedOutputs {
                address: self.input.address.clone(),
                output_total,
                input_amount: self.input.amount,
            });
        }

        let verified = match &self.input.signature {
            Some(signature) => {
                verify_signature(&self.input.address, &self.output_map, signature).unwrap_or(false)
            }
            None => false,
        };

        if !verified {
            return Err(InvalidTransaction::BadSignature(self.input.address.clone()));
        }

        Ok(())
    }

    /// Boolean form of [`Transaction::validate`]; the reason is logged
    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(err) => {
                error!("{}", err);
                false
            }
        }
    }
}
