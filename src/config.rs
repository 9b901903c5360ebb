// Configuration module
//
// Consensus constants shared by every node, and the per-process settings read
// from the environment at startup.

use rand::Rng;
use thiserror::Error;

use std::env;

/// Difficulty of the genesis block
pub const INITIAL_DIFFICULTY: u32 = 3;

/// Target time between two blocks, in milliseconds
pub const MINE_RATE: i64 = 1000;

/// Balance of an address that has never spent
pub const STARTING_BALANCE: u64 = 1000;

/// Amount credited to a miner by the reward transaction
pub const MINING_REWARD: u64 = 50;

/// Input address that marks a reward transaction
pub const REWARD_INPUT_ADDRESS: &str = "*authorized-address*";

pub const GENESIS_TIMESTAMP: i64 = 1;
pub const GENESIS_LAST_HASH: &str = "-----";
pub const GENESIS_HASH: &str = "hash-one";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;

/// Errors that can occur while reading the configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Settings of a single node process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Interface the HTTP API binds to
    pub host: String,

    /// Port the HTTP API binds to
    pub port: u16,

    /// ed25519 secret key of the node wallet; a fresh one is generated when unset
    pub wallet_secret_key: Option<Vec<u8>>,

    /// Base URL of the root node to sync from at startup; set only on peers
    pub root_address: Option<String>,
}

impl NodeConfig {
    /// Reads the configuration from the environment (and `.env` if present)
    ///
    /// `HOST` and `PORT` override the defaults. With `GENERATE_PEER_PORT=true`
    /// a random port above the base port is picked, so several peers can run
    /// on one machine; such a peer syncs from the root node listening on the
    /// base port. `WALLET_SECRET_KEY` takes the node wallet's secret key as
    /// hex.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Self::from_vars(
            env::var("HOST").ok(),
            env::var("PORT").ok(),
            env::var("GENERATE_PEER_PORT").ok(),
            env::var("WALLET_SECRET_KEY").ok(),
        )
    }

    fn from_vars(
        host: Option<String>,
        port: Option<String>,
        generate_peer_port: Option<String>,
        wallet_secret_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        let host = host.unwrap_or_else(|| DEFAULT_HOST.to_string());

        let base_port = match port {
            Some(value) => value
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidValue { name: "PORT", value })?,
            None => DEFAULT_PORT,
        };

        let (port, root_address) = match generate_peer_port.as_deref() {
            Some("true") => {
                let offset = rand::thread_rng().gen_range(1..=1000);
                let port = base_port.checked_add(offset).ok_or(ConfigError::InvalidValue {
                    name: "PORT",
                    value: base_port.to_string(),
                })?;

                (port, Some(format!("http://{}:{}", host, base_port)))
            }
            _ => (base_port, None),
        };

        let wallet_secret_key = match wallet_secret_key {
            Some(value) => match hex::decode(&value) {
                Ok(bytes) if bytes.len() == 32 => Some(bytes),
                // Never echo the key back
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "WALLET_SECRET_KEY",
                        value: "<redacted>".to_string(),
                    })
                }
            },
            None => None,
        };

        Ok(NodeConfig {
            host,
            port,
            wallet_secret_key,
            root_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::from_vars(None, None, None, None).unwrap();

        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.wallet_secret_key, None);
        assert_eq!(config.root_address, None);
    }

    #[test]
    fn test_explicit_values() {
        let config = NodeConfig::from_vars(
            Some("0.0.0.0".to_string()),
            Some("4000".to_string()),
            Some("false".to_string()),
            None,
        )
        .unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4000);
        assert_eq!(config.root_address, None);
    }

    #[test]
    fn test_generated_peer_port() {
        let config = NodeConfig::from_vars(None, None, Some("true".to_string()), None).unwrap();

        assert!(config.port > DEFAULT_PORT);
        assert!(config.port <= DEFAULT_PORT + 1000);
        assert_eq!(config.root_address.as_deref(), Some("http://127.0.0.1:3000"));
    }

    #[test]
    fn test_invalid_port() {
        let result = NodeConfig::from_vars(None, Some("eighty".to_string()), None, None);
        assert!(matches!(result, Err(ConfigError::InvalidValue { name: "PORT", .. })));

        let result = NodeConfig::from_vars(
            None,
            Some("65535".to_string()),
            Some("true".to_string()),
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_wallet_secret_key() {
        let config = NodeConfig::from_vars(None, None, None, Some("07".repeat(32))).unwrap();
        assert_eq!(config.wallet_secret_key, Some(vec![7; 32]));

        let result = NodeConfig::from_vars(None, None, None, Some("0707".to_string()));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { name: "WALLET_SECRET_KEY", .. })
        ));

        let result = NodeConfig::from_vars(None, None, None, Some("zz".repeat(32)));
        assert!(result.is_err());
    }
}
