//! Application configuration loaded from environment variables.

use crate::errors::{LedgerError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC endpoint (e.g. https://rpc-amoy.polygon.technology/)
    pub rpc_url: String,
    /// Hex-encoded signing key for the workflow transactions
    pub private_key: String,
    /// Address of the deployed supply-chain contract
    pub contract_address: String,
    /// Chain id the endpoint must be serving (80002 = Polygon Amoy)
    pub chain_id: u64,
    /// Port for the REST API server
    pub api_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            rpc_url: env_var("RPC_URL")
                .unwrap_or_else(|_| "https://rpc-amoy.polygon.technology/".to_string()),
            private_key: env_var("PRIVATE_KEY").map_err(|_| {
                LedgerError::Config("PRIVATE_KEY environment variable is required".to_string())
            })?,
            contract_address: env_var("CONTRACT_ADDRESS").map_err(|_| {
                LedgerError::Config("CONTRACT_ADDRESS environment variable is required".to_string())
            })?,
            chain_id: env_var("CHAIN_ID")
                .unwrap_or_else(|_| "80002".to_string())
                .parse()
                .map_err(|_| LedgerError::Config("Invalid CHAIN_ID".to_string()))?,
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| LedgerError::Config("Invalid API_PORT".to_string()))?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| LedgerError::Config(format!("Missing env var: {key}")))
}
