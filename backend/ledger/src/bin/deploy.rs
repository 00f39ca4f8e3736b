//! One-shot contract deployment.
//!
//! Reads the compiled artifact (ABI + creation bytecode), deploys it
//! through a signing client, and prints the deployed address to stdout —
//! that address goes into the ledger client's `CONTRACT_ADDRESS`.
//! Any failure prints the error and exits non-zero.
//!
//! Environment:
//! * `RPC_URL`       — JSON-RPC endpoint (default: the public Amoy endpoint)
//! * `PRIVATE_KEY`   — hex signing key (required)
//! * `CHAIN_ID`      — expected chain id (default: 80002)
//! * `ARTIFACT_PATH` — compiled artifact JSON (default: artifacts/SupplyChain.json)

use std::{fs, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use ethers::abi::Abi;
use ethers::contract::ContractFactory;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Bytes, U256};
use ethers::utils::to_checksum;
use serde::Deserialize;

const DEFAULT_RPC_URL: &str = "https://rpc-amoy.polygon.technology/";
const DEFAULT_CHAIN_ID: u64 = 80002;
const DEFAULT_ARTIFACT_PATH: &str = "artifacts/SupplyChain.json";

/// The slice of a compiler artifact we need (hardhat/foundry layout).
#[derive(Deserialize)]
struct Artifact {
    abi: Abi,
    bytecode: Bytes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let rpc_url = std::env::var("RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
    let private_key =
        std::env::var("PRIVATE_KEY").context("PRIVATE_KEY environment variable is required")?;
    let chain_id: u64 = std::env::var("CHAIN_ID")
        .unwrap_or_else(|_| DEFAULT_CHAIN_ID.to_string())
        .parse()
        .context("Invalid CHAIN_ID")?;
    let artifact_path =
        std::env::var("ARTIFACT_PATH").unwrap_or_else(|_| DEFAULT_ARTIFACT_PATH.to_string());

    let raw = fs::read_to_string(&artifact_path)
        .with_context(|| format!("cannot read contract artifact {artifact_path}"))?;
    let artifact: Artifact = serde_json::from_str(&raw)
        .with_context(|| format!("malformed contract artifact {artifact_path}"))?;

    let provider = Provider::<Http>::try_from(rpc_url.as_str())
        .with_context(|| format!("bad RPC endpoint {rpc_url}"))?
        .interval(Duration::from_millis(500));
    let connected = provider
        .get_chainid()
        .await
        .with_context(|| format!("cannot reach {rpc_url}"))?;
    if connected != U256::from(chain_id) {
        return Err(anyhow!(
            "endpoint serves chain {connected}, expected chain {chain_id}"
        ));
    }

    let wallet: LocalWallet = private_key
        .parse::<LocalWallet>()
        .context("Invalid PRIVATE_KEY")?
        .with_chain_id(chain_id);
    let client = Arc::new(SignerMiddleware::new(provider, wallet));

    eprintln!("Deploying supply-chain contract to chain {chain_id} via {rpc_url} ...");
    let factory = ContractFactory::new(artifact.abi, artifact.bytecode, client);
    let contract = factory.deploy(())?.send().await?;

    // The address is the whole point; keep stdout machine-readable.
    println!("{}", to_checksum(&contract.address(), None));
    Ok(())
}
