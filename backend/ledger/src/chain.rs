//! EVM contract binding — signs, submits, and decodes supply-chain calls.
//!
//! ## Failure handling
//!
//! * Connection problems (unreachable endpoint, wrong chain, bad key or
//!   address) all collapse into a single [`LedgerError::Connect`]; the
//!   operator fixes the environment and re-invokes the binary.
//! * Rejected transactions carry the contract's revert reason when it can
//!   be decoded (standard `Error(string)` payload), classified into a
//!   [`Rejection`] kind.  Undiagnosable failures stay [`LedgerError::Call`].

use std::sync::Arc;

use async_trait::async_trait;
use ethers::abi::AbiDecode;
use ethers::contract::{abigen, parse_log, ContractCall, ContractError};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TransactionReceipt, U256, U64};
use ethers::utils::to_checksum;
use tracing::{debug, info};

use crate::config::Config;
use crate::errors::{LedgerError, Rejection, Result};
use crate::product::{Product, ProductLedger, Stage, TransferKind};

abigen!(
    SupplyChain,
    r#"[
        function registerProduct(string name, string description)
        function transferToDistributor(uint256 id, address to)
        function transferToRetailer(uint256 id, address to)
        function sellToConsumer(uint256 id, address to)
        function productCount() view returns (uint256)
        function getProduct(uint256 id) view returns (uint256, string, string, address, uint8)
        function getProductHistory(uint256 id) view returns (string[])
        event ProductRegistered(uint256 id)
    ]"#
);

pub type EthClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// 4-byte selector of the solidity `Error(string)` revert payload.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

// ─────────────────────────────────────────────────────────
// Connection establishment
// ─────────────────────────────────────────────────────────

/// Bind a signing client to the contract at the configured address.
///
/// Verifies that the endpoint serves the expected chain before anything
/// else; a mismatch is a connection failure, not a warning.
pub async fn connect(config: &Config) -> Result<ChainLedger> {
    let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
        .map_err(|e| LedgerError::Connect(format!("bad RPC endpoint {}: {e}", config.rpc_url)))?;

    let chain_id = provider
        .get_chainid()
        .await
        .map_err(|e| LedgerError::Connect(format!("cannot reach {}: {e}", config.rpc_url)))?;
    if chain_id != U256::from(config.chain_id) {
        return Err(LedgerError::Connect(format!(
            "endpoint serves chain {chain_id}, expected chain {}",
            config.chain_id
        )));
    }

    let wallet: LocalWallet = config
        .private_key
        .parse()
        .map_err(|e| LedgerError::Connect(format!("bad signing key: {e}")))?;
    let wallet = wallet.with_chain_id(config.chain_id);
    info!("Signer account: {}", to_checksum(&wallet.address(), None));

    let address: Address = config.contract_address.parse().map_err(|_| {
        LedgerError::Connect(format!("bad contract address {}", config.contract_address))
    })?;

    let client = Arc::new(SignerMiddleware::new(provider, wallet));
    Ok(ChainLedger {
        contract: SupplyChain::new(address, client),
    })
}

/// The production [`ProductLedger`]: every call goes to the chain.
pub struct ChainLedger {
    contract: SupplyChain<EthClient>,
}

impl ChainLedger {
    /// Submit a state-changing call and wait for its mined receipt.
    ///
    /// A dropped transaction or a zero-status receipt counts as rejection.
    async fn send_tx(&self, call: ContractCall<EthClient, ()>, label: &str) -> Result<TransactionReceipt> {
        let pending = call.send().await.map_err(classify_contract_error)?;
        let receipt = pending
            .await
            .map_err(|e| LedgerError::Call(format!("{label}: {e}")))?
            .ok_or_else(|| {
                LedgerError::Call(format!("{label}: transaction dropped before inclusion"))
            })?;

        if receipt.status != Some(U64::from(1)) {
            return Err(Rejection::Reverted(format!("{label}: transaction reverted on-chain")).into());
        }
        debug!(
            "{label} confirmed in block {:?}",
            receipt.block_number.map(|b| b.as_u64())
        );
        Ok(receipt)
    }
}

#[async_trait]
impl ProductLedger for ChainLedger {
    async fn product_count(&self) -> Result<u64> {
        let count = self
            .contract
            .product_count()
            .call()
            .await
            .map_err(|e| LedgerError::Fetch(format!("productCount: {e}")))?;
        u256_to_u64(count)
            .ok_or_else(|| LedgerError::Fetch(format!("productCount out of range: {count}")))
    }

    async fn fetch_product(&self, id: u64) -> Result<Product> {
        let (pid, name, description, owner, status) = self
            .contract
            .get_product(U256::from(id))
            .call()
            .await
            .map_err(|e| LedgerError::Fetch(format!("getProduct({id}): {e}")))?;
        let history = self
            .contract
            .get_product_history(U256::from(id))
            .call()
            .await
            .map_err(|e| LedgerError::Fetch(format!("getProductHistory({id}): {e}")))?;

        let status = Stage::from_index(status)
            .ok_or_else(|| LedgerError::Fetch(format!("product {id}: unknown stage index {status}")))?;

        Ok(Product {
            id: u256_to_u64(pid).unwrap_or(id),
            name,
            description,
            owner: to_checksum(&owner, None),
            status,
            history,
        })
    }

    async fn register(&self, name: &str, description: &str) -> Result<Option<u64>> {
        let call = self
            .contract
            .register_product(name.to_owned(), description.to_owned());
        let receipt = self.send_tx(call, "registerProduct").await?;
        Ok(registered_id(&receipt))
    }

    async fn transfer(&self, kind: TransferKind, id: u64, to: Address) -> Result<()> {
        let call = match kind {
            TransferKind::Distributor => self.contract.transfer_to_distributor(U256::from(id), to),
            TransferKind::Retailer => self.contract.transfer_to_retailer(U256::from(id), to),
            TransferKind::Consumer => self.contract.sell_to_consumer(U256::from(id), to),
        };
        self.send_tx(call, kind.method_name()).await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Receipt / revert decoding
// ─────────────────────────────────────────────────────────

/// Scan a confirmed receipt for the `ProductRegistered` event and pull
/// out the assigned id.  An absent event leaves the id unknown.
fn registered_id(receipt: &TransactionReceipt) -> Option<u64> {
    receipt
        .logs
        .iter()
        .find_map(|log| parse_log::<ProductRegisteredFilter>(log.clone()).ok())
        .and_then(|ev| u256_to_u64(ev.id))
}

fn classify_contract_error(err: ContractError<EthClient>) -> LedgerError {
    let revert_data = match &err {
        ContractError::Revert(data) => Some(data.to_vec()),
        _ => None,
    };
    classify_failure(revert_data.as_deref(), &err.to_string())
}

/// Classify a failed state-changing call.
///
/// Prefers a decodable `Error(string)` payload; falls back to scanning
/// the provider's error text for the node's `execution reverted` wording.
fn classify_failure(revert_data: Option<&[u8]>, message: &str) -> LedgerError {
    if let Some(reason) = revert_data.and_then(decode_revert_reason) {
        return LedgerError::Rejected(classify_revert(&reason));
    }
    if let Some(tail) = message.split("execution reverted").nth(1) {
        let reason = tail.trim_start_matches(':').trim();
        if reason.is_empty() {
            return LedgerError::Rejected(Rejection::Reverted("no reason given".to_string()));
        }
        return LedgerError::Rejected(classify_revert(reason));
    }
    LedgerError::Call(message.to_string())
}

/// Decode a standard `Error(string)` revert payload.
fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() <= 4 || data[..4] != ERROR_SELECTOR {
        return None;
    }
    <String as AbiDecode>::decode(&data[4..]).ok()
}

/// Map a free-text revert reason onto a [`Rejection`] kind.
///
/// The contract's exact strings are not published, so this matches on
/// wording: existence complaints, then stage complaints, then
/// authorization complaints.  Order matters — stage messages often name
/// a role ("not in 'Manufactured' stage") and must win over the role
/// keywords.
fn classify_revert(reason: &str) -> Rejection {
    let lower = reason.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["exist", "not found", "no such", "invalid id"]) {
        Rejection::UnknownProduct(reason.to_string())
    } else if has(&["stage", "status", "state"]) {
        Rejection::WrongStage(reason.to_string())
    } else if has(&["only", "auth", "caller", "owner", "manufactur", "distribut", "retail"]) {
        Rejection::NotAuthorized(reason.to_string())
    } else {
        Rejection::Reverted(reason.to_string())
    }
}

fn u256_to_u64(value: U256) -> Option<u64> {
    (value <= U256::from(u64::MAX)).then(|| value.as_u64())
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::AbiEncode;
    use ethers::contract::EthEvent;
    use ethers::types::{Log, H256};

    fn revert_payload(reason: &str) -> Vec<u8> {
        let mut data = ERROR_SELECTOR.to_vec();
        data.extend(reason.to_string().encode());
        data
    }

    #[test]
    fn decode_revert_reason_roundtrip() {
        let data = revert_payload("Product does not exist");
        assert_eq!(
            decode_revert_reason(&data).as_deref(),
            Some("Product does not exist")
        );
    }

    #[test]
    fn decode_revert_reason_from_raw_hex() {
        // Error("no")
        let data = hex::decode(concat!(
            "08c379a0",
            "0000000000000000000000000000000000000000000000000000000000000020",
            "0000000000000000000000000000000000000000000000000000000000000002",
            "6e6f000000000000000000000000000000000000000000000000000000000000",
        ))
        .unwrap();
        assert_eq!(decode_revert_reason(&data).as_deref(), Some("no"));
    }

    #[test]
    fn decode_revert_reason_rejects_other_selectors() {
        let mut data = revert_payload("whatever");
        data[0] ^= 0xff;
        assert_eq!(decode_revert_reason(&data), None);
    }

    #[test]
    fn classify_revert_existence() {
        assert!(matches!(
            classify_revert("Product does not exist"),
            Rejection::UnknownProduct(_)
        ));
    }

    #[test]
    fn classify_revert_stage_wins_over_role_keywords() {
        assert!(matches!(
            classify_revert("Product is not in 'Manufactured' stage"),
            Rejection::WrongStage(_)
        ));
    }

    #[test]
    fn classify_revert_authorization() {
        assert!(matches!(
            classify_revert("Only the current distributor can transfer"),
            Rejection::NotAuthorized(_)
        ));
    }

    #[test]
    fn classify_revert_fallback_keeps_reason() {
        assert_eq!(
            classify_revert("arithmetic overflow"),
            Rejection::Reverted("arithmetic overflow".to_string())
        );
    }

    #[test]
    fn classify_failure_prefers_revert_data() {
        let data = revert_payload("Product does not exist");
        let err = classify_failure(Some(&data), "irrelevant provider text");
        assert!(matches!(
            err,
            LedgerError::Rejected(Rejection::UnknownProduct(_))
        ));
    }

    #[test]
    fn classify_failure_scans_provider_text() {
        let err = classify_failure(
            None,
            "(code: 3, message: execution reverted: Only the manufacturer can register, data: None)",
        );
        assert!(matches!(
            err,
            LedgerError::Rejected(Rejection::NotAuthorized(_))
        ));
    }

    #[test]
    fn classify_failure_without_revert_is_a_plain_call_error() {
        let err = classify_failure(None, "connection timed out");
        assert!(matches!(err, LedgerError::Call(_)));
    }

    #[test]
    fn registered_id_extracted_from_receipt_logs() {
        let log = Log {
            topics: vec![ProductRegisteredFilter::signature()],
            data: U256::from(7u64).encode().into(),
            ..Default::default()
        };
        let receipt = TransactionReceipt {
            logs: vec![log],
            ..Default::default()
        };
        assert_eq!(registered_id(&receipt), Some(7));
    }

    #[test]
    fn registered_id_absent_event_is_unknown() {
        let stray = Log {
            topics: vec![H256::zero()],
            ..Default::default()
        };
        let receipt = TransactionReceipt {
            logs: vec![stray],
            ..Default::default()
        };
        assert_eq!(registered_id(&receipt), None);
    }

    #[test]
    fn u256_conversion_guards_overflow() {
        assert_eq!(u256_to_u64(U256::from(42u64)), Some(42));
        assert_eq!(u256_to_u64(U256::from(u64::MAX)), Some(u64::MAX));
        assert_eq!(u256_to_u64(U256::from(u64::MAX) + 1), None);
    }
}
