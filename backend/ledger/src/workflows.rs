//! Workflow orchestration over the on-chain ledger.
//!
//! Holds the in-memory product table (a snapshot of the contract's state,
//! never a source of truth) and runs the four user workflows against the
//! [`ProductLedger`] boundary.  Input validation happens here, before any
//! network round trip; authorization and stage correctness are entirely
//! the contract's business.

use std::sync::Arc;

use ethers::types::Address;
use ethers::utils::to_checksum;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::errors::{LedgerError, Result};
use crate::product::{Product, ProductLedger, TransferKind};

pub struct LedgerState {
    ledger: Arc<dyn ProductLedger>,
    products: RwLock<Vec<Product>>,
    /// Serializes state-changing workflows across the call and its
    /// follow-up reload.  Read-only reloads don't take this lock.
    write_gate: Mutex<()>,
}

impl LedgerState {
    pub fn new(ledger: Arc<dyn ProductLedger>) -> Self {
        Self {
            ledger,
            products: RwLock::new(Vec::new()),
            write_gate: Mutex::new(()),
        }
    }

    /// Current view of the product table (possibly stale).
    pub async fn snapshot(&self) -> Vec<Product> {
        self.products.read().await.clone()
    }

    /// Full-table reload: re-fetch every product by sequential id.
    ///
    /// Replaces the snapshot wholesale on success.  Any single fetch
    /// failure aborts the reload and leaves the previous snapshot intact;
    /// callers log the error rather than surfacing it.
    pub async fn reload(&self) -> Result<usize> {
        let count = self.ledger.product_count().await?;
        let mut table = Vec::with_capacity(count as usize);
        for id in 1..=count {
            table.push(self.ledger.fetch_product(id).await?);
        }
        let len = table.len();
        *self.products.write().await = table;
        debug!("Reloaded {len} products");
        Ok(len)
    }

    /// Register a new product and refresh the table.
    ///
    /// Returns the id reported by the registration event; `None` means
    /// the transaction confirmed but the event was absent, which still
    /// counts as success.
    pub async fn register(&self, name: &str, description: &str) -> Result<Option<u64>> {
        let (name, description) = validate_register_inputs(name, description)?;
        let _gate = self.write_gate.lock().await;
        let id = self.ledger.register(&name, &description).await?;
        match id {
            Some(id) => info!("Registered product {id}"),
            None => info!("Registered product (id not reported by event)"),
        }
        self.refresh_after_write().await;
        Ok(id)
    }

    /// Hand a product to the next actor in the chain and refresh the table.
    pub async fn transfer(&self, kind: TransferKind, id: u64, to: &str) -> Result<()> {
        let id = validate_product_id(id)?;
        let to = parse_destination(to)?;
        let _gate = self.write_gate.lock().await;
        self.ledger.transfer(kind, id, to).await?;
        info!(
            "{} succeeded for product {id} -> {}",
            kind.method_name(),
            to_checksum(&to, None)
        );
        self.refresh_after_write().await;
        Ok(())
    }

    /// Reload after a confirmed write.  A failed reload never fails the
    /// workflow that triggered it; the stale table is kept.
    async fn refresh_after_write(&self) {
        if let Err(e) = self.reload().await {
            warn!("Reload after write failed, keeping previous table: {e}");
        }
    }
}

// ─────────────────────────────────────────────────────────
// Input validation
// ─────────────────────────────────────────────────────────

fn validate_register_inputs(name: &str, description: &str) -> Result<(String, String)> {
    let name = name.trim();
    let description = description.trim();
    if name.is_empty() || description.is_empty() {
        return Err(LedgerError::InvalidInput(
            "product name and description are required".to_string(),
        ));
    }
    Ok((name.to_string(), description.to_string()))
}

fn validate_product_id(id: u64) -> Result<u64> {
    if id == 0 {
        return Err(LedgerError::InvalidInput(
            "product id must be a positive integer".to_string(),
        ));
    }
    Ok(id)
}

/// Parse a destination address: 0x-prefixed, 40 hex digits, and when the
/// hex carries mixed case its EIP-55 checksum must hold.
fn parse_destination(raw: &str) -> Result<Address> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(LedgerError::InvalidInput(
            "destination address is required".to_string(),
        ));
    }
    if !s.starts_with("0x") {
        return Err(LedgerError::InvalidInput(format!(
            "destination address must start with 0x: {s}"
        )));
    }
    let addr: Address = s
        .parse()
        .map_err(|_| LedgerError::InvalidInput(format!("malformed destination address: {s}")))?;

    let hex_part = &s[2..];
    let mixed_case = hex_part.chars().any(|c| c.is_ascii_uppercase())
        && hex_part.chars().any(|c| c.is_ascii_lowercase());
    if mixed_case && to_checksum(&addr, None) != s {
        return Err(LedgerError::InvalidInput(format!(
            "destination address fails its checksum: {s}"
        )));
    }
    Ok(addr)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Rejection;
    use crate::product::Stage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    const MANUFACTURER: &str = "0x0000000000000000000000000000000000000001";
    // EIP-55 test vector.
    const DISTRIBUTOR: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    /// In-memory stand-in for the contract.  Enforces the same forward-only
    /// stage machine so rejection paths behave like the real thing.
    #[derive(Default)]
    struct MockLedger {
        products: StdMutex<Vec<Product>>,
        writes: AtomicUsize,
        fail_reads: AtomicBool,
    }

    #[async_trait]
    impl ProductLedger for MockLedger {
        async fn product_count(&self) -> Result<u64> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(LedgerError::Fetch("simulated RPC outage".to_string()));
            }
            Ok(self.products.lock().unwrap().len() as u64)
        }

        async fn fetch_product(&self, id: u64) -> Result<Product> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(LedgerError::Fetch("simulated RPC outage".to_string()));
            }
            self.products
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or_else(|| LedgerError::Fetch(format!("no product {id}")))
        }

        async fn register(&self, name: &str, description: &str) -> Result<Option<u64>> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut table = self.products.lock().unwrap();
            let id = table.len() as u64 + 1;
            table.push(Product {
                id,
                name: name.to_string(),
                description: description.to_string(),
                owner: MANUFACTURER.to_string(),
                status: Stage::Manufactured,
                history: vec![format!("Manufactured by {MANUFACTURER}")],
            });
            Ok(Some(id))
        }

        async fn transfer(&self, kind: TransferKind, id: u64, to: Address) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut table = self.products.lock().unwrap();
            let product = table.iter_mut().find(|p| p.id == id).ok_or_else(|| {
                LedgerError::Rejected(Rejection::UnknownProduct(format!("product {id}")))
            })?;
            if product.status != kind.required_stage() {
                return Err(Rejection::WrongStage(format!(
                    "product {id} is in '{}' stage",
                    product.status.as_str()
                ))
                .into());
            }
            product.status = kind.target_stage();
            product.owner = to_checksum(&to, None);
            product
                .history
                .push(format!("{} -> {}", kind.method_name(), product.owner));
            Ok(())
        }
    }

    fn state_with(mock: Arc<MockLedger>) -> LedgerState {
        LedgerState::new(mock)
    }

    #[tokio::test]
    async fn register_then_reload_reports_matching_id() {
        let state = state_with(Arc::new(MockLedger::default()));
        let id = state.register("Widget", "A test widget").await.unwrap();
        assert_eq!(id, Some(1));

        let table = state.snapshot().await;
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].id, 1);
        assert_eq!(table[0].status, Stage::Manufactured);
    }

    #[tokio::test]
    async fn blank_registration_never_reaches_the_contract() {
        let mock = Arc::new(MockLedger::default());
        let state = state_with(mock.clone());

        let err = state.register("   ", "desc").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        let err = state.register("Widget", "").await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert_eq!(mock.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_transfer_inputs_never_reach_the_contract() {
        let mock = Arc::new(MockLedger::default());
        let state = state_with(mock.clone());

        for to in ["", "not-an-address", "5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed", "0x1234"] {
            let err = state
                .transfer(TransferKind::Distributor, 1, to)
                .await
                .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidInput(_)), "input: {to:?}");
        }
        let err = state
            .transfer(TransferKind::Distributor, 0, DISTRIBUTOR)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
        assert_eq!(mock.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_ledger_reloads_to_an_empty_list() {
        let state = state_with(Arc::new(MockLedger::default()));
        assert_eq!(state.reload().await.unwrap(), 0);
        assert!(state.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn failed_reload_preserves_the_previous_snapshot() {
        let mock = Arc::new(MockLedger::default());
        let state = state_with(mock.clone());
        state.register("Widget", "A test widget").await.unwrap();
        assert_eq!(state.snapshot().await.len(), 1);

        mock.fail_reads.store(true, Ordering::SeqCst);
        assert!(state.reload().await.is_err());
        assert_eq!(state.snapshot().await.len(), 1, "stale table must survive");
    }

    #[tokio::test]
    async fn transfer_advances_stage_and_owner() {
        let state = state_with(Arc::new(MockLedger::default()));
        state.register("Widget", "A test widget").await.unwrap();

        state
            .transfer(TransferKind::Distributor, 1, DISTRIBUTOR)
            .await
            .unwrap();

        let table = state.snapshot().await;
        assert_eq!(table[0].status, Stage::Distributed);
        assert_eq!(table[0].owner, DISTRIBUTOR);
        assert_eq!(table[0].history.len(), 2);
    }

    #[tokio::test]
    async fn out_of_order_transfer_is_rejected_and_leaves_the_product_alone() {
        let state = state_with(Arc::new(MockLedger::default()));
        state.register("Widget", "A test widget").await.unwrap();

        // Product is Manufactured; skipping straight to the retailer must fail.
        let err = state
            .transfer(TransferKind::Retailer, 1, DISTRIBUTOR)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Rejected(Rejection::WrongStage(_))
        ));

        let table = state.snapshot().await;
        assert_eq!(table[0].status, Stage::Manufactured);
        assert_eq!(table[0].history.len(), 1);
    }

    #[tokio::test]
    async fn transfer_of_unknown_product_is_rejected() {
        let state = state_with(Arc::new(MockLedger::default()));
        let err = state
            .transfer(TransferKind::Distributor, 5, DISTRIBUTOR)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Rejected(Rejection::UnknownProduct(_))
        ));
    }

    #[tokio::test]
    async fn history_never_shrinks_across_reloads() {
        let state = state_with(Arc::new(MockLedger::default()));
        state.register("Widget", "A test widget").await.unwrap();
        state.reload().await.unwrap();
        let before = state.snapshot().await[0].history.len();

        state
            .transfer(TransferKind::Distributor, 1, DISTRIBUTOR)
            .await
            .unwrap();
        state.reload().await.unwrap();
        let after = state.snapshot().await[0].history.len();
        assert!(after >= before);
    }

    #[test]
    fn destination_validation_accepts_lowercase_and_checksummed() {
        assert!(parse_destination("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").is_ok());
        assert!(parse_destination(DISTRIBUTOR).is_ok());
        // Surrounding whitespace is tolerated.
        assert!(parse_destination(&format!("  {DISTRIBUTOR} ")).is_ok());
    }

    #[test]
    fn destination_validation_rejects_a_broken_checksum() {
        // Same address with one letter's case flipped.
        let err = parse_destination("0x5aaeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }
}
