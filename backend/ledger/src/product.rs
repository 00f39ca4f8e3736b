//! Canonical product types mirrored from the supply-chain contract.
//!
//! The contract owns every field here; the client never mutates a product
//! locally.  `Stage` is a strict forward-only lifecycle:
//!
//! ```text
//! Manufactured ──► Distributed ──► Retailed ──► Sold
//! ```
//!
//! Backward transitions never happen on a well-behaved contract; the
//! client reflects whatever the contract reports and performs no
//! enforcement of its own.

use async_trait::async_trait;
use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Lifecycle stage of a product, as stored by the contract (`uint8` enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    /// Registered by the manufacturer.
    Manufactured,
    /// Handed to a distributor.
    Distributed,
    /// Handed to a retailer.
    Retailed,
    /// Sold to a consumer.  Terminal.
    Sold,
}

impl Stage {
    /// Decode the contract's numeric stage index.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Manufactured),
            1 => Some(Self::Distributed),
            2 => Some(Self::Retailed),
            3 => Some(Self::Sold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manufactured => "Manufactured",
            Self::Distributed => "Distributed",
            Self::Retailed => "Retailed",
            Self::Sold => "Sold",
        }
    }

    /// The stage a successful transfer out of `self` lands in.
    /// `None` for the terminal stage.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Manufactured => Some(Self::Distributed),
            Self::Distributed => Some(Self::Retailed),
            Self::Retailed => Some(Self::Sold),
            Self::Sold => None,
        }
    }
}

/// The three stage-transfer operations, one per handoff.
///
/// They are identical in shape and differ only in which contract method
/// is invoked and which precondition text is shown, so all transfer
/// handling is parameterized over this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Distributor,
    Retailer,
    Consumer,
}

impl TransferKind {
    /// Contract method behind this transfer.
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Distributor => "transferToDistributor",
            Self::Retailer => "transferToRetailer",
            Self::Consumer => "sellToConsumer",
        }
    }

    /// Stage the product must currently be in for the call to succeed.
    pub fn required_stage(&self) -> Stage {
        match self {
            Self::Distributor => Stage::Manufactured,
            Self::Retailer => Stage::Distributed,
            Self::Consumer => Stage::Retailed,
        }
    }

    /// Stage the product lands in after a successful call — always the
    /// successor of the required stage.
    pub fn target_stage(&self) -> Stage {
        self.required_stage().next().unwrap_or(Stage::Sold)
    }

    /// Actor role the contract expects to sign this call.
    pub fn required_actor(&self) -> &'static str {
        match self {
            Self::Distributor => "manufacturer",
            Self::Retailer => "distributor",
            Self::Consumer => "retailer",
        }
    }

    /// Plausible causes listed when a rejection carries no decodable reason.
    pub fn plausible_causes(&self) -> Vec<String> {
        vec![
            format!("caller is not the current {}", self.required_actor()),
            format!(
                "product is not in '{}' stage",
                self.required_stage().as_str()
            ),
            "product id does not exist".to_string(),
        ]
    }
}

/// A product row as reported by the contract, history included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub description: String,
    /// Current holder, EIP-55 checksummed.
    pub owner: String,
    pub status: Stage,
    /// Append-only trace, one entry per stage transition.
    pub history: Vec<String>,
}

/// Boundary to the on-chain ledger.
///
/// The production implementation signs and submits real transactions
/// (`chain::ChainLedger`); tests substitute an in-memory mock.
#[async_trait]
pub trait ProductLedger: Send + Sync {
    /// Scalar number of registered products.
    async fn product_count(&self) -> Result<u64>;

    /// Fetch one product's fields and its history trace.
    async fn fetch_product(&self, id: u64) -> Result<Product>;

    /// Register a new product.  Returns the id reported by the
    /// `ProductRegistered` event, or `None` when the event was absent
    /// from the confirmed receipt.
    async fn register(&self, name: &str, description: &str) -> Result<Option<u64>>;

    /// Hand the product to the next actor in the chain.
    async fn transfer(&self, kind: TransferKind, id: u64, to: Address) -> Result<()>;
}
