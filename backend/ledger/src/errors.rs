//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The contract refused a state-changing call and we could decode why.
    #[error("Contract rejected the call: {0}")]
    Rejected(#[from] Rejection),

    /// A state-changing call failed without a decodable revert reason
    /// (network fault, gas failure, dropped transaction, ...).
    #[error("Transaction failed: {0}")]
    Call(String),

    /// A read-only contract query failed.  Reload callers log these and
    /// keep the previous snapshot.
    #[error("Contract read failed: {0}")]
    Fetch(String),
}

/// Classified revert reasons from the supply-chain contract.
///
/// The contract's revert strings are free text, so classification is
/// keyword-based; anything unrecognised stays [`Rejection::Reverted`]
/// with the raw reason.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("caller is not the authorized actor: {0}")]
    NotAuthorized(String),

    #[error("product is in the wrong stage: {0}")]
    WrongStage(String),

    #[error("no such product: {0}")]
    UnknownProduct(String),

    #[error("execution reverted: {0}")]
    Reverted(String),
}

impl Rejection {
    /// Short identifier string used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotAuthorized(_) => "not_authorized",
            Self::WrongStage(_) => "wrong_stage",
            Self::UnknownProduct(_) => "unknown_product",
            Self::Reverted(_) => "reverted",
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
