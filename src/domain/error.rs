use rust_decimal::Decimal;

use crate::domain::profile::Profile;
use crate::domain::withdrawal::WithdrawalStatus;

/// Crate-wide failure taxonomy shared by both engines.
///
/// Display strings for the 4xx variants are the wire contract; storage
/// and transport failures are collapsed by the HTTP layer into a generic
/// message so store internals never leak to callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Profile not found")]
    ProfileNotFound,

    #[error("Invalid action")]
    InvalidAction(String),

    /// The tap was rejected, but the regenerated energy in `profile` has
    /// already been persisted.
    #[error("Not enough energy")]
    InsufficientEnergy { profile: Box<Profile> },

    #[error("Amount must be between {min} and {max}")]
    InvalidAmount { min: Decimal, max: Decimal },

    #[error("Invalid wallet address: {0}")]
    InvalidDestination(String),

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("You already have a pending withdrawal. Please wait for it to complete.")]
    WithdrawalInProgress,

    #[error("Withdrawal not found")]
    WithdrawalNotFound,

    #[error("illegal withdrawal status transition: {from} -> {to}")]
    IllegalTransition {
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    },

    /// A conditional write lost against a concurrent update. Retried
    /// internally; callers only see it re-wrapped once the retry budget
    /// is spent.
    #[error("ledger row changed concurrently")]
    Conflict,

    #[error("store error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn retries_exhausted() -> Self {
        Self::Storage("conditional write retries exhausted".into())
    }

    pub(crate) fn store_timeout() -> Self {
        Self::Storage("ledger store call timed out".into())
    }
}
