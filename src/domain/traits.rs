use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{Error, MiningAction, Profile, Withdrawal, WithdrawalStatus};

/// Storage boundary for the per-user ledger row and the withdrawal table.
///
/// Implementations must make `update_profile` and `insert_withdrawal`
/// atomic with respect to concurrent callers: the version-conditional
/// profile write is the serialization point for taps, and the withdrawal
/// insert re-checks the at-most-one-outstanding rule under the same guard
/// that protects the table. Calls are expected to complete promptly; the
/// engines bound each one with a timeout and surface a transient error
/// instead of hanging.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch the ledger row, or `None` when the user was never provisioned.
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>, Error>;

    /// Create the row with provisioning defaults. Returns the existing row
    /// unchanged when the user is already provisioned.
    async fn create_profile(&self, user_id: &str) -> Result<Profile, Error>;

    /// Conditional write: succeeds only while the stored version still
    /// matches `profile.version`, then bumps it and returns the stored
    /// row. Fails with [`Error::Conflict`] when a concurrent writer got
    /// there first.
    async fn update_profile(&self, profile: &Profile) -> Result<Profile, Error>;

    /// Unconditional balance credit, used to compensate a debit whose
    /// paired withdrawal insert failed and to refund failed payouts.
    async fn credit_balance(&self, user_id: &str, amount: Decimal) -> Result<(), Error>;

    async fn has_outstanding_withdrawal(&self, user_id: &str) -> Result<bool, Error>;

    /// Insert a new withdrawal intent. Rejects with
    /// [`Error::WithdrawalInProgress`] when the user already has an
    /// outstanding record; the check and the insert are one atomic step.
    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), Error>;

    async fn withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>, Error>;

    /// Conditional transition: succeeds only while the record is still in
    /// `from`; fails with [`Error::Conflict`] otherwise.
    async fn update_withdrawal_status(
        &self,
        id: Uuid,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    ) -> Result<Withdrawal, Error>;

    /// Most recent withdrawals for the user, newest first.
    async fn withdrawals(&self, user_id: &str, limit: usize) -> Result<Vec<Withdrawal>, Error>;

    /// Best-effort audit append; engines log and continue on failure.
    async fn append_action(&self, action: &MiningAction) -> Result<(), Error>;
}
