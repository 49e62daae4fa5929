use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::Tunables;
use crate::domain::{Error, LedgerStore, Profile, Withdrawal, WithdrawalStatus};

/// Outcome of a successful withdrawal request.
#[derive(Debug, Clone)]
pub struct WithdrawalReceipt {
    pub withdrawal: Withdrawal,
    pub new_balance: Decimal,
}

/// Converts ledger balance into at most one outstanding payout intent per
/// user: strict validation, atomic debit, saga compensation.
///
/// The debit and the intent insert complete before any external payout
/// call is made; no lock or row guard is ever held across third-party
/// latency.
pub struct WithdrawalEngine {
    store: Arc<dyn LedgerStore>,
    tunables: Tunables,
}

impl WithdrawalEngine {
    pub fn new(store: Arc<dyn LedgerStore>, tunables: Tunables) -> Self {
        Self { store, tunables }
    }

    pub async fn withdraw(
        &self,
        user_id: &str,
        amount: Decimal,
        destination: &str,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalReceipt, Error> {
        let t = &self.tunables;
        if amount < t.min_withdrawal || amount > t.max_withdrawal {
            return Err(Error::InvalidAmount {
                min: t.min_withdrawal,
                max: t.max_withdrawal,
            });
        }
        let destination = destination.trim();
        if destination.len() < t.min_address_len || destination.len() > t.max_address_len {
            return Err(Error::InvalidDestination("address length out of range".into()));
        }

        // Read-time guard; the insert below re-checks under the store's
        // own atomic check, which is what actually closes the race.
        if self
            .bounded(self.store.has_outstanding_withdrawal(user_id))
            .await?
        {
            return Err(Error::WithdrawalInProgress);
        }

        let debited = self.debit(user_id, amount).await?;

        let withdrawal = Withdrawal {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            amount,
            wallet_address: destination.to_string(),
            status: WithdrawalStatus::Pending,
            created_at: now,
        };
        if let Err(e) = self.bounded(self.store.insert_withdrawal(&withdrawal)).await {
            // The debit committed but the intent did not; put the funds
            // back before surfacing the error.
            self.refund(user_id, amount).await;
            return Err(e);
        }

        Ok(WithdrawalReceipt {
            new_balance: debited.total_mined,
            withdrawal,
        })
    }

    /// Most recent withdrawals, newest first, one bounded page.
    pub async fn history(&self, user_id: &str) -> Result<Vec<Withdrawal>, Error> {
        self.bounded(
            self.store
                .withdrawals(user_id, self.tunables.history_page_size),
        )
        .await
    }

    /// Payout-processor contract surface.
    pub async fn mark_processing(&self, id: Uuid) -> Result<Withdrawal, Error> {
        self.transition(id, WithdrawalStatus::Processing).await
    }

    pub async fn mark_completed(&self, id: Uuid) -> Result<Withdrawal, Error> {
        self.transition(id, WithdrawalStatus::Completed).await
    }

    /// Terminal failure: the debited amount is re-credited to the user.
    pub async fn mark_failed(&self, id: Uuid) -> Result<Withdrawal, Error> {
        let updated = self.transition(id, WithdrawalStatus::Failed).await?;
        if let Err(e) = self
            .bounded(
                self.store
                    .credit_balance(&updated.user_id, updated.amount),
            )
            .await
        {
            // The transition already committed; retrying mark_failed would
            // be an illegal transition, so this cannot double-credit. The
            // refund has to be reconciled operationally.
            tracing::error!(
                user_id = %updated.user_id,
                withdrawal_id = %updated.id,
                error = %e,
                "refund after failed payout did not commit"
            );
            return Err(e);
        }
        Ok(updated)
    }

    async fn debit(&self, user_id: &str, amount: Decimal) -> Result<Profile, Error> {
        for _ in 0..self.tunables.write_retries {
            let mut profile = self
                .bounded(self.store.profile(user_id))
                .await?
                .ok_or(Error::ProfileNotFound)?;
            if amount > profile.total_mined {
                return Err(Error::InsufficientBalance);
            }
            profile.total_mined -= amount;
            match self.bounded(self.store.update_profile(&profile)).await {
                Ok(saved) => return Ok(saved),
                Err(Error::Conflict) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::retries_exhausted())
    }

    async fn refund(&self, user_id: &str, amount: Decimal) {
        if let Err(e) = self.bounded(self.store.credit_balance(user_id, amount)).await {
            // Funds are in limbo until someone reconciles the ledger row
            // against the withdrawal table.
            tracing::error!(
                user_id,
                amount = %amount,
                error = %e,
                "compensating credit failed after withdrawal insert error"
            );
        }
    }

    async fn transition(&self, id: Uuid, to: WithdrawalStatus) -> Result<Withdrawal, Error> {
        for _ in 0..self.tunables.write_retries {
            let current = self
                .bounded(self.store.withdrawal(id))
                .await?
                .ok_or(Error::WithdrawalNotFound)?;
            if !current.status.can_transition_to(to) {
                return Err(Error::IllegalTransition {
                    from: current.status,
                    to,
                });
            }
            match self
                .bounded(self.store.update_withdrawal_status(id, current.status, to))
                .await
            {
                Ok(updated) => return Ok(updated),
                Err(Error::Conflict) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::retries_exhausted())
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        tokio::time::timeout(self.tunables.store_timeout, fut)
            .await
            .map_err(|_| Error::store_timeout())?
    }
}
