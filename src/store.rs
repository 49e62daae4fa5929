use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::Tunables;
use crate::domain::{Error, LedgerStore, MiningAction, Profile, Withdrawal, WithdrawalStatus};

/// In-memory ledger store for tests, local runs, and embedding.
///
/// A single `RwLock` stands in for the relational store's row guards:
/// every mutating call takes the write lock, performs its condition check,
/// and applies the change before releasing, which gives the engines the
/// same atomicity as row-level locks or a unique constraint.
pub struct MemoryLedgerStore {
    tunables: Tunables,
    inner: RwLock<State>,
}

#[derive(Default)]
struct State {
    profiles: HashMap<String, Profile>,
    withdrawals: Vec<Withdrawal>,
    actions: Vec<MiningAction>,
}

impl MemoryLedgerStore {
    pub fn new(tunables: Tunables) -> Self {
        Self {
            tunables,
            inner: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, Error> {
        self.inner
            .read()
            .map_err(|_| Error::Storage("ledger store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, Error> {
        self.inner
            .write()
            .map_err(|_| Error::Storage("ledger store lock poisoned".into()))
    }

    /// Snapshot of the audit table, for tests and local inspection.
    pub fn actions(&self) -> Vec<MiningAction> {
        self.inner
            .read()
            .map(|state| state.actions.clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new(Tunables::default())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn profile(&self, user_id: &str) -> Result<Option<Profile>, Error> {
        Ok(self.read()?.profiles.get(user_id).cloned())
    }

    async fn create_profile(&self, user_id: &str) -> Result<Profile, Error> {
        let mut state = self.write()?;
        let profile = state
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| Profile::provision(user_id, Utc::now(), &self.tunables));
        Ok(profile.clone())
    }

    async fn update_profile(&self, profile: &Profile) -> Result<Profile, Error> {
        let mut state = self.write()?;
        let row = state
            .profiles
            .get_mut(&profile.user_id)
            .ok_or(Error::ProfileNotFound)?;
        if row.version != profile.version {
            return Err(Error::Conflict);
        }
        let mut updated = profile.clone();
        updated.version += 1;
        *row = updated.clone();
        Ok(updated)
    }

    async fn credit_balance(&self, user_id: &str, amount: Decimal) -> Result<(), Error> {
        let mut state = self.write()?;
        let row = state
            .profiles
            .get_mut(user_id)
            .ok_or(Error::ProfileNotFound)?;
        row.total_mined += amount;
        row.version += 1;
        Ok(())
    }

    async fn has_outstanding_withdrawal(&self, user_id: &str) -> Result<bool, Error> {
        Ok(self
            .read()?
            .withdrawals
            .iter()
            .any(|w| w.user_id == user_id && w.status.is_outstanding()))
    }

    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), Error> {
        let mut state = self.write()?;
        // Write-time re-check: the outstanding scan and the push happen
        // under one write guard, standing in for a partial unique index.
        if state
            .withdrawals
            .iter()
            .any(|w| w.user_id == withdrawal.user_id && w.status.is_outstanding())
        {
            return Err(Error::WithdrawalInProgress);
        }
        state.withdrawals.push(withdrawal.clone());
        Ok(())
    }

    async fn withdrawal(&self, id: Uuid) -> Result<Option<Withdrawal>, Error> {
        Ok(self.read()?.withdrawals.iter().find(|w| w.id == id).cloned())
    }

    async fn update_withdrawal_status(
        &self,
        id: Uuid,
        from: WithdrawalStatus,
        to: WithdrawalStatus,
    ) -> Result<Withdrawal, Error> {
        let mut state = self.write()?;
        let row = state
            .withdrawals
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or(Error::WithdrawalNotFound)?;
        if row.status != from {
            return Err(Error::Conflict);
        }
        row.status = to;
        Ok(row.clone())
    }

    async fn withdrawals(&self, user_id: &str, limit: usize) -> Result<Vec<Withdrawal>, Error> {
        // Insertion order is creation order, so newest first = reverse scan.
        Ok(self
            .read()?
            .withdrawals
            .iter()
            .rev()
            .filter(|w| w.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn append_action(&self, action: &MiningAction) -> Result<(), Error> {
        self.write()?.actions.push(action.clone());
        Ok(())
    }
}
