use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::config::Tunables;
use crate::domain::{ActionType, Accrual, Error, LedgerStore, MiningAction, Profile};

/// Computes the authoritative, time-consistent ledger state for a user and
/// applies the effect of discrete tap actions.
///
/// The engine keeps no per-user state between calls: every operation is a
/// row read, a pure computation on the copy, and one version-conditional
/// write. Conflicting writers re-read and retry within a bounded budget,
/// so the net effect of N concurrent taps equals some sequential ordering
/// of them.
pub struct MiningEngine {
    store: Arc<dyn LedgerStore>,
    tunables: Tunables,
}

impl MiningEngine {
    pub fn new(store: Arc<dyn LedgerStore>, tunables: Tunables) -> Self {
        Self { store, tunables }
    }

    /// Regenerate energy (and credit passive accrual when enabled) for the
    /// window since the row was last reconciled, then persist.
    ///
    /// The write happens even when nothing accrued, so the next call
    /// measures elapsed time from `now` and the same window can never be
    /// claimed twice.
    pub async fn reconcile(&self, user_id: &str, now: DateTime<Utc>) -> Result<Profile, Error> {
        for _ in 0..self.tunables.write_retries {
            let mut profile = self.load(user_id).await?;
            let accrual = profile.advance(now, &self.tunables);
            match self.bounded(self.store.update_profile(&profile)).await {
                Ok(saved) => {
                    self.record_accrual(&saved, accrual, now).await;
                    return Ok(saved);
                }
                Err(Error::Conflict) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::retries_exhausted())
    }

    /// Apply one tap: advance the row to `now`, spend tap energy, credit
    /// the reward.
    ///
    /// When energy is short the advanced row is persisted anyway before the
    /// rejection is returned; regeneration is never lost to a failed tap.
    pub async fn tap(&self, user_id: &str, now: DateTime<Utc>) -> Result<Profile, Error> {
        for _ in 0..self.tunables.write_retries {
            let mut profile = self.load(user_id).await?;
            let accrual = profile.advance(now, &self.tunables);
            let reward = profile.try_tap(&self.tunables);
            match self.bounded(self.store.update_profile(&profile)).await {
                Ok(saved) => {
                    self.record_accrual(&saved, accrual, now).await;
                    return match reward {
                        Some(reward) => {
                            self.record_action(MiningAction {
                                user_id: saved.user_id.clone(),
                                action_type: ActionType::Tap,
                                amount: reward,
                                energy_cost: self.tunables.energy_cost_tap,
                                recorded_at: now,
                            })
                            .await;
                            Ok(saved)
                        }
                        None => Err(Error::InsufficientEnergy {
                            profile: Box::new(saved),
                        }),
                    };
                }
                Err(Error::Conflict) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::retries_exhausted())
    }

    /// Toggle passive accrual. The row is reconciled first so the flag flip
    /// never retroactively claims or forfeits an elapsed window.
    pub async fn set_auto_mining(
        &self,
        user_id: &str,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Profile, Error> {
        for _ in 0..self.tunables.write_retries {
            let mut profile = self.load(user_id).await?;
            let accrual = profile.advance(now, &self.tunables);
            profile.auto_mining_enabled = enabled;
            match self.bounded(self.store.update_profile(&profile)).await {
                Ok(saved) => {
                    self.record_accrual(&saved, accrual, now).await;
                    return Ok(saved);
                }
                Err(Error::Conflict) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::retries_exhausted())
    }

    async fn load(&self, user_id: &str) -> Result<Profile, Error> {
        self.bounded(self.store.profile(user_id))
            .await?
            .ok_or(Error::ProfileNotFound)
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        tokio::time::timeout(self.tunables.store_timeout, fut)
            .await
            .map_err(|_| Error::store_timeout())?
    }

    async fn record_accrual(&self, profile: &Profile, accrual: Accrual, now: DateTime<Utc>) {
        if accrual.auto_reward > Decimal::ZERO {
            self.record_action(MiningAction {
                user_id: profile.user_id.clone(),
                action_type: ActionType::AutoMine,
                amount: accrual.auto_reward,
                energy_cost: accrual.auto_energy_cost,
                recorded_at: now,
            })
            .await;
        }
    }

    async fn record_action(&self, action: MiningAction) {
        if let Err(e) = self.bounded(self.store.append_action(&action)).await {
            tracing::warn!(user_id = %action.user_id, error = %e, "failed to append audit action");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::store::MemoryLedgerStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    async fn engine_with_profile(
        mutate: impl FnOnce(&mut Profile),
    ) -> (MiningEngine, Arc<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::default());
        let mut profile = store.create_profile("u1").await.unwrap();
        profile.last_energy_update = t0();
        mutate(&mut profile);
        store.update_profile(&profile).await.unwrap();
        let engine = MiningEngine::new(store.clone(), Tunables::default());
        (engine, store)
    }

    #[tokio::test]
    async fn tap_credits_reward_and_spends_energy() {
        let (engine, store) = engine_with_profile(|_| {}).await;

        let profile = engine.tap("u1", t0()).await.unwrap();
        assert_eq!(profile.total_mined, Decimal::new(5, 1));
        assert_eq!(profile.energy_level, Decimal::from(99));
        assert_eq!(profile.tap_count, 1);

        let actions = store.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::Tap);
        assert_eq!(actions[0].amount, Decimal::new(5, 1));
    }

    #[tokio::test]
    async fn rejected_tap_still_persists_regeneration() {
        let (engine, store) = engine_with_profile(|p| {
            p.energy_level = Decimal::ZERO;
        })
        .await;

        // One second regenerates 0.5 energy, still below the tap cost.
        let now = t0() + Duration::seconds(1);
        let err = engine.tap("u1", now).await.unwrap_err();
        let Error::InsufficientEnergy { profile } = err else {
            panic!("expected InsufficientEnergy, got {err:?}");
        };
        assert_eq!(profile.energy_level, Decimal::new(5, 1));

        let stored = store.profile("u1").await.unwrap().unwrap();
        assert_eq!(stored.energy_level, Decimal::new(5, 1));
        assert_eq!(stored.last_energy_update, now);
        assert_eq!(stored.total_mined, Decimal::ZERO);
        assert!(store.actions().is_empty());
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_at_zero_elapsed() {
        let (engine, _) = engine_with_profile(|p| {
            p.energy_level = Decimal::from(40);
        })
        .await;

        let first = engine.reconcile("u1", t0()).await.unwrap();
        let second = engine.reconcile("u1", t0()).await.unwrap();
        assert_eq!(first.energy_level, second.energy_level);
        assert_eq!(first.total_mined, second.total_mined);
        assert_eq!(first.last_energy_update, second.last_energy_update);
    }

    #[tokio::test]
    async fn reconcile_credits_passive_accrual_and_audits_it() {
        let (engine, store) = engine_with_profile(|p| {
            p.auto_mining_enabled = true;
        })
        .await;

        let profile = engine
            .reconcile("u1", t0() + Duration::seconds(30))
            .await
            .unwrap();
        // 30 s of passive accrual at 0.1 * 1 per second.
        assert_eq!(profile.total_mined, Decimal::from(3));
        assert_eq!(profile.energy_level, Decimal::from(97));

        let actions = store.actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].action_type, ActionType::AutoMine);
        assert_eq!(actions[0].amount, Decimal::from(3));
        assert_eq!(actions[0].energy_cost, Decimal::from(3));
    }

    #[tokio::test]
    async fn missing_profile_is_a_provisioning_error() {
        let store = Arc::new(MemoryLedgerStore::default());
        let engine = MiningEngine::new(store, Tunables::default());
        assert!(matches!(
            engine.tap("ghost", t0()).await,
            Err(Error::ProfileNotFound)
        ));
    }

    #[tokio::test]
    async fn toggling_auto_mining_reconciles_first() {
        let (engine, _) = engine_with_profile(|p| {
            p.energy_level = Decimal::ZERO;
        })
        .await;

        let now = t0() + Duration::seconds(10);
        let profile = engine.set_auto_mining("u1", true, now).await.unwrap();
        assert!(profile.auto_mining_enabled);
        // The elapsed window regenerated energy but paid no auto reward:
        // the flag was off while the window elapsed.
        assert_eq!(profile.energy_level, Decimal::from(5));
        assert_eq!(profile.total_mined, Decimal::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_taps_never_lose_updates() {
        let (engine, store) = engine_with_profile(|p| {
            p.energy_level = Decimal::from(5);
        })
        .await;
        let engine = Arc::new(engine);

        // Same `now` for every task: zero elapsed, no regeneration, so
        // exactly five of the eight taps can be paid for. Each task
        // commits at most once, which caps conflicts per task below the
        // retry limit and makes the outcome deterministic.
        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.tap("u1", t0()).await }));
        }

        let mut succeeded = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(Error::InsufficientEnergy { .. }) => rejected += 1,
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }
        assert_eq!(succeeded, 5);
        assert_eq!(rejected, 3);

        let stored = store.profile("u1").await.unwrap().unwrap();
        assert_eq!(stored.tap_count, 5);
        assert_eq!(stored.energy_level, Decimal::ZERO);
        // Five rewards of 0.1 * 1 * 5 each.
        assert_eq!(stored.total_mined, Decimal::new(25, 1));
    }
}
