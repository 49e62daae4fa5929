use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::Tunables;

/// Authoritative per-user ledger row.
///
/// Balance and energy are only ever derived from this record plus elapsed
/// wall-clock time; nothing the client reports is trusted. The row is
/// mutated exclusively through conditional writes keyed on `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub total_mined: Decimal,
    pub mining_rate: Decimal,
    pub multiplier: Decimal,
    pub energy_level: Decimal,
    pub tap_count: u64,
    /// Last moment energy/balance were reconciled; never moves backward.
    pub last_energy_update: DateTime<Utc>,
    pub auto_mining_enabled: bool,
    /// Bumped by the store on every successful write; conditional updates
    /// compare it to detect concurrent writers. Never leaves the process.
    pub version: u64,
}

/// What one reconciliation credited passively, for audit logging.
#[derive(Debug, Clone, Copy, Default)]
pub struct Accrual {
    pub auto_reward: Decimal,
    pub auto_energy_cost: Decimal,
}

impl Profile {
    /// Row created at account provisioning.
    pub fn provision(user_id: impl Into<String>, now: DateTime<Utc>, t: &Tunables) -> Self {
        Self {
            user_id: user_id.into(),
            total_mined: Decimal::ZERO,
            mining_rate: t.default_mining_rate,
            multiplier: Decimal::ONE,
            energy_level: t.max_energy,
            tap_count: 0,
            last_energy_update: now,
            auto_mining_enabled: false,
            version: 0,
        }
    }

    /// Move the record forward to `now`: regenerate energy for the elapsed
    /// window and, when auto-mining is on, credit the passive reward for at
    /// most `t.max_auto_mine_secs` of it.
    ///
    /// Requests arriving with an older timestamp are clamped to zero
    /// elapsed time and leave `last_energy_update` where it was.
    pub fn advance(&mut self, now: DateTime<Utc>, t: &Tunables) -> Accrual {
        let elapsed = elapsed_seconds(self.last_energy_update, now);
        self.energy_level = t
            .max_energy
            .min(self.energy_level + elapsed * t.energy_regen_per_sec);
        if now > self.last_energy_update {
            self.last_energy_update = now;
        }

        let mut accrual = Accrual::default();
        if self.auto_mining_enabled && elapsed > Decimal::ZERO {
            let window = elapsed.min(t.max_auto_mine_secs);
            let affordable = self.energy_level / t.energy_cost_auto_per_sec;
            let secs = window.min(affordable);
            if secs > Decimal::ZERO {
                accrual.auto_reward = self.mining_rate * self.multiplier * secs;
                accrual.auto_energy_cost = secs * t.energy_cost_auto_per_sec;
                self.total_mined += accrual.auto_reward;
                self.energy_level -= accrual.auto_energy_cost;
            }
        }
        accrual
    }

    /// Apply one tap to an already-advanced row. Returns the reward, or
    /// `None` when the remaining energy cannot cover the tap cost.
    pub fn try_tap(&mut self, t: &Tunables) -> Option<Decimal> {
        if self.energy_level < t.energy_cost_tap {
            return None;
        }
        let reward = self.mining_rate * self.multiplier * t.tap_reward_factor;
        self.total_mined += reward;
        self.energy_level -= t.energy_cost_tap;
        self.tap_count += 1;
        Some(reward)
    }
}

fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> Decimal {
    let millis = (to - from).num_milliseconds().max(0);
    Decimal::from(millis) / Decimal::from(1000)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn drained_profile(t: &Tunables) -> Profile {
        let mut p = Profile::provision("u1", t0(), t);
        p.energy_level = Decimal::ZERO;
        p
    }

    #[test]
    fn regeneration_clamps_to_max_energy() {
        let t = Tunables::default();
        let mut p = drained_profile(&t);
        // 200 s at 0.5/s regenerates exactly to the cap, not past it.
        p.advance(t0() + Duration::seconds(200), &t);
        assert_eq!(p.energy_level, Decimal::from(100));
        assert_eq!(p.last_energy_update, t0() + Duration::seconds(200));
    }

    #[test]
    fn regeneration_is_proportional_to_elapsed_time() {
        let t = Tunables::default();
        let mut p = drained_profile(&t);
        p.advance(t0() + Duration::seconds(30), &t);
        assert_eq!(p.energy_level, Decimal::from(15));
    }

    #[test]
    fn zero_elapsed_reconciliation_is_idempotent() {
        let t = Tunables::default();
        let mut p = Profile::provision("u1", t0(), &t);
        p.energy_level = Decimal::from(40);
        p.advance(t0(), &t);
        let energy = p.energy_level;
        let mined = p.total_mined;
        p.advance(t0(), &t);
        assert_eq!(p.energy_level, energy);
        assert_eq!(p.total_mined, mined);
    }

    #[test]
    fn clock_skew_clamps_to_zero_and_keeps_watermark() {
        let t = Tunables::default();
        let mut p = drained_profile(&t);
        p.advance(t0() - Duration::seconds(60), &t);
        assert_eq!(p.energy_level, Decimal::ZERO);
        assert_eq!(p.last_energy_update, t0());
    }

    #[test]
    fn tap_rewards_and_spends_energy() {
        let t = Tunables::default();
        let mut p = Profile::provision("u1", t0(), &t);
        p.mining_rate = Decimal::new(1, 1); // 0.1
        p.energy_level = Decimal::ONE;

        let reward = p.try_tap(&t).expect("enough energy for one tap");
        assert_eq!(reward, Decimal::new(5, 1)); // 0.1 * 1 * 5
        assert_eq!(p.total_mined, Decimal::new(5, 1));
        assert_eq!(p.energy_level, Decimal::ZERO);
        assert_eq!(p.tap_count, 1);

        // Second immediate tap is rejected and changes nothing.
        assert!(p.try_tap(&t).is_none());
        assert_eq!(p.total_mined, Decimal::new(5, 1));
        assert_eq!(p.tap_count, 1);
    }

    #[test]
    fn auto_mining_claims_at_most_the_window_cap() {
        let t = Tunables::default();
        let mut p = Profile::provision("u1", t0(), &t);
        p.auto_mining_enabled = true;

        // Ten idle minutes, but only 60 s are claimable.
        let accrual = p.advance(t0() + Duration::seconds(600), &t);
        assert_eq!(accrual.auto_reward, Decimal::from(6) * p.mining_rate);
        assert_eq!(accrual.auto_energy_cost, Decimal::from(6));
        assert_eq!(p.total_mined, Decimal::new(6, 0) * Decimal::new(1, 1));
        assert_eq!(p.energy_level, Decimal::from(94));
    }

    #[test]
    fn auto_mining_is_limited_by_available_energy() {
        let t = Tunables::default();
        let mut p = Profile::provision("u1", t0(), &t);
        p.auto_mining_enabled = true;
        p.energy_level = Decimal::ZERO;

        // 10 s regenerates 5 energy, which affords 50 s of auto-mining;
        // the 10 s window is the binding constraint here.
        let accrual = p.advance(t0() + Duration::seconds(10), &t);
        assert_eq!(accrual.auto_energy_cost, Decimal::ONE);
        assert_eq!(p.energy_level, Decimal::from(4));
    }

    #[test]
    fn auto_mining_disabled_accrues_nothing() {
        let t = Tunables::default();
        let mut p = Profile::provision("u1", t0(), &t);
        let accrual = p.advance(t0() + Duration::seconds(600), &t);
        assert_eq!(accrual.auto_reward, Decimal::ZERO);
        assert_eq!(p.total_mined, Decimal::ZERO);
    }
}
