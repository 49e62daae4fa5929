use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Tap,
    AutoMine,
}

/// Append-only audit row for balance-affecting mining events. Written
/// best-effort after the ledger mutation commits; a failed append never
/// rolls the mutation back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiningAction {
    pub user_id: String,
    pub action_type: ActionType,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub energy_cost: Decimal,
    pub recorded_at: DateTime<Utc>,
}
