use std::net::SocketAddr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Error;

/// Economy and engine tunables. Defaults mirror the production values;
/// embedders override individual fields before constructing the engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunables {
    pub max_energy: Decimal,
    pub energy_regen_per_sec: Decimal,
    pub energy_cost_tap: Decimal,
    /// Reward per tap is `mining_rate * multiplier * tap_reward_factor`.
    pub tap_reward_factor: Decimal,
    pub energy_cost_auto_per_sec: Decimal,
    /// Longest idle window passive accrual may claim in one reconciliation.
    pub max_auto_mine_secs: Decimal,
    /// Mining rate assigned to newly provisioned profiles.
    pub default_mining_rate: Decimal,
    pub min_withdrawal: Decimal,
    pub max_withdrawal: Decimal,
    /// Accepted destination-address length envelope, after trimming.
    pub min_address_len: usize,
    pub max_address_len: usize,
    /// Page size for the withdrawal history query.
    pub history_page_size: usize,
    /// Attempts per conditional write before the conflict surfaces as a
    /// transient storage error.
    pub write_retries: u32,
    /// Upper bound on any single ledger-store call.
    pub store_timeout: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            max_energy: Decimal::from(100),
            energy_regen_per_sec: Decimal::new(5, 1),
            energy_cost_tap: Decimal::ONE,
            tap_reward_factor: Decimal::from(5),
            energy_cost_auto_per_sec: Decimal::new(1, 1),
            max_auto_mine_secs: Decimal::from(60),
            default_mining_rate: Decimal::new(1, 1),
            min_withdrawal: Decimal::new(1, 2),
            max_withdrawal: Decimal::from(1000),
            min_address_len: 10,
            max_address_len: 70,
            history_page_size: 50,
            write_retries: 8,
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// Process-level configuration for the bundled server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// `(token, user_id)` pairs accepted by the static bearer resolver.
    pub tokens: Vec<(String, String)>,
    pub tunables: Tunables,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8090".parse().expect("static addr"),
            tokens: Vec::new(),
            tunables: Tunables::default(),
        }
    }
}

impl ServerConfig {
    /// Read overrides from the environment: `MINER_BIND_ADDR` and
    /// `MINER_TOKENS` (`token=user` pairs, comma separated).
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("MINER_BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|_| Error::Config(format!("invalid MINER_BIND_ADDR: {addr}")))?;
        }
        if let Ok(table) = std::env::var("MINER_TOKENS") {
            config.tokens = parse_token_table(&table)?;
        }
        Ok(config)
    }
}

fn parse_token_table(table: &str) -> Result<Vec<(String, String)>, Error> {
    let mut tokens = Vec::new();
    for pair in table.split(',').filter(|p| !p.trim().is_empty()) {
        let (token, user_id) = pair
            .trim()
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("malformed token pair: {pair}")))?;
        if token.is_empty() || user_id.is_empty() {
            return Err(Error::Config(format!("malformed token pair: {pair}")));
        }
        tokens.push((token.to_string(), user_id.to_string()));
    }
    Ok(tokens)
}
