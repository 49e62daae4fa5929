//! Server-side ledger and energy-regeneration engine for a tap-to-earn
//! currency.
//!
//! Users accumulate balance by manual taps or passive accrual against a
//! bounded, time-regenerating energy resource, and convert balance into
//! at-most-one outstanding payout intent. Authoritative state is always a
//! pure function of the stored row plus elapsed wall-clock time; all
//! mutation goes through version-conditional writes, so concurrent and
//! replayed requests serialize per user.

pub mod auth;
pub mod config;
pub mod domain;
pub mod logging;
pub mod mining;
pub mod payout;
pub mod server;
pub mod store;

pub use auth::{AuthProvider, StaticTokenAuth};
pub use config::{ServerConfig, Tunables};
pub use domain::{Error, LedgerStore, Profile, Withdrawal, WithdrawalStatus};
pub use mining::MiningEngine;
pub use payout::{WithdrawalEngine, WithdrawalReceipt};
pub use store::MemoryLedgerStore;
