pub mod action;
pub mod error;
pub mod profile;
pub mod traits;
pub mod withdrawal;

pub use action::{ActionType, MiningAction};
pub use error::Error;
pub use profile::{Accrual, Profile};
pub use traits::LedgerStore;
pub use withdrawal::{Withdrawal, WithdrawalStatus};
