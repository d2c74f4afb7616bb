//! Reward ledger integration

pub mod ledger;

pub use ledger::{LedgerError, RewardGrant, RewardLedger};
