//! Credit system for tracking team and user balances.

mod allotment;
mod store;

pub use allotment::{monthly_credits, AllotmentCalculator};
pub use store::{CreditStore, CreditStoreData, CreditStoreStats, LedgerStore};
