//! Credit ledger for SMS and usage metering.
//!
//! Teams earn a monthly allotment of credits per accepted seat and can buy
//! additional credits; users can hold personal credits as a fallback. Every
//! usage event is charged to exactly one balance and recorded in an
//! append-only expense log.
//!
//! # Architecture
//!
//! ```text
//! Usage event → resolve payer (team → member teams → personal) → log expense
//!             → threshold check → warning / limit-reached notice (best effort)
//! Checkout completed → add purchased credits → clear limit
//! ```
//!
//! # Modules
//!
//! - [`ledger`] - Charge attribution and low-balance handling
//! - [`credits`] - Storage seam, JSON-persisted store and monthly allotment
//! - [`directory`] - Team membership, subscription and contact lookups
//! - [`notify`] - Email dispatch seam
//! - [`config`] - Ledger configuration
//! - [`clock`] - Time source and calendar month helpers

pub mod clock;
pub mod config;
pub mod credits;
pub mod directory;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod types;

// Re-exports for convenience
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::LedgerConfig;
pub use credits::{monthly_credits, AllotmentCalculator, CreditStore, LedgerStore};
pub use directory::{Directory, MemoryDirectory};
pub use error::LedgerError;
pub use ledger::CreditLedger;
pub use notify::{LimitReachedNotice, LogNotifier, LowBalanceNotice, Notifier};
pub use types::{
    ChargeOutcome, ChargeRequest, ChargeableOwner, Contact, CreditBalance, CreditExpenseLog,
    CreditType, Owner, SubscriptionStatus, TeamCredits, TeamId, TeamInfo, UserId,
};

use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Build a ledger over a JSON-file store and a directory document.
///
/// With no storage path the store lives in memory only.
pub async fn open_ledger(
    config: LedgerConfig,
    storage_path: Option<PathBuf>,
    directory: MemoryDirectory,
    notifier: Arc<dyn Notifier>,
) -> Result<CreditLedger, LedgerError> {
    config.validate()?;

    let store = match storage_path {
        Some(path) => {
            info!("Opening credit store at {:?}", path);
            CreditStore::open(path).await?
        }
        None => {
            info!("Using in-memory credit store");
            CreditStore::in_memory()
        }
    };

    Ok(CreditLedger::new(
        config,
        Arc::new(store),
        Arc::new(directory),
        notifier,
    ))
}
