//! Common test utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use credit_ledger::{
    Contact, CreditLedger, CreditStore, FixedClock, LedgerConfig, LedgerError, LimitReachedNotice,
    LowBalanceNotice, MemoryDirectory, Notifier, SubscriptionStatus,
};
use std::sync::{Arc, Mutex};

/// Team with four accepted members on an active plan.
pub const TEAM: u64 = 100;
/// Member of [`TEAM`].
pub const MEMBER: u64 = 1;
/// User without any team.
pub const SOLO: u64 = 50;

/// Notifier that remembers every notice it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub warnings: Mutex<Vec<LowBalanceNotice>>,
    pub limits: Mutex<Vec<LimitReachedNotice>>,
}

impl RecordingNotifier {
    pub fn warning_count(&self) -> usize {
        self.warnings.lock().unwrap().len()
    }

    pub fn limit_count(&self) -> usize {
        self.limits.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_low_balance_warning(&self, notice: &LowBalanceNotice) -> Result<(), LedgerError> {
        self.warnings.lock().unwrap().push(notice.clone());
        Ok(())
    }

    async fn send_limit_reached(&self, notice: &LimitReachedNotice) -> Result<(), LedgerError> {
        self.limits.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap()
}

pub fn contact(email: &str) -> Contact {
    Contact {
        name: String::new(),
        email: email.into(),
        locale: "en".into(),
    }
}

pub fn directory() -> MemoryDirectory {
    let mut dir = MemoryDirectory::new();
    dir.add_team(TEAM, Some(SubscriptionStatus::Active));
    dir.set_billing_contact(TEAM, contact("billing@example.com"));
    for user_id in MEMBER..MEMBER + 4 {
        dir.add_membership(user_id, TEAM, true);
    }
    dir.add_membership(9, TEAM, false);
    dir.add_user(MEMBER, contact("member@example.com"));
    dir.add_user(SOLO, contact("solo@example.com"));
    dir
}

pub struct Harness {
    pub ledger: Arc<CreditLedger>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
}

pub fn harness() -> Harness {
    harness_with(directory())
}

pub fn harness_with(directory: MemoryDirectory) -> Harness {
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(FixedClock::new(start()));
    let ledger = CreditLedger::new(
        LedgerConfig::default(),
        Arc::new(CreditStore::in_memory()),
        Arc::new(directory),
        notifier.clone(),
    )
    .with_clock(clock.clone());

    Harness {
        ledger: Arc::new(ledger),
        notifier,
        clock,
    }
}
