//! Low-balance and limit-reached notifications.

use crate::error::LedgerError;
use crate::types::{Contact, Owner};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// Low-balance warning for a team or user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowBalanceNotice {
    pub owner: Owner,
    pub recipient: Contact,
    /// Credits left after the charge that crossed the threshold.
    pub balance: i64,
}

/// Sent when a balance is exhausted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimitReachedNotice {
    pub owner: Owner,
    pub recipient: Contact,
}

/// Email dispatch seam.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_low_balance_warning(&self, notice: &LowBalanceNotice) -> Result<(), LedgerError>;

    async fn send_limit_reached(&self, notice: &LimitReachedNotice) -> Result<(), LedgerError>;
}

/// Notifier that only records notices in the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_low_balance_warning(&self, notice: &LowBalanceNotice) -> Result<(), LedgerError> {
        info!(
            owner = %notice.owner,
            email = %notice.recipient.email,
            locale = %notice.recipient.locale,
            balance = notice.balance,
            "Credit balance low"
        );
        Ok(())
    }

    async fn send_limit_reached(&self, notice: &LimitReachedNotice) -> Result<(), LedgerError> {
        info!(
            owner = %notice.owner,
            email = %notice.recipient.email,
            locale = %notice.recipient.locale,
            "Credit limit reached"
        );
        Ok(())
    }
}
