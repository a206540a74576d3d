//! Ledger configuration.

use crate::error::LedgerError;
use serde::Deserialize;

/// Credit ledger configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Whether SMS credits are enforced. When off, every owner has credits.
    #[serde(default = "default_sms_credits_enabled")]
    pub sms_credits_enabled: bool,

    /// Seat price in dollars. Each accepted member earns half of it
    /// (in cents) as monthly credits.
    #[serde(default = "default_price_per_seat")]
    pub price_per_seat: u32,

    /// Remaining personal credits below which a user is warned.
    /// Default: 200 (= $2)
    #[serde(default = "default_user_warning_threshold")]
    pub user_warning_threshold: i64,

    /// Fraction of the monthly allotment below which a team is warned.
    #[serde(default = "default_team_warning_ratio")]
    pub team_warning_ratio: f64,
}

fn default_sms_credits_enabled() -> bool {
    true
}

fn default_price_per_seat() -> u32 {
    15
}

fn default_user_warning_threshold() -> i64 {
    200
}

fn default_team_warning_ratio() -> f64 {
    0.2
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            sms_credits_enabled: default_sms_credits_enabled(),
            price_per_seat: default_price_per_seat(),
            user_warning_threshold: default_user_warning_threshold(),
            team_warning_ratio: default_team_warning_ratio(),
        }
    }
}

impl LedgerConfig {
    /// Reject settings the ledger cannot work with.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if !(0.0..=1.0).contains(&self.team_warning_ratio) {
            return Err(LedgerError::Config(format!(
                "team_warning_ratio must be between 0 and 1, got {}",
                self.team_warning_ratio
            )));
        }
        if self.user_warning_threshold < 0 {
            return Err(LedgerError::Config(format!(
                "user_warning_threshold must not be negative, got {}",
                self.user_warning_threshold
            )));
        }
        Ok(())
    }
}
