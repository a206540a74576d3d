//! Monthly allotment and warning threshold calculation.

use crate::config::LedgerConfig;

/// Calculate the monthly credits a team earns.
///
/// Formula:
/// - per_seat = (price_per_seat / 2) * 100
/// - total = accepted_members * per_seat
///
/// Computed as `members * price * 50` so odd seat prices stay exact.
pub fn monthly_credits(accepted_members: u32, price_per_seat: u32) -> i64 {
    i64::from(accepted_members)
        .saturating_mul(i64::from(price_per_seat))
        .saturating_mul(50)
}

/// Allotment calculator with cached config.
pub struct AllotmentCalculator {
    price_per_seat: u32,
    team_warning_ratio: f64,
    user_warning_threshold: i64,
}

impl AllotmentCalculator {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            price_per_seat: config.price_per_seat,
            team_warning_ratio: config.team_warning_ratio,
            user_warning_threshold: config.user_warning_threshold,
        }
    }

    /// Monthly credits for a team with the given accepted member count.
    pub fn monthly_credits(&self, accepted_members: u32) -> i64 {
        monthly_credits(accepted_members, self.price_per_seat)
    }

    /// Remaining credits below which a team is warned.
    pub fn team_warning_limit(&self, total_monthly_credits: i64) -> f64 {
        total_monthly_credits as f64 * self.team_warning_ratio
    }

    /// Remaining credits below which a user is warned.
    pub fn user_warning_limit(&self) -> i64 {
        self.user_warning_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monthly_credits_basic() {
        // 4 members * (15 / 2) * 100 = 3000
        assert_eq!(monthly_credits(4, 15), 3000);
    }

    #[test]
    fn test_monthly_credits_no_members() {
        assert_eq!(monthly_credits(0, 15), 0);
    }

    #[test]
    fn test_monthly_credits_saturates() {
        assert_eq!(monthly_credits(u32::MAX, u32::MAX), i64::MAX);
    }

    #[test]
    fn test_calculator_thresholds() {
        let calc = AllotmentCalculator::new(&LedgerConfig::default());

        assert_eq!(calc.monthly_credits(2), 1500);
        assert!((calc.team_warning_limit(3000) - 600.0).abs() < f64::EPSILON);
        assert_eq!(calc.user_warning_limit(), 200);
    }

    #[test]
    fn test_calculator_custom_price() {
        let config = LedgerConfig {
            price_per_seat: 37,
            ..LedgerConfig::default()
        };
        let calc = AllotmentCalculator::new(&config);

        assert_eq!(calc.monthly_credits(3), 3 * 1850);
    }
}
