//! Core types for the credit ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a team (or organization).
pub type TeamId = u64;

/// Identifier of a user.
pub type UserId = u64;

/// Who a credit balance belongs to.
///
/// A balance belongs to exactly one team or one user, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Owner {
    /// Team-level balance (monthly allotment + purchased credits).
    Team(TeamId),
    /// Personal balance of a user.
    User(UserId),
}

impl Owner {
    /// Pick an owner from optional ids, preferring the team.
    pub fn from_ids(user_id: Option<UserId>, team_id: Option<TeamId>) -> Option<Self> {
        match (team_id, user_id) {
            (Some(team_id), _) => Some(Owner::Team(team_id)),
            (None, Some(user_id)) => Some(Owner::User(user_id)),
            (None, None) => None,
        }
    }

    pub fn team_id(&self) -> Option<TeamId> {
        match self {
            Owner::Team(id) => Some(*id),
            Owner::User(_) => None,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Owner::User(id) => Some(*id),
            Owner::Team(_) => None,
        }
    }
}

impl std::fmt::Display for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::Team(id) => write!(f, "team:{}", id),
            Owner::User(id) => write!(f, "user:{}", id),
        }
    }
}

/// Which bucket a charge was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CreditType {
    /// The team's monthly seat-based allotment.
    Monthly,
    /// Purchased top-up credits.
    Additional,
}

/// Credit balance of a team or user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditBalance {
    /// Unique balance ID.
    pub id: String,
    /// Owner of this balance. Fixed at creation.
    owner: Owner,
    /// Purchased credits still available.
    pub additional_credits: i64,
    /// When the balance ran out. Cleared by a top-up.
    pub limit_reached_at: Option<DateTime<Utc>>,
    /// When the last low-balance warning went out.
    pub warning_sent_at: Option<DateTime<Utc>>,
    /// When this balance was created.
    pub created_at: DateTime<Utc>,
}

impl CreditBalance {
    /// Create a new balance for an owner.
    pub fn new(owner: Owner, additional_credits: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner,
            additional_credits: additional_credits.max(0),
            limit_reached_at: None,
            warning_sent_at: None,
            created_at: now,
        }
    }

    pub fn owner(&self) -> Owner {
        self.owner
    }

    /// Add purchased credits, lift a reached limit and re-arm the
    /// low-balance warning.
    pub fn top_up(&mut self, amount: i64) {
        self.additional_credits = self.additional_credits.saturating_add(amount);
        self.limit_reached_at = None;
        self.warning_sent_at = None;
    }

    /// Remove additional credits, never going below zero.
    ///
    /// Returns the amount actually removed.
    pub fn deduct_additional(&mut self, amount: i64) -> i64 {
        let deducted = amount.clamp(0, self.additional_credits.max(0));
        self.additional_credits -= deducted;
        deducted
    }
}

/// Immutable record of a single usage event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditExpenseLog {
    /// Unique log ID.
    pub id: String,
    /// Balance that paid for the usage.
    pub credit_balance_id: String,
    /// Credits charged. `None` while the exact amount is not known yet.
    pub credits: Option<i64>,
    /// Bucket that was charged.
    pub credit_type: CreditType,
    /// When the usage happened.
    pub date: DateTime<Utc>,
    /// Booking that triggered the usage.
    pub booking_uid: String,
    /// SMS message id of the usage.
    pub sms_sid: String,
}

impl CreditExpenseLog {
    pub fn new(
        credit_balance_id: String,
        credits: Option<i64>,
        credit_type: CreditType,
        date: DateTime<Utc>,
        booking_uid: String,
        sms_sid: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            credit_balance_id,
            credits,
            credit_type,
            date,
            booking_uid,
            sms_sid,
        }
    }
}

/// Credits available to a team in the current month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamCredits {
    pub total_monthly_credits: i64,
    /// May go negative when monthly usage overshoots the allotment.
    pub total_remaining_monthly_credits: i64,
    pub additional_credits: i64,
}

impl TeamCredits {
    /// Monthly remainder plus purchased credits.
    pub fn available(&self) -> i64 {
        self.total_remaining_monthly_credits
            .saturating_add(self.additional_credits)
    }
}

/// A usage event to be charged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub user_id: Option<UserId>,
    pub team_id: Option<TeamId>,
    /// `None` when the exact cost is not known yet.
    pub credits: Option<i64>,
    pub booking_uid: String,
    pub sms_sid: String,
}

/// Payer picked for a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChargeableOwner {
    pub owner: Owner,
    pub credit_type: CreditType,
    /// Credits the payer had before this charge. `None` for zero-credit probes.
    pub available_credits: Option<i64>,
}

/// Result of a successful charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChargeOutcome {
    pub owner: Owner,
    pub credit_type: CreditType,
}

/// Billing subscription state of a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Trialing,
    Incomplete,
    Canceled,
    Unpaid,
}

impl SubscriptionStatus {
    /// Whether the team earns a monthly allotment.
    pub fn grants_monthly_credits(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::PastDue)
    }
}

/// Someone who can receive billing emails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_locale() -> String {
    "en".to_string()
}

/// Team facts the ledger needs from the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamInfo {
    pub id: TeamId,
    /// Number of members who accepted their invitation.
    pub accepted_members: u32,
    pub subscription_status: Option<SubscriptionStatus>,
    /// Where team billing emails go.
    #[serde(default)]
    pub billing_contact: Option<Contact>,
}
