//! Charge attribution, expense logging and low-balance handling.

use crate::clock::{in_current_month, start_of_month, Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::credits::{AllotmentCalculator, LedgerStore};
use crate::directory::Directory;
use crate::error::LedgerError;
use crate::notify::{LimitReachedNotice, LowBalanceNotice, Notifier};
use crate::types::{
    ChargeOutcome, ChargeRequest, ChargeableOwner, Contact, CreditBalance, CreditExpenseLog,
    CreditType, Owner, TeamCredits, TeamId, UserId,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Credit ledger for teams and users.
///
/// Holds no balance state of its own; every read goes to the store so
/// concurrent callers always see the latest committed balance.
pub struct CreditLedger {
    store: Arc<dyn LedgerStore>,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    allotment: AllotmentCalculator,
}

impl CreditLedger {
    pub fn new(
        config: LedgerConfig,
        store: Arc<dyn LedgerStore>,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let allotment = AllotmentCalculator::new(&config);
        Self {
            store,
            directory,
            notifier,
            clock: Arc::new(SystemClock),
            config,
            allotment,
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Charge a usage event to the team or user that can pay for it.
    ///
    /// Returns `Ok(None)` when nobody can pay; nothing is logged then.
    /// `credits: None` records the event with an unknown amount and
    /// requires at least one credit to be available.
    #[instrument(skip(self, request), fields(user_id = ?request.user_id, team_id = ?request.team_id, credits = ?request.credits))]
    pub async fn charge_credits(
        &self,
        request: ChargeRequest,
    ) -> Result<Option<ChargeOutcome>, LedgerError> {
        if let Some(credits) = request.credits.filter(|c| *c < 0) {
            return Err(LedgerError::InvalidAmount(credits));
        }

        let requested = request.credits.unwrap_or(1);
        let payer = self
            .resolve_chargeable_owner(requested, request.user_id, request.team_id)
            .await?;

        let Some(payer) = payer else {
            error!("No team or user found to charge. No credit expense log created");
            return Ok(None);
        };

        self.create_expense_log(
            payer.owner,
            request.credits,
            payer.credit_type,
            &request.booking_uid,
            &request.sms_sid,
        )
        .await?;

        if let (Some(credits), Some(available)) =
            (request.credits.filter(|c| *c != 0), payer.available_credits)
        {
            // The charge is committed; threshold bookkeeping must not undo it.
            if let Err(e) = self
                .handle_low_credit_balance(payer.owner, available.saturating_sub(credits))
                .await
            {
                error!("Low balance check failed for {}: {}", payer.owner, e);
            }
        }

        Ok(Some(ChargeOutcome {
            owner: payer.owner,
            credit_type: payer.credit_type,
        }))
    }

    /// Pick who pays for `requested` credits.
    ///
    /// A request of zero credits is an availability probe: the given owner
    /// is returned unchanged without looking at balances.
    #[instrument(skip(self))]
    pub async fn resolve_chargeable_owner(
        &self,
        requested: i64,
        user_id: Option<UserId>,
        team_id: Option<TeamId>,
    ) -> Result<Option<ChargeableOwner>, LedgerError> {
        if requested == 0 {
            return Ok(Owner::from_ids(user_id, team_id).map(|owner| ChargeableOwner {
                owner,
                credit_type: CreditType::Additional,
                available_credits: None,
            }));
        }

        if let Some(team_id) = team_id {
            if let Some(payer) = self.team_payer(team_id, requested).await? {
                return Ok(Some(payer));
            }
        }

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        for team_id in self.directory.accepted_team_ids(user_id).await? {
            if let Some(payer) = self.team_payer(team_id, requested).await? {
                return Ok(Some(payer));
            }
        }

        // Personal credits only pay when no team does.
        let owner = Owner::User(user_id);
        if let Some(balance) = self.store.find_balance(owner).await? {
            if balance.limit_reached_at.is_none() && balance.additional_credits >= requested {
                return Ok(Some(ChargeableOwner {
                    owner,
                    credit_type: CreditType::Additional,
                    available_credits: Some(balance.additional_credits),
                }));
            }
        }

        Ok(None)
    }

    async fn team_payer(
        &self,
        team_id: TeamId,
        requested: i64,
    ) -> Result<Option<ChargeableOwner>, LedgerError> {
        let now = self.clock.now();
        let balance = self.store.find_balance(Owner::Team(team_id)).await?;

        if balance
            .as_ref()
            .is_some_and(|b| in_current_month(b.limit_reached_at, now))
        {
            debug!("Team {} reached its limit this month", team_id);
            return Ok(None);
        }

        let credits = self.team_credits(team_id, balance.as_ref(), now).await?;
        let available = credits.available();
        if available < requested {
            return Ok(None);
        }

        let credit_type = if credits.total_remaining_monthly_credits > 0 {
            CreditType::Monthly
        } else {
            CreditType::Additional
        };

        Ok(Some(ChargeableOwner {
            owner: Owner::Team(team_id),
            credit_type,
            available_credits: Some(available),
        }))
    }

    /// Whether the team or user may still use credit-consuming features.
    #[instrument(skip(self))]
    pub async fn has_available_credits(
        &self,
        user_id: Option<UserId>,
        team_id: Option<TeamId>,
    ) -> Result<bool, LedgerError> {
        if !self.config.sms_credits_enabled {
            return Ok(true);
        }

        if let Some(team_id) = team_id {
            if self.team_has_available_credits(team_id).await? {
                return Ok(true);
            }
        }

        let Some(user_id) = user_id else {
            return Ok(false);
        };

        for team_id in self.directory.accepted_team_ids(user_id).await? {
            if self.team_has_available_credits(team_id).await? {
                return Ok(true);
            }
        }

        Ok(self
            .store
            .find_balance(Owner::User(user_id))
            .await?
            .is_some_and(|b| b.limit_reached_at.is_none() && b.additional_credits > 0))
    }

    async fn team_has_available_credits(&self, team_id: TeamId) -> Result<bool, LedgerError> {
        if self.directory.team(team_id).await?.is_none() {
            return Ok(false);
        }

        let now = self.clock.now();
        let limit_reached = self
            .store
            .find_balance(Owner::Team(team_id))
            .await?
            .is_some_and(|b| in_current_month(b.limit_reached_at, now));

        Ok(!limit_reached)
    }

    /// Monthly, remaining monthly and purchased credits of a team.
    #[instrument(skip(self))]
    pub async fn get_all_credits_for_team(&self, team_id: TeamId) -> Result<TeamCredits, LedgerError> {
        let now = self.clock.now();
        let balance = self.store.find_balance(Owner::Team(team_id)).await?;
        self.team_credits(team_id, balance.as_ref(), now).await
    }

    async fn team_credits(
        &self,
        team_id: TeamId,
        balance: Option<&CreditBalance>,
        now: DateTime<Utc>,
    ) -> Result<TeamCredits, LedgerError> {
        let total_monthly_credits = self.get_monthly_credits(team_id).await?;

        let (used, additional_credits) = match balance {
            Some(balance) => {
                let period_start = start_of_month(now);
                let used: i64 = self
                    .store
                    .expense_logs(&balance.id)
                    .await?
                    .iter()
                    .filter(|l| l.credit_type == CreditType::Monthly)
                    .filter(|l| l.date >= period_start && l.date <= now)
                    .filter_map(|l| l.credits)
                    .fold(0, i64::saturating_add);
                (used, balance.additional_credits)
            }
            None => (0, 0),
        };

        Ok(TeamCredits {
            total_monthly_credits,
            total_remaining_monthly_credits: total_monthly_credits.saturating_sub(used),
            additional_credits,
        })
    }

    /// Credits a team earns this month from its accepted seats.
    ///
    /// Zero unless the subscription is active or past due.
    #[instrument(skip(self))]
    pub async fn get_monthly_credits(&self, team_id: TeamId) -> Result<i64, LedgerError> {
        let Some(team) = self.directory.team(team_id).await? else {
            return Ok(0);
        };

        if !team
            .subscription_status
            .is_some_and(|s| s.grants_monthly_credits())
        {
            return Ok(0);
        }

        Ok(self.allotment.monthly_credits(team.accepted_members))
    }

    /// Move the owner through NORMAL → WARNED → LIMIT_REACHED.
    ///
    /// Team flags only count within the current calendar month; user flags
    /// stay until a top-up clears them.
    #[instrument(skip(self))]
    pub async fn handle_low_credit_balance(
        &self,
        owner: Owner,
        remaining_credits: i64,
    ) -> Result<(), LedgerError> {
        match owner {
            Owner::User(user_id) => self.handle_low_user_balance(user_id, remaining_credits).await,
            Owner::Team(team_id) => self.handle_low_team_balance(team_id, remaining_credits).await,
        }
    }

    async fn handle_low_user_balance(&self, user_id: UserId, remaining: i64) -> Result<(), LedgerError> {
        // On a team plan personal credits are only a fallback.
        if !self.directory.accepted_team_ids(user_id).await?.is_empty() {
            debug!("User {} is on a team plan, skipping low balance check", user_id);
            return Ok(());
        }

        if remaining > 0 && remaining >= self.allotment.user_warning_limit() {
            return Ok(());
        }

        let owner = Owner::User(user_id);
        let balance = self.store.find_balance(owner).await?;
        if balance.as_ref().is_some_and(|b| b.limit_reached_at.is_some()) {
            return Ok(());
        }

        let now = self.clock.now();

        if remaining <= 0 {
            if self.store.mark_limit_reached(owner, now, None).await? {
                info!("User {} reached the credit limit", user_id);
                if let Some(recipient) = self.directory.user(user_id).await? {
                    self.notify_limit_reached(LimitReachedNotice { owner, recipient })
                        .await;
                }
            }
            return Ok(());
        }

        if balance.as_ref().is_some_and(|b| b.warning_sent_at.is_some()) {
            return Ok(());
        }

        let Some(recipient) = self.directory.user(user_id).await? else {
            warn!("User {} not found, no low balance warning sent", user_id);
            return Ok(());
        };

        if self.store.mark_warning_sent(owner, now, None).await? {
            info!("User {} balance low: {} credits left", user_id, remaining);
            self.notify_low_balance(LowBalanceNotice {
                owner,
                recipient,
                balance: remaining,
            })
            .await;
        }

        Ok(())
    }

    async fn handle_low_team_balance(&self, team_id: TeamId, remaining: i64) -> Result<(), LedgerError> {
        let TeamCredits {
            total_monthly_credits,
            ..
        } = self.get_all_credits_for_team(team_id).await?;

        // An exhausted team always reaches the limit, even with no allotment.
        if remaining > 0
            && (remaining as f64) >= self.allotment.team_warning_limit(total_monthly_credits)
        {
            return Ok(());
        }

        let owner = Owner::Team(team_id);
        let now = self.clock.now();
        let period_start = start_of_month(now);
        let balance = self.store.find_balance(owner).await?;

        if balance
            .as_ref()
            .is_some_and(|b| in_current_month(b.limit_reached_at, now))
        {
            return Ok(());
        }

        if remaining <= 0 {
            if self
                .store
                .mark_limit_reached(owner, now, Some(period_start))
                .await?
            {
                info!("Team {} reached the credit limit", team_id);
                if let Some(recipient) = self.team_contact(team_id).await? {
                    self.notify_limit_reached(LimitReachedNotice { owner, recipient })
                        .await;
                }
            }
            return Ok(());
        }

        if balance
            .as_ref()
            .is_some_and(|b| in_current_month(b.warning_sent_at, now))
        {
            return Ok(());
        }

        if self
            .store
            .mark_warning_sent(owner, now, Some(period_start))
            .await?
        {
            info!(
                "Team {} balance low: {} of {} monthly credits left",
                team_id, remaining, total_monthly_credits
            );
            if let Some(recipient) = self.team_contact(team_id).await? {
                self.notify_low_balance(LowBalanceNotice {
                    owner,
                    recipient,
                    balance: remaining,
                })
                .await;
            }
        }

        Ok(())
    }

    async fn team_contact(&self, team_id: TeamId) -> Result<Option<Contact>, LedgerError> {
        Ok(self
            .directory
            .team(team_id)
            .await?
            .and_then(|t| t.billing_contact))
    }

    async fn notify_low_balance(&self, notice: LowBalanceNotice) {
        if let Err(e) = self.notifier.send_low_balance_warning(&notice).await {
            warn!("Failed to send low balance warning to {}: {}", notice.owner, e);
        }
    }

    async fn notify_limit_reached(&self, notice: LimitReachedNotice) {
        if let Err(e) = self.notifier.send_limit_reached(&notice).await {
            warn!("Failed to send limit reached notice to {}: {}", notice.owner, e);
        }
    }

    /// Append an expense log for `owner`, creating its balance if needed.
    ///
    /// Known additional-credit charges are deducted in the same store
    /// transaction as the log insert.
    pub async fn create_expense_log(
        &self,
        owner: Owner,
        credits: Option<i64>,
        credit_type: CreditType,
        booking_uid: &str,
        sms_sid: &str,
    ) -> Result<CreditBalance, LedgerError> {
        let now = self.clock.now();
        let balance = self.store.find_or_create_balance(owner, now).await?;

        let log = CreditExpenseLog::new(
            balance.id.clone(),
            credits,
            credit_type,
            now,
            booking_uid.to_string(),
            sms_sid.to_string(),
        );

        let deduct = match (credit_type, credits) {
            (CreditType::Additional, Some(c)) if c > 0 => Some(c),
            _ => None,
        };

        debug!(
            "Logging {:?} {:?} credits against {}",
            credits, credit_type, owner
        );

        self.store.record_expense(owner, log, deduct).await
    }

    /// Add purchased credits (checkout completed) and lift a reached limit.
    #[instrument(skip(self))]
    pub async fn add_purchased_credits(
        &self,
        owner: Owner,
        credits: i64,
    ) -> Result<CreditBalance, LedgerError> {
        if credits <= 0 {
            return Err(LedgerError::InvalidAmount(credits));
        }

        let balance = self
            .store
            .increment_additional_credits(owner, credits, self.clock.now())
            .await?;

        info!(
            "Added {} credits to {} (now {})",
            credits, owner, balance.additional_credits
        );

        Ok(balance)
    }

    /// Current balance of an owner, if one was ever created.
    pub async fn get_balance(&self, owner: Owner) -> Result<Option<CreditBalance>, LedgerError> {
        self.store.find_balance(owner).await
    }

    /// Expense history of an owner, oldest first.
    pub async fn get_expense_logs(&self, owner: Owner) -> Result<Vec<CreditExpenseLog>, LedgerError> {
        match self.store.find_balance(owner).await? {
            Some(balance) => self.store.expense_logs(&balance.id).await,
            None => Ok(Vec::new()),
        }
    }
}
