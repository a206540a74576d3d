//! Newline-delimited JSON events consumed by the worker.

use crate::error::WorkerResult;
use credit_ledger::{ChargeRequest, CreditLedger, Owner, TeamId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// One input line.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Usage to be charged (e.g. an SMS was sent).
    Charge(ChargeRequest),
    /// Checkout completed: purchased credits for a team or user.
    Purchase {
        team_id: Option<TeamId>,
        user_id: Option<UserId>,
        credits: i64,
    },
    /// Availability check before sending.
    Check {
        team_id: Option<TeamId>,
        user_id: Option<UserId>,
    },
    /// Monthly / remaining / additional credits of a team.
    TeamCredits { team_id: TeamId },
    /// Raw balance of a team or user.
    Balance {
        team_id: Option<TeamId>,
        user_id: Option<UserId>,
    },
}

/// One output line.
#[derive(Debug, Clone, Serialize)]
pub struct EventResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EventResponse {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

fn owner(user_id: Option<UserId>, team_id: Option<TeamId>) -> WorkerResult<Owner> {
    Owner::from_ids(user_id, team_id).ok_or_else(|| credit_ledger::LedgerError::MissingOwner.into())
}

/// Apply one event to the ledger.
pub async fn apply(ledger: &CreditLedger, event: LedgerEvent) -> WorkerResult<Value> {
    debug!("Applying event: {:?}", event);

    let value = match event {
        LedgerEvent::Charge(request) => {
            let outcome = ledger.charge_credits(request).await?;
            if outcome.is_none() {
                warn!("Charge skipped, no payer found");
            }
            json!({ "charged": outcome })
        }
        LedgerEvent::Purchase {
            team_id,
            user_id,
            credits,
        } => {
            let balance = ledger
                .add_purchased_credits(owner(user_id, team_id)?, credits)
                .await?;
            serde_json::to_value(balance)?
        }
        LedgerEvent::Check { team_id, user_id } => {
            let available = ledger.has_available_credits(user_id, team_id).await?;
            json!({ "available": available })
        }
        LedgerEvent::TeamCredits { team_id } => {
            serde_json::to_value(ledger.get_all_credits_for_team(team_id).await?)?
        }
        LedgerEvent::Balance { team_id, user_id } => {
            serde_json::to_value(ledger.get_balance(owner(user_id, team_id)?).await?)?
        }
    };

    Ok(value)
}

/// Parse and apply one input line, never failing the loop.
pub async fn handle_line(ledger: &CreditLedger, line: &str) -> EventResponse {
    let event: LedgerEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => return EventResponse::failure(format!("Invalid event: {}", e)),
    };

    match apply(ledger, event).await {
        Ok(value) => EventResponse::success(value),
        Err(e) => EventResponse::failure(e),
    }
}
