//! Team membership, subscription and contact lookups.

use crate::error::LedgerError;
use crate::types::{Contact, SubscriptionStatus, TeamId, TeamInfo, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Read-only view of teams and users the ledger charges against.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Directory: Send + Sync {
    /// Teams whose invitation the user accepted, in membership order.
    async fn accepted_team_ids(&self, user_id: UserId) -> Result<Vec<TeamId>, LedgerError>;

    /// Team facts, `None` if the team does not exist.
    async fn team(&self, team_id: TeamId) -> Result<Option<TeamInfo>, LedgerError>;

    /// Contact details of a user, `None` if the user does not exist.
    async fn user(&self, user_id: UserId) -> Result<Option<Contact>, LedgerError>;
}

/// A membership row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub team_id: TeamId,
    #[serde(default)]
    pub accepted: bool,
}

/// A team row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamRecord {
    pub id: TeamId,
    #[serde(default)]
    pub subscription_status: Option<SubscriptionStatus>,
    #[serde(default)]
    pub billing_contact: Option<Contact>,
}

/// A user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    #[serde(flatten)]
    pub contact: Contact,
}

/// In-memory directory, typically loaded from a JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryDirectory {
    #[serde(default)]
    teams: Vec<TeamRecord>,
    #[serde(default)]
    users: Vec<UserRecord>,
    #[serde(default)]
    memberships: Vec<Membership>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a directory from a JSON file.
    pub async fn load(path: &Path) -> Result<Self, LedgerError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LedgerError::Directory(format!("Failed to read {:?}: {}", path, e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Insert or replace a team.
    pub fn add_team(&mut self, id: TeamId, subscription_status: Option<SubscriptionStatus>) {
        self.teams.retain(|t| t.id != id);
        self.teams.push(TeamRecord {
            id,
            subscription_status,
            billing_contact: None,
        });
    }

    /// Set the billing contact of an existing team.
    pub fn set_billing_contact(&mut self, team_id: TeamId, contact: Contact) {
        if let Some(team) = self.teams.iter_mut().find(|t| t.id == team_id) {
            team.billing_contact = Some(contact);
        }
    }

    /// Insert or replace a user.
    pub fn add_user(&mut self, id: UserId, contact: Contact) {
        self.users.retain(|u| u.id != id);
        self.users.push(UserRecord { id, contact });
    }

    /// Add a membership row.
    pub fn add_membership(&mut self, user_id: UserId, team_id: TeamId, accepted: bool) {
        self.memberships.push(Membership {
            user_id,
            team_id,
            accepted,
        });
    }

    /// Number of accepted members of a team.
    pub fn count_accepted(&self, team_id: TeamId) -> u32 {
        let count = self
            .memberships
            .iter()
            .filter(|m| m.team_id == team_id && m.accepted)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn accepted_team_ids(&self, user_id: UserId) -> Result<Vec<TeamId>, LedgerError> {
        Ok(self
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.accepted)
            .map(|m| m.team_id)
            .collect())
    }

    async fn team(&self, team_id: TeamId) -> Result<Option<TeamInfo>, LedgerError> {
        Ok(self.teams.iter().find(|t| t.id == team_id).map(|t| TeamInfo {
            id: t.id,
            accepted_members: self.count_accepted(t.id),
            subscription_status: t.subscription_status,
            billing_contact: t.billing_contact.clone(),
        }))
    }

    async fn user(&self, user_id: UserId) -> Result<Option<Contact>, LedgerError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.contact.clone()))
    }
}
