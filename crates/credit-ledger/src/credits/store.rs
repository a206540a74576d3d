//! Credit balance storage.

use crate::error::LedgerError;
use crate::types::{CreditBalance, CreditExpenseLog, Owner};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Data version for schema migrations.
const DATA_VERSION: u32 = 1;

/// Persistence seam of the ledger.
///
/// Implementations must apply each method atomically: concurrent charges
/// against the same owner are serialized here, not in the ledger. A write
/// that fails to persist must leave no trace.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Look up the balance of an owner.
    async fn find_balance(&self, owner: Owner) -> Result<Option<CreditBalance>, LedgerError>;

    /// Return the owner's balance, creating an empty one if missing.
    async fn find_or_create_balance(
        &self,
        owner: Owner,
        now: DateTime<Utc>,
    ) -> Result<CreditBalance, LedgerError>;

    /// Append an expense log and, in the same transaction, take `deduct`
    /// credits from the additional bucket (floored at zero).
    async fn record_expense(
        &self,
        owner: Owner,
        log: CreditExpenseLog,
        deduct: Option<i64>,
    ) -> Result<CreditBalance, LedgerError>;

    /// Add purchased credits and clear `limit_reached_at` and
    /// `warning_sent_at`. Creates the balance if missing.
    async fn increment_additional_credits(
        &self,
        owner: Owner,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<CreditBalance, LedgerError>;

    /// Set `limit_reached_at` unless it is already set at or after
    /// `period_start`. With no `period_start` any existing value counts.
    ///
    /// Returns `true` if this call set the flag.
    async fn mark_limit_reached(
        &self,
        owner: Owner,
        at: DateTime<Utc>,
        period_start: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError>;

    /// Same compare-and-set as [`LedgerStore::mark_limit_reached`] for
    /// `warning_sent_at`.
    async fn mark_warning_sent(
        &self,
        owner: Owner,
        at: DateTime<Utc>,
        period_start: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError>;

    /// Expense logs of a balance, oldest first.
    async fn expense_logs(&self, balance_id: &str) -> Result<Vec<CreditExpenseLog>, LedgerError>;
}

/// Persistent data structure for the credit store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditStoreData {
    /// Schema version for migrations.
    pub version: u32,
    /// Balances keyed by owner (`team:<id>` / `user:<id>`).
    pub balances: HashMap<String, CreditBalance>,
    /// Expense log, append-only.
    pub expense_logs: Vec<CreditExpenseLog>,
}

impl Default for CreditStoreData {
    fn default() -> Self {
        Self {
            version: DATA_VERSION,
            balances: HashMap::new(),
            expense_logs: Vec::new(),
        }
    }
}

fn owner_key(owner: Owner) -> String {
    owner.to_string()
}

fn flag_is_current(flag: Option<DateTime<Utc>>, period_start: Option<DateTime<Utc>>) -> bool {
    match (flag, period_start) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(at), Some(start)) => at >= start,
    }
}

/// Credit store kept in memory and optionally mirrored to a JSON file.
pub struct CreditStore {
    data: RwLock<CreditStoreData>,
    storage_path: Option<PathBuf>,
}

impl CreditStore {
    /// Create a store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            data: RwLock::new(CreditStoreData::default()),
            storage_path: None,
        }
    }

    /// Open a file-backed store, loading existing data if available.
    pub async fn open(storage_path: PathBuf) -> Result<Self, LedgerError> {
        let store = Self {
            data: RwLock::new(CreditStoreData::default()),
            storage_path: Some(storage_path),
        };

        store.load().await?;

        Ok(store)
    }

    /// Persist `next` and make it the current data. On a failed write the
    /// current data is left untouched.
    async fn commit(
        &self,
        current: &mut CreditStoreData,
        next: CreditStoreData,
    ) -> Result<(), LedgerError> {
        self.persist(&next).await?;
        *current = next;
        Ok(())
    }

    /// Write a snapshot to disk. Callers hold the write guard so snapshots
    /// land in mutation order.
    async fn persist(&self, data: &CreditStoreData) -> Result<(), LedgerError> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        let bytes = serde_json::to_vec(data)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Atomic write
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &bytes).await?;
        fs::rename(&temp_path, path).await?;

        debug!("Saved credit store ({} bytes) to {:?}", bytes.len(), path);

        Ok(())
    }

    async fn load(&self) -> Result<(), LedgerError> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        if !path.exists() {
            info!("Credit store not found at {:?}, starting fresh", path);
            return Ok(());
        }

        let bytes = fs::read(path).await?;
        if bytes.is_empty() {
            warn!("Credit store file is empty, starting fresh");
            return Ok(());
        }

        let data: CreditStoreData = serde_json::from_slice(&bytes)?;
        if data.version != DATA_VERSION {
            return Err(LedgerError::Storage(format!(
                "Unsupported credit store version {} (expected {})",
                data.version, DATA_VERSION
            )));
        }

        info!(
            "Loaded credit store: {} balances, {} expense logs",
            data.balances.len(),
            data.expense_logs.len()
        );

        *self.data.write().await = data;

        Ok(())
    }

    /// Get summary statistics.
    pub async fn get_stats(&self) -> CreditStoreStats {
        let data = self.data.read().await;
        CreditStoreStats {
            total_balances: data.balances.len(),
            total_expense_logs: data.expense_logs.len(),
            total_credits_logged: data.expense_logs.iter().filter_map(|l| l.credits).sum(),
        }
    }
}

#[async_trait]
impl LedgerStore for CreditStore {
    async fn find_balance(&self, owner: Owner) -> Result<Option<CreditBalance>, LedgerError> {
        let data = self.data.read().await;
        Ok(data.balances.get(&owner_key(owner)).cloned())
    }

    async fn find_or_create_balance(
        &self,
        owner: Owner,
        now: DateTime<Utc>,
    ) -> Result<CreditBalance, LedgerError> {
        let mut data = self.data.write().await;
        let key = owner_key(owner);

        if let Some(balance) = data.balances.get(&key) {
            return Ok(balance.clone());
        }

        let balance = CreditBalance::new(owner, 0, now);
        let mut next = data.clone();
        next.balances.insert(key, balance.clone());
        self.commit(&mut data, next).await?;

        debug!("Created credit balance {} for {}", balance.id, owner);

        Ok(balance)
    }

    async fn record_expense(
        &self,
        owner: Owner,
        log: CreditExpenseLog,
        deduct: Option<i64>,
    ) -> Result<CreditBalance, LedgerError> {
        let mut data = self.data.write().await;
        let mut next = data.clone();

        let balance = next
            .balances
            .get_mut(&owner_key(owner))
            .filter(|b| b.id == log.credit_balance_id)
            .ok_or_else(|| {
                LedgerError::Storage(format!(
                    "Credit balance {} not found for {}",
                    log.credit_balance_id, owner
                ))
            })?;

        if let Some(amount) = deduct {
            let deducted = balance.deduct_additional(amount);
            if deducted < amount {
                warn!(
                    "Additional credits of {} exhausted: wanted {}, deducted {}",
                    owner, amount, deducted
                );
            }
        }
        let balance = balance.clone();

        next.expense_logs.push(log);
        self.commit(&mut data, next).await?;

        Ok(balance)
    }

    async fn increment_additional_credits(
        &self,
        owner: Owner,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<CreditBalance, LedgerError> {
        let mut data = self.data.write().await;
        let mut next = data.clone();

        let balance = next
            .balances
            .entry(owner_key(owner))
            .or_insert_with(|| CreditBalance::new(owner, 0, now));
        balance.top_up(amount);
        let balance = balance.clone();

        self.commit(&mut data, next).await?;

        Ok(balance)
    }

    async fn mark_limit_reached(
        &self,
        owner: Owner,
        at: DateTime<Utc>,
        period_start: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError> {
        let mut data = self.data.write().await;
        let mut next = data.clone();

        let balance = next
            .balances
            .entry(owner_key(owner))
            .or_insert_with(|| CreditBalance::new(owner, 0, at));
        if flag_is_current(balance.limit_reached_at, period_start) {
            return Ok(false);
        }
        balance.limit_reached_at = Some(at);

        self.commit(&mut data, next).await?;

        Ok(true)
    }

    async fn mark_warning_sent(
        &self,
        owner: Owner,
        at: DateTime<Utc>,
        period_start: Option<DateTime<Utc>>,
    ) -> Result<bool, LedgerError> {
        let mut data = self.data.write().await;
        let mut next = data.clone();

        let balance = next
            .balances
            .entry(owner_key(owner))
            .or_insert_with(|| CreditBalance::new(owner, 0, at));
        if flag_is_current(balance.warning_sent_at, period_start) {
            return Ok(false);
        }
        balance.warning_sent_at = Some(at);

        self.commit(&mut data, next).await?;

        Ok(true)
    }

    async fn expense_logs(&self, balance_id: &str) -> Result<Vec<CreditExpenseLog>, LedgerError> {
        let data = self.data.read().await;
        Ok(data
            .expense_logs
            .iter()
            .filter(|l| l.credit_balance_id == balance_id)
            .cloned()
            .collect())
    }
}

/// Summary statistics for the credit store.
#[derive(Debug, Clone)]
pub struct CreditStoreStats {
    pub total_balances: usize,
    pub total_expense_logs: usize,
    pub total_credits_logged: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CreditType;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    fn expense(balance: &CreditBalance, credits: Option<i64>, credit_type: CreditType) -> CreditExpenseLog {
        CreditExpenseLog::new(
            balance.id.clone(),
            credits,
            credit_type,
            now(),
            "booking-1".to_string(),
            "SM123".to_string(),
        )
    }

    #[tokio::test]
    async fn test_find_or_create_balance_is_idempotent() {
        let store = CreditStore::in_memory();

        let first = store.find_or_create_balance(Owner::Team(1), now()).await.unwrap();
        let second = store.find_or_create_balance(Owner::Team(1), now()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.owner(), Owner::Team(1));
        assert_eq!(store.get_stats().await.total_balances, 1);
    }

    #[tokio::test]
    async fn test_find_balance_missing() {
        let store = CreditStore::in_memory();
        assert!(store.find_balance(Owner::User(9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_expense_deducts_additional() {
        let store = CreditStore::in_memory();
        store
            .increment_additional_credits(Owner::Team(1), 100, now())
            .await
            .unwrap();
        let balance = store.find_balance(Owner::Team(1)).await.unwrap().unwrap();

        let updated = store
            .record_expense(
                Owner::Team(1),
                expense(&balance, Some(40), CreditType::Additional),
                Some(40),
            )
            .await
            .unwrap();

        assert_eq!(updated.additional_credits, 60);
        assert_eq!(store.expense_logs(&balance.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_record_expense_never_goes_negative() {
        let store = CreditStore::in_memory();
        store
            .increment_additional_credits(Owner::Team(1), 10, now())
            .await
            .unwrap();
        let balance = store.find_balance(Owner::Team(1)).await.unwrap().unwrap();

        let updated = store
            .record_expense(
                Owner::Team(1),
                expense(&balance, Some(25), CreditType::Additional),
                Some(25),
            )
            .await
            .unwrap();

        assert_eq!(updated.additional_credits, 0);
    }

    #[tokio::test]
    async fn test_record_expense_unknown_balance() {
        let store = CreditStore::in_memory();
        let balance = CreditBalance::new(Owner::Team(1), 0, now());

        let result = store
            .record_expense(Owner::Team(1), expense(&balance, Some(1), CreditType::Monthly), None)
            .await;

        assert!(matches!(result, Err(LedgerError::Storage(_))));
        assert_eq!(store.get_stats().await.total_expense_logs, 0);
    }

    #[tokio::test]
    async fn test_increment_clears_limit() {
        let store = CreditStore::in_memory();
        assert!(store
            .mark_limit_reached(Owner::User(2), now(), None)
            .await
            .unwrap());

        let balance = store
            .increment_additional_credits(Owner::User(2), 300, now())
            .await
            .unwrap();

        assert_eq!(balance.additional_credits, 300);
        assert!(balance.limit_reached_at.is_none());
    }

    #[tokio::test]
    async fn test_mark_flags_compare_and_set() {
        let store = CreditStore::in_memory();
        let owner = Owner::User(5);

        assert!(store.mark_warning_sent(owner, now(), None).await.unwrap());
        assert!(!store.mark_warning_sent(owner, now(), None).await.unwrap());

        assert!(store.mark_limit_reached(owner, now(), None).await.unwrap());
        assert!(!store.mark_limit_reached(owner, now(), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_flags_respect_period_start() {
        let store = CreditStore::in_memory();
        let owner = Owner::Team(3);
        let april = Utc.with_ymd_and_hms(2026, 4, 20, 0, 0, 0).unwrap();
        let may_start = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();

        assert!(store.mark_warning_sent(owner, april, None).await.unwrap());
        // April's warning does not count in May
        assert!(store
            .mark_warning_sent(owner, now(), Some(may_start))
            .await
            .unwrap());
        assert!(!store
            .mark_warning_sent(owner, now(), Some(may_start))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().join("credits.json");

        {
            let store = CreditStore::open(storage_path.clone()).await.unwrap();
            let balance = store
                .increment_additional_credits(Owner::Team(1), 1_000, now())
                .await
                .unwrap();
            store
                .record_expense(
                    Owner::Team(1),
                    expense(&balance, None, CreditType::Monthly),
                    None,
                )
                .await
                .unwrap();
        }

        {
            let store = CreditStore::open(storage_path).await.unwrap();
            let balance = store.find_balance(Owner::Team(1)).await.unwrap().unwrap();
            assert_eq!(balance.additional_credits, 1_000);

            let logs = store.expense_logs(&balance.id).await.unwrap();
            assert_eq!(logs.len(), 1);
            assert!(logs[0].credits.is_none());
        }
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().join("credits.json");
        let store = CreditStore::open(storage_path.clone()).await.unwrap();
        let balance = store
            .increment_additional_credits(Owner::User(4), 500, now())
            .await
            .unwrap();

        // A directory where the temp file goes makes every write fail
        let blocker = storage_path.with_extension("tmp");
        std::fs::create_dir(&blocker).unwrap();

        let result = store
            .record_expense(
                Owner::User(4),
                expense(&balance, Some(100), CreditType::Additional),
                Some(100),
            )
            .await;
        assert!(matches!(result, Err(LedgerError::Storage(_))));

        let result = store.increment_additional_credits(Owner::User(4), 50, now()).await;
        assert!(result.is_err());
        let result = store.mark_warning_sent(Owner::User(4), now(), None).await;
        assert!(result.is_err());

        let current = store.find_balance(Owner::User(4)).await.unwrap().unwrap();
        assert_eq!(current.additional_credits, 500);
        assert!(current.warning_sent_at.is_none());
        assert!(store.expense_logs(&balance.id).await.unwrap().is_empty());

        // Retrying after the failure charges exactly once
        std::fs::remove_dir(&blocker).unwrap();
        store
            .record_expense(
                Owner::User(4),
                expense(&balance, Some(100), CreditType::Additional),
                Some(100),
            )
            .await
            .unwrap();

        let reopened = CreditStore::open(storage_path).await.unwrap();
        let current = reopened.find_balance(Owner::User(4)).await.unwrap().unwrap();
        assert_eq!(current.additional_credits, 400);
        assert_eq!(reopened.expense_logs(&balance.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_rejects_unknown_version() {
        let temp_dir = TempDir::new().unwrap();
        let storage_path = temp_dir.path().join("credits.json");
        std::fs::write(
            &storage_path,
            r#"{"version": 99, "balances": {}, "expense_logs": []}"#,
        )
        .unwrap();

        let result = CreditStore::open(storage_path).await;
        assert!(matches!(result, Err(LedgerError::Storage(_))));
    }
}
