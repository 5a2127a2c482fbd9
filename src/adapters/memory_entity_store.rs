//! In-memory implementation of EntityStore.
//!
//! All state sits behind one `RwLock`, so every write (including
//! `commit_analysis`) is atomic with respect to every other call.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    AlertDraft, FraudAlert, InvestigationStatus, Merchant, RiskProfile, StatusChange, Transaction,
    User,
};
use crate::ports::{
    AnalysisCommit, CommitOutcome, EntityStore, StatsQuery, StoreError, StoreResult, TimeWindow,
    TransactionStats,
};

#[derive(Default)]
struct State {
    users: HashMap<String, User>,
    merchants: HashMap<String, Merchant>,
    transactions: HashMap<String, Transaction>,
    alerts: HashMap<Uuid, FraudAlert>,
    alert_by_transaction: HashMap<String, Uuid>,
}

impl State {
    fn upsert_alert(&mut self, draft: &AlertDraft, now: DateTime<Utc>) -> FraudAlert {
        if let Some(id) = self.alert_by_transaction.get(&draft.transaction_id) {
            if let Some(alert) = self.alerts.get_mut(id) {
                alert.refresh_from(draft, now);
                return alert.clone();
            }
        }
        let alert = FraudAlert::from_draft(draft.clone(), now);
        self.alert_by_transaction
            .insert(alert.transaction_id.clone(), alert.id);
        self.alerts.insert(alert.id, alert.clone());
        alert
    }
}

#[derive(Clone, Default)]
pub struct MemoryEntityStore {
    state: Arc<RwLock<State>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn get_user(&self, user_id: &str) -> StoreResult<User> {
        self.state
            .read()
            .await
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))
    }

    async fn save_user(&self, user: &User) -> StoreResult<User> {
        let mut state = self.state.write().await;
        state.users.insert(user.user_id.clone(), user.clone());
        Ok(user.clone())
    }

    async fn update_user_risk_profile(&self, user_id: &str, profile: RiskProfile) -> StoreResult<User> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        user.risk_profile = profile;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn get_merchant(&self, merchant_id: &str) -> StoreResult<Merchant> {
        self.state
            .read()
            .await
            .merchants
            .get(merchant_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("merchant {}", merchant_id)))
    }

    async fn save_merchant(&self, merchant: &Merchant) -> StoreResult<Merchant> {
        let mut state = self.state.write().await;
        state
            .merchants
            .insert(merchant.merchant_id.clone(), merchant.clone());
        Ok(merchant.clone())
    }

    async fn get_transaction(&self, transaction_id: &str) -> StoreResult<Transaction> {
        self.state
            .read()
            .await
            .transactions
            .get(transaction_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", transaction_id)))
    }

    async fn get_recent_transactions(
        &self,
        user_id: &str,
        window: TimeWindow,
    ) -> StoreResult<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut found: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.user_id.as_deref() == Some(user_id) && window.contains(t.timestamp))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });
        Ok(found)
    }

    async fn save_transaction(&self, tx: &Transaction) -> StoreResult<Transaction> {
        let mut state = self.state.write().await;
        state
            .transactions
            .insert(tx.transaction_id.clone(), tx.clone());
        Ok(tx.clone())
    }

    async fn set_fraud_label(&self, transaction_id: &str, is_fraud: bool) -> StoreResult<Transaction> {
        let mut state = self.state.write().await;
        let tx = state
            .transactions
            .get_mut(transaction_id)
            .ok_or_else(|| StoreError::NotFound(format!("transaction {}", transaction_id)))?;
        tx.is_fraud = is_fraud;
        Ok(tx.clone())
    }

    async fn get_alert(&self, alert_id: Uuid) -> StoreResult<FraudAlert> {
        self.state
            .read()
            .await
            .alerts
            .get(&alert_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("alert {}", alert_id)))
    }

    async fn get_alert_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<FraudAlert>> {
        let state = self.state.read().await;
        Ok(state
            .alert_by_transaction
            .get(transaction_id)
            .and_then(|id| state.alerts.get(id))
            .cloned())
    }

    async fn save_alert(&self, draft: &AlertDraft) -> StoreResult<FraudAlert> {
        let mut state = self.state.write().await;
        Ok(state.upsert_alert(draft, Utc::now()))
    }

    async fn update_alert_status(
        &self,
        alert_id: Uuid,
        expected: InvestigationStatus,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> StoreResult<FraudAlert> {
        let mut state = self.state.write().await;
        let alert = state
            .alerts
            .get_mut(&alert_id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {}", alert_id)))?;
        if alert.investigation_status != expected {
            return Err(StoreError::Conflict(format!(
                "alert {} is {}, expected {}",
                alert_id, alert.investigation_status, expected
            )));
        }
        alert
            .apply(change, at)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        Ok(alert.clone())
    }

    async fn commit_analysis(&self, commit: AnalysisCommit) -> StoreResult<CommitOutcome> {
        let now = Utc::now();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let scored = commit.transaction;

        let (transaction, inserted) = match state.transactions.get(&scored.transaction_id) {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.fraud_score = scored.fraud_score;
                updated.processing_time_ms = scored.processing_time_ms;
                updated.append_reasons(&scored.fraud_reason);
                (updated, false)
            }
            None => (scored, true),
        };

        if inserted {
            if let Some(merchant) = transaction
                .merchant_id
                .as_deref()
                .and_then(|id| state.merchants.get_mut(id))
            {
                merchant.record_amount(&transaction.amount);
            }
            if let Some(credit) = &commit.lifetime_credit {
                if let Some(user) = transaction
                    .user_id
                    .as_deref()
                    .and_then(|id| state.users.get_mut(id))
                {
                    user.lifetime_value = user.lifetime_value.clone() + credit.clone();
                    user.updated_at = now;
                }
            }
        }

        state
            .transactions
            .insert(transaction.transaction_id.clone(), transaction.clone());
        let alert = commit.alert.map(|draft| state.upsert_alert(&draft, now));

        Ok(CommitOutcome {
            transaction,
            alert,
            inserted,
        })
    }

    async fn recent_alerts(&self, limit: i64) -> StoreResult<Vec<FraudAlert>> {
        let state = self.state.read().await;
        let mut alerts: Vec<FraudAlert> = state.alerts.values().cloned().collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        alerts.truncate(limit.max(0) as usize);
        Ok(alerts)
    }

    async fn transaction_stats(&self, query: StatsQuery) -> StoreResult<TransactionStats> {
        let state = self.state.read().await;
        let window = TimeWindow::ending_at(query.now, query.lookback);
        let hour_ago = query.now - Duration::hours(1);
        let day_ago = query.now - Duration::days(1);

        let mut stats = TransactionStats::default();
        let mut score_sum = 0.0;
        for tx in state.transactions.values().filter(|t| window.contains(t.timestamp)) {
            stats.total_transactions += 1;
            score_sum += tx.fraud_score;
            if tx.is_fraud {
                stats.fraud_count += 1;
            }
            if tx.fraud_score >= query.flag_threshold {
                stats.flagged_count += 1;
            }
            if tx.timestamp >= hour_ago {
                stats.last_hour += 1;
            }
            if tx.timestamp >= day_ago {
                stats.last_day += 1;
            }
        }
        if stats.total_transactions > 0 {
            stats.avg_fraud_score = score_sum / stats.total_transactions as f64;
        }
        Ok(stats)
    }
}
