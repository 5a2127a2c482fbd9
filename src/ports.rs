//! Entity store port.
//!
//! The engine talks to persisted state only through [`EntityStore`]. Adapters
//! live in `crate::adapters`.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    AlertDraft, FraudAlert, InvestigationStatus, Merchant, RiskProfile, StatusChange, Transaction,
    User,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::PoolTimedOut => StoreError::Timeout("connection pool".to_string()),
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                StoreError::Conflict(db_err.message().to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Inclusive time range `[start, end]` used for history lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The `span` leading up to and including `end`.
    pub fn ending_at(end: DateTime<Utc>, span: Duration) -> Self {
        Self {
            start: end - span,
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Everything an analysis writes, committed atomically.
#[derive(Debug, Clone)]
pub struct AnalysisCommit {
    /// Scored transaction. `fraud_reason` holds only this run's rule ids; the
    /// store appends them to any reasons already recorded.
    pub transaction: Transaction,
    pub alert: Option<AlertDraft>,
    /// Added to the user's lifetime value the first time the transaction is stored.
    pub lifetime_credit: Option<BigDecimal>,
}

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub transaction: Transaction,
    pub alert: Option<FraudAlert>,
    /// False when the transaction already existed and was re-scored.
    pub inserted: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct StatsQuery {
    pub now: DateTime<Utc>,
    pub lookback: Duration,
    pub flag_threshold: f64,
}

/// Raw counts over the stats lookback window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransactionStats {
    pub total_transactions: i64,
    pub fraud_count: i64,
    pub flagged_count: i64,
    pub avg_fraud_score: f64,
    pub last_hour: i64,
    pub last_day: i64,
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> StoreResult<User>;

    async fn save_user(&self, user: &User) -> StoreResult<User>;

    /// Explicit policy change; analysis never calls this.
    async fn update_user_risk_profile(&self, user_id: &str, profile: RiskProfile) -> StoreResult<User>;

    async fn get_merchant(&self, merchant_id: &str) -> StoreResult<Merchant>;

    async fn save_merchant(&self, merchant: &Merchant) -> StoreResult<Merchant>;

    async fn get_transaction(&self, transaction_id: &str) -> StoreResult<Transaction>;

    /// Transactions of `user_id` with timestamps inside `window`, newest first.
    async fn get_recent_transactions(
        &self,
        user_id: &str,
        window: TimeWindow,
    ) -> StoreResult<Vec<Transaction>>;

    /// Inserts or replaces a transaction record as given.
    async fn save_transaction(&self, tx: &Transaction) -> StoreResult<Transaction>;

    /// Operator feedback label. Independent of the computed score.
    async fn set_fraud_label(&self, transaction_id: &str, is_fraud: bool) -> StoreResult<Transaction>;

    async fn get_alert(&self, alert_id: Uuid) -> StoreResult<FraudAlert>;

    async fn get_alert_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<FraudAlert>>;

    /// Insert-if-absent keyed by transaction. An existing alert gets its
    /// scoring fields refreshed and keeps its lifecycle.
    async fn save_alert(&self, draft: &AlertDraft) -> StoreResult<FraudAlert>;

    /// Compare-and-swap: applies `change` only while the alert is still in
    /// `expected`, otherwise fails with `Conflict`.
    async fn update_alert_status(
        &self,
        alert_id: Uuid,
        expected: InvestigationStatus,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> StoreResult<FraudAlert>;

    async fn commit_analysis(&self, commit: AnalysisCommit) -> StoreResult<CommitOutcome>;

    async fn recent_alerts(&self, limit: i64) -> StoreResult<Vec<FraudAlert>>;

    async fn transaction_stats(&self, query: StatsQuery) -> StoreResult<TransactionStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds_are_inclusive() {
        let end = Utc::now();
        let window = TimeWindow::ending_at(end, Duration::minutes(5));
        assert!(window.contains(end));
        assert!(window.contains(end - Duration::minutes(5)));
        assert!(!window.contains(end - Duration::minutes(6)));
        assert!(!window.contains(end + Duration::seconds(1)));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert!(matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Timeout(_)
        ));
    }
}
