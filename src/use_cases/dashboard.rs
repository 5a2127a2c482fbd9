//! Dashboard read queries. Figures are derived from the store on every call.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;

use crate::config::ConfigHandle;
use crate::domain::finding::round_score;
use crate::domain::FraudAlert;
use crate::error::EngineError;
use crate::ports::{EntityStore, StatsQuery};
use crate::services::deadline::store_call;

pub const STATS_LOOKBACK_DAYS: i64 = 7;
pub const DEFAULT_ALERT_LIMIT: i64 = 20;
pub const MAX_ALERT_LIMIT: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub total_transactions: i64,
    pub fraud_detected: i64,
    /// Percentage of labelled fraud, two decimals.
    pub fraud_rate: f64,
    pub avg_fraud_score: f64,
    /// Transactions scored at or above the alert threshold.
    pub flagged_transactions: i64,
    pub transactions_last_hour: i64,
    pub transactions_last_day: i64,
    pub lookback_days: i64,
}

#[derive(Clone)]
pub struct Dashboard {
    store: Arc<dyn EntityStore>,
    config: ConfigHandle,
}

impl Dashboard {
    pub fn new(store: Arc<dyn EntityStore>, config: ConfigHandle) -> Self {
        Self { store, config }
    }

    pub async fn stats(&self) -> Result<DashboardStats, EngineError> {
        self.stats_at(Utc::now()).await
    }

    /// Statistics over the `STATS_LOOKBACK_DAYS` ending at `now`.
    pub async fn stats_at(&self, now: DateTime<Utc>) -> Result<DashboardStats, EngineError> {
        let config = self.config.snapshot();
        let deadline = Instant::now() + config.store_timeout();
        let query = StatsQuery {
            now,
            lookback: Duration::days(STATS_LOOKBACK_DAYS),
            flag_threshold: config.alert_threshold,
        };
        let raw = store_call(deadline, "transaction stats", self.store.transaction_stats(query)).await?;

        let fraud_rate = if raw.total_transactions > 0 {
            (raw.fraud_count as f64 / raw.total_transactions as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };

        Ok(DashboardStats {
            total_transactions: raw.total_transactions,
            fraud_detected: raw.fraud_count,
            fraud_rate,
            avg_fraud_score: round_score(raw.avg_fraud_score),
            flagged_transactions: raw.flagged_count,
            transactions_last_hour: raw.last_hour,
            transactions_last_day: raw.last_day,
            lookback_days: STATS_LOOKBACK_DAYS,
        })
    }

    /// Newest alerts first. `limit` is clamped to `1..=MAX_ALERT_LIMIT`.
    pub async fn recent_alerts(&self, limit: i64) -> Result<Vec<FraudAlert>, EngineError> {
        let deadline = Instant::now() + self.config.snapshot().store_timeout();
        let limit = limit.clamp(1, MAX_ALERT_LIMIT);
        store_call(deadline, "recent alerts", self.store.recent_alerts(limit)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryEntityStore;
    use crate::domain::{AlertDraft, RiskTier, Transaction};
    use bigdecimal::BigDecimal;

    fn scored(id: &str, at: DateTime<Utc>, score: f64, is_fraud: bool) -> Transaction {
        let mut tx = Transaction::new(id, Some("u1".to_string()), Some("m1".to_string()), BigDecimal::from(10), at);
        tx.fraud_score = score;
        tx.is_fraud = is_fraud;
        tx
    }

    #[tokio::test]
    async fn test_empty_store_has_zero_rate() {
        let dashboard = Dashboard::new(Arc::new(MemoryEntityStore::new()), ConfigHandle::default());
        let stats = dashboard.stats().await.unwrap();
        assert_eq!(stats.total_transactions, 0);
        assert_eq!(stats.fraud_rate, 0.0);
        assert_eq!(stats.lookback_days, 7);
    }

    #[tokio::test]
    async fn test_rate_is_a_percentage() {
        let store = Arc::new(MemoryEntityStore::new());
        let now = Utc::now();
        store.save_transaction(&scored("a", now - Duration::minutes(5), 0.9, true)).await.unwrap();
        store.save_transaction(&scored("b", now - Duration::hours(3), 0.1, false)).await.unwrap();
        store.save_transaction(&scored("c", now - Duration::days(2), 0.2, false)).await.unwrap();

        let dashboard = Dashboard::new(store, ConfigHandle::default());
        let stats = dashboard.stats_at(now).await.unwrap();
        assert_eq!(stats.total_transactions, 3);
        assert_eq!(stats.fraud_detected, 1);
        assert_eq!(stats.fraud_rate, 33.33);
        assert_eq!(stats.avg_fraud_score, 0.4);
        assert_eq!(stats.flagged_transactions, 1);
        assert_eq!(stats.transactions_last_hour, 1);
        assert_eq!(stats.transactions_last_day, 2);
    }

    #[tokio::test]
    async fn test_recent_alerts_clamps_limit() {
        let store = Arc::new(MemoryEntityStore::new());
        for i in 0..3 {
            store
                .save_alert(&AlertDraft {
                    transaction_id: format!("t{}", i),
                    alert_type: "velocity".to_string(),
                    severity: RiskTier::Medium,
                    confidence_score: 0.55,
                    triggered_rules: vec!["velocity".to_string()],
                })
                .await
                .unwrap();
        }
        let dashboard = Dashboard::new(store, ConfigHandle::default());
        assert_eq!(dashboard.recent_alerts(0).await.unwrap().len(), 1);
        assert_eq!(dashboard.recent_alerts(500).await.unwrap().len(), 3);
    }
}
