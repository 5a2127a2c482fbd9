use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use fraudwatch_core::adapters::MemoryEntityStore;
use fraudwatch_core::config::{ConfigHandle, EngineConfig};
use fraudwatch_core::domain::{
    AlertDraft, FraudAlert, InvestigationStatus, Merchant, RiskProfile, StatusChange, Transaction,
    User,
};
use fraudwatch_core::error::EngineError;
use fraudwatch_core::ports::{
    AnalysisCommit, CommitOutcome, EntityStore, StatsQuery, StoreResult, TimeWindow,
    TransactionStats,
};
use fraudwatch_core::use_cases::{AnalyzeTransaction, TransactionInput};

/// Memory store whose user and transaction lookups stall.
struct SlowStore {
    inner: MemoryEntityStore,
    user_delay: Duration,
    transaction_delay: Duration,
}

#[async_trait]
impl EntityStore for SlowStore {
    async fn get_user(&self, user_id: &str) -> StoreResult<User> {
        tokio::time::sleep(self.user_delay).await;
        self.inner.get_user(user_id).await
    }

    async fn save_user(&self, user: &User) -> StoreResult<User> {
        self.inner.save_user(user).await
    }

    async fn update_user_risk_profile(&self, user_id: &str, profile: RiskProfile) -> StoreResult<User> {
        self.inner.update_user_risk_profile(user_id, profile).await
    }

    async fn get_merchant(&self, merchant_id: &str) -> StoreResult<Merchant> {
        self.inner.get_merchant(merchant_id).await
    }

    async fn save_merchant(&self, merchant: &Merchant) -> StoreResult<Merchant> {
        self.inner.save_merchant(merchant).await
    }

    async fn get_transaction(&self, transaction_id: &str) -> StoreResult<Transaction> {
        tokio::time::sleep(self.transaction_delay).await;
        self.inner.get_transaction(transaction_id).await
    }

    async fn get_recent_transactions(
        &self,
        user_id: &str,
        window: TimeWindow,
    ) -> StoreResult<Vec<Transaction>> {
        self.inner.get_recent_transactions(user_id, window).await
    }

    async fn save_transaction(&self, tx: &Transaction) -> StoreResult<Transaction> {
        self.inner.save_transaction(tx).await
    }

    async fn set_fraud_label(&self, transaction_id: &str, is_fraud: bool) -> StoreResult<Transaction> {
        self.inner.set_fraud_label(transaction_id, is_fraud).await
    }

    async fn get_alert(&self, alert_id: Uuid) -> StoreResult<FraudAlert> {
        self.inner.get_alert(alert_id).await
    }

    async fn get_alert_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<FraudAlert>> {
        self.inner.get_alert_by_transaction(transaction_id).await
    }

    async fn save_alert(&self, draft: &AlertDraft) -> StoreResult<FraudAlert> {
        self.inner.save_alert(draft).await
    }

    async fn update_alert_status(
        &self,
        alert_id: Uuid,
        expected: InvestigationStatus,
        change: &StatusChange,
        at: DateTime<Utc>,
    ) -> StoreResult<FraudAlert> {
        self.inner.update_alert_status(alert_id, expected, change, at).await
    }

    async fn commit_analysis(&self, commit: AnalysisCommit) -> StoreResult<CommitOutcome> {
        self.inner.commit_analysis(commit).await
    }

    async fn recent_alerts(&self, limit: i64) -> StoreResult<Vec<FraudAlert>> {
        self.inner.recent_alerts(limit).await
    }

    async fn transaction_stats(&self, query: StatsQuery) -> StoreResult<TransactionStats> {
        self.inner.transaction_stats(query).await
    }
}

fn analyzer_over(inner: MemoryEntityStore, delay: Duration) -> AnalyzeTransaction {
    let store = Arc::new(SlowStore {
        inner,
        user_delay: delay,
        transaction_delay: Duration::ZERO,
    });
    AnalyzeTransaction::new(store, ConfigHandle::new(EngineConfig::default()).unwrap())
}

fn purchase(id: &str) -> TransactionInput {
    let mut input = TransactionInput::new("user_slow", "merchant_slow", BigDecimal::from(42));
    input.transaction_id = Some(id.to_string());
    input
}

#[tokio::test]
async fn test_slow_store_times_out_without_writing() {
    let inner = MemoryEntityStore::new();
    let analyzer = analyzer_over(inner.clone(), Duration::from_millis(500));

    let err = analyzer
        .execute_with_timeout(purchase("txn_slow"), Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Timeout(_)));
    assert!(err.is_retryable());
    assert!(inner.get_transaction("txn_slow").await.is_err());
    assert!(inner.get_alert_by_transaction("txn_slow").await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_within_deadline_completes() {
    let inner = MemoryEntityStore::new();
    let analyzer = analyzer_over(inner.clone(), Duration::from_millis(5));

    let result = analyzer
        .execute_with_timeout(purchase("txn_fast"), Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(result.transaction_id, "txn_fast");
    assert!(inner.get_transaction("txn_fast").await.is_ok());
}

#[tokio::test]
async fn test_transaction_lookup_is_bounded_by_store_timeout() {
    let inner = MemoryEntityStore::new();
    let fast = analyzer_over(inner.clone(), Duration::ZERO);
    fast.execute(purchase("txn_lookup")).await.unwrap();

    let mut config = EngineConfig::default();
    config.store_timeout_ms = 50;
    let store = Arc::new(SlowStore {
        inner,
        user_delay: Duration::ZERO,
        transaction_delay: Duration::from_millis(500),
    });
    let slow = AnalyzeTransaction::new(store, ConfigHandle::new(config).unwrap());

    let err = slow.fetch("txn_lookup").await.unwrap_err();
    assert!(matches!(err, EngineError::Timeout(_)));
    assert!(fast.fetch("txn_lookup").await.is_ok());
}
