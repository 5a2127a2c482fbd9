//! Analyze transaction use case.
//! Validates the input, scores it against the rule set and commits the
//! verdict together with any alert.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ConfigHandle, EngineConfig};
use crate::domain::{Finding, RiskTier, Transaction, User};
use crate::error::EngineError;
use crate::ports::{AnalysisCommit, EntityStore, TimeWindow};
use crate::services::alerts::AlertManager;
use crate::services::deadline::{store_call, wait};
use crate::services::locks::KeyLocks;
use crate::services::rules::{AnalysisContext, RuleRegistry};
use crate::services::scoring::ScoreAggregator;
use crate::validation::{
    optional_text, validate_coordinates, validate_currency, validate_identifier,
    validate_ip_address, validate_positive_amount, ValidationError, CITY_MAX_LEN,
    COUNTRY_MAX_LEN, USER_AGENT_MAX_LEN,
};

const TRANSACTION_TYPE_MAX_LEN: usize = 20;

/// Input for the AnalyzeTransaction use case.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionInput {
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub user_id: String,
    pub merchant_id: String,
    pub amount: BigDecimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub location_country: Option<String>,
    #[serde(default)]
    pub location_city: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TransactionInput {
    pub fn new(user_id: impl Into<String>, merchant_id: impl Into<String>, amount: BigDecimal) -> Self {
        Self {
            transaction_id: None,
            user_id: user_id.into(),
            merchant_id: merchant_id.into(),
            amount,
            currency: None,
            transaction_type: None,
            location_country: None,
            location_city: None,
            latitude: None,
            longitude: None,
            ip_address: None,
            user_agent: None,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Approve,
    Review,
    Hold,
    Block,
}

impl Recommendation {
    pub fn for_tier(tier: RiskTier) -> Self {
        match tier {
            RiskTier::Low => Recommendation::Approve,
            RiskTier::Medium => Recommendation::Review,
            RiskTier::High => Recommendation::Hold,
            RiskTier::Critical => Recommendation::Block,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recommendation::Approve => "approve",
            Recommendation::Review => "review",
            Recommendation::Hold => "hold",
            Recommendation::Block => "block",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of the AnalyzeTransaction use case.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub transaction_id: String,
    pub fraud_score: f64,
    pub risk_level: RiskTier,
    pub recommendation: Recommendation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<Uuid>,
    pub findings: Vec<Finding>,
    pub processing_time_ms: i64,
}

/// Validated input. `timestamp` is what the caller supplied, if anything.
struct Candidate {
    tx: Transaction,
    timestamp: Option<DateTime<Utc>>,
}

fn validate(input: TransactionInput) -> Result<Candidate, ValidationError> {
    let transaction_id = match input.transaction_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => validate_identifier("transaction_id", id)?,
        _ => format!("txn_{}", Uuid::new_v4().simple()),
    };
    let user_id = validate_identifier("user_id", &input.user_id)?;
    let merchant_id = validate_identifier("merchant_id", &input.merchant_id)?;
    validate_positive_amount(&input.amount)?;
    let currency = validate_currency(input.currency.as_deref().unwrap_or("USD"))?;
    validate_coordinates(input.latitude, input.longitude)?;
    let ip_address = match input.ip_address.as_deref().map(str::trim) {
        Some(ip) if !ip.is_empty() => Some(validate_ip_address(ip)?.to_string()),
        _ => None,
    };

    let mut tx = Transaction::new(
        transaction_id,
        Some(user_id),
        Some(merchant_id),
        input.amount,
        input.timestamp.unwrap_or_else(Utc::now),
    );
    tx.currency = currency;
    tx.transaction_type = optional_text(
        "transaction_type",
        input.transaction_type.as_deref(),
        TRANSACTION_TYPE_MAX_LEN,
    )?;
    tx.location_country = optional_text(
        "location_country",
        input.location_country.as_deref(),
        COUNTRY_MAX_LEN,
    )?;
    tx.location_city = optional_text("location_city", input.location_city.as_deref(), CITY_MAX_LEN)?;
    tx.latitude = input.latitude;
    tx.longitude = input.longitude;
    tx.ip_address = ip_address;
    tx.user_agent = optional_text("user_agent", input.user_agent.as_deref(), USER_AGENT_MAX_LEN)?;

    Ok(Candidate {
        tx,
        timestamp: input.timestamp,
    })
}

/// `NotFound` means "absent" for optional lookups.
fn optional<T>(result: Result<T, EngineError>) -> Result<Option<T>, EngineError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(EngineError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Use case for scoring a single transaction.
#[derive(Clone)]
pub struct AnalyzeTransaction {
    store: Arc<dyn EntityStore>,
    config: ConfigHandle,
    rules: Arc<RuleRegistry>,
    user_locks: KeyLocks,
    transaction_locks: KeyLocks,
}

impl AnalyzeTransaction {
    pub fn new(store: Arc<dyn EntityStore>, config: ConfigHandle) -> Self {
        Self {
            store,
            config,
            rules: Arc::new(RuleRegistry::standard()),
            user_locks: KeyLocks::new(),
            transaction_locks: KeyLocks::new(),
        }
    }

    pub fn with_rules(mut self, rules: RuleRegistry) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Loads a recorded transaction within the configured store timeout.
    pub async fn fetch(&self, transaction_id: &str) -> Result<Transaction, EngineError> {
        let deadline = Instant::now() + self.config.snapshot().store_timeout();
        store_call(deadline, "load transaction", self.store.get_transaction(transaction_id)).await
    }

    /// Analyses with the configured store timeout.
    pub async fn execute(&self, input: TransactionInput) -> Result<AnalysisResult, EngineError> {
        let timeout = self.config.snapshot().store_timeout();
        self.execute_with_timeout(input, timeout).await
    }

    /// Analyses `input`; every lock wait and store call shares one deadline.
    /// Nothing is written if the deadline passes first.
    pub async fn execute_with_timeout(
        &self,
        input: TransactionInput,
        timeout: Duration,
    ) -> Result<AnalysisResult, EngineError> {
        let started = std::time::Instant::now();
        let deadline = Instant::now() + timeout;
        let config = self.config.snapshot();

        let Candidate { mut tx, timestamp } = validate(input)?;
        let transaction_id = tx.transaction_id.clone();
        let user_id = tx.user_id.clone().unwrap_or_default();
        let merchant_id = tx.merchant_id.clone().unwrap_or_default();

        let _user_guard = wait(deadline, "user lock", self.user_locks.acquire(&user_id))
            .await
            .map_err(|e| {
                warn!("Timed out waiting for the lock on user {}", user_id);
                e
            })?;
        let _tx_guard = wait(
            deadline,
            "transaction lock",
            self.transaction_locks.acquire(&transaction_id),
        )
        .await
        .map_err(|e| {
            warn!("Timed out waiting for the lock on transaction {}", transaction_id);
            e
        })?;

        let (recorded, user, merchant, history) = match timestamp {
            Some(at) => {
                let (recorded, user, merchant, history) = tokio::join!(
                    store_call(deadline, "load transaction", self.store.get_transaction(&transaction_id)),
                    store_call(deadline, "load user", self.store.get_user(&user_id)),
                    store_call(deadline, "load merchant", self.store.get_merchant(&merchant_id)),
                    self.history(deadline, &user_id, at, &config),
                );
                (optional(recorded)?, optional(user)?, optional(merchant)?, Some(history?))
            }
            None => {
                let (recorded, user, merchant) = tokio::join!(
                    store_call(deadline, "load transaction", self.store.get_transaction(&transaction_id)),
                    store_call(deadline, "load user", self.store.get_user(&user_id)),
                    store_call(deadline, "load merchant", self.store.get_merchant(&merchant_id)),
                );
                (optional(recorded)?, optional(user)?, optional(merchant)?, None)
            }
        };

        if let Some(prev) = &recorded {
            adopt_recorded(&mut tx, prev)?;
        }
        // the lookup above used the supplied timestamp; redo it if the record disagrees
        let history = match history {
            Some(h) if Some(tx.timestamp) == timestamp => h,
            _ => self.history(deadline, &user_id, tx.timestamp, &config).await?,
        };

        let ctx = AnalysisContext::assemble(&tx, user, merchant, history, recorded.as_ref());
        debug!(
            "Context for {}: {} history entries, user known: {}, merchant known: {}",
            transaction_id,
            ctx.history.len(),
            ctx.user.is_some(),
            ctx.merchant.is_some()
        );

        let findings = self.rules.evaluate(&tx, &ctx, &config);
        let aggregated = ScoreAggregator::new(config.tier_cutpoints).aggregate(findings);
        let draft = AlertManager::draft(&tx, &aggregated, &config);
        let recommendation = Recommendation::for_tier(aggregated.tier);

        let processing_time_ms = started.elapsed().as_millis() as i64;
        tx.fraud_score = aggregated.fraud_score;
        tx.fraud_reason = aggregated
            .findings
            .iter()
            .map(|f| f.rule_id.as_str().to_string())
            .collect();
        tx.processing_time_ms = Some(processing_time_ms);
        let lifetime_credit = lifetime_credit(ctx.user.as_ref(), recommendation, &tx);

        let outcome = store_call(
            deadline,
            "commit analysis",
            self.store.commit_analysis(AnalysisCommit {
                transaction: tx,
                alert: draft,
                lifetime_credit,
            }),
        )
        .await?;

        info!(
            "Transaction {} scored {:.4} ({}, {}){}",
            transaction_id,
            aggregated.fraud_score,
            aggregated.tier,
            recommendation,
            outcome
                .alert
                .as_ref()
                .map(|a| format!(", alert {}", a.id))
                .unwrap_or_default()
        );

        Ok(AnalysisResult {
            transaction_id,
            fraud_score: aggregated.fraud_score,
            risk_level: aggregated.tier,
            recommendation,
            alert_id: outcome.alert.map(|a| a.id),
            findings: aggregated.findings,
            processing_time_ms,
        })
    }

    async fn history(
        &self,
        deadline: Instant,
        user_id: &str,
        at: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Result<Vec<Transaction>, EngineError> {
        let window = TimeWindow::ending_at(at, config.history_window());
        store_call(
            deadline,
            "load history",
            self.store.get_recent_transactions(user_id, window),
        )
        .await
    }
}

/// A re-analysed transaction keeps its recorded facts. A different user,
/// merchant or amount under the same id is rejected.
fn adopt_recorded(tx: &mut Transaction, prev: &Transaction) -> Result<(), EngineError> {
    if prev.user_id != tx.user_id || prev.merchant_id != tx.merchant_id || prev.amount != tx.amount {
        return Err(EngineError::Conflict(format!(
            "transaction {} is already recorded with different details",
            tx.transaction_id
        )));
    }
    if prev.timestamp != tx.timestamp {
        debug!(
            "Transaction {} keeps its recorded timestamp {}",
            tx.transaction_id, prev.timestamp
        );
    }
    tx.timestamp = prev.timestamp;
    tx.created_at = prev.created_at;
    tx.is_fraud = prev.is_fraud;
    Ok(())
}

/// Approved spend by a known user counts toward their lifetime value.
fn lifetime_credit(user: Option<&User>, recommendation: Recommendation, tx: &Transaction) -> Option<BigDecimal> {
    match (user, recommendation) {
        (Some(_), Recommendation::Approve) => Some(tx.amount.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn input() -> TransactionInput {
        TransactionInput::new("user_1", "merchant_1", BigDecimal::from_str("25.00").unwrap())
    }

    #[test]
    fn test_recommendation_table() {
        assert_eq!(Recommendation::for_tier(RiskTier::Low), Recommendation::Approve);
        assert_eq!(Recommendation::for_tier(RiskTier::Medium), Recommendation::Review);
        assert_eq!(Recommendation::for_tier(RiskTier::High), Recommendation::Hold);
        assert_eq!(Recommendation::for_tier(RiskTier::Critical), Recommendation::Block);
    }

    #[test]
    fn test_validate_generates_id_and_normalises() {
        let mut raw = input();
        raw.currency = Some("eur".to_string());
        raw.ip_address = Some(" 192.168.0.1 ".to_string());
        raw.location_city = Some("   ".to_string());
        let candidate = validate(raw).unwrap();
        assert!(candidate.tx.transaction_id.starts_with("txn_"));
        assert!(candidate.tx.transaction_id.len() <= 50);
        assert_eq!(candidate.tx.currency, "EUR");
        assert_eq!(candidate.tx.ip_address.as_deref(), Some("192.168.0.1"));
        assert_eq!(candidate.tx.location_city, None);
        assert!(candidate.timestamp.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let mut raw = input();
        raw.amount = BigDecimal::from(0);
        assert_eq!(validate(raw).err().unwrap().field, "amount");

        let mut raw = input();
        raw.user_id = "  ".to_string();
        assert_eq!(validate(raw).err().unwrap().field, "user_id");

        let mut raw = input();
        raw.currency = Some("DOLLARS".to_string());
        assert_eq!(validate(raw).err().unwrap().field, "currency");

        let mut raw = input();
        raw.ip_address = Some("999.1.1.1".to_string());
        assert_eq!(validate(raw).err().unwrap().field, "ip_address");

        let mut raw = input();
        raw.latitude = Some(95.0);
        raw.longitude = Some(0.0);
        assert_eq!(validate(raw).err().unwrap().field, "latitude");

        let mut raw = input();
        raw.transaction_id = Some("x".repeat(51));
        assert_eq!(validate(raw).err().unwrap().field, "transaction_id");
    }

    #[test]
    fn test_recorded_facts_win_and_mismatch_conflicts() {
        let at = Utc::now() - chrono::Duration::hours(2);
        let mut prev = validate(input()).unwrap().tx;
        prev.timestamp = at;
        prev.is_fraud = true;

        let mut again = validate(input()).unwrap().tx;
        again.transaction_id = prev.transaction_id.clone();
        adopt_recorded(&mut again, &prev).unwrap();
        assert_eq!(again.timestamp, at);
        assert!(again.is_fraud);

        let mut other = input();
        other.amount = BigDecimal::from(26);
        let mut other = validate(other).unwrap().tx;
        assert!(matches!(adopt_recorded(&mut other, &prev), Err(EngineError::Conflict(_))));
    }

    #[test]
    fn test_input_deserializes_with_defaults() {
        let raw: TransactionInput = serde_json::from_str(
            r#"{"user_id": "u1", "merchant_id": "m1", "amount": "12.50", "timestamp": "2024-03-12T03:15:00Z"}"#,
        )
        .unwrap();
        assert_eq!(raw.amount, BigDecimal::from_str("12.50").unwrap());
        assert!(raw.timestamp.is_some());
        assert!(raw.currency.is_none());
    }
}
