//! Alert creation and the investigation lifecycle.

use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{ConfigHandle, EngineConfig};
use crate::domain::{
    AlertDraft, Finding, FraudAlert, Resolution, RiskTier, RuleId, StatusChange, Transaction,
};
use crate::error::EngineError;
use crate::ports::EntityStore;
use crate::services::deadline::store_call;
use crate::services::scoring::AggregatedScore;
use crate::validation::ValidationError;

/// Status writes that lose a compare-and-swap are re-read and retried this many times in total.
pub const MAX_STATUS_ATTEMPTS: usize = 3;

pub const COMPOSITE_ALERT_TYPE: &str = "composite";

#[derive(Clone)]
pub struct AlertManager {
    store: Arc<dyn EntityStore>,
    config: ConfigHandle,
}

impl AlertManager {
    pub fn new(store: Arc<dyn EntityStore>, config: ConfigHandle) -> Self {
        Self { store, config }
    }

    /// Alert contents for a scored transaction, or `None` below the alert threshold.
    pub fn draft(tx: &Transaction, score: &AggregatedScore, config: &EngineConfig) -> Option<AlertDraft> {
        build_draft(&tx.transaction_id, score.fraud_score, score.tier, score.rule_ids(), config)
    }

    /// Drafts and stores an alert for an already scored transaction.
    pub async fn maybe_alert(
        &self,
        tx: &Transaction,
        fraud_score: f64,
        findings: &[Finding],
    ) -> Result<Option<FraudAlert>, EngineError> {
        let config = self.config.snapshot();
        let tier = config.tier_cutpoints.tier_for(fraud_score);
        let mut rules: Vec<RuleId> = findings
            .iter()
            .filter(|f| f.weight > 0.0)
            .map(|f| f.rule_id)
            .collect();
        rules.sort();
        rules.dedup();

        let draft = match build_draft(&tx.transaction_id, fraud_score, tier, rules, &config) {
            Some(d) => d,
            None => return Ok(None),
        };
        let deadline = Instant::now() + config.store_timeout();
        let alert = store_call(deadline, "save alert", self.store.save_alert(&draft)).await?;
        info!(
            "Alert {} stored for transaction {} ({})",
            alert.id, alert.transaction_id, alert.severity
        );
        Ok(Some(alert))
    }

    pub async fn begin_review(&self, alert_id: Uuid) -> Result<FraudAlert, EngineError> {
        self.transition(alert_id, StatusChange::BeginReview).await
    }

    pub async fn resolve(&self, alert_id: Uuid, resolution: Resolution) -> Result<FraudAlert, EngineError> {
        if resolution.resolved_by.trim().is_empty() {
            return Err(ValidationError::new("resolved_by", "resolved_by is required").into());
        }
        self.transition(alert_id, StatusChange::Resolve(resolution)).await
    }

    async fn transition(&self, alert_id: Uuid, change: StatusChange) -> Result<FraudAlert, EngineError> {
        let deadline = Instant::now() + self.config.snapshot().store_timeout();
        for attempt in 1..=MAX_STATUS_ATTEMPTS {
            let current = store_call(deadline, "load alert", self.store.get_alert(alert_id)).await?;
            current
                .investigation_status
                .validate_transition(change.target())?;

            let write = self.store.update_alert_status(
                alert_id,
                current.investigation_status,
                &change,
                Utc::now(),
            );
            match store_call(deadline, "update alert status", write).await {
                Ok(updated) => {
                    info!(
                        "Alert {} moved {} -> {}",
                        alert_id, current.investigation_status, updated.investigation_status
                    );
                    return Ok(updated);
                }
                Err(EngineError::Conflict(msg)) => {
                    warn!(
                        "Alert {} changed concurrently (attempt {}/{}): {}",
                        alert_id, attempt, MAX_STATUS_ATTEMPTS, msg
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Err(EngineError::Conflict(format!(
            "alert {} kept changing; gave up after {} attempts",
            alert_id, MAX_STATUS_ATTEMPTS
        )))
    }
}

fn build_draft(
    transaction_id: &str,
    fraud_score: f64,
    tier: RiskTier,
    rules: Vec<RuleId>,
    config: &EngineConfig,
) -> Option<AlertDraft> {
    if fraud_score < config.alert_threshold {
        return None;
    }
    let alert_type = match rules.as_slice() {
        [single] => single.as_str().to_string(),
        _ => COMPOSITE_ALERT_TYPE.to_string(),
    };
    Some(AlertDraft {
        transaction_id: transaction_id.to_string(),
        alert_type,
        severity: tier,
        confidence_score: fraud_score,
        triggered_rules: rules.iter().map(|r| r.as_str().to_string()).collect(),
    })
}
