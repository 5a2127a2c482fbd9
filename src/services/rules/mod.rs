//! Fraud rules.
//!
//! Each rule is a pure predicate over `(transaction, context, config)` that
//! yields at most one [`Finding`]. Rules share no state, so the registry can
//! run them in any order and a failing rule only loses its own finding.

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::config::EngineConfig;
use crate::domain::{Finding, Merchant, RuleId, Transaction, User};

pub mod amount_anomaly;
pub mod impossible_travel;
pub mod location_anomaly;
pub mod merchant_risk;
pub mod new_entity;
pub mod off_hours;
pub mod user_profile;
pub mod velocity;

pub use amount_anomaly::AmountAnomalyRule;
pub use impossible_travel::ImpossibleTravelRule;
pub use location_anomaly::LocationAnomalyRule;
pub use merchant_risk::MerchantRiskRule;
pub use new_entity::NewEntityRule;
pub use off_hours::OffHoursRule;
pub use user_profile::UserRiskProfileRule;
pub use velocity::VelocityRule;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("amount {0} cannot be evaluated")]
    UnrepresentableAmount(String),

    #[error("missing data: {0}")]
    MissingData(&'static str),
}

pub type RuleResult = Result<Option<Finding>, RuleError>;

pub trait Rule: Send + Sync {
    fn id(&self) -> RuleId;

    fn evaluate(&self, tx: &Transaction, ctx: &AnalysisContext, config: &EngineConfig) -> RuleResult;
}

/// Read-only data a rule may consult beyond the transaction itself.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub user: Option<User>,
    pub merchant: Option<Merchant>,
    /// Same user's earlier transactions inside the history window, newest first.
    /// Never contains the transaction under analysis.
    pub history: Vec<Transaction>,
    /// Merchant average amount, excluding the transaction under analysis.
    pub merchant_baseline: Option<BigDecimal>,
}

impl AnalysisContext {
    /// Builds the context for `tx`.
    ///
    /// `recorded` is the stored copy of `tx` when this is a re-analysis: its
    /// amount has already been folded into the merchant average and is taken
    /// back out so the baseline matches the first run.
    pub fn assemble(
        tx: &Transaction,
        user: Option<User>,
        merchant: Option<Merchant>,
        history: Vec<Transaction>,
        recorded: Option<&Transaction>,
    ) -> Self {
        let mut history: Vec<Transaction> = history
            .into_iter()
            .filter(|h| h.transaction_id != tx.transaction_id && h.timestamp <= tx.timestamp)
            .collect();
        history.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });

        let merchant_baseline = merchant.as_ref().and_then(|m| match recorded {
            Some(prev) if prev.merchant_id.as_deref() == Some(m.merchant_id.as_str()) => {
                m.average_excluding(&prev.amount)
            }
            _ => m.avg_transaction_amount.clone(),
        });

        Self {
            user,
            merchant,
            history,
            merchant_baseline,
        }
    }

    /// History entries at or after `since`.
    pub fn since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &Transaction> {
        self.history.iter().filter(move |t| t.timestamp >= since)
    }
}

pub(crate) fn amount_f64(amount: &BigDecimal) -> Result<f64, RuleError> {
    amount
        .to_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RuleError::UnrepresentableAmount(amount.to_string()))
}

/// Rules keyed by id. Iteration order is the id order, which keeps logs and
/// finding lists stable.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: BTreeMap<RuleId, Arc<dyn Rule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in rule.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VelocityRule));
        registry.register(Arc::new(AmountAnomalyRule));
        registry.register(Arc::new(ImpossibleTravelRule));
        registry.register(Arc::new(MerchantRiskRule));
        registry.register(Arc::new(NewEntityRule));
        registry.register(Arc::new(OffHoursRule));
        registry.register(Arc::new(LocationAnomalyRule));
        registry.register(Arc::new(UserRiskProfileRule));
        registry
    }

    /// Registers `rule`, returning the rule it replaced.
    pub fn register(&mut self, rule: Arc<dyn Rule>) -> Option<Arc<dyn Rule>> {
        self.rules.insert(rule.id(), rule)
    }

    pub fn remove(&mut self, id: RuleId) -> Option<Arc<dyn Rule>> {
        self.rules.remove(&id)
    }

    pub fn ids(&self) -> Vec<RuleId> {
        self.rules.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs every rule. Errors and panics are logged and dropped.
    pub fn evaluate(
        &self,
        tx: &Transaction,
        ctx: &AnalysisContext,
        config: &EngineConfig,
    ) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (id, rule) in &self.rules {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| rule.evaluate(tx, ctx, config)));
            match outcome {
                Ok(Ok(Some(finding))) => {
                    if finding.rule_id != *id {
                        warn!(
                            "Rule {} emitted a finding for {}, discarding",
                            id, finding.rule_id
                        );
                    } else if finding.weight > 0.0 {
                        findings.push(finding);
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!(
                        "Rule {} failed for transaction {}: {}",
                        id, tx.transaction_id, e
                    );
                }
                Err(_) => {
                    warn!(
                        "Rule {} panicked for transaction {}",
                        id, tx.transaction_id
                    );
                }
            }
        }
        findings
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::domain::{MerchantRiskLevel, RiskProfile};
    use chrono::{Duration, TimeZone};
    use std::str::FromStr;

    pub fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 12, 0, 0).unwrap()
    }

    pub fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    pub fn tx(id: &str, amount: &str, at: DateTime<Utc>) -> Transaction {
        Transaction::new(
            id,
            Some("user_1".to_string()),
            Some("merchant_1".to_string()),
            dec(amount),
            at,
        )
        .located("US", Some("Chicago".to_string()))
    }

    pub fn established_user() -> User {
        User::new("user_1", "Dana Smith")
            .registered_on((noon() - Duration::days(400)).date_naive())
            .with_risk_profile(RiskProfile::Normal)
    }

    pub fn established_merchant(avg: &str) -> Merchant {
        Merchant::new("merchant_1", "Corner Grocery")
            .with_risk_level(MerchantRiskLevel::Low)
            .with_average(dec(avg), 200)
            .created_at(noon() - Duration::days(900))
    }

    pub fn context(history: Vec<Transaction>) -> AnalysisContext {
        let merchant = established_merchant("50");
        AnalysisContext {
            user: Some(established_user()),
            merchant_baseline: merchant.avg_transaction_amount.clone(),
            merchant: Some(merchant),
            history,
        }
    }
}
