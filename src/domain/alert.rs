//! Fraud alerts and their investigation lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::risk::RiskTier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestigationStatus {
    Pending,
    InReview,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move alert from {from} to {to}")]
pub struct InvalidTransition {
    pub from: InvestigationStatus,
    pub to: InvestigationStatus,
}

impl InvestigationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationStatus::Pending => "PENDING",
            InvestigationStatus::InReview => "IN_REVIEW",
            InvestigationStatus::Resolved => "RESOLVED",
        }
    }

    /// The only status that may follow this one.
    pub fn next(&self) -> Option<InvestigationStatus> {
        match self {
            InvestigationStatus::Pending => Some(InvestigationStatus::InReview),
            InvestigationStatus::InReview => Some(InvestigationStatus::Resolved),
            InvestigationStatus::Resolved => None,
        }
    }

    pub fn can_transition_to(&self, target: InvestigationStatus) -> bool {
        self.next() == Some(target)
    }

    pub fn validate_transition(&self, target: InvestigationStatus) -> Result<(), InvalidTransition> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: *self,
                to: target,
            })
        }
    }
}

impl fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestigationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(InvestigationStatus::Pending),
            "IN_REVIEW" => Ok(InvestigationStatus::InReview),
            "RESOLVED" => Ok(InvestigationStatus::Resolved),
            other => Err(format!("unknown investigation status '{}'", other)),
        }
    }
}

/// Outcome recorded when an investigation closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub resolved_by: String,
    pub false_positive: bool,
}

/// A requested status change. Resolving always carries its resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    BeginReview,
    Resolve(Resolution),
}

impl StatusChange {
    pub fn target(&self) -> InvestigationStatus {
        match self {
            StatusChange::BeginReview => InvestigationStatus::InReview,
            StatusChange::Resolve(_) => InvestigationStatus::Resolved,
        }
    }
}

/// Everything the alert manager decides about an alert before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertDraft {
    pub transaction_id: String,
    pub alert_type: String,
    pub severity: RiskTier,
    pub confidence_score: f64,
    pub triggered_rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAlert {
    pub id: Uuid,
    pub transaction_id: String,
    pub alert_type: String,
    pub severity: RiskTier,
    pub confidence_score: f64,
    pub triggered_rules: Vec<String>,
    pub investigation_status: InvestigationStatus,
    pub false_positive: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl FraudAlert {
    pub fn from_draft(draft: AlertDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id: draft.transaction_id,
            alert_type: draft.alert_type,
            severity: draft.severity,
            confidence_score: draft.confidence_score,
            triggered_rules: draft.triggered_rules,
            investigation_status: InvestigationStatus::Pending,
            false_positive: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            resolved_by: None,
        }
    }

    /// Refreshes the scoring fields from a newer analysis. Lifecycle fields stay.
    pub fn refresh_from(&mut self, draft: &AlertDraft, now: DateTime<Utc>) {
        self.alert_type = draft.alert_type.clone();
        self.severity = draft.severity;
        self.confidence_score = draft.confidence_score;
        self.triggered_rules = draft.triggered_rules.clone();
        self.updated_at = now;
    }

    /// Applies a validated status change in place.
    pub fn apply(&mut self, change: &StatusChange, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        self.investigation_status.validate_transition(change.target())?;
        self.investigation_status = change.target();
        if let StatusChange::Resolve(resolution) = change {
            self.false_positive = Some(resolution.false_positive);
            self.resolved_by = Some(resolution.resolved_by.clone());
            self.resolved_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> AlertDraft {
        AlertDraft {
            transaction_id: "txn_1".to_string(),
            alert_type: "velocity".to_string(),
            severity: RiskTier::High,
            confidence_score: 0.72,
            triggered_rules: vec!["velocity".to_string()],
        }
    }

    #[test]
    fn test_only_forward_edges_are_valid() {
        use InvestigationStatus::*;
        let all = [Pending, InReview, Resolved];
        for from in all {
            for to in all {
                let expected = matches!((from, to), (Pending, InReview) | (InReview, Resolved));
                assert_eq!(from.can_transition_to(to), expected, "{} -> {}", from, to);
                assert_eq!(from.validate_transition(to).is_ok(), expected);
            }
        }
    }

    #[test]
    fn test_new_alert_is_pending_without_resolution() {
        let alert = FraudAlert::from_draft(draft(), Utc::now());
        assert_eq!(alert.investigation_status, InvestigationStatus::Pending);
        assert_eq!(alert.false_positive, None);
        assert!(alert.resolved_by.is_none());
        assert!(alert.resolved_at.is_none());
    }

    #[test]
    fn test_resolution_fields_set_only_on_resolve() {
        let mut alert = FraudAlert::from_draft(draft(), Utc::now());
        alert.apply(&StatusChange::BeginReview, Utc::now()).unwrap();
        assert_eq!(alert.investigation_status, InvestigationStatus::InReview);
        assert_eq!(alert.false_positive, None);

        let resolution = Resolution {
            resolved_by: "analyst@bank".to_string(),
            false_positive: true,
        };
        alert.apply(&StatusChange::Resolve(resolution), Utc::now()).unwrap();
        assert_eq!(alert.investigation_status, InvestigationStatus::Resolved);
        assert_eq!(alert.false_positive, Some(true));
        assert_eq!(alert.resolved_by.as_deref(), Some("analyst@bank"));
        assert!(alert.resolved_at.is_some());
    }

    #[test]
    fn test_illegal_change_leaves_alert_untouched() {
        let mut alert = FraudAlert::from_draft(draft(), Utc::now());
        let before = alert.clone();
        let err = alert
            .apply(
                &StatusChange::Resolve(Resolution {
                    resolved_by: "x".to_string(),
                    false_positive: false,
                }),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err.from, InvestigationStatus::Pending);
        assert_eq!(err.to, InvestigationStatus::Resolved);
        assert_eq!(alert, before);
    }

    #[test]
    fn test_refresh_keeps_lifecycle() {
        let mut alert = FraudAlert::from_draft(draft(), Utc::now());
        alert.apply(&StatusChange::BeginReview, Utc::now()).unwrap();
        let mut newer = draft();
        newer.confidence_score = 0.9;
        newer.severity = RiskTier::Critical;
        alert.refresh_from(&newer, Utc::now());
        assert_eq!(alert.confidence_score, 0.9);
        assert_eq!(alert.severity, RiskTier::Critical);
        assert_eq!(alert.investigation_status, InvestigationStatus::InReview);
    }
}
