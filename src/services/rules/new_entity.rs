use chrono::Duration;

use super::{AnalysisContext, Rule, RuleResult};
use crate::config::EngineConfig;
use crate::domain::{Finding, RuleId, Transaction};

/// Brand-new or unknown cardholder or merchant.
///
/// An entity missing from the store is reported at reduced weight since its
/// age cannot be checked. When both parties qualify the stronger contribution
/// wins and both reasons are kept.
pub struct NewEntityRule;

impl Rule for NewEntityRule {
    fn id(&self) -> RuleId {
        RuleId::NewEntity
    }

    fn evaluate(&self, tx: &Transaction, ctx: &AnalysisContext, config: &EngineConfig) -> RuleResult {
        let w = config.weight(self.id());
        let unknown = w * config.unknown_entity_discount;
        let max_age_days = config.new_entity_max_age_days;
        let mut hits: Vec<(f64, String)> = Vec::new();

        match &ctx.user {
            Some(user) => {
                let age = (tx.timestamp.date_naive() - user.registered_since()).num_days().max(0);
                if age < max_age_days {
                    hits.push((w, format!("user {} registered {} days ago", user.user_id, age)));
                }
            }
            None => {
                let who = tx.user_id.as_deref().unwrap_or("<none>");
                hits.push((unknown, format!("user {} is not on file", who)));
            }
        }

        match &ctx.merchant {
            Some(merchant) => {
                let age = (tx.timestamp - merchant.created_at).max(Duration::zero());
                if age < Duration::days(max_age_days) {
                    hits.push((
                        w,
                        format!("merchant {} onboarded {} days ago", merchant.merchant_id, age.num_days()),
                    ));
                }
            }
            None => {
                let which = tx.merchant_id.as_deref().unwrap_or("<none>");
                hits.push((unknown, format!("merchant {} is not on file", which)));
            }
        }

        if hits.is_empty() {
            return Ok(None);
        }
        let weight = hits.iter().map(|(w, _)| *w).fold(0.0, f64::max);
        let reason = hits
            .iter()
            .map(|(_, r)| r.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Ok(Some(Finding::new(self.id(), weight, hits.len() as f64, reason)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::User;
    use crate::services::rules::fixtures::*;

    #[test]
    fn test_established_parties_are_silent() {
        let finding = NewEntityRule
            .evaluate(&tx("t", "20", noon()), &context(vec![]), &EngineConfig::default())
            .unwrap();
        assert!(finding.is_none());
    }

    #[test]
    fn test_fresh_user_gets_full_weight() {
        let mut ctx = context(vec![]);
        ctx.user = Some(User::new("user_1", "New Person").registered_on((noon() - Duration::days(2)).date_naive()));
        let finding = NewEntityRule
            .evaluate(&tx("t", "20", noon()), &ctx, &EngineConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(finding.weight, 0.25);
        assert!(finding.reason.contains("registered 2 days ago"));
    }

    #[test]
    fn test_unknown_parties_are_discounted() {
        let finding = NewEntityRule
            .evaluate(&tx("t", "20", noon()), &AnalysisContext::default(), &EngineConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(finding.weight, 0.125);
        assert_eq!(finding.signal, 2.0);
        assert!(finding.reason.contains("user user_1 is not on file"));
        assert!(finding.reason.contains("merchant merchant_1 is not on file"));
    }

    #[test]
    fn test_new_merchant_outweighs_unknown_user() {
        let mut ctx = context(vec![]);
        ctx.user = None;
        ctx.merchant = ctx.merchant.map(|m| m.created_at(noon() - Duration::days(1)));
        let finding = NewEntityRule
            .evaluate(&tx("t", "20", noon()), &ctx, &EngineConfig::default())
            .unwrap()
            .unwrap();
        assert_eq!(finding.weight, 0.25);
    }
}
