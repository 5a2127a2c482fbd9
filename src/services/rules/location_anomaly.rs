use std::collections::BTreeSet;

use super::{AnalysisContext, Rule, RuleResult};
use crate::config::EngineConfig;
use crate::domain::{Finding, RuleId, Transaction};
use crate::utils::geo::normalize_country;

/// Share of the weight given to a country the user has never used before.
const UNSEEN_COUNTRY_FACTOR: f64 = 0.6;

pub struct LocationAnomalyRule;

impl Rule for LocationAnomalyRule {
    fn id(&self) -> RuleId {
        RuleId::LocationAnomaly
    }

    fn evaluate(&self, tx: &Transaction, ctx: &AnalysisContext, config: &EngineConfig) -> RuleResult {
        let country = match tx.location_country.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => normalize_country(c),
            _ => return Ok(None),
        };
        let w = config.weight(self.id());

        if config
            .high_risk_countries
            .iter()
            .any(|c| normalize_country(c) == country)
        {
            return Ok(Some(Finding::new(
                self.id(),
                w,
                1.0,
                format!("{} is a high-risk country", country),
            )));
        }

        let seen: BTreeSet<String> = ctx
            .history
            .iter()
            .filter_map(|t| t.location_country.as_deref())
            .filter(|c| !c.trim().is_empty())
            .map(normalize_country)
            .collect();
        if seen.is_empty() || seen.contains(&country) {
            return Ok(None);
        }

        let known = seen.into_iter().collect::<Vec<_>>().join(", ");
        Ok(Some(Finding::new(
            self.id(),
            w * UNSEEN_COUNTRY_FACTOR,
            0.0,
            format!("first transaction from {} (previously {})", country, known),
        )))
    }
}
