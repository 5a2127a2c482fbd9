use std::collections::HashSet;

use super::{AnalysisContext, Rule, RuleResult};
use crate::config::EngineConfig;
use crate::domain::{Finding, RuleId, Transaction};

/// Too many transactions from one user inside the velocity window.
pub struct VelocityRule;

impl Rule for VelocityRule {
    fn id(&self) -> RuleId {
        RuleId::Velocity
    }

    fn evaluate(&self, tx: &Transaction, ctx: &AnalysisContext, config: &EngineConfig) -> RuleResult {
        let since = tx.timestamp - config.velocity_window();
        let recent: Vec<&Transaction> = ctx.since(since).collect();
        let count = recent.len() as u32 + 1;
        let limit = config.velocity_limit;
        if count <= limit {
            return Ok(None);
        }

        let excess = f64::from(count - limit) / f64::from(limit);
        let weight = config.weight(self.id()) * (0.5 + 0.5 * excess.min(1.0));

        let ips: HashSet<&str> = recent
            .iter()
            .copied()
            .chain(std::iter::once(tx))
            .filter_map(|t| t.ip_address.as_deref())
            .collect();
        let mut reason = format!(
            "{} transactions within {}s (limit {})",
            count, config.velocity_window_secs, limit
        );
        if ips.len() > 1 {
            reason.push_str(&format!(" from {} IP addresses", ips.len()));
        }

        Ok(Some(Finding::new(self.id(), weight, f64::from(count), reason)))
    }
}
