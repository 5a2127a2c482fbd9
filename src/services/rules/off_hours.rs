use chrono::Timelike;

use super::{amount_f64, AnalysisContext, Rule, RuleResult};
use crate::config::EngineConfig;
use crate::domain::{Finding, RuleId, Transaction};

/// Sizeable spend during the configured overnight window (UTC).
pub struct OffHoursRule;

/// `[start, end)` in hours; `start > end` wraps past midnight, `start == end` is empty.
pub(crate) fn hour_in_window(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

impl Rule for OffHoursRule {
    fn id(&self) -> RuleId {
        RuleId::OffHours
    }

    fn evaluate(&self, tx: &Transaction, _ctx: &AnalysisContext, config: &EngineConfig) -> RuleResult {
        let hour = tx.timestamp.hour();
        if !hour_in_window(hour, config.off_hours_start_hour, config.off_hours_end_hour) {
            return Ok(None);
        }
        let amount = amount_f64(&tx.amount)?;
        if amount < config.off_hours_amount_threshold {
            return Ok(None);
        }
        Ok(Some(Finding::new(
            self.id(),
            config.weight(self.id()),
            f64::from(hour),
            format!("amount {} at {:02}:00 UTC", tx.amount, hour),
        )))
    }
}
