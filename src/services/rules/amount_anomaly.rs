use bigdecimal::ToPrimitive;

use super::{amount_f64, AnalysisContext, Rule, RuleResult};
use crate::config::EngineConfig;
use crate::domain::{Finding, RuleId, Transaction};

/// Amount far above the user's or the merchant's usual spend.
pub struct AmountAnomalyRule;

impl AmountAnomalyRule {
    fn user_average(ctx: &AnalysisContext) -> Option<f64> {
        let amounts: Vec<f64> = ctx
            .history
            .iter()
            .filter_map(|t| t.amount.to_f64())
            .filter(|v| v.is_finite())
            .collect();
        if amounts.is_empty() {
            return None;
        }
        let mean = amounts.iter().sum::<f64>() / amounts.len() as f64;
        Some(mean).filter(|m| *m > 0.0)
    }
}

impl Rule for AmountAnomalyRule {
    fn id(&self) -> RuleId {
        RuleId::AmountAnomaly
    }

    fn evaluate(&self, tx: &Transaction, ctx: &AnalysisContext, config: &EngineConfig) -> RuleResult {
        let amount = amount_f64(&tx.amount)?;
        let w = config.weight(self.id());

        let merchant_avg = ctx
            .merchant_baseline
            .as_ref()
            .and_then(|b| b.to_f64())
            .filter(|v| v.is_finite() && *v > 0.0);
        let baselines = [("user", Self::user_average(ctx)), ("merchant", merchant_avg)];

        let strongest = baselines
            .iter()
            .filter_map(|(label, base)| base.map(|b| (*label, amount / b, b)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match strongest {
            Some((label, ratio, base)) => {
                let threshold = config.amount_multiplier_threshold;
                if ratio < threshold {
                    return Ok(None);
                }
                let factor = (ratio / (threshold * config.amount_ratio_cap)).clamp(0.5, 1.0);
                Ok(Some(Finding::new(
                    self.id(),
                    w * factor,
                    ratio,
                    format!(
                        "amount {} is {:.1}x the {} average of {:.2}",
                        tx.amount, ratio, label, base
                    ),
                )))
            }
            None if amount >= config.high_amount_threshold => Ok(Some(Finding::new(
                self.id(),
                w * 0.5,
                amount / config.high_amount_threshold,
                format!(
                    "amount {} exceeds {:.2} with no spending baseline",
                    tx.amount, config.high_amount_threshold
                ),
            ))),
            None => Ok(None),
        }
    }
}
