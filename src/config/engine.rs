//! Tunable thresholds and weights for the scoring engine.
//!
//! Loaded from an optional JSON file plus `FRAUD_*` environment overrides, and
//! held behind an [`ArcSwap`] so a running engine can take new thresholds
//! without a restart. Each analysis reads one snapshot.

use anyhow::Context;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::domain::{RuleId, TierCutpoints};
use crate::error::ConfigError;

pub const CONFIG_PATH_VAR: &str = "FRAUD_ENGINE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub velocity_window_secs: u64,
    pub velocity_limit: u32,
    pub amount_multiplier_threshold: f64,
    /// Ratio (as a multiple of the threshold) at which the amount weight saturates.
    pub amount_ratio_cap: f64,
    pub high_amount_threshold: f64,
    pub history_window_days: i64,
    pub travel_speed_threshold_kmh: f64,
    pub alert_threshold: f64,
    pub tier_cutpoints: TierCutpoints,
    pub rule_weights: BTreeMap<RuleId, f64>,
    pub merchant_medium_factor: f64,
    pub new_entity_max_age_days: i64,
    pub unknown_entity_discount: f64,
    pub off_hours_start_hour: u32,
    pub off_hours_end_hour: u32,
    pub off_hours_amount_threshold: f64,
    pub high_risk_countries: Vec<String>,
    pub store_timeout_ms: u64,
}

pub fn default_rule_weights() -> BTreeMap<RuleId, f64> {
    BTreeMap::from([
        (RuleId::Velocity, 0.5),
        (RuleId::AmountAnomaly, 0.6),
        (RuleId::ImpossibleTravel, 0.7),
        (RuleId::MerchantRisk, 0.4),
        (RuleId::NewEntity, 0.25),
        (RuleId::OffHours, 0.3),
        (RuleId::LocationAnomaly, 0.35),
        (RuleId::UserRiskProfile, 0.3),
    ])
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            velocity_window_secs: 60,
            velocity_limit: 3,
            amount_multiplier_threshold: 5.0,
            amount_ratio_cap: 2.0,
            high_amount_threshold: 5000.0,
            history_window_days: 30,
            travel_speed_threshold_kmh: 900.0,
            alert_threshold: 0.5,
            tier_cutpoints: TierCutpoints::default(),
            rule_weights: default_rule_weights(),
            merchant_medium_factor: 0.5,
            new_entity_max_age_days: 7,
            unknown_entity_discount: 0.5,
            off_hours_start_hour: 2,
            off_hours_end_hour: 6,
            off_hours_amount_threshold: 500.0,
            high_risk_countries: Vec::new(),
            store_timeout_ms: 2000,
        }
    }
}

impl EngineConfig {
    /// File named by `FRAUD_ENGINE_CONFIG` (if any), then env overrides, then validation.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse engine config {}", path.display()))?;
        Ok(config)
    }

    /// Applies `FRAUD_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FRAUD_VELOCITY_WINDOW_SECS") {
            self.velocity_window_secs = v.trim().parse().context("FRAUD_VELOCITY_WINDOW_SECS")?;
        }
        if let Some(v) = lookup("FRAUD_VELOCITY_LIMIT") {
            self.velocity_limit = v.trim().parse().context("FRAUD_VELOCITY_LIMIT")?;
        }
        if let Some(v) = lookup("FRAUD_AMOUNT_MULTIPLIER") {
            self.amount_multiplier_threshold = v.trim().parse().context("FRAUD_AMOUNT_MULTIPLIER")?;
        }
        if let Some(v) = lookup("FRAUD_TRAVEL_SPEED_KMH") {
            self.travel_speed_threshold_kmh = v.trim().parse().context("FRAUD_TRAVEL_SPEED_KMH")?;
        }
        if let Some(v) = lookup("FRAUD_ALERT_THRESHOLD") {
            self.alert_threshold = v.trim().parse().context("FRAUD_ALERT_THRESHOLD")?;
        }
        if let Some(v) = lookup("FRAUD_STORE_TIMEOUT_MS") {
            self.store_timeout_ms = v.trim().parse().context("FRAUD_STORE_TIMEOUT_MS")?;
        }
        if let Some(v) = lookup("FRAUD_TIER_CUTPOINTS") {
            self.tier_cutpoints = parse_cutpoints(&v)?;
        }
        if let Some(v) = lookup("FRAUD_RULE_WEIGHTS") {
            for (rule, weight) in parse_rule_weights(&v)? {
                self.rule_weights.insert(rule, weight);
            }
        }
        if let Some(v) = lookup("FRAUD_HIGH_RISK_COUNTRIES") {
            self.high_risk_countries = v
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.velocity_window_secs == 0 {
            return Err(ConfigError::Invalid("velocity_window_secs must be positive".into()));
        }
        if self.velocity_limit == 0 {
            return Err(ConfigError::Invalid("velocity_limit must be positive".into()));
        }
        if self.history_window_days <= 0 {
            return Err(ConfigError::Invalid("history_window_days must be positive".into()));
        }
        if self.velocity_window_secs as i64 > self.history_window_days * 86_400 {
            return Err(ConfigError::Invalid(
                "velocity window must fit inside the history window".into(),
            ));
        }
        if !(self.amount_multiplier_threshold.is_finite() && self.amount_multiplier_threshold > 1.0) {
            return Err(ConfigError::Invalid(
                "amount_multiplier_threshold must be greater than 1".into(),
            ));
        }
        if !(self.amount_ratio_cap.is_finite() && self.amount_ratio_cap >= 1.0) {
            return Err(ConfigError::Invalid("amount_ratio_cap must be at least 1".into()));
        }
        if !(self.travel_speed_threshold_kmh.is_finite() && self.travel_speed_threshold_kmh > 0.0) {
            return Err(ConfigError::Invalid(
                "travel_speed_threshold_kmh must be positive".into(),
            ));
        }
        if !(self.alert_threshold > 0.0 && self.alert_threshold <= 1.0) {
            return Err(ConfigError::Invalid("alert_threshold must be in (0, 1]".into()));
        }
        // re-check in case the struct was built by hand
        TierCutpoints::new(self.tier_cutpoints.points())?;
        for (rule, weight) in &self.rule_weights {
            if !(0.0..=1.0).contains(weight) {
                return Err(ConfigError::Invalid(format!(
                    "weight for {} must be in [0, 1], got {}",
                    rule, weight
                )));
            }
        }
        for (name, factor) in [
            ("merchant_medium_factor", self.merchant_medium_factor),
            ("unknown_entity_discount", self.unknown_entity_discount),
        ] {
            if !(0.0..=1.0).contains(&factor) {
                return Err(ConfigError::Invalid(format!("{} must be in [0, 1]", name)));
            }
        }
        if self.off_hours_start_hour > 23 || self.off_hours_end_hour > 24 {
            return Err(ConfigError::Invalid("off-hours window must use hours 0-24".into()));
        }
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::Invalid("store_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn weight(&self, rule: RuleId) -> f64 {
        self.rule_weights
            .get(&rule)
            .copied()
            .or_else(|| default_rule_weights().get(&rule).copied())
            .unwrap_or(0.0)
    }

    pub fn velocity_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.velocity_window_secs as i64)
    }

    pub fn history_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.history_window_days)
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }
}

fn parse_cutpoints(raw: &str) -> anyhow::Result<TierCutpoints> {
    let values = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .context("FRAUD_TIER_CUTPOINTS must be three comma-separated numbers")?;
    let points: [f64; 3] = values
        .try_into()
        .map_err(|_| anyhow::anyhow!("FRAUD_TIER_CUTPOINTS must have exactly three values"))?;
    Ok(TierCutpoints::new(points)?)
}

fn parse_rule_weights(raw: &str) -> anyhow::Result<Vec<(RuleId, f64)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> anyhow::Result<(RuleId, f64)> {
            let (rule, weight) = entry
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("expected rule=weight, got '{}'", entry))?;
            let rule = rule
                .parse::<RuleId>()
                .map_err(|_| ConfigError::UnknownRule(rule.trim().to_string()))?;
            let weight = weight
                .trim()
                .parse::<f64>()
                .with_context(|| format!("weight for {}", rule))?;
            Ok((rule, weight))
        })
        .collect()
}

/// Shared, hot-swappable engine configuration.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<ArcSwap<EngineConfig>>,
}

impl ConfigHandle {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        })
    }

    pub fn snapshot(&self) -> Arc<EngineConfig> {
        self.inner.load_full()
    }

    /// Swaps in a new configuration after validating it. In-flight analyses
    /// keep the snapshot they started with.
    pub fn replace(&self, config: EngineConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.inner.store(Arc::new(config));
        tracing::info!("Engine configuration replaced");
        Ok(())
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(EngineConfig::default())),
        }
    }
}
