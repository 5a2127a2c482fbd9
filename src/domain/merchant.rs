//! Merchant entity and its rolling average amount.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MerchantRiskLevel {
    Low,
    Medium,
    High,
}

impl MerchantRiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MerchantRiskLevel::Low => "LOW",
            MerchantRiskLevel::Medium => "MEDIUM",
            MerchantRiskLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for MerchantRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MerchantRiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(MerchantRiskLevel::Low),
            "MEDIUM" => Ok(MerchantRiskLevel::Medium),
            "HIGH" => Ok(MerchantRiskLevel::High),
            other => Err(format!("unknown merchant risk level '{}'", other)),
        }
    }
}

impl Default for MerchantRiskLevel {
    fn default() -> Self {
        MerchantRiskLevel::Low
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Merchant {
    pub merchant_id: String,
    pub name: String,
    pub category: Option<String>,
    pub risk_level: MerchantRiskLevel,
    pub country: Option<String>,
    pub avg_transaction_amount: Option<BigDecimal>,
    /// Number of observations folded into `avg_transaction_amount`.
    pub transaction_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Merchant {
    pub fn new(merchant_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            name: name.into(),
            category: None,
            risk_level: MerchantRiskLevel::Low,
            country: None,
            avg_transaction_amount: None,
            transaction_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_risk_level(mut self, level: MerchantRiskLevel) -> Self {
        self.risk_level = level;
        self
    }

    /// Seeds the rolling average as if `count` transactions of `avg` had been seen.
    pub fn with_average(mut self, avg: BigDecimal, count: i64) -> Self {
        self.avg_transaction_amount = Some(avg);
        self.transaction_count = count.max(1);
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    /// Folds one more amount into the rolling average.
    pub fn record_amount(&mut self, amount: &BigDecimal) {
        let updated = match &self.avg_transaction_amount {
            Some(avg) if self.transaction_count > 0 => {
                let n = BigDecimal::from(self.transaction_count + 1);
                avg.clone() + (amount.clone() - avg.clone()) / n
            }
            _ => amount.clone(),
        };
        self.avg_transaction_amount = Some(updated);
        self.transaction_count += 1;
    }

    /// The rolling average with one previously recorded `amount` taken back out.
    ///
    /// Returns `None` when that amount was the only observation.
    pub fn average_excluding(&self, amount: &BigDecimal) -> Option<BigDecimal> {
        let avg = self.avg_transaction_amount.as_ref()?;
        if self.transaction_count <= 1 {
            return None;
        }
        let n = self.transaction_count;
        let total = avg.clone() * BigDecimal::from(n) - amount.clone();
        Some(total / BigDecimal::from(n - 1))
    }
}
