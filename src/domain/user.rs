//! Cardholder entity.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskProfile {
    Normal,
    Watch,
    HighRisk,
}

impl RiskProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskProfile::Normal => "NORMAL",
            RiskProfile::Watch => "WATCH",
            RiskProfile::HighRisk => "HIGH_RISK",
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NORMAL" => Ok(RiskProfile::Normal),
            "WATCH" => Ok(RiskProfile::Watch),
            "HIGH_RISK" => Ok(RiskProfile::HighRisk),
            other => Err(format!("unknown risk profile '{}'", other)),
        }
    }
}

impl Default for RiskProfile {
    fn default() -> Self {
        RiskProfile::Normal
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub registration_date: Option<NaiveDate>,
    pub risk_profile: RiskProfile,
    pub lifetime_value: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            name: name.into(),
            email: None,
            phone: None,
            registration_date: Some(now.date_naive()),
            risk_profile: RiskProfile::Normal,
            lifetime_value: BigDecimal::from(0),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn registered_on(mut self, date: NaiveDate) -> Self {
        self.registration_date = Some(date);
        self
    }

    pub fn with_risk_profile(mut self, profile: RiskProfile) -> Self {
        self.risk_profile = profile;
        self
    }

    /// Day the account became active; falls back to the record creation date.
    pub fn registered_since(&self) -> NaiveDate {
        self.registration_date
            .unwrap_or_else(|| self.created_at.date_naive())
    }
}
