//! Transaction domain entity.
//! Framework-agnostic representation of a scored payment event.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::geo::GeoPoint;

/// Domain entity representing a transaction and its fraud verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub user_id: Option<String>,
    pub merchant_id: Option<String>,
    pub amount: BigDecimal,
    pub currency: String,
    pub transaction_type: Option<String>,
    pub location_country: Option<String>,
    pub location_city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: Option<i64>,
    pub is_fraud: bool,
    pub fraud_score: f64,
    pub fraud_reason: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        transaction_id: impl Into<String>,
        user_id: Option<String>,
        merchant_id: Option<String>,
        amount: BigDecimal,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            user_id,
            merchant_id,
            amount,
            currency: "USD".to_string(),
            transaction_type: None,
            location_country: None,
            location_city: None,
            latitude: None,
            longitude: None,
            ip_address: None,
            user_agent: None,
            timestamp,
            processing_time_ms: None,
            is_fraud: false,
            fraud_score: 0.0,
            fraud_reason: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn located(mut self, country: impl Into<String>, city: Option<String>) -> Self {
        self.location_country = Some(country.into());
        self.location_city = city;
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    /// Explicit coordinates when both are present.
    pub fn coordinates(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }

    /// Best known position: explicit coordinates, else the country centroid.
    pub fn position(&self) -> Option<GeoPoint> {
        self.coordinates().or_else(|| {
            self.location_country
                .as_deref()
                .and_then(crate::utils::geo::country_centroid)
        })
    }

    /// Appends rule ids not already present, preserving existing order.
    pub fn append_reasons<I, S>(&mut self, reasons: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for reason in reasons {
            let reason = reason.as_ref();
            if !self.fraud_reason.iter().any(|r| r == reason) {
                self.fraud_reason.push(reason.to_string());
            }
        }
    }
}
