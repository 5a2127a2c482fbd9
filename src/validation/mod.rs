use bigdecimal::BigDecimal;
use std::fmt;
use std::net::IpAddr;

pub const IDENTIFIER_MAX_LEN: usize = 50;
pub const CURRENCY_LEN: usize = 3;
pub const CITY_MAX_LEN: usize = 100;
pub const COUNTRY_MAX_LEN: usize = 50;
pub const USER_AGENT_MAX_LEN: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Sanitises an identifier and checks it is present, bounded and free of spaces.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = sanitize_string(value);
    validate_required(field, &value)?;
    validate_max_len(field, &value, IDENTIFIER_MAX_LEN)?;

    if value.chars().any(char::is_whitespace) {
        return Err(ValidationError::new(field, "must not contain whitespace"));
    }

    Ok(value)
}

pub fn validate_positive_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::from(0) {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    Ok(())
}

/// Returns the upper-cased ISO-4217 style code.
pub fn validate_currency(currency: &str) -> Result<String, ValidationError> {
    let currency = sanitize_string(currency).to_ascii_uppercase();
    validate_required("currency", &currency)?;

    if currency.len() != CURRENCY_LEN || !currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        return Err(ValidationError::new(
            "currency",
            format!("must be {} ASCII letters", CURRENCY_LEN),
        ));
    }

    Ok(currency)
}

pub fn validate_ip_address(ip: &str) -> Result<IpAddr, ValidationError> {
    ip.trim()
        .parse::<IpAddr>()
        .map_err(|_| ValidationError::new("ip_address", "must be a valid IPv4 or IPv6 address"))
}

pub fn validate_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> ValidationResult {
    match (latitude, longitude) {
        (None, None) => Ok(()),
        (Some(lat), Some(lon)) => {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(ValidationError::new("latitude", "must be between -90 and 90"));
            }
            if !(-180.0..=180.0).contains(&lon) {
                return Err(ValidationError::new("longitude", "must be between -180 and 180"));
            }
            Ok(())
        }
        (Some(_), None) => Err(ValidationError::new("longitude", "required when latitude is set")),
        (None, Some(_)) => Err(ValidationError::new("latitude", "required when longitude is set")),
    }
}

/// Sanitises an optional free-text field, mapping blank values to `None`.
pub fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max_len: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(sanitize_string) {
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => {
            validate_max_len(field, &v, max_len)?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}
