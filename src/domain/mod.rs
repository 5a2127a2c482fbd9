//! Domain entities shared by the engine, the stores and the HTTP layer.

pub mod alert;
pub mod finding;
pub mod merchant;
pub mod risk;
pub mod transaction;
pub mod user;

pub use alert::{
    AlertDraft, FraudAlert, InvalidTransition, InvestigationStatus, Resolution, StatusChange,
};
pub use finding::{Finding, RuleId};
pub use merchant::{Merchant, MerchantRiskLevel};
pub use risk::{RiskTier, TierCutpoints};
pub use transaction::Transaction;
pub use user::{RiskProfile, User};
