pub mod alerts;
pub(crate) mod deadline;
pub mod locks;
pub mod rules;
pub mod scoring;

pub use alerts::AlertManager;
pub use locks::KeyLocks;
pub use rules::{AnalysisContext, Rule, RuleRegistry};
pub use scoring::{AggregatedScore, ScoreAggregator};
