pub mod analyze_transaction;
pub mod dashboard;

pub use analyze_transaction::{AnalysisResult, AnalyzeTransaction, Recommendation, TransactionInput};
pub use dashboard::{Dashboard, DashboardStats};
