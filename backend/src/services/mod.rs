//! Service layer for business logic and orchestration.
//!
//! Services sit between the HTTP handlers and the repository traits. They
//! own the rules that are not about transport: password and token handling,
//! input validation, the analysis workflow and the subscription plans.

pub mod analysis;
pub mod auth;
pub mod billing;
pub mod pagination;
pub mod validation;

pub use analysis::{AnalysisError, AnalysisOutcome, AnalysisRequest, AnalyzerSettings, PropertyAnalyzer};
pub use auth::{AuthError, PasswordHasher, TokenService};
pub use billing::{BillingError, StripeClient, StripeConfig};
pub use pagination::Pagination;
pub use validation::ValidationErrors;
