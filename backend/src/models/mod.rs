//! Core domain types: users, analyses and audit events.
//!
//! These are the shapes the repository layer stores and returns. HTTP DTOs
//! live in [`crate::http::dto`] and are built from these.

pub mod analysis;
pub mod audit;
pub mod macros;
pub mod user;

pub use analysis::*;
pub use audit::*;
pub use user::*;
