//! Repository implementations.
//!
//! - `local`: in-memory, used by tests and local development
//! - `postgres`: Diesel + r2d2 (feature `postgres-repo`)
pub mod local;
#[cfg(feature = "postgres-repo")]
pub mod postgres;

pub use local::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use postgres::{PoolStats, PostgresConfig, PostgresRepository};
