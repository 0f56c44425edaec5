//! Persistence for accounts, analyses and the audit trail.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  HTTP handlers / services                    │
//! └───────────────────┬──────────────────────────┘
//!                     │  Arc<dyn FullRepository>
//! ┌───────────────────▼──────────────────────────┐
//! │  Repository traits (repository/mod.rs)       │
//! └──────────┬─────────────────────┬─────────────┘
//!            │                     │
//!   ┌────────▼────────┐   ┌────────▼─────────────┐
//!   │ LocalRepository │   │ PostgresRepository   │
//!   │   (in-memory)   │   │ (Diesel + r2d2)      │
//!   └─────────────────┘   └──────────────────────┘
//! ```
//!
//! The backend is chosen once at startup by [`RepositoryFactory::resolve`]
//! and injected into the HTTP state. There is no global instance.

#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod factory;
pub mod models;
pub mod repo_config;
pub mod repositories;
pub mod repository;

#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::{PoolStats, PostgresConfig};
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}

pub use factory::{RepositoryFactory, RepositoryType};
pub use models::{PageRequest, Paged};
pub use repo_config::RepositoryConfig;
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    AnalysisRepository, AuditRepository, ErrorContext, FullRepository, RepositoryError,
    RepositoryResult, UserRepository,
};
