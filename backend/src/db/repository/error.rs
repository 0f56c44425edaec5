//! Repository failures.
//!
//! Every variant carries a message and an [`ErrorContext`] naming the
//! operation and row involved, so a log line alone is enough to locate the
//! failing call.

use std::fmt;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Where a repository failure happened.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Repository method, e.g. `create_user`.
    pub operation: Option<String>,
    /// Table-level noun: `user`, `analysis`, `audit_event`.
    pub entity: Option<String>,
    pub entity_id: Option<String>,
    pub details: Option<String>,
    /// Set for pool exhaustion, timeouts and serialization failures.
    pub retryable: bool,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Self::default()
        }
    }

    pub fn with_entity(self, entity: impl Into<String>) -> Self {
        Self {
            entity: Some(entity.into()),
            ..self
        }
    }

    pub fn with_entity_id(self, id: impl ToString) -> Self {
        Self {
            entity_id: Some(id.to_string()),
            ..self
        }
    }

    pub fn with_details(self, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..self
        }
    }

    pub fn retryable(self) -> Self {
        Self {
            retryable: true,
            ..self
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labelled = [
            ("operation", &self.operation),
            ("entity", &self.entity),
            ("id", &self.entity_id),
            ("details", &self.details),
        ];
        let mut fields: Vec<String> = labelled
            .iter()
            .filter_map(|(label, value)| value.as_ref().map(|v| format!("{label}={v}")))
            .collect();
        if self.retryable {
            fields.push("retryable=true".to_string());
        }
        write!(f, "[{}]", fields.join(", "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Pool checkout or connection failure.
    #[error("Connection error: {message} {context}")]
    ConnectionError { message: String, context: ErrorContext },

    #[error("Query error: {message} {context}")]
    QueryError { message: String, context: ErrorContext },

    #[error("Not found: {message} {context}")]
    NotFound { message: String, context: ErrorContext },

    /// Unique constraint hit, e.g. a second account for one email.
    #[error("Conflict: {message} {context}")]
    Conflict { message: String, context: ErrorContext },

    #[error("Data validation error: {message} {context}")]
    ValidationError { message: String, context: ErrorContext },

    /// Bad backend selection or connection settings.
    #[error("Configuration error: {message} {context}")]
    ConfigurationError { message: String, context: ErrorContext },

    #[error("Internal error: {message} {context}")]
    InternalError { message: String, context: ErrorContext },

    #[error("Timeout error: {message} {context}")]
    TimeoutError { message: String, context: ErrorContext },
}

/// `name(message)` builds a variant with an empty context;
/// `name_with_context(message, context)` attaches one.
macro_rules! constructors {
    ($($variant:ident => $plain:ident $(, $with:ident)?;)*) => {
        impl RepositoryError {
            $(
                pub fn $plain(message: impl Into<String>) -> Self {
                    Self::$variant {
                        message: message.into(),
                        context: ErrorContext::default(),
                    }
                }

                $(
                    pub fn $with(message: impl Into<String>, context: ErrorContext) -> Self {
                        Self::$variant {
                            message: message.into(),
                            context,
                        }
                    }
                )?
            )*
        }
    };
}

constructors! {
    QueryError => query;
    NotFound => not_found, not_found_with_context;
    Conflict => conflict, conflict_with_context;
    ValidationError => validation, validation_with_context;
    ConfigurationError => configuration;
    InternalError => internal, internal_with_context;
}

impl RepositoryError {
    /// Connection failures are always retryable.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::connection_with_context(message, ErrorContext::default())
    }

    pub fn connection_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::ConnectionError {
            message: message.into(),
            context: context.retryable(),
        }
    }

    /// Timeouts are always retryable.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::TimeoutError {
            message: message.into(),
            context: ErrorContext::default().retryable(),
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::ConnectionError { context, .. }
            | Self::QueryError { context, .. }
            | Self::NotFound { context, .. }
            | Self::Conflict { context, .. }
            | Self::ValidationError { context, .. }
            | Self::ConfigurationError { context, .. }
            | Self::InternalError { context, .. }
            | Self::TimeoutError { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::ConnectionError { context, .. }
            | Self::QueryError { context, .. }
            | Self::NotFound { context, .. }
            | Self::Conflict { context, .. }
            | Self::ValidationError { context, .. }
            | Self::ConfigurationError { context, .. }
            | Self::InternalError { context, .. }
            | Self::TimeoutError { context, .. } => context,
        }
    }

    /// Whether the Postgres retry loop should try again.
    pub fn is_retryable(&self) -> bool {
        self.context().retryable
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Stamp the repository method onto an error raised by a helper.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }
}

impl From<String> for RepositoryError {
    fn from(message: String) -> Self {
        Self::internal(message)
    }
}

impl From<&str> for RepositoryError {
    fn from(message: &str) -> Self {
        Self::internal(message)
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::result::Error> for RepositoryError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::NotFound => Self::not_found("Record not found"),
            Error::DatabaseError(kind, info) => {
                let message = info.message().to_string();
                let context = ErrorContext::default().with_details(format!("db_error_kind={kind:?}"));
                match kind {
                    DatabaseErrorKind::UniqueViolation => Self::Conflict { message, context },
                    DatabaseErrorKind::SerializationFailure => Self::QueryError {
                        message,
                        context: context.retryable(),
                    },
                    _ => Self::QueryError { message, context },
                }
            }
            Error::DeserializationError(e) | Error::SerializationError(e) => {
                Self::internal(format!("Row conversion failed: {e}"))
            }
            other => Self::query(other.to_string()),
        }
    }
}

#[cfg(feature = "postgres-repo")]
impl From<diesel::r2d2::PoolError> for RepositoryError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::connection_with_context(err.to_string(), ErrorContext::new("checkout"))
    }
}
