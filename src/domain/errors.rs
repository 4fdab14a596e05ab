//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Referenced entity is absent. `entity` is the kind ("post", "group"), `key` the lookup value.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Authenticated actor lacks rights on the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Anonymous actor attempted a members-only action.
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Uniqueness violation on an administrative write (duplicate username or slug).
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Repository error: {0}")]
    Repo(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Status code the web layer answers with.
    pub fn http_status(&self) -> u16 {
        match self {
            DomainError::NotFound { .. } => 404,
            DomainError::Forbidden(_) => 403,
            DomainError::Unauthenticated => 401,
            DomainError::Validation(_) => 400,
            DomainError::Conflict(_) => 409,
            DomainError::Repo(_) | DomainError::Snapshot(_) => 500,
        }
    }
}
