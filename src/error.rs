//! Error types for the authorization engine

use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum RbacError {
    /// Bad input shape, uniqueness violation, self-loop, permission-parents-role
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Adding the edge would close a cycle in the item hierarchy
    #[error("Cannot add '{child}' as a child of '{parent}'. A loop has been detected.")]
    Cycle { parent: String, child: String },

    /// Referenced item/rule/edge is absent or not visible in the active scope
    #[error("Not found: {0}")]
    NotFound(String),

    /// Scope unresolved at startup or malformed cache wiring
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The policy store failed (connectivity, constraint violation, timeout)
    #[error("Store error: {0}")]
    Store(String),
}

impl RbacError {
    /// Shorthand used by store adapters to wrap backend failures.
    pub fn store(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Store(format!("{}: {}", context, err))
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, RbacError>;
