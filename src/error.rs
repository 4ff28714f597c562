//! Error types for recovery vault queries.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`RecoveryError`].
pub type Result<T> = std::result::Result<T, RecoveryError>;

/// Errors that can occur while querying Recovery Services vaults.
///
/// All errors implement `std::error::Error` and can be chained with `source()`.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// An identifier was left empty and no default is configured.
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    /// Credential acquisition failed.
    #[error("authorization failed: {0}")]
    Authorization(String),

    /// A management API call failed.
    #[error("{operation} {resource}: {source}")]
    Provider {
        /// Operation name (get_vault, list_backup_policies, ...)
        operation: String,
        /// Resource the operation targeted
        resource: String,
        /// Underlying error
        #[source]
        source: Box<RecoveryError>,
    },

    /// The requested resource does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The management API answered with a non-success status.
    #[error("HTTP {status} {code}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// ARM error code
        code: String,
        /// ARM error message
        message: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// A resource or policy name failed validation.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation exceeded its time budget.
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    /// Command execution failed.
    #[error("command execution failed: {0}")]
    CommandFailed(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RecoveryError {
    /// Wraps an error coming out of a management client call with the
    /// operation and resource it belonged to.
    ///
    /// # Example
    ///
    /// ```
    /// use recoveryvault::RecoveryError;
    ///
    /// let err = RecoveryError::NotFound("vault-A".to_string());
    /// let wrapped = RecoveryError::provider_op("get_vault", "rg-1/vault-A", err);
    ///
    /// assert_eq!(
    ///     wrapped.to_string(),
    ///     "get_vault rg-1/vault-A: resource not found: vault-A"
    /// );
    /// ```
    pub fn provider_op(
        operation: impl Into<String>,
        resource: impl Into<String>,
        err: RecoveryError,
    ) -> Self {
        Self::Provider {
            operation: operation.into(),
            resource: resource.into(),
            source: Box::new(err),
        }
    }

    /// Returns `true` if this error, or the provider error it wraps, is a
    /// not-found answer.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Http { status, .. } => *status == 404,
            Self::Provider { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Returns `true` for cancellation and timeouts, including wrapped ones.
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Cancelled | Self::TimedOut(_) => true,
            Self::Provider { source, .. } => source.is_interrupted(),
            _ => false,
        }
    }
}
