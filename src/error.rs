//! Error types for the RIVUS state lifecycle
//!
//! Errors are classified by how the user experiences them:
//! - Retryable: identity provisioning and remote reads/writes
//! - Degraded: generation failures (the guide already substituted a placeholder)
//! - Rejected: invalid input or an intent the current state does not allow

use thiserror::Error;

/// Errors surfaced by the controller, gateways and storage.
#[derive(Debug, Error)]
pub enum AppError {
    // Retryable errors
    #[error("Could not establish an identity: {0}")]
    Auth(String),

    #[error("Failed to load state: {0}")]
    Load(String),

    #[error("Failed to save state: {0}")]
    Save(String),

    // Degraded
    #[error("Guidance generation failed: {0}")]
    Generation(String),

    // Rejected
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Another operation is still in progress")]
    Busy,

    #[error("Weekly review is locked until every task is completed")]
    WeeklyLocked,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Local storage error: {0}")]
    Storage(String),
}

impl AppError {
    /// Returns true if the same intent can simply be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Auth(_) | AppError::Load(_) | AppError::Save(_) | AppError::Busy
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "Check your connection and try signing in again.",
            AppError::Load(_) => "Your data could not be loaded. Try again in a moment.",
            AppError::Save(_) => "Your latest change will be saved with the next update.",
            AppError::Generation(_) => "The AI could not be reached. Try again.",
            AppError::Validation(_) => "Check the value and try again.",
            AppError::Busy => "Wait for the current operation to finish.",
            AppError::WeeklyLocked => "Complete your pending SMART tasks first.",
            AppError::NotFound(_) => "Refresh and try again.",
            AppError::Storage(_) => "Check disk permissions for ~/.rivus.",
        }
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        AppError::Storage(err.to_string())
    }
}

/// Serializable error representation for views
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotice {
    pub message: String,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

impl From<&AppError> for ErrorNotice {
    fn from(err: &AppError) -> Self {
        ErrorNotice {
            message: err.to_string(),
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
