//! Error types surfaced to callers.

use crate::models::{ReportId, UserId};
use thiserror::Error;

/// Outcome of a failed report or sharing operation.
#[derive(Error, Debug)]
pub enum NewsLensError {
    /// Bad input shape (empty text, self-share, invalid handle).
    #[error("invalid input: {0}")]
    Validation(String),

    /// Unknown report or user.
    #[error("not found: {0}")]
    NotFound(String),

    /// Acting user may not perform the operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// No block of a new report produced a usable analysis.
    #[error("analysis failed: {0}")]
    AnalysisFailure(String),

    #[error(transparent)]
    Store(StoreError),
}

impl NewsLensError {
    pub fn report_not_found(id: ReportId) -> Self {
        NewsLensError::NotFound(format!("{} does not exist", id))
    }

    pub fn user_not_found(id: UserId) -> Self {
        NewsLensError::NotFound(format!("{} does not exist", id))
    }
}

/// Constraint or persistence failure inside the record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("handle '{0}' is already taken")]
    DuplicateHandle(String),

    #[error("{0} does not exist")]
    MissingUser(UserId),

    #[error("{0} does not exist")]
    MissingReport(ReportId),

    #[error("{0} already exists")]
    DuplicateReport(ReportId),

    #[error("grant for {recipient} on {report} violates ownership rules")]
    InvalidGrant { report: ReportId, recipient: UserId },

    #[error("store {} is in use by another process", .0.display())]
    Locked(std::path::PathBuf),

    #[error("unable to access snapshot file. {error}")]
    Io {
        #[from]
        error: std::io::Error,
    },

    #[error("unable to decode snapshot file. {error}")]
    Serde {
        #[from]
        error: serde_json::Error,
    },
}

/// Constraint violations keep their caller-facing category; only genuine
/// persistence failures stay wrapped as `Store`.
impl From<StoreError> for NewsLensError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MissingUser(_) | StoreError::MissingReport(_) => {
                NewsLensError::NotFound(err.to_string())
            }
            StoreError::DuplicateHandle(_) | StoreError::InvalidGrant { .. } => {
                NewsLensError::Validation(err.to_string())
            }
            other => NewsLensError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, NewsLensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_keep_their_category() {
        let err: NewsLensError = StoreError::MissingUser(UserId(4)).into();
        assert!(matches!(err, NewsLensError::NotFound(_)));

        let err: NewsLensError = StoreError::DuplicateHandle("alice".to_string()).into();
        assert!(matches!(err, NewsLensError::Validation(_)));

        let err: NewsLensError = StoreError::DuplicateReport(ReportId(1)).into();
        assert!(matches!(err, NewsLensError::Store(_)));
    }
}
