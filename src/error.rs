use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocSyncErrorCode {
    InvalidArgument,
    FailedPrecondition,
    Internal,
    NotFound,
    PermissionDenied,
    Aborted,
    Unavailable,
    DataLoss,
}

impl DocSyncErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocSyncErrorCode::InvalidArgument => "docsync/invalid-argument",
            DocSyncErrorCode::FailedPrecondition => "docsync/failed-precondition",
            DocSyncErrorCode::Internal => "docsync/internal",
            DocSyncErrorCode::NotFound => "docsync/not-found",
            DocSyncErrorCode::PermissionDenied => "docsync/permission-denied",
            DocSyncErrorCode::Aborted => "docsync/aborted",
            DocSyncErrorCode::Unavailable => "docsync/unavailable",
            DocSyncErrorCode::DataLoss => "docsync/data-loss",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DocSyncError {
    pub code: DocSyncErrorCode,
    message: String,
}

impl DocSyncError {
    pub fn new(code: DocSyncErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    /// True for failures the persistence engine may emit for contended or
    /// interrupted transactions. Such errors are retried by the engine and are
    /// the only kind the bookkeeping operations are allowed to swallow.
    pub fn is_transient_storage_error(&self) -> bool {
        matches!(
            self.code,
            DocSyncErrorCode::Aborted | DocSyncErrorCode::Unavailable
        )
    }
}

impl Display for DocSyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for DocSyncError {}

pub type DocSyncResult<T> = Result<T, DocSyncError>;

pub fn invalid_argument(message: impl Into<String>) -> DocSyncError {
    DocSyncError::new(DocSyncErrorCode::InvalidArgument, message)
}

pub fn failed_precondition(message: impl Into<String>) -> DocSyncError {
    DocSyncError::new(DocSyncErrorCode::FailedPrecondition, message)
}

pub fn internal_error(message: impl Into<String>) -> DocSyncError {
    DocSyncError::new(DocSyncErrorCode::Internal, message)
}

pub fn not_found(message: impl Into<String>) -> DocSyncError {
    DocSyncError::new(DocSyncErrorCode::NotFound, message)
}

pub fn permission_denied(message: impl Into<String>) -> DocSyncError {
    DocSyncError::new(DocSyncErrorCode::PermissionDenied, message)
}

pub fn aborted(message: impl Into<String>) -> DocSyncError {
    DocSyncError::new(DocSyncErrorCode::Aborted, message)
}

pub fn unavailable(message: impl Into<String>) -> DocSyncError {
    DocSyncError::new(DocSyncErrorCode::Unavailable, message)
}

pub fn data_loss(message: impl Into<String>) -> DocSyncError {
    DocSyncError::new(DocSyncErrorCode::DataLoss, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_code_string() {
        let err = not_found("batch 7 is gone");
        assert_eq!(err.code_str(), "docsync/not-found");
        assert!(err.to_string().contains("batch 7 is gone"));
    }

    #[test]
    fn transient_codes() {
        assert!(aborted("conflict").is_transient_storage_error());
        assert!(unavailable("locked").is_transient_storage_error());
        assert!(!internal_error("bug").is_transient_storage_error());
    }
}
