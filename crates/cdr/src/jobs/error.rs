use thiserror::Error;

use crate::error::CdrError;

/// How a job handler stopped.
#[derive(Error, Debug)]
pub enum JobError {
    /// The job was cancelled and stopped at a safe point.
    #[error("job cancelled")]
    Cancelled,

    #[error("missing job argument '{0}'")]
    MissingArg(String),

    /// Worth another attempt.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Failed(String),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error(transparent)]
    Core(#[from] CdrError),
}

impl JobError {
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::Transient(_) => true,
            JobError::Core(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl From<JobError> for CdrError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::Core(inner) => inner,
            JobError::MissingArg(name) => CdrError::InvalidInput(format!("missing job argument '{}'", name)),
            JobError::Transient(message) => CdrError::Timeout(message),
            other => CdrError::InvariantViolation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(JobError::Transient("busy".into()).is_retryable());
        assert!(JobError::Core(CdrError::Timeout("lock".into())).is_retryable());
        assert!(!JobError::Core(CdrError::InvalidInput("x".into())).is_retryable());
        assert!(!JobError::Cancelled.is_retryable());
    }

    #[test]
    fn test_into_core_error() {
        let err: CdrError = JobError::MissingArg("subset".into()).into();
        assert_eq!(err.kind(), "InvalidInput");
        let err: CdrError = JobError::Core(CdrError::not_found("Job", 4)).into();
        assert_eq!(err.kind(), "NotFound");
    }
}
