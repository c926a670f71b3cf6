//! Error channel shared by every fallible ragbag operation.
//!
//! Errors carry a category (see [`ErrorCode`]) and a message that names the
//! offending schema, attribute or object. Nothing in the workspace retries or
//! recovers from these: they are returned to the caller as-is.

use serde::{Deserialize, Serialize};

/// Error category, mirrored by the variants of [`RagbagError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidArgument,
    FailedPrecondition,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RagbagError {
    /// Malformed input: bad schema, shape, type or missing required attribute.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An operation-specific invariant does not hold for otherwise valid input.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    /// An unsupported schema kind or an unreachable state was reached.
    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, RagbagError>;

impl RagbagError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn failed_precondition(msg: impl Into<String>) -> Self {
        Self::FailedPrecondition(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// The message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::InvalidArgument(m) | Self::FailedPrecondition(m) | Self::Internal(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_and_message() {
        let err = RagbagError::failed_precondition("sort is not supported for mixed dtype");
        assert_eq!(err.code(), ErrorCode::FailedPrecondition);
        assert_eq!(err.message(), "sort is not supported for mixed dtype");
        assert_eq!(
            err.to_string(),
            "failed precondition: sort is not supported for mixed dtype"
        );
    }
}
