//! Core error types for CONCORD.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Value could not be represented as JSON
    InvalidEncoding,

    /// Value nested deeper than canonical encoding allows
    NestingTooDeep {
        /// Depth limit that was exceeded
        limit: usize,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEncoding => write!(f, "Invalid encoding"),
            Self::NestingTooDeep { limit } => {
                write!(f, "Value nested deeper than {} levels", limit)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(_err: serde_json::Error) -> Self {
        Self::InvalidEncoding
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(CoreError::InvalidEncoding.to_string(), "Invalid encoding");
        assert_eq!(
            CoreError::NestingTooDeep { limit: 128 }.to_string(),
            "Value nested deeper than 128 levels"
        );
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert_eq!(CoreError::from(err), CoreError::InvalidEncoding);
    }
}
