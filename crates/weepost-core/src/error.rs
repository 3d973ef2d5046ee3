//! Why a sample was abandoned

use crate::projector::FieldError;
use crate::transport::PostError;

/// Terminal failure for one sample.
///
/// Isolated to that sample: the worker logs it and moves on.
#[derive(Debug)]
pub enum DeliveryError {
    /// A filter failed with something other than a missing field
    Projection(FieldError),
    /// Document could not be serialized
    Encode(serde_json::Error),
    /// Every attempt failed with a retryable error
    Exhausted { attempts: u32, last: PostError },
    /// The endpoint (or request) failed in a way retrying cannot fix
    Rejected { attempts: u32, error: PostError },
    /// Shutdown requested while the sample was in flight
    Interrupted { attempts: u32 },
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Projection(e) => write!(f, "projection failed: {e}"),
            Self::Encode(e) => write!(f, "cannot encode document: {e}"),
            Self::Exhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
            Self::Rejected { attempts, error } => {
                write!(f, "rejected on attempt {attempts}: {error}")
            }
            Self::Interrupted { attempts } => {
                write!(f, "interrupted by shutdown after {attempts} attempts")
            }
        }
    }
}

impl std::error::Error for DeliveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Projection(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Exhausted { last: e, .. } | Self::Rejected { error: e, .. } => Some(e),
            Self::Interrupted { .. } => None,
        }
    }
}

impl DeliveryError {
    /// Number of POST attempts made before giving up
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Projection(_) | Self::Encode(_) => 0,
            Self::Exhausted { attempts, .. }
            | Self::Rejected { attempts, .. }
            | Self::Interrupted { attempts } => *attempts,
        }
    }

    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::EvalError;

    fn http_err(status: u16) -> PostError {
        PostError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn display_exhausted() {
        let err = DeliveryError::Exhausted {
            attempts: 3,
            last: http_err(503),
        };
        assert_eq!(err.to_string(), "gave up after 3 attempts: HTTP 503: test");
        assert_eq!(err.attempts(), 3);
    }

    #[test]
    fn display_rejected() {
        let err = DeliveryError::Rejected {
            attempts: 1,
            error: http_err(401),
        };
        assert_eq!(err.to_string(), "rejected on attempt 1: HTTP 401: test");
    }

    #[test]
    fn projection_has_no_attempts() {
        let err = DeliveryError::Projection(FieldError {
            field: "x".into(),
            error: EvalError::ZeroDivision,
        });
        assert_eq!(err.attempts(), 0);
        assert!(err.to_string().contains("division by zero"));
        assert!(!err.is_interrupted());
    }

    #[test]
    fn source_chain() {
        use std::error::Error;
        let err = DeliveryError::Rejected {
            attempts: 1,
            error: http_err(400),
        };
        assert!(err.source().is_some());
        assert!(DeliveryError::Interrupted { attempts: 0 }.source().is_none());
    }
}
