use thiserror::Error;

use fleetstock_core::DomainError;

/// Engine operation error.
///
/// Domain failures pass through unchanged; everything else is an
/// infrastructure failure of the storage layer.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("storage lock poisoned")]
    LockPoisoned,

    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(err) => Some(err),
            _ => None,
        }
    }

    /// Stable machine-readable code for callers.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Domain(err) => err.code(),
            EngineError::Storage(_) | EngineError::LockPoisoned => "storage_error",
            EngineError::Serialization(_) => "serialization_error",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::Domain(err) => err.http_status(),
            _ => 500,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_mapping() {
        let err: EngineError = DomainError::not_found("order").into();
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.to_string(), "order not found");
        assert_eq!(EngineError::LockPoisoned.http_status(), 500);
    }
}
