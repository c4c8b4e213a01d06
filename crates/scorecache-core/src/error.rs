use thiserror::Error;

/// Core error types for scorecache operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid match date: {0}")]
    InvalidDate(String),

    #[error("Invalid origin payload: {message}")]
    InvalidPayload { message: String },

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Time formatting error: {0}")]
    TimeFormat(#[from] time::error::Format),
}

impl CoreError {
    /// Create a new InvalidDate error
    pub fn invalid_date(date: impl Into<String>) -> Self {
        Self::InvalidDate(date.into())
    }

    /// Create a new InvalidPayload error
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Failure reported by the upstream sports-data provider.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("origin rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("origin returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("origin transport error: {0}")]
    Transport(String),

    #[error("origin payload rejected: {0}")]
    Payload(#[from] CoreError),
}

impl OriginError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Short label used as a metric/log dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Status { .. } => "status",
            Self::Transport(_) => "transport",
            Self::Payload(_) => "payload",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_formats() {
        let err = CoreError::invalid_date("2025-13-40");
        assert_eq!(err.to_string(), "Invalid match date: 2025-13-40");

        let err = OriginError::status(503, "maintenance");
        assert_eq!(err.to_string(), "origin returned status 503: maintenance");
        assert_eq!(err.kind(), "status");
    }

    #[test]
    fn test_payload_error_wraps_core_error() {
        let err: OriginError = CoreError::invalid_payload("expected object").into();
        assert!(matches!(err, OriginError::Payload(_)));
        assert!(err.to_string().contains("expected object"));
        assert_eq!(err.kind(), "payload");
    }
}
