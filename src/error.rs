use thiserror::Error;

/// Main error type for report jobs, parsing and health monitoring
#[derive(Error, Debug)]
pub enum FlexmonError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Missing configuration: {0}")]
    Configuration(String),

    // Report job errors
    #[error("Statement {reference} is still being generated")]
    NotReady { reference: String },

    #[error("Transport failure for {reference} after {attempts} attempts: {message}")]
    RetryableTransport {
        reference: String,
        attempts: u32,
        message: String,
    },

    #[error("Remote error: {message}")]
    RemoteFatal { message: String },

    #[error("Report {reference} timed out after {elapsed_secs}s (reference preserved, resume with a new wait)")]
    Timeout { reference: String, elapsed_secs: u64 },

    #[error("Submission already in flight for idempotency key {0}")]
    DuplicateSubmission(String),

    #[error("Wait for report {reference} was cancelled")]
    Cancelled { reference: String },

    // Document errors
    #[error("Malformed document: {0}")]
    Document(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl FlexmonError {
    /// Whether the same call may succeed later without resubmitting the job
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FlexmonError::NotReady { .. }
                | FlexmonError::RetryableTransport { .. }
                | FlexmonError::Timeout { .. }
        )
    }

    /// Reference code carried by the error, if any
    pub fn reference(&self) -> Option<&str> {
        match self {
            FlexmonError::NotReady { reference }
            | FlexmonError::RetryableTransport { reference, .. }
            | FlexmonError::Timeout { reference, .. }
            | FlexmonError::Cancelled { reference } => Some(reference),
            _ => None,
        }
    }
}

impl From<roxmltree::Error> for FlexmonError {
    fn from(err: roxmltree::Error) -> Self {
        FlexmonError::Document(err.to_string())
    }
}

/// Result type alias for FlexmonError
pub type Result<T> = std::result::Result<T, FlexmonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_carries_reference() {
        let err = FlexmonError::Timeout {
            reference: "1234567890".to_string(),
            elapsed_secs: 600,
        };
        assert!(err.to_string().contains("1234567890"));
        assert_eq!(err.reference(), Some("1234567890"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_remote_fatal_keeps_text_verbatim() {
        let err = FlexmonError::RemoteFatal {
            message: "Error 1020: Invalid request or unable to validate request.".to_string(),
        };
        assert!(err
            .to_string()
            .ends_with("Error 1020: Invalid request or unable to validate request."));
        assert!(!err.is_retryable());
    }
}
