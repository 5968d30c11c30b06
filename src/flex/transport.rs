use async_trait::async_trait;
use thiserror::Error;

/// Raw reply from the statement service. Success or failure of the job is
/// signalled inside `body`, independently of `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: String,
}

impl RemoteResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Failure below the HTTP layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("response interrupted: {0}")]
    Interrupted(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Request(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_body() || err.is_decode() {
            TransportError::Interrupted(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// The two operations of the remote report-generation protocol
#[async_trait]
pub trait StatementTransport: Send + Sync {
    /// `SendRequest`: start generating the statement for `query_id`
    async fn send_request(
        &self,
        query_id: &str,
        token: &str,
    ) -> std::result::Result<RemoteResponse, TransportError>;

    /// `GetStatement`: fetch the statement generated under `reference`
    async fn get_statement(
        &self,
        reference: &str,
        token: &str,
    ) -> std::result::Result<RemoteResponse, TransportError>;
}
