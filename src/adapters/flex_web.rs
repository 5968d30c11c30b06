//! Flex Web Service HTTP client.
//!
//! `GET {base}/FlexStatementService.SendRequest?t=&q=&v=` and
//! `GET {base}/FlexStatementService.GetStatement?t=&q=&v=`. Both return XML;
//! the body is handed back untouched together with the HTTP status.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::config::FlexConfig;
use crate::error::{FlexmonError, Result};
use crate::flex::{RemoteResponse, StatementTransport, TransportError};

const SEND_REQUEST: &str = "FlexStatementService.SendRequest";
const GET_STATEMENT: &str = "FlexStatementService.GetStatement";

pub struct FlexWebClient {
    http: Client,
    base_url: String,
    version: u32,
}

impl FlexWebClient {
    pub fn new(config: &FlexConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                FlexmonError::Internal(format!("failed to build Flex HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            version: config.version,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call(
        &self,
        operation: &str,
        code: &str,
        token: &str,
    ) -> std::result::Result<RemoteResponse, TransportError> {
        let url = format!("{}/{}", self.base_url, operation);
        debug!("GET {} (q={})", url, code);

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("t", token.to_string()),
                ("q", code.to_string()),
                ("v", self.version.to_string()),
            ])
            .send()
            .await?;

        let status = resp.status().as_u16();
        let body = resp.text().await?;

        Ok(RemoteResponse { status, body })
    }
}

#[async_trait]
impl StatementTransport for FlexWebClient {
    async fn send_request(
        &self,
        query_id: &str,
        token: &str,
    ) -> std::result::Result<RemoteResponse, TransportError> {
        self.call(SEND_REQUEST, query_id, token).await
    }

    async fn get_statement(
        &self,
        reference: &str,
        token: &str,
    ) -> std::result::Result<RemoteResponse, TransportError> {
        self.call(GET_STATEMENT, reference, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let config = FlexConfig {
            base_url: "https://example.test/Universal/servlet/".to_string(),
            ..Default::default()
        };
        let client = FlexWebClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "https://example.test/Universal/servlet");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_retryable() {
        let config = FlexConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            connect_timeout_secs: 1,
            request_timeout_secs: 2,
            ..Default::default()
        };
        let client = FlexWebClient::new(&config).unwrap();
        let err = client.send_request("123", "token").await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error class: {:?}", err);
    }
}
