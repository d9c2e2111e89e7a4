//! REST and SSE client for the execution control plane

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;

use crate::error::ExecutionError;
use crate::types::{
    ExecutionHealth, ExecutionHistory, ExecutionStatus, ResumeRequest, ResumeResult,
    RollbackResult,
};

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable holding the API base URL
pub const API_BASE_ENV: &str = "AGENTWIRE_API_BASE";

/// Environment variable holding an optional bearer token
pub const API_TOKEN_ENV: &str = "AGENTWIRE_API_TOKEN";

/// Raw body chunks of a streaming response
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ExecutionError>>;

// ============================================================================
// Traits
// ============================================================================

/// Source of the bearer token sent with every request
///
/// Authentication lives outside this crate. Returning `None` sends the
/// request without an `Authorization` header.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Option<String>;
}

struct StaticToken(String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// The execution control endpoints
///
/// [`ExecutionClient`] is the HTTP implementation. The service only depends
/// on this trait, so tests can substitute an in-memory backend.
#[async_trait]
pub trait ExecutionApi: Send + Sync {
    /// `GET /api/execution/health`
    async fn health(&self) -> Result<ExecutionHealth, ExecutionError>;

    /// `GET /api/execution/status/{thread_id}`
    async fn status(&self, thread_id: &str) -> Result<ExecutionStatus, ExecutionError>;

    /// `GET /api/execution/history/{thread_id}?limit=N`
    async fn history(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<ExecutionHistory, ExecutionError>;

    /// `POST /api/execution/rollback/{thread_id}?checkpoint_id=ID`
    async fn rollback(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
    ) -> Result<RollbackResult, ExecutionError>;

    /// `POST /api/execution/resume`
    async fn resume(&self, request: &ResumeRequest) -> Result<ResumeResult, ExecutionError>;

    /// `POST /api/execution/resume-stream`, returning the raw body stream
    async fn resume_stream(&self, request: &ResumeRequest) -> Result<ByteStream, ExecutionError>;
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for the execution control API
#[derive(Clone)]
pub struct ExecutionClient {
    client: reqwest::Client,
    base_url: String,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl std::fmt::Debug for ExecutionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionClient")
            .field("base_url", &self.base_url)
            .field(
                "token_source",
                &self.token_source.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl ExecutionClient {
    /// Create a client for `base_url` without authentication
    pub fn new(base_url: impl Into<String>) -> Result<Self, ExecutionError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a client from `AGENTWIRE_API_BASE` and `AGENTWIRE_API_TOKEN`
    pub fn from_env() -> Result<Self, ExecutionError> {
        let base_url = std::env::var(API_BASE_ENV).map_err(|_| {
            ExecutionError::Configuration(format!("{} environment variable not set", API_BASE_ENV))
        })?;
        let mut builder = Self::builder().base_url(base_url);
        if let Ok(token) = std::env::var(API_TOKEN_ENV) {
            builder = builder.bearer_token(token);
        }
        builder.build()
    }

    /// Create a builder for more advanced configuration
    pub fn builder() -> ExecutionClientBuilder {
        ExecutionClientBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/execution/{}", self.base_url, path)
    }

    async fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, ExecutionError> {
        let token = match &self.token_source {
            Some(source) => source.token().await,
            None => None,
        };
        match token {
            Some(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                    ExecutionError::Configuration(format!("Invalid bearer token: {}", e))
                })?;
                Ok(request.header(AUTHORIZATION, value))
            }
            None => Ok(request),
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ExecutionError> {
        self.authorize(request)
            .await?
            .send()
            .await
            .map_err(ExecutionError::from_reqwest_error)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ExecutionError> {
        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::from_response_body(status.as_u16(), &body));
        }
        parse_body(response).await
    }
}

async fn parse_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ExecutionError> {
    response
        .json::<T>()
        .await
        .map_err(|e| ExecutionError::InvalidResponse(format!("Failed to parse response: {}", e)))
}

#[async_trait]
impl ExecutionApi for ExecutionClient {
    async fn health(&self) -> Result<ExecutionHealth, ExecutionError> {
        self.execute(self.client.get(self.url("health"))).await
    }

    async fn status(&self, thread_id: &str) -> Result<ExecutionStatus, ExecutionError> {
        let mut status: ExecutionStatus = self
            .execute(self.client.get(self.url(&format!("status/{}", thread_id))))
            .await?;
        if status.thread_id.is_empty() {
            status.thread_id = thread_id.to_string();
        }
        Ok(status)
    }

    async fn history(
        &self,
        thread_id: &str,
        limit: Option<usize>,
    ) -> Result<ExecutionHistory, ExecutionError> {
        let mut request = self.client.get(self.url(&format!("history/{}", thread_id)));
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }
        self.execute(request).await
    }

    async fn rollback(
        &self,
        thread_id: &str,
        checkpoint_id: &str,
    ) -> Result<RollbackResult, ExecutionError> {
        let request = self
            .client
            .post(self.url(&format!("rollback/{}", thread_id)))
            .query(&[("checkpoint_id", checkpoint_id)]);
        let response = self.send(request).await?;
        let status = response.status().as_u16();

        match status {
            200..=299 => parse_body(response).await,
            // Checkpoint missing, or the thread is in a state that forbids rollback.
            404 | 409 => {
                let body = response.text().await.unwrap_or_default();
                let message = match ExecutionError::from_response_body(status, &body) {
                    ExecutionError::Http { message, .. } => message,
                    other => other.to_string(),
                };
                log::warn!(
                    "Rollback of {} to {} refused: {}",
                    thread_id,
                    checkpoint_id,
                    message
                );
                Ok(RollbackResult {
                    success: false,
                    message,
                    thread_id: Some(thread_id.to_string()),
                    checkpoint_id: Some(checkpoint_id.to_string()),
                })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ExecutionError::from_response_body(status, &body))
            }
        }
    }

    async fn resume(&self, request: &ResumeRequest) -> Result<ResumeResult, ExecutionError> {
        self.execute(self.client.post(self.url("resume")).json(request))
            .await
    }

    async fn resume_stream(&self, request: &ResumeRequest) -> Result<ByteStream, ExecutionError> {
        let http_request = self
            .client
            .post(self.url("resume-stream"))
            .header("accept", "text/event-stream")
            .json(request);
        let response = self.send(http_request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::from_response_body(status.as_u16(), &body));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(ExecutionError::from_reqwest_error)
            })
            .boxed())
    }
}

/// Builder for [`ExecutionClient`]
///
/// `base_url` is required.
#[derive(Default)]
pub struct ExecutionClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl ExecutionClientBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Set the API base URL (without the `/api/execution` suffix)
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout
    ///
    /// Applies to the whole request, so streaming resumes that run longer
    /// than this are cut off.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Send a fixed bearer token
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token_source = Some(Arc::new(StaticToken(token.into())));
        self
    }

    /// Ask `source` for a token before every request
    pub fn token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ExecutionClient, ExecutionError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ExecutionError::Configuration("Base URL is required".to_string()))?;
        reqwest::Url::parse(&base_url).map_err(|e| {
            ExecutionError::Configuration(format!("Invalid base URL '{}': {}", base_url, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| {
                ExecutionError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(ExecutionClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_source: self.token_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_base_url() {
        let result = ExecutionClient::builder().build();
        assert!(matches!(
            result.unwrap_err(),
            ExecutionError::Configuration(_)
        ));
    }

    #[test]
    fn test_builder_rejects_invalid_url() {
        let result = ExecutionClient::new("not a url");
        assert!(matches!(
            result.unwrap_err(),
            ExecutionError::Configuration(_)
        ));
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let client = ExecutionClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(
            client.url("status/t-1"),
            "http://localhost:8000/api/execution/status/t-1"
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = ExecutionClient::builder()
            .base_url("http://localhost")
            .bearer_token("secret")
            .build()
            .unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_from_env_missing_base() {
        std::env::remove_var(API_BASE_ENV);
        let result = ExecutionClient::from_env();
        assert!(matches!(
            result.unwrap_err(),
            ExecutionError::Configuration(_)
        ));
    }
}

#[cfg(test)]
#[path = "wiremock_tests.rs"]
mod wiremock_tests;
