//! HTTP client for services that hand tasks to a relay gateway.

use std::time::Duration;

use {
    relay_protocol::{ApiResponse, ResponseStatus, TaskRequest, TaskResponse},
    reqwest::{Client, StatusCode, Url},
    tracing::debug,
};

/// Leaves room for the gateway's own 5 s task timeout to answer first.
pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid gateway url '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with an error body (or a non-JSON rejection).
    #[error("gateway returned {status}: {message}")]
    Rejected { status: StatusCode, message: String },
}

/// Bearer-authenticated client for `POST /enqueue_task` and `GET /ping`.
pub struct GatewayClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl GatewayClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, api_key, DEFAULT_CLIENT_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|source| ClientError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("relay-client/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|source| ClientError::InvalidUrl {
                url: format!("{}{path}", self.base_url),
                source,
            })
    }

    /// Liveness check; needs no credentials.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let response = self.client.get(self.url("/ping")?).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Rejected {
                status,
                message: response.text().await?,
            });
        }
        Ok(())
    }

    /// Submit a task and wait for its result.
    pub async fn enqueue_task(&self, request: &TaskRequest) -> Result<TaskResponse, ClientError> {
        let url = self.url("/enqueue_task")?;
        debug!(%url, task = %request.task, "enqueue task");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        match serde_json::from_str::<ApiResponse>(&body) {
            Ok(ApiResponse {
                status: ResponseStatus::Success,
                task: Some(task),
                ..
            }) if status.is_success() => Ok(task),
            Ok(api) => Err(ClientError::Rejected {
                status,
                message: api.error.unwrap_or_else(|| "unknown error".to_string()),
            }),
            Err(_) => Err(ClientError::Rejected {
                status,
                message: body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_base_url() {
        let err = GatewayClient::new("not a url", "key").unwrap_err();
        assert!(matches!(err, ClientError::InvalidUrl { .. }));
    }

    #[test]
    fn endpoint_urls_join_the_base() {
        let client = GatewayClient::new("http://127.0.0.1:5000/", "key").unwrap();
        assert_eq!(
            client.url("/enqueue_task").unwrap().as_str(),
            "http://127.0.0.1:5000/enqueue_task"
        );
    }

    #[test]
    fn debug_hides_the_key() {
        let client = GatewayClient::new("http://127.0.0.1:5000", "super-secret-key").unwrap();
        let out = format!("{client:?}");
        assert!(!out.contains("super-secret-key"));
        assert!(out.contains("REDACTED"));
    }
}
