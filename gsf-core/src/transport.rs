//! How forecast requests reach the service.

use crate::error::FetchError;
use crate::forecast::{ForecastRequest, ForecastResponse};
use async_trait::async_trait;

/// Sends one forecast request and returns the decoded response.
#[async_trait]
pub trait ForecastTransport: Send + Sync {
    async fn post(&self, request: &ForecastRequest) -> Result<ForecastResponse, FetchError>;
}

#[cfg(feature = "api")]
pub use http::HttpTransport;

#[cfg(feature = "api")]
mod http {
    use super::ForecastTransport;
    use crate::error::FetchError;
    use crate::forecast::{ForecastConfig, ForecastRequest, ForecastResponse};
    use async_trait::async_trait;
    use log::debug;

    /// JSON over HTTPS with a fixed request timeout.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
        endpoint: String,
    }

    impl HttpTransport {
        pub fn new(config: &ForecastConfig) -> Result<Self, FetchError> {
            let client = reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            Ok(Self {
                client,
                endpoint: config.endpoint.clone(),
            })
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }
    }

    fn transport_error(e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(e.to_string())
        }
    }

    #[async_trait]
    impl ForecastTransport for HttpTransport {
        async fn post(&self, request: &ForecastRequest) -> Result<ForecastResponse, FetchError> {
            debug!("POST {} at {}", self.endpoint, request.timestamp);
            let response = self
                .client
                .post(&self.endpoint)
                .json(request)
                .send()
                .await
                .map_err(transport_error)?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            let body = response.text().await.map_err(transport_error)?;
            serde_json::from_str(&body).map_err(|e| FetchError::Payload(e.to_string()))
        }
    }

}
