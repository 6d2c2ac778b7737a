use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use super::dispatch::with_tool_dispatch;
use crate::errors::{ProviderError, ProviderResult};
use crate::stream::sse::response_events;
use crate::stream::{normalize, ApiStream, StreamNormalizer};
use crate::tool_router::catalog::register_catalog;
use crate::tool_router::ToolRouter;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(600); // 10 minutes

pub fn http_client() -> ProviderResult<Client> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Fail construction when a required credential is absent or blank
pub fn require(value: &str, what: &str, vendor: &str) -> ProviderResult<()> {
    if value.trim().is_empty() {
        return Err(ProviderError::configuration(format!(
            "{} is required for {}",
            what, vendor
        )));
    }
    Ok(())
}

/// Pass 2xx responses through; anything else becomes a `VendorHttp` error with the body.
pub async fn check_status(response: Response, vendor: &str) -> ProviderResult<Response> {
    match response.status() {
        status if status.is_success() => Ok(response),
        status => {
            let body = response.text().await.unwrap_or_default();
            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    tracing::warn!("{} rate limited the request", vendor)
                }
                status if status.is_server_error() => {
                    tracing::warn!("{} server error: {}", vendor, status)
                }
                _ => tracing::debug!("{} rejected the request: {}", vendor, status),
            }
            Err(ProviderError::VendorHttp {
                vendor: vendor.to_string(),
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Frame, normalize and dispatch tool calls for a streaming response
pub fn stream_response<N>(
    response: Response,
    vendor: &'static str,
    normalizer: N,
    router: Arc<dyn ToolRouter>,
) -> ApiStream
where
    N: StreamNormalizer + 'static,
{
    with_tool_dispatch(normalize(response_events(response, vendor), normalizer), router)
}

/// Make the tool catalog known to `router`. Handlers call this once at construction.
pub fn register_tools(router: &Arc<dyn ToolRouter>) {
    register_catalog(router.as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_require() {
        assert!(require("key", "API key", "OpenAI").is_ok());
        let err = require("  ", "API key", "OpenAI").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: API key is required for OpenAI"
        );
    }

    #[tokio::test]
    async fn test_check_status_keeps_body() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let response = http_client()?.get(server.uri()).send().await?;
        match check_status(response, "Mistral").await {
            Err(ProviderError::VendorHttp {
                vendor,
                status,
                body,
            }) => {
                assert_eq!(vendor, "Mistral");
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("expected VendorHttp, got {:?}", other.map(|r| r.status())),
        }
        Ok(())
    }
}
