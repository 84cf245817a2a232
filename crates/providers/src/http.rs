//! Shared HTTP transport for the Messages-API backends.
//!
//! Posts one JSON body, retrying transient failures with exponential backoff,
//! and packages the last attempt as an [`ApiExchange`].

use std::time::Duration;

use backon::Retryable;
use deskpilot_core::error::ProviderError;
use deskpilot_core::provider::{ApiExchange, ApiRequestRecord, ApiResponseRecord, ProviderResponse};
use reqwest::header::HeaderMap;
use tracing::{debug, warn};

use crate::retry::{adjust_for_rate_limit, backoff_from};

const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// One failed attempt, with the response if the server answered.
#[derive(Debug)]
struct AttemptFailure {
    error: ProviderError,
    response: Option<ApiResponseRecord>,
}

pub(crate) struct HttpTransport {
    client: reqwest::Client,
    max_retries: usize,
    min_retry_delay: Duration,
}

impl HttpTransport {
    pub(crate) fn new(
        timeout: Duration,
        proxy: Option<&str>,
        max_retries: usize,
    ) -> Result<Self, ProviderError> {
        let mut builder = reqwest::Client::builder().timeout(timeout);
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ProviderError::NotConfigured(format!("invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries,
            min_retry_delay: Duration::from_secs(1),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_min_retry_delay(mut self, delay: Duration) -> Self {
        self.min_retry_delay = delay;
        self
    }

    /// POST `body` to `url` and parse the final response with `parse`.
    pub(crate) async fn post(
        &self,
        url: &str,
        headers: HeaderMap,
        body: serde_json::Value,
        parse: impl Fn(&str) -> Result<ProviderResponse, ProviderError>,
    ) -> ApiExchange {
        let request = ApiRequestRecord {
            method: "POST".into(),
            url: url.to_string(),
            body,
        };

        let outcome = (|| self.attempt(url, &headers, &request.body))
            .retry(backoff_from(self.min_retry_delay, self.max_retries))
            .when(|f: &AttemptFailure| f.error.is_transient())
            .adjust(|f: &AttemptFailure, dur| adjust_for_rate_limit(&f.error, dur))
            .notify(|f: &AttemptFailure, dur: Duration| {
                warn!(error = %f.error, delay_ms = dur.as_millis() as u64, "Retrying provider request");
            })
            .await;

        match outcome {
            Ok(response) => {
                let result = parse(&response.body);
                ApiExchange {
                    request,
                    response: Some(response),
                    result,
                }
            }
            Err(failure) => ApiExchange {
                request,
                response: failure.response,
                result: Err(failure.error),
            },
        }
    }

    async fn attempt(
        &self,
        url: &str,
        headers: &HeaderMap,
        body: &serde_json::Value,
    ) -> Result<ApiResponseRecord, AttemptFailure> {
        debug!(url, "Sending provider request");

        let response = self
            .client
            .post(url)
            .headers(headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptFailure {
                error: if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                },
                response: None,
            })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await.map_err(|e| AttemptFailure {
            error: ProviderError::Network(e.to_string()),
            response: None,
        })?;
        let record = ApiResponseRecord { status, body: text };

        let error = match status {
            200..=299 => return Ok(record),
            429 => ProviderError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            401 | 403 => ProviderError::AuthenticationFailed(error_message(&record.body)),
            _ => {
                warn!(status, body = %record.body, "Provider API error");
                ProviderError::Api {
                    status_code: status,
                    message: error_message(&record.body),
                }
            }
        };

        Err(AttemptFailure {
            error,
            response: Some(record),
        })
    }
}

/// Pull `error.message` out of an error body, falling back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}


#[cfg(test)]
mod tests {
    use super::*;

    fn ok_parse(body: &str) -> Result<ProviderResponse, ProviderError> {
        serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    fn transport(max_retries: usize) -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5), None, max_retries)
            .unwrap()
            .with_min_retry_delay(Duration::from_millis(1))
    }

    const OK_BODY: &str = r#"{"id":"msg_1","model":"claude","content":[{"type":"text","text":"hi"}]}"#;

    #[test]
    fn extracts_error_message() {
        let body = r#"{"type":"error","error":{"type":"invalid_request_error","message":"max_tokens too large"}}"#;
        assert_eq!(error_message(body), "max_tokens too large");
        assert_eq!(error_message("gateway exploded"), "gateway exploded");
    }

    #[test]
    fn invalid_proxy_is_rejected() {
        let result = HttpTransport::new(Duration::from_secs(1), Some("http://[::1"), 0);
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let (base, captured) = test_server::serve(vec![
            (529, r#"{"error":{"message":"overloaded"}}"#.into()),
            (200, OK_BODY.into()),
        ])
        .await;

        let exchange = transport(2)
            .post(&format!("{base}/v1/messages"), HeaderMap::new(), serde_json::json!({"a": 1}), ok_parse)
            .await;

        assert!(exchange.result.is_ok());
        assert_eq!(exchange.response.as_ref().map(|r| r.status), Some(200));
        assert_eq!(captured.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (base, captured) = test_server::serve(vec![
            (400, r#"{"error":{"message":"bad request"}}"#.into()),
            (200, OK_BODY.into()),
        ])
        .await;

        let exchange = transport(3)
            .post(&format!("{base}/v1/messages"), HeaderMap::new(), serde_json::json!({}), ok_parse)
            .await;

        match exchange.error() {
            Some(ProviderError::Api { status_code, message }) => {
                assert_eq!(*status_code, 400);
                assert_eq!(message, "bad request");
            }
            other => panic!("expected API error, got {other:?}"),
        }
        assert_eq!(exchange.response.as_ref().map(|r| r.status), Some(400));
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn auth_failure_maps_to_authentication_error() {
        let (base, _) = test_server::serve(vec![(401, r#"{"error":{"message":"invalid x-api-key"}}"#.into())]).await;
        let exchange = transport(0)
            .post(&format!("{base}/v1/messages"), HeaderMap::new(), serde_json::json!({}), ok_parse)
            .await;
        assert!(matches!(exchange.error(), Some(ProviderError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn unparseable_success_body_is_invalid_response() {
        let (base, _) = test_server::serve(vec![(200, "{not json".into())]).await;
        let exchange = transport(0)
            .post(&format!("{base}/v1/messages"), HeaderMap::new(), serde_json::json!({}), ok_parse)
            .await;
        assert!(matches!(exchange.error(), Some(ProviderError::InvalidResponse(_))));
        assert!(exchange.response.is_some());
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let exchange = transport(0)
            .post(&format!("http://{addr}/v1/messages"), HeaderMap::new(), serde_json::json!({}), ok_parse)
            .await;
        assert!(matches!(exchange.error(), Some(ProviderError::Network(_))));
        assert!(exchange.response.is_none());
    }
}
