use std::sync::Arc;
use std::time::Duration;

use super::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::core::FetchExhaustedError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait `n * backoff_step` after the n-th failed attempt.
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }
}

/// Bounded retry around a single read. Never use this for submissions.
#[derive(Clone)]
pub struct RetryableFetchClient {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
}

impl RetryableFetchClient {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Retries on transport errors and 5xx. Any other response, 4xx included,
    /// is returned to the caller as-is.
    pub async fn fetch(&self, request: HttpRequest) -> Result<HttpResponse, FetchExhaustedError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.transport.execute(request.clone()).await {
                Ok(response) if !response.status.is_server_error() => return Ok(response),
                Ok(response) => {
                    last_error = format!("server error {}", response.status);
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                let wait = self.policy.backoff_step * attempt;
                tracing::warn!(
                    "🔁 {} {} failed (attempt {}/{}): {} - retrying in {:?}",
                    request.method,
                    request.url,
                    attempt,
                    attempts,
                    last_error,
                    wait
                );
                tokio::time::sleep(wait).await;
            }
        }

        Err(FetchExhaustedError {
            url: request.url,
            attempts,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::MockHttpTransport;
    use crate::core::TransportError;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_step: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_recovers_after_two_server_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut transport = MockHttpTransport::new();
        transport.expect_execute().times(3).returning(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Ok(HttpResponse::new(StatusCode::SERVICE_UNAVAILABLE, ""))
            } else {
                Ok(HttpResponse::new(StatusCode::OK, r#"{"data":[]}"#))
            }
        });

        let client = RetryableFetchClient::new(Arc::new(transport), fast_policy());
        let response = client.fetch(HttpRequest::get("http://feed.test")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(StatusCode::NOT_FOUND, "missing")));

        let client = RetryableFetchClient::new(Arc::new(transport), fast_policy());
        let response = client.fetch(HttpRequest::get("http://feed.test")).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_last_error() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(3)
            .returning(|_| Err(TransportError::Timeout("deadline elapsed".to_string())));

        let client = RetryableFetchClient::new(Arc::new(transport), fast_policy());
        let err = client
            .fetch(HttpRequest::get("http://feed.test"))
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 3);
        assert_eq!(err.url, "http://feed.test");
        assert!(err.last_error.contains("deadline elapsed"));
    }

    #[tokio::test]
    async fn test_backoff_is_linear() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_execute()
            .times(3)
            .returning(|_| Ok(HttpResponse::new(StatusCode::BAD_GATEWAY, "")));

        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_step: Duration::from_millis(20),
        };
        let client = RetryableFetchClient::new(Arc::new(transport), policy);

        let started = std::time::Instant::now();
        assert!(client.fetch(HttpRequest::get("http://feed.test")).await.is_err());

        // 20ms after the first failure, 40ms after the second.
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
