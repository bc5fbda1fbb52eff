//! Shared HTTP client with bounded retry.
//!
//! Both the token endpoint and the GraphQL endpoint go through
//! [`execute_with_retry`], which retries transient failures (transport errors,
//! 429, 5xx) with exponential backoff and records each retry on the metrics
//! sink.

use std::time::Duration;

use reqwest::{Client, ClientBuilder, Request, Response, StatusCode};

use crate::core::metrics::RunMetrics;
use crate::error::{Result, UsageError};

/// Maximum number of retries after the initial attempt.
pub const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff between attempts.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Build a configured HTTP client.
///
/// The per-request timeout is the whole run's timeout budget; individual
/// stages never outlive it.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("xfinity-usage/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| UsageError::Config(format!("failed to build HTTP client: {e}")))
}

fn should_retry(result: &reqwest::Result<Response>) -> bool {
    match result {
        Ok(response) => {
            let status = response.status();
            status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        Err(e) => !e.is_builder() && !e.is_redirect(),
    }
}

/// Execute a request, retrying transient failures up to [`MAX_RETRIES`] times.
///
/// Returns the final response even when its status is non-2xx; callers are
/// responsible for mapping status codes into their own error category. Only
/// transport-level failures surface as `Err`.
pub async fn execute_with_retry(
    client: &Client,
    request: Request,
    metrics: &RunMetrics,
) -> reqwest::Result<Response> {
    let host = request
        .url()
        .host_str()
        .unwrap_or("unknown")
        .to_string();
    let method = request.method().as_str().to_string();

    let mut attempt: u32 = 0;
    loop {
        let Some(this_attempt) = request.try_clone() else {
            // Streaming bodies cannot be cloned; execute exactly once.
            return client.execute(request).await;
        };

        let result = client.execute(this_attempt).await;
        if attempt >= MAX_RETRIES || !should_retry(&result) {
            return result;
        }

        let status_code = result
            .as_ref()
            .map(|r| r.status().as_u16())
            .unwrap_or_default();
        metrics.record_retry(&host, &method, status_code);
        tracing::warn!(
            host = %host,
            method = %method,
            status_code,
            attempt,
            "http: retrying request"
        );

        tokio::time::sleep(RETRY_BASE_DELAY * 2u32.pow(attempt)).await;
        attempt += 1;
    }
}
