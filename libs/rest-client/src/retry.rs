//! Retry loop for single-mode requests.

use crate::config::ClientConfig;
use crate::context::ClientContext;
use crate::profiling::ProfilingEntry;
use crate::response::{QueueMode, Response};
use crate::transport::{PreparedRequest, Transport};
use std::time::{Duration, Instant};

/// How a single-mode request reacts to transport failures.
///
/// `retries_max` counts total attempts, so the default of 1 means no retry.
/// HTTP error statuses are responses, not failures, and are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries_max: u32,
    pub retry_delay: Duration,
    pub log_retries: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries_max: 1,
            retry_delay: Duration::from_millis(200),
            log_retries: false,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            retries_max: config.retries_max,
            retry_delay: config.retry_delay,
            log_retries: config.log_retries,
        }
    }

    /// Total attempts; at least one
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retries_max.max(1)
    }
}

/// Run `request` until it produces a response or the attempts run out.
///
/// Every failed attempt except the last is recorded in the profiling log
/// here; the caller records the final outcome. The attempt counter lives on
/// this call's stack, so concurrent calls never share it.
pub(crate) async fn execute_with_retry(
    transport: &dyn Transport,
    request: &PreparedRequest,
    policy: RetryPolicy,
    context: &ClientContext,
) -> Response {
    let url = request.url();
    let max_attempts = policy.max_attempts();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let start = Instant::now();
        let err = match transport.execute(request.clone()).await {
            Ok(raw) => return Response::from_raw(raw, QueueMode::Single),
            Err(err) => err,
        };
        let response = Response::from_error(url.as_str(), &err, start.elapsed(), QueueMode::Single);

        if attempt >= max_attempts {
            tracing::error!(
                attempts = attempt,
                error_code = %err.kind(),
                error = err.message(),
                url = %url,
                "max retries ({attempt}) reached"
            );
            return response;
        }

        context.log_profiling(ProfilingEntry::from_info(response.meta()));
        if policy.log_retries {
            tracing::warn!(
                attempt,
                max_attempts,
                error_code = %err.kind(),
                error = err.message(),
                url = %url,
                "retrying request"
            );
        }
        tokio::time::sleep(policy.retry_delay).await;
    }
}
