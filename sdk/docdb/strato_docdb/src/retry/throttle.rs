// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::constants;
use crate::http::{Request, Response, StatusCode};
use crate::pipeline::RequestContext;
use crate::retry::{send_next, Policy};
use crate::{Result, ThrottleRetryOptions};

/// Waits out 429 responses.
///
/// A 429 is retried after the server-provided `retry-after` hint, until
/// either the attempt cap is reached or the cumulative wait would exceed the
/// configured budget; the 429 response is then returned to the caller
/// unchanged. An attempt cap of zero turns the policy into a pass-through.
pub struct ThrottleRetryPolicy {
    max_retry_attempts: u32,
    max_cumulative_wait: Duration,
}

impl ThrottleRetryPolicy {
    pub fn new(options: &ThrottleRetryOptions) -> Self {
        Self {
            max_retry_attempts: options.max_retry_attempts,
            max_cumulative_wait: options.max_cumulative_wait,
        }
    }
}

#[async_trait]
impl Policy for ThrottleRetryPolicy {
    async fn send(
        &self,
        ctx: &RequestContext,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> Result<Response> {
        if self.max_retry_attempts == 0 {
            return send_next(ctx, request, next).await;
        }

        let mut attempts = 0u32;
        let mut cumulative_wait = Duration::ZERO;
        loop {
            let response = send_next(ctx, request, next).await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            let delay = response
                .retry_after()
                .unwrap_or(constants::DEFAULT_THROTTLE_BACKOFF);
            if attempts >= self.max_retry_attempts
                || cumulative_wait + delay > self.max_cumulative_wait
            {
                tracing::debug!(
                    attempts,
                    ?cumulative_wait,
                    "throttle retries exhausted, returning 429"
                );
                return Ok(response);
            }

            tracing::debug!(attempts, ?delay, "throttled, backing off");
            tokio::time::sleep(delay).await;
            cumulative_wait += delay;
            attempts += 1;
        }
    }
}
