// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::constants;
use crate::global_endpoint_manager::GlobalEndpointManager;
use crate::http::{Request, Response, StatusCode};
use crate::location_cache::OperationKind;
use crate::pipeline::RequestContext;
use crate::retry::{send_next, Policy};
use crate::{FailoverRetryOptions, Result};

/// Regional failover retry policy.
///
/// Reacts to the failure classes that indicate a regional problem rather
/// than a bad request:
///
/// * 403 with a write-forbidden or account-not-found substatus, and
///   retryable transport errors: mark the attempted endpoint unavailable,
///   refresh the topology, and retry against the next resolved endpoint.
/// * 404 with a read-session-not-available substatus: retry once per region
///   available to the operation on multi-write accounts; on single-write
///   accounts retry exactly once, forced onto the write endpoint so the
///   read observes the latest write.
/// * 503: retry against the next preferred region, bounded by the number of
///   preferred regions.
///
/// Every other outcome is returned unmodified.
pub struct FailoverRetryPolicy {
    gem: Arc<GlobalEndpointManager>,
    options: FailoverRetryOptions,
}

/// Retry bookkeeping for one logical call.
///
/// Deliberately created fresh inside [`FailoverRetryPolicy::send`] for every
/// call: the policy object itself is shared across concurrent requests and
/// must stay stateless.
#[derive(Debug, Default)]
struct CallState {
    retry_count: usize,
    session_retry_count: usize,
    preferred_location_index: usize,
    use_write_endpoint: bool,
}

impl CallState {
    /// Index into the ordered endpoint list for the next attempt.
    fn attempt_index(&self) -> usize {
        self.retry_count + self.session_retry_count
    }
}

impl FailoverRetryPolicy {
    pub fn new(gem: Arc<GlobalEndpointManager>, options: &FailoverRetryOptions) -> Self {
        Self {
            gem,
            options: options.clone(),
        }
    }

    /// 403 substatus values that mean "this region cannot serve the
    /// request", as opposed to an authorization problem.
    fn is_endpoint_failure(response: &Response) -> bool {
        response.status() == StatusCode::FORBIDDEN
            && matches!(
                response.sub_status(),
                Some(constants::SUBSTATUS_WRITE_FORBIDDEN)
                    | Some(constants::SUBSTATUS_DATABASE_ACCOUNT_NOT_FOUND)
            )
    }

    fn is_session_unavailable(response: &Response) -> bool {
        response.status() == StatusCode::NOT_FOUND
            && response.sub_status() == Some(constants::SUBSTATUS_READ_SESSION_NOT_AVAILABLE)
    }

    async fn should_retry_endpoint_failure(
        &self,
        state: &mut CallState,
        ctx: &RequestContext,
        endpoint: &Url,
    ) -> bool {
        if !self.gem.cross_region_retries_enabled()
            || state.retry_count >= self.options.max_retry_attempts
        {
            return false;
        }

        match ctx.operation_kind {
            OperationKind::Write => self.gem.mark_endpoint_unavailable_for_write(endpoint),
            OperationKind::Read => self.gem.mark_endpoint_unavailable_for_read(endpoint),
        }

        // The retry loop can make progress on a stale map; a refresh failure
        // here must not turn a retryable failure into a terminal one.
        if let Err(error) = self.gem.update().await {
            tracing::warn!(%error, "topology refresh after endpoint failure failed");
        }

        if !self.options.backoff.is_zero() {
            tokio::time::sleep(self.options.backoff).await;
        }

        state.retry_count += 1;
        state.use_write_endpoint = false;
        true
    }

    fn should_retry_session_unavailable(
        &self,
        state: &mut CallState,
        ctx: &RequestContext,
    ) -> bool {
        let limit = if self.gem.can_use_multiple_write_locations() {
            self.gem.available_location_count(ctx.operation_kind)
        } else {
            1
        };
        if state.session_retry_count >= limit {
            return false;
        }
        if !self.gem.can_use_multiple_write_locations() {
            // The single retry goes to the write endpoint to pick up the
            // latest write before giving up.
            state.use_write_endpoint = true;
        }
        state.session_retry_count += 1;
        true
    }

    fn should_retry_service_unavailable(
        &self,
        state: &mut CallState,
        ctx: &RequestContext,
    ) -> bool {
        if !self.gem.cross_region_retries_enabled() {
            return false;
        }
        if ctx.operation_kind.is_write() && !self.gem.can_use_multiple_write_locations() {
            return false;
        }
        if state.preferred_location_index >= self.gem.preferred_location_count() {
            return false;
        }
        state.preferred_location_index += 1;
        state.retry_count += 1;
        true
    }
}

#[async_trait]
impl Policy for FailoverRetryPolicy {
    async fn send(
        &self,
        ctx: &RequestContext,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> Result<Response> {
        let mut state = CallState::default();
        loop {
            let endpoint = self.gem.resolve_service_endpoint(
                state.attempt_index(),
                ctx.operation_kind,
                state.use_write_endpoint,
            );
            request.set_endpoint(&endpoint);

            match send_next(ctx, request, next).await {
                Err(error) if error.is_retryable_transport() => {
                    tracing::debug!(%endpoint, %error, "transport failure, considering failover");
                    if !self
                        .should_retry_endpoint_failure(&mut state, ctx, &endpoint)
                        .await
                    {
                        return Err(error);
                    }
                }
                Err(error) => return Err(error),
                Ok(response) if Self::is_endpoint_failure(&response) => {
                    tracing::debug!(
                        %endpoint,
                        sub_status = ?response.sub_status(),
                        "endpoint refused operation, considering failover"
                    );
                    if !self
                        .should_retry_endpoint_failure(&mut state, ctx, &endpoint)
                        .await
                    {
                        return Ok(response);
                    }
                }
                Ok(response) if Self::is_session_unavailable(&response) => {
                    if !self.should_retry_session_unavailable(&mut state, ctx) {
                        return Ok(response);
                    }
                }
                Ok(response) if response.status() == StatusCode::SERVICE_UNAVAILABLE => {
                    if !self.should_retry_service_unavailable(&mut state, ctx) {
                        return Ok(response);
                    }
                }
                Ok(response) => return Ok(response),
            }
        }
    }
}
