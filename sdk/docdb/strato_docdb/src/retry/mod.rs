// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! The per-request retry pipeline.
//!
//! Two independent policies compose around the transport:
//!
//! * [`ThrottleRetryPolicy`] waits out 429 responses, bounded by an attempt
//!   cap and a cumulative wait budget.
//! * [`FailoverRetryPolicy`] reacts to regional failures (403/404/503 and
//!   retryable transport errors) by consulting the global endpoint manager
//!   and re-targeting the request at another regional endpoint.
//!
//! Policies form a chain: each one calls the next and inspects the outcome.
//! The last element of every chain is a [`TransportPolicy`] that hands the
//! request to the outbound HTTP collaborator.

mod failover;
mod throttle;

pub use failover::FailoverRetryPolicy;
pub use throttle::ThrottleRetryPolicy;

use std::sync::Arc;

use async_trait::async_trait;

use crate::http::{Request, Response, Transport};
use crate::pipeline::RequestContext;
use crate::Result;

/// One stage of the request pipeline.
#[async_trait]
pub trait Policy: Send + Sync {
    async fn send(
        &self,
        ctx: &RequestContext,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> Result<Response>;
}

/// Sends `request` through the remainder of the chain.
pub(crate) async fn send_next(
    ctx: &RequestContext,
    request: &mut Request,
    next: &[Arc<dyn Policy>],
) -> Result<Response> {
    next[0].send(ctx, request, &next[1..]).await
}

/// Terminal pipeline stage: hands the request to the transport.
pub struct TransportPolicy {
    transport: Arc<dyn Transport>,
}

impl TransportPolicy {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Policy for TransportPolicy {
    async fn send(
        &self,
        _ctx: &RequestContext,
        request: &mut Request,
        next: &[Arc<dyn Policy>],
    ) -> Result<Response> {
        debug_assert!(next.is_empty(), "transport policy must terminate the chain");
        self.transport.send(request).await
    }
}
