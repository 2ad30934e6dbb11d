// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! The request pipeline: endpoint resolution, session bookkeeping, and the
//! retry policy chain, composed around the transport.
//!
//! One pipeline instance is shared by every client built on it; everything
//! specific to a single logical call travels in a [`RequestContext`] created
//! for that call.

use std::sync::Arc;

use crate::global_endpoint_manager::GlobalEndpointManager;
use crate::http::{Request, Response, StatusCode, Transport};
use crate::location_cache::OperationKind;
use crate::retry::{FailoverRetryPolicy, Policy, ThrottleRetryPolicy, TransportPolicy};
use crate::session::SessionContainer;
use crate::{constants, ClientOptions, Error, ResourceId, ResourceLink, Result};

/// Per-call request metadata threaded through the policy chain.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub operation_kind: OperationKind,
    pub resource_link: ResourceLink,
}

impl RequestContext {
    pub fn read(resource_link: ResourceLink) -> Self {
        Self {
            operation_kind: OperationKind::Read,
            resource_link,
        }
    }

    pub fn write(resource_link: ResourceLink) -> Self {
        Self {
            operation_kind: OperationKind::Write,
            resource_link,
        }
    }
}

/// See the module docs.
pub struct RequestPipeline {
    gem: Arc<GlobalEndpointManager>,
    session: Option<Arc<SessionContainer>>,
    policies: Vec<Arc<dyn Policy>>,
}

impl RequestPipeline {
    /// Builds the policy chain `[failover, throttle, transport]`.
    ///
    /// `session` is the session container to consult around every request;
    /// pass `None` when the effective consistency level does not use
    /// session tokens.
    pub fn new(
        transport: Arc<dyn Transport>,
        gem: Arc<GlobalEndpointManager>,
        session: Option<Arc<SessionContainer>>,
        options: &ClientOptions,
    ) -> Self {
        let policies: Vec<Arc<dyn Policy>> = vec![
            Arc::new(FailoverRetryPolicy::new(gem.clone(), &options.failover_retry)),
            Arc::new(ThrottleRetryPolicy::new(&options.throttle_retry)),
            Arc::new(TransportPolicy::new(transport)),
        ];
        Self {
            gem,
            session,
            policies,
        }
    }

    /// The URL of `link` on the account's default endpoint. The failover
    /// policy re-targets the host per attempt.
    pub fn url(&self, link: &ResourceLink) -> url::Url {
        link.url(self.gem.default_endpoint())
    }

    pub fn endpoint_manager(&self) -> &Arc<GlobalEndpointManager> {
        &self.gem
    }

    /// Sends `request` through the policy chain.
    ///
    /// Reads get the container's cached session token attached unless the
    /// caller already supplied one. A successful response has its session
    /// headers captured back into the container; any other response clears
    /// the container's token so a retry is not pinned to a possibly-wrong
    /// one. Non-success responses surface as [`Error::Service`].
    pub async fn send(&self, ctx: &RequestContext, request: &mut Request) -> Result<Response> {
        if let Some(session) = &self.session {
            if !ctx.operation_kind.is_write()
                && request.headers().get(constants::SESSION_TOKEN).is_none()
            {
                if let Some(token) = session.get_session_token(ctx.resource_link.path()) {
                    request.insert_header(constants::SESSION_TOKEN, token);
                }
            }
        }

        let response = self.policies[0]
            .send(ctx, request, &self.policies[1..])
            .await?;

        let succeeded =
            response.status().is_success() || response.status() == StatusCode::NOT_MODIFIED;

        if let Some(session) = &self.session {
            if succeeded {
                self.capture_session_token(ctx, &response);
            } else {
                session.clear_session_token(ctx.resource_link.path());
            }
        }

        if succeeded {
            Ok(response)
        } else {
            Err(Error::Service {
                status: response.status(),
                sub_status: response.sub_status(),
            })
        }
    }

    /// Merges a response's session/resource-id/address headers into the
    /// session container.
    fn capture_session_token(&self, ctx: &RequestContext, response: &Response) {
        let Some(session) = &self.session else {
            return;
        };
        let Some(token) = response.session_token() else {
            return;
        };
        let Some(resource_id) = response.resource_id() else {
            tracing::debug!("response carried a session token but no resource id, ignoring");
            return;
        };
        let address = response
            .alt_content_path()
            .unwrap_or_else(|| ctx.resource_link.path());
        session.set_session_token(address, &ResourceId::new(resource_id), token);
    }
}
