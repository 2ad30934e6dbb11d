// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Owns the [`LocationCache`] and keeps it in sync with the account's
//! topology document.
//!
//! A manager instance drives one long-lived background task that re-fetches
//! the topology on a fixed interval. A failed background fetch is logged and
//! retried on the next tick; it never takes the loop down. The retry layer
//! can also trigger an immediate refresh after a regional failure.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use url::Url;

use crate::cache::{AsyncCache, Factory};
use crate::http::{Method, Request, Transport};
use crate::location_cache::{LocationCache, OperationKind, Region};
use crate::models::AccountProperties;
use crate::{ClientOptions, Error, Result};

const ACCOUNT_CACHE_KEY: &str = "account";

/// See the module docs.
pub struct GlobalEndpointManager {
    transport: Arc<dyn Transport>,
    default_endpoint: Url,
    preferred_regions: Vec<String>,
    location_cache: LocationCache,
    refresh_interval: Duration,

    /// Single-flights concurrent topology fetches: a burst of failing
    /// requests all triggering refreshes results in one GET.
    account_cache: AsyncCache<&'static str, AccountProperties>,

    refresh_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl GlobalEndpointManager {
    pub fn new(transport: Arc<dyn Transport>, endpoint: Url, options: &ClientOptions) -> Self {
        Self {
            location_cache: LocationCache::new(endpoint.clone(), options),
            transport,
            default_endpoint: endpoint,
            preferred_regions: options.preferred_regions.clone(),
            refresh_interval: options.topology_refresh_interval,
            account_cache: AsyncCache::new(),
            refresh_task: Mutex::new(None),
        }
    }

    /// Spawns the periodic topology refresh task. Idempotent; the task runs
    /// until [`close`](Self::close) or drop.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.refresh_task.lock().unwrap();
        if slot.is_some() {
            return;
        }
        let manager = Arc::downgrade(self);
        let interval = self.refresh_interval;
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                if let Err(error) = manager.update().await {
                    tracing::warn!(%error, "background topology refresh failed");
                }
            }
        }));
    }

    /// Stops the background refresh task.
    pub fn close(&self) {
        if let Some(task) = self.refresh_task.lock().unwrap().take() {
            task.abort();
        }
    }

    /// Fetches and parses the account topology document.
    ///
    /// Concurrent callers share a single fetch.
    pub async fn account_properties(&self) -> Result<AccountProperties> {
        self.account_cache
            .get_async(ACCOUNT_CACHE_KEY, None, self.fetch_factory());
        self.account_cache.await_value(&ACCOUNT_CACHE_KEY).await
    }

    /// Fetches the topology document and applies it to the location cache.
    ///
    /// Used by the background loop on every tick and by the retry layer
    /// after a regional failure. Errors are surfaced to the caller.
    pub async fn update(&self) -> Result<()> {
        let properties = self.account_properties().await?;
        self.location_cache.update(
            &properties.write_regions,
            &properties.read_regions,
            &self.preferred_regions,
            properties.enable_multiple_write_locations,
        );
        self.location_cache.refresh_stale_endpoints();
        Ok(())
    }

    pub fn resolve_service_endpoint(
        &self,
        attempt: usize,
        op: OperationKind,
        force_write_endpoint: bool,
    ) -> Url {
        self.location_cache
            .resolve_service_endpoint(attempt, op, force_write_endpoint)
    }

    pub fn mark_endpoint_unavailable_for_read(&self, endpoint: &Url) {
        self.location_cache
            .mark_unavailable(endpoint, OperationKind::Read);
    }

    pub fn mark_endpoint_unavailable_for_write(&self, endpoint: &Url) {
        self.location_cache
            .mark_unavailable(endpoint, OperationKind::Write);
    }

    pub fn can_use_multiple_write_locations(&self) -> bool {
        self.location_cache.can_use_multiple_write_locations()
    }

    pub fn cross_region_retries_enabled(&self) -> bool {
        self.location_cache.cross_region_retries_enabled()
    }

    pub fn available_location_count(&self, op: OperationKind) -> usize {
        self.location_cache.available_location_count(op)
    }

    pub fn preferred_location_count(&self) -> usize {
        self.location_cache.preferred_location_count()
    }

    pub fn refresh_stale_endpoints(&self) {
        self.location_cache.refresh_stale_endpoints();
    }

    pub fn location_of(&self, endpoint: &Url) -> Option<Region> {
        self.location_cache.location_of(endpoint)
    }

    pub fn default_endpoint(&self) -> &Url {
        &self.default_endpoint
    }

    fn fetch_factory(&self) -> Factory<AccountProperties> {
        let transport = self.transport.clone();
        let endpoint = self.default_endpoint.clone();
        Arc::new(move || {
            let transport = transport.clone();
            let endpoint = endpoint.clone();
            async move {
                let request = Request::new(endpoint, Method::Get);
                let response = transport.send(&request).await?;
                if !response.status().is_success() {
                    return Err(Error::Service {
                        status: response.status(),
                        sub_status: response.sub_status(),
                    });
                }
                response.deserialize_body::<AccountProperties>()
            }
            .boxed()
        })
    }
}

impl Drop for GlobalEndpointManager {
    fn drop(&mut self) {
        self.close();
    }
}
