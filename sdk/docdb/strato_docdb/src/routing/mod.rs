// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Partition routing: mapping item identities onto the physical partition
//! key ranges that own them.
//!
//! The [`PartitionKeyRangeCache`] keeps each container's range map fresh
//! without re-fetching it per request; [`read_many`] turns flat lists of
//! item identities into one bounded parameterized query per owning range.

pub mod read_many;

pub use read_many::*;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::FutureExt;

use crate::cache::{AsyncCache, Factory};
use crate::http::{Method, Request};
use crate::models::{PartitionKeyRange, PartitionKeyRangeResult};
use crate::pipeline::{RequestContext, RequestPipeline};
use crate::resource_context::{ResourceLink, ResourceType};
use crate::Result;

/// Fetches the partition key range feed of a container.
#[async_trait]
pub trait PartitionKeyRangeFetcher: Send + Sync {
    async fn fetch_partition_key_ranges(
        &self,
        container: &ResourceLink,
    ) -> Result<PartitionKeyRangeResult>;
}

/// A [`PartitionKeyRangeFetcher`] that issues `GET {container}/pkranges`
/// through the request pipeline.
pub struct PipelinePartitionKeyRangeFetcher {
    pipeline: Arc<RequestPipeline>,
}

impl PipelinePartitionKeyRangeFetcher {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl PartitionKeyRangeFetcher for PipelinePartitionKeyRangeFetcher {
    async fn fetch_partition_key_ranges(
        &self,
        container: &ResourceLink,
    ) -> Result<PartitionKeyRangeResult> {
        let link = container.feed(ResourceType::PartitionKeyRanges);
        let mut request = Request::new(self.pipeline.url(&link), Method::Get);
        let response = self
            .pipeline
            .send(&RequestContext::read(link), &mut request)
            .await?;
        response.deserialize_body()
    }
}

/// One fetched generation of a container's range map.
#[derive(Clone, Debug)]
pub struct RangeMapSnapshot {
    pub resource_id: String,
    pub ranges: Arc<Vec<PartitionKeyRange>>,
    fetched_at: Instant,
}

impl RangeMapSnapshot {
    pub fn new(resource_id: impl Into<String>, ranges: Vec<PartitionKeyRange>) -> Self {
        Self {
            resource_id: resource_id.into(),
            ranges: Arc::new(ranges),
            fetched_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

// Two snapshots carrying the same data are the same generation, no matter
// when they were fetched; the obsolete-hint comparison depends on this.
impl PartialEq for RangeMapSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.resource_id == other.resource_id && self.ranges == other.ranges
    }
}

/// Caches each container's partition key range map. See the module docs.
pub struct PartitionKeyRangeCache {
    fetcher: Arc<dyn PartitionKeyRangeFetcher>,
    cache: AsyncCache<String, RangeMapSnapshot>,
}

impl PartitionKeyRangeCache {
    pub fn new(fetcher: Arc<dyn PartitionKeyRangeFetcher>) -> Self {
        Self {
            fetcher,
            cache: AsyncCache::new(),
        }
    }

    /// Whether the cached map for `container` is missing or older than
    /// `max_age`.
    pub fn needs_refresh(&self, container: &ResourceLink, max_age: Duration) -> bool {
        match self.cache.get_value(&container.path().to_string()) {
            Some(Ok(snapshot)) => snapshot.age() > max_age,
            _ => true,
        }
    }

    /// Returns the cached map, refreshing it first when stale.
    pub async fn ranges(
        &self,
        container: &ResourceLink,
        max_age: Duration,
    ) -> Result<RangeMapSnapshot> {
        if !self.needs_refresh(container, max_age) {
            if let Some(cached) = self.cache.get_value(&container.path().to_string()) {
                return cached;
            }
        }
        self.refresh(container, None).await
    }

    /// Replaces the map for `container` from a fresh server fetch.
    ///
    /// `known_stale` is the snapshot the caller has proven stale (an
    /// effective partition key resolved to no range in it); when the fetch
    /// comes back identical, the underlying single-flight cache re-fetches
    /// a bounded number of times before giving up.
    pub async fn refresh(
        &self,
        container: &ResourceLink,
        known_stale: Option<&RangeMapSnapshot>,
    ) -> Result<RangeMapSnapshot> {
        let key = container.path().to_string();
        self.cache
            .get_async(key.clone(), known_stale.cloned(), self.fetch_factory(container));
        self.cache.await_value(&key).await
    }

    fn fetch_factory(&self, container: &ResourceLink) -> Factory<RangeMapSnapshot> {
        let fetcher = self.fetcher.clone();
        let container = container.clone();
        Arc::new(move || {
            let fetcher = fetcher.clone();
            let container = container.clone();
            async move {
                let result = fetcher.fetch_partition_key_ranges(&container).await?;
                tracing::debug!(
                    container = container.path(),
                    ranges = result.ranges.len(),
                    "partition key range map fetched"
                );
                Ok(RangeMapSnapshot::new(result.resource_id, result.ranges))
            }
            .boxed()
        })
    }
}

/// Finds the range whose half-open interval contains `epk`.
///
/// `None` means the cached map no longer tiles the hash space where this key
/// lands (a split or merge happened); callers must refresh and re-resolve
/// rather than fail.
pub fn find_range_for_epk<'r>(
    epk: &str,
    ranges: &'r [PartitionKeyRange],
) -> Option<&'r PartitionKeyRange> {
    ranges.iter().find(|range| range.contains(epk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub(crate) fn range(id: &str, min: &str, max: &str) -> PartitionKeyRange {
        PartitionKeyRange {
            id: id.to_string(),
            min_inclusive: min.to_string(),
            max_exclusive: max.to_string(),
            ..Default::default()
        }
    }

    fn container() -> ResourceLink {
        ResourceLink::database("d").container("c")
    }

    pub(crate) struct ScriptedFetcher {
        results: Mutex<Vec<PartitionKeyRangeResult>>,
        pub(crate) fetches: AtomicUsize,
    }

    impl ScriptedFetcher {
        pub(crate) fn new(results: Vec<PartitionKeyRangeResult>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results),
                fetches: AtomicUsize::new(0),
            })
        }

        pub(crate) fn repeating(result: PartitionKeyRangeResult) -> Arc<Self> {
            Self::new(vec![result; 8])
        }
    }

    #[async_trait]
    impl PartitionKeyRangeFetcher for ScriptedFetcher {
        async fn fetch_partition_key_ranges(
            &self,
            _container: &ResourceLink,
        ) -> Result<PartitionKeyRangeResult> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock().unwrap();
            Ok(results.remove(0))
        }
    }

    pub(crate) fn feed(ranges: Vec<PartitionKeyRange>) -> PartitionKeyRangeResult {
        PartitionKeyRangeResult {
            resource_id: "rid1".to_string(),
            ranges,
        }
    }

    #[test]
    fn find_range_min_inclusive_boundary() {
        let ranges = vec![range("0", "", "80"), range("1", "80", "FF")];
        assert_eq!(find_range_for_epk("80", &ranges).unwrap().id, "1");
        assert_eq!(find_range_for_epk("7F", &ranges).unwrap().id, "0");
        assert_eq!(find_range_for_epk("", &ranges).unwrap().id, "0");
        assert_eq!(find_range_for_epk("FE", &ranges).unwrap().id, "1");
    }

    #[test]
    fn find_range_not_found_outside_map() {
        let ranges = vec![range("0", "", "40")];
        assert!(find_range_for_epk("41", &ranges).is_none());
    }

    #[tokio::test]
    async fn ranges_fetches_once_while_fresh() {
        let fetcher = ScriptedFetcher::repeating(feed(vec![range("0", "", "FF")]));
        let cache = PartitionKeyRangeCache::new(fetcher.clone());

        let first = cache
            .ranges(&container(), Duration::from_secs(60))
            .await
            .unwrap();
        let second = cache
            .ranges(&container(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_max_age_always_refreshes() {
        let fetcher = ScriptedFetcher::repeating(feed(vec![range("0", "", "FF")]));
        let cache = PartitionKeyRangeCache::new(fetcher.clone());

        cache.ranges(&container(), Duration::ZERO).await.unwrap();
        cache.ranges(&container(), Duration::ZERO).await.unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn needs_refresh_is_true_for_unknown_container() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let cache = PartitionKeyRangeCache::new(fetcher);
        assert!(cache.needs_refresh(&container(), Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn forced_refresh_with_stale_hint_refetches_until_map_changes() {
        let stale = feed(vec![range("0", "", "FF")]);
        let split = feed(vec![range("1", "", "80"), range("2", "80", "FF")]);
        let fetcher = ScriptedFetcher::new(vec![stale.clone(), stale.clone(), split]);
        let cache = PartitionKeyRangeCache::new(fetcher.clone());

        let known_stale = cache
            .ranges(&container(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(known_stale.ranges.len(), 1);

        // The first re-fetch returns the same map; the cache re-fetches on
        // its own until the split shows up.
        let refreshed = cache
            .refresh(&container(), Some(&known_stale))
            .await
            .unwrap();
        assert_eq!(refreshed.ranges.len(), 2);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 3);
    }
}
