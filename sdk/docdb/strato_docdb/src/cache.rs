// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! A keyed value cache with single-flight recomputation.
//!
//! Each key holds at most one in-flight computation; concurrent callers
//! awaiting the same key observe the one shared computation instead of
//! starting duplicates. This is what keeps a burst of concurrently failing
//! requests from stampeding the account topology or partition range feeds
//! with identical refresh fetches.
//!
//! A caller that has already proven its copy of a value stale can pass it as
//! an *obsolete hint*: if a refresh completes with exactly that value, the
//! cache restarts the factory instead of handing back data the caller knows
//! is useless. The restart loop is bounded; when it trips, the final value is
//! stored anyway and [`Error::StillObsolete`] is returned.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::{Error, Result};

/// Number of automatic re-fetches tolerated when a refresh keeps matching
/// the caller's obsolete hint.
const DEFAULT_MAX_OBSOLETE_REFRESHES: usize = 3;

/// Produces one recomputation of a cached value. Stored so the cache can
/// restart the same computation when a refresh comes back obsolete.
pub type Factory<V> = Arc<dyn Fn() -> BoxFuture<'static, Result<V>> + Send + Sync>;

type SharedResult<V> = std::result::Result<V, Arc<Error>>;
type SharedComputation<V> = Shared<BoxFuture<'static, SharedResult<V>>>;

struct CacheEntry<V> {
    /// The in-flight computation, if any.
    pending: Option<SharedComputation<V>>,

    /// Outcome of the most recently completed computation.
    last: Option<SharedResult<V>>,

    /// Value the caller has proven stale; a refresh completing with exactly
    /// this value restarts the factory.
    obsolete: Option<V>,

    /// Factory to restart when a refresh comes back obsolete.
    factory: Option<Factory<V>>,

    /// Bumped whenever `pending` is replaced, so a waiter can tell whether
    /// the computation it awaited is still the current one.
    generation: u64,
}

impl<V> Default for CacheEntry<V> {
    fn default() -> Self {
        Self {
            pending: None,
            last: None,
            obsolete: None,
            factory: None,
            generation: 0,
        }
    }
}

/// A keyed single-flight value cache. See the module docs.
pub struct AsyncCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    max_obsolete_refreshes: usize,
}

impl<K, V> AsyncCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_obsolete_refreshes: DEFAULT_MAX_OBSOLETE_REFRESHES,
        }
    }

    /// Overrides the bound on automatic obsolete-hint re-fetches.
    pub fn with_max_obsolete_refreshes(mut self, max: usize) -> Self {
        self.max_obsolete_refreshes = max.max(1);
        self
    }

    /// Stores an already-computed value, unconditionally replacing any
    /// pending computation for the key.
    pub fn set_value(&self, key: K, value: V) {
        let mut entries = self.entries.lock().unwrap();
        let generation = entries.get(&key).map(|e| e.generation + 1).unwrap_or(0);
        entries.insert(
            key,
            CacheEntry {
                pending: None,
                last: Some(Ok(value)),
                obsolete: None,
                factory: None,
                generation,
            },
        );
    }

    /// Starts one computation of `factory`, stores it as the key's pending
    /// computation, and waits for it to complete.
    pub async fn set(&self, key: K, factory: Factory<V>) -> Result<V> {
        {
            let mut entries = self.entries.lock().unwrap();
            let computation = start_computation(&factory);
            let entry = entries.entry(key.clone()).or_default();
            entry.pending = Some(computation);
            entry.obsolete = None;
            entry.factory = Some(factory);
            entry.generation += 1;
        }
        self.await_value(&key).await
    }

    /// Returns the last completed value for the key without blocking.
    pub fn get_value(&self, key: &K) -> Option<Result<V>> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .and_then(|e| e.last.clone())
            .map(|r| r.map_err(Error::Cached))
    }

    /// Schedules a refresh of the key's value.
    ///
    /// If the key has no computation in flight, a new computation of
    /// `factory` is started eagerly. If one is already pending, only the
    /// recorded factory and obsolete hint are updated; the in-flight
    /// computation is left alone and [`await_value`](Self::await_value) will
    /// consult the new hint when it completes.
    pub fn get_async(&self, key: K, obsolete: Option<V>, factory: Factory<V>) {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key).or_default();
        if entry.pending.is_some() {
            // Leave the in-flight computation alone; the new factory and
            // hint take effect when a waiter picks up its result.
            entry.obsolete = obsolete;
            entry.factory = Some(factory);
        } else {
            entry.pending = Some(start_computation(&factory));
            entry.obsolete = obsolete;
            entry.factory = Some(factory);
            entry.generation += 1;
        }
    }

    /// Waits for the key's pending computation and returns its value, or
    /// returns the completed value immediately when nothing is pending.
    ///
    /// When the computation completes with exactly the recorded obsolete
    /// hint, the factory is restarted automatically (bounded; see module
    /// docs). Dropping the returned future never cancels the underlying
    /// computation: it stays available to other waiters.
    pub async fn await_value(&self, key: &K) -> Result<V> {
        let mut obsolete_attempts = 0usize;
        loop {
            let (computation, generation) = {
                let entries = self.entries.lock().unwrap();
                let Some(entry) = entries.get(key) else {
                    return Err(Error::CacheMiss);
                };
                match &entry.pending {
                    None => {
                        return entry
                            .last
                            .clone()
                            .map(|r| r.map_err(Error::Cached))
                            .unwrap_or(Err(Error::CacheMiss));
                    }
                    Some(pending) => (pending.clone(), entry.generation),
                }
            };

            let result = computation.await;

            let mut entries = self.entries.lock().unwrap();
            let Some(entry) = entries.get_mut(key) else {
                // Entry was removed while waiting; hand back what we got.
                return result.map_err(Error::Cached);
            };
            if entry.generation != generation {
                // Someone replaced the computation while we waited.
                continue;
            }

            match result {
                Err(error) => {
                    entry.pending = None;
                    entry.last = Some(Err(error.clone()));
                    return Err(Error::Cached(error));
                }
                Ok(value) => {
                    // The hint and factory recorded right now, not the ones
                    // seen before the wait: a get_async that raced in while
                    // the computation ran takes effect here.
                    if entry.obsolete.as_ref() == Some(&value) {
                        obsolete_attempts += 1;
                        if obsolete_attempts >= self.max_obsolete_refreshes {
                            entry.pending = None;
                            entry.last = Some(Ok(value));
                            entry.obsolete = None;
                            return Err(Error::StillObsolete {
                                attempts: obsolete_attempts,
                            });
                        }
                        // The refresh produced the value the caller already
                        // proved stale; restart the factory.
                        let Some(factory) = entry.factory.clone() else {
                            entry.pending = None;
                            entry.last = Some(Ok(value.clone()));
                            return Ok(value);
                        };
                        tracing::debug!(
                            attempt = obsolete_attempts,
                            "refresh returned obsolete value, restarting"
                        );
                        entry.pending = Some(start_computation(&factory));
                        entry.generation += 1;
                        continue;
                    }

                    entry.pending = None;
                    entry.last = Some(Ok(value.clone()));
                    entry.obsolete = None;
                    return Ok(value);
                }
            }
        }
    }

    /// Evicts the key outright, pending computation included.
    pub fn remove(&self, key: &K) {
        self.entries.lock().unwrap().remove(key);
    }

    /// Evicts every entry.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl<K, V> Default for AsyncCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Starts a computation and, when a runtime is available, drives it on a
/// detached task so it makes progress even if every waiter goes away.
fn start_computation<V>(factory: &Factory<V>) -> SharedComputation<V>
where
    V: Clone + Send + Sync + 'static,
{
    let shared = (factory)()
        .map(|result| result.map_err(Arc::new))
        .boxed()
        .shared();
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(shared.clone());
    }
    shared
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn set_value_then_get_value() {
        let cache: AsyncCache<String, String> = AsyncCache::new();
        cache.set_value("k".into(), "v".into());
        assert_eq!(cache.get_value(&"k".into()).unwrap().unwrap(), "v");
        assert!(cache.get_value(&"missing".into()).is_none());
    }

    #[tokio::test]
    async fn set_runs_factory_and_stores_value() {
        let cache: AsyncCache<String, String> = AsyncCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = {
            let calls = calls.clone();
            factory_of(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("fresh".to_string())
            })
        };

        let value = cache.set("k".into(), factory).await.unwrap();
        assert_eq!(value, "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get_value(&"k".into()).unwrap().unwrap(), "fresh");
    }

    #[tokio::test]
    async fn concurrent_waiters_share_one_computation() {
        let cache = Arc::new(AsyncCache::<String, String>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = {
            let calls = calls.clone();
            slow_factory_of(Duration::from_millis(50), move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("shared".to_string())
            })
        };

        cache.get_async("k".into(), None, factory);

        let a = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.await_value(&"k".to_string()).await })
        };
        let b = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.await_value(&"k".to_string()).await })
        };

        assert_eq!(a.await.unwrap().unwrap(), "shared");
        assert_eq!(b.await.unwrap().unwrap(), "shared");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn obsolete_hint_triggers_one_automatic_refetch() {
        let cache: AsyncCache<String, String> = AsyncCache::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = {
            let calls = calls.clone();
            factory_of(move || {
                // First fetch returns the stale value, the restart succeeds.
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Ok("stale".to_string()),
                    _ => Ok("fresh".to_string()),
                }
            })
        };

        cache.get_async("k".into(), Some("stale".into()), factory);
        let value = cache.await_value(&"k".to_string()).await.unwrap();

        assert_eq!(value, "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistently_obsolete_value_is_bounded() {
        let cache: AsyncCache<String, String> =
            AsyncCache::new().with_max_obsolete_refreshes(3);
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = {
            let calls = calls.clone();
            factory_of(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("stale".to_string())
            })
        };

        cache.get_async("k".into(), Some("stale".into()), factory);
        let err = cache.await_value(&"k".to_string()).await.unwrap_err();

        assert!(matches!(err, Error::StillObsolete { attempts: 3 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Final state wins: the stale value is still stored for readers.
        assert_eq!(cache.get_value(&"k".into()).unwrap().unwrap(), "stale");
    }

    #[tokio::test]
    async fn factory_error_replayed_to_waiters() {
        let cache = Arc::new(AsyncCache::<String, String>::new());
        let factory = factory_of(|| {
            Err(Error::InvalidPartitionKey("boom".into()))
        });

        cache.get_async("k".into(), None, factory);

        let a = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.await_value(&"k".to_string()).await })
        };
        let b = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.await_value(&"k".to_string()).await })
        };

        assert!(matches!(a.await.unwrap(), Err(Error::Cached(_))));
        assert!(matches!(b.await.unwrap(), Err(Error::Cached(_))));
        // The error is stored and replayed on later lookups too.
        assert!(matches!(
            cache.get_value(&"k".into()),
            Some(Err(Error::Cached(_)))
        ));
    }

    #[tokio::test]
    async fn await_value_without_entry_is_a_miss() {
        let cache: AsyncCache<String, String> = AsyncCache::new();
        assert!(matches!(
            cache.await_value(&"k".to_string()).await,
            Err(Error::CacheMiss)
        ));
    }

    #[tokio::test]
    async fn remove_evicts_entry() {
        let cache: AsyncCache<String, String> = AsyncCache::new();
        cache.set_value("k".into(), "v".into());
        cache.remove(&"k".to_string());
        assert!(cache.get_value(&"k".into()).is_none());
    }

    fn factory_of<F>(f: F) -> Factory<String>
    where
        F: Fn() -> Result<String> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Arc::new(move || {
            let f = f.clone();
            async move { f() }.boxed()
        })
    }

    fn slow_factory_of<F>(delay: Duration, f: F) -> Factory<String>
    where
        F: Fn() -> Result<String> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Arc::new(move || {
            let f = f.clone();
            async move {
                tokio::time::sleep(delay).await;
                f()
            }
            .boxed()
        })
    }
}
