// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Per-container session token bookkeeping.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{container_path, PartitionSessionToken, VectorSessionToken};
use crate::{PartitionKeyRangeId, ResourceId};

/// Tracks session tokens for every container the client has touched.
///
/// Tokens are keyed by the container's server-assigned resource id, with the
/// logical container path mapping onto it. When a path resolves to a new
/// resource id the container was recreated, and every token recorded for the
/// old incarnation is discarded.
#[derive(Debug, Default)]
pub struct SessionContainer {
    state: RwLock<SessionState>,
}

#[derive(Debug, Default)]
struct SessionState {
    rids_by_path: HashMap<String, ResourceId>,
    tokens_by_rid: HashMap<ResourceId, HashMap<PartitionKeyRangeId, String>>,
}

impl SessionContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every known partition token for the container addressed by
    /// `resource_address`, serialized as comma-separated `id:token` pairs.
    ///
    /// All partitions are returned: without a range lookup the container
    /// cannot know which physical partition a request's logical key maps to,
    /// so the union is the safe superset.
    pub fn get_session_token(&self, resource_address: &str) -> Option<String> {
        let path = container_path(resource_address)?;
        let state = self.state.read().unwrap();
        let rid = state.rids_by_path.get(&path)?;
        let tokens = state.tokens_by_rid.get(rid)?;
        if tokens.is_empty() {
            return None;
        }

        let mut pairs: Vec<String> = tokens
            .iter()
            .map(|(range_id, token)| format!("{}:{}", range_id.value(), token))
            .collect();
        // Sorted for deterministic output.
        pairs.sort();
        Some(pairs.join(","))
    }

    /// Records the session tokens a response carried for the container
    /// addressed by `resource_address`.
    ///
    /// Well-formed vector tokens merge with existing ones so progress is
    /// monotonic; opaque tokens overwrite; fragments without an `id:value`
    /// shape are skipped.
    pub fn set_session_token(
        &self,
        resource_address: &str,
        resource_id: &ResourceId,
        token: &str,
    ) {
        let Some(path) = container_path(resource_address) else {
            tracing::debug!(
                resource_address,
                "ignoring session token for non-container address"
            );
            return;
        };
        if token.trim().is_empty() {
            return;
        }

        let mut state = self.state.write().unwrap();
        match state.rids_by_path.get(&path).cloned() {
            Some(existing) if existing == *resource_id => {}
            Some(old) => {
                // The container behind this path was recreated; its old
                // tokens describe a resource that no longer exists.
                tracing::debug!(%path, %old, new = %resource_id, "container recreated, discarding session state");
                state.tokens_by_rid.remove(&old);
                state.rids_by_path.insert(path.clone(), resource_id.clone());
            }
            None => {
                state.rids_by_path.insert(path.clone(), resource_id.clone());
            }
        }

        let tokens = state.tokens_by_rid.entry(resource_id.clone()).or_default();
        for fragment in token.split(',') {
            let fragment = fragment.trim();
            if fragment.is_empty() {
                continue;
            }
            match fragment.parse::<PartitionSessionToken>() {
                Ok(parsed) => {
                    let value = match tokens
                        .get(&parsed.pkrange_id)
                        .and_then(|existing| existing.parse::<VectorSessionToken>().ok())
                    {
                        Some(existing) => match existing.merge(parsed.vector_token.clone()) {
                            Ok(merged) => merged.to_string(),
                            Err(error) => {
                                tracing::debug!(%error, "replacing unmergeable session token");
                                parsed.vector_token.to_string()
                            }
                        },
                        None => parsed.vector_token.to_string(),
                    };
                    tokens.insert(parsed.pkrange_id, value);
                }
                Err(_) => {
                    // Opaque token: keep it verbatim as long as it has the
                    // id:value shape; drop it silently otherwise.
                    match fragment.split_once(':') {
                        Some((id, value)) if !id.is_empty() && !value.is_empty() => {
                            tokens.insert(PartitionKeyRangeId::new(id), value.to_string());
                        }
                        _ => {
                            tracing::warn!(fragment, "skipping malformed session token fragment");
                        }
                    }
                }
            }
        }
    }

    /// Drops all session state for the container addressed by
    /// `resource_address`.
    pub fn clear_session_token(&self, resource_address: &str) {
        let Some(path) = container_path(resource_address) else {
            return;
        };
        let mut state = self.state.write().unwrap();
        if let Some(rid) = state.rids_by_path.remove(&path) {
            state.tokens_by_rid.remove(&rid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ITEM: &str = "dbs/db1/colls/c1/docs/item1";
    const CONTAINER: &str = "dbs/db1/colls/c1";

    fn rid(value: &str) -> ResourceId {
        ResourceId::new(value)
    }

    #[test]
    fn empty_container_has_no_token() {
        let container = SessionContainer::new();
        assert!(container.get_session_token(ITEM).is_none());
    }

    #[test]
    fn set_then_get_roundtrip() {
        let container = SessionContainer::new();
        container.set_session_token(ITEM, &rid("rid1"), "0:1#10,1:2#20");

        let token = container.get_session_token(CONTAINER).unwrap();
        assert!(token.contains("0:1#10"));
        assert!(token.contains("1:2#20"));
        assert!(token.contains(','));
    }

    #[test]
    fn item_and_container_addresses_share_state() {
        let container = SessionContainer::new();
        container.set_session_token(CONTAINER, &rid("rid1"), "0:1#10");
        assert!(container.get_session_token(ITEM).is_some());
    }

    #[test]
    fn resource_id_change_discards_old_tokens() {
        let container = SessionContainer::new();
        container.set_session_token(ITEM, &rid("rid1"), "0:1#10");
        container.set_session_token(ITEM, &rid("rid2"), "1:1#30");

        let token = container.get_session_token(ITEM).unwrap();
        assert_eq!(token, "1:1#30");
    }

    #[test]
    fn vector_tokens_merge_to_highest_progress() {
        let container = SessionContainer::new();
        container.set_session_token(ITEM, &rid("rid1"), "0:1#20");
        container.set_session_token(ITEM, &rid("rid1"), "0:1#10");

        // The older write's lower LSN must not regress the stored token.
        assert_eq!(container.get_session_token(ITEM).unwrap(), "0:1#20");
    }

    #[test]
    fn opaque_tokens_overwrite() {
        let container = SessionContainer::new();
        container.set_session_token(ITEM, &rid("rid1"), "0:opaque-a");
        container.set_session_token(ITEM, &rid("rid1"), "0:opaque-b");

        assert_eq!(container.get_session_token(ITEM).unwrap(), "0:opaque-b");
    }

    #[test]
    fn malformed_fragments_are_skipped() {
        let container = SessionContainer::new();
        container.set_session_token(ITEM, &rid("rid1"), "garbage,:nope,1:,0:1#10,");

        assert_eq!(container.get_session_token(ITEM).unwrap(), "0:1#10");
    }

    #[test]
    fn per_partition_entries_are_updated_independently() {
        let container = SessionContainer::new();
        container.set_session_token(ITEM, &rid("rid1"), "0:1#10,1:1#10");
        container.set_session_token(ITEM, &rid("rid1"), "1:1#50");

        let token = container.get_session_token(ITEM).unwrap();
        assert!(token.contains("0:1#10"));
        assert!(token.contains("1:1#50"));
    }

    #[test]
    fn clear_drops_all_state_for_path() {
        let container = SessionContainer::new();
        container.set_session_token(ITEM, &rid("rid1"), "0:1#10");
        container.clear_session_token(ITEM);
        assert!(container.get_session_token(ITEM).is_none());
    }

    #[test]
    fn containers_are_independent() {
        let container = SessionContainer::new();
        container.set_session_token("dbs/db1/colls/a/docs/x", &rid("ridA"), "0:1#10");
        container.set_session_token("dbs/db1/colls/b/docs/y", &rid("ridB"), "0:1#99");

        assert_eq!(
            container.get_session_token("dbs/db1/colls/a").unwrap(),
            "0:1#10"
        );
        assert_eq!(
            container.get_session_token("dbs/db1/colls/b").unwrap(),
            "0:1#99"
        );

        container.clear_session_token("dbs/db1/colls/a");
        assert!(container.get_session_token("dbs/db1/colls/a").is_none());
        assert!(container.get_session_token("dbs/db1/colls/b").is_some());
    }

    #[test]
    fn concurrent_readers_share_state() {
        use std::sync::Arc;
        use std::thread;

        let container = Arc::new(SessionContainer::new());
        container.set_session_token(ITEM, &rid("rid1"), "0:1#10");

        let clone = Arc::clone(&container);
        let handle = thread::spawn(move || clone.get_session_token(ITEM));

        let main_result = container.get_session_token(ITEM);
        let thread_result = handle.join().unwrap();
        assert_eq!(main_result, thread_result);
        assert!(main_result.is_some());
    }
}
