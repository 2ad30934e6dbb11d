// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Turns a flat list of item identities into one bounded parameterized
//! query per owning physical partition.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{PartitionKeyDefinition, PartitionKeyRange};
use crate::partition_key::PartitionKey;
use crate::query::Query;
use crate::resource_context::ResourceLink;
use crate::routing::{find_range_for_epk, PartitionKeyRangeCache, RangeMapSnapshot};
use crate::{ClientOptions, Error, Result};

/// Computes the effective partition key of a logical partition key.
///
/// Owned by the partitioning layer of the SDK, not by this crate; routing
/// only consumes it. Implementations reject malformed keys (wrong component
/// count, nested arrays, non-empty objects).
pub trait EffectivePartitionKeyHasher: Send + Sync {
    fn effective_partition_key(
        &self,
        partition_key: &PartitionKey,
        definition: &PartitionKeyDefinition,
    ) -> Result<String>;
}

/// An item id paired with its logical partition key.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemIdentity {
    pub id: String,
    pub partition_key: PartitionKey,
}

impl ItemIdentity {
    pub fn new(id: impl Into<String>, partition_key: impl Into<PartitionKey>) -> Self {
        Self {
            id: id.into(),
            partition_key: partition_key.into(),
        }
    }
}

/// Item identities bucketed by the physical range that owns them.
#[derive(Debug, Default)]
pub struct GroupedItems {
    by_range: HashMap<String, Vec<ItemIdentity>>,

    /// Range ids in first-seen order, for deterministic query issuance.
    range_order: Vec<String>,
}

impl GroupedItems {
    pub fn range_ids(&self) -> &[String] {
        &self.range_order
    }

    pub fn items_for(&self, range_id: &str) -> &[ItemIdentity] {
        self.by_range.get(range_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A query targeted at one physical partition key range.
#[derive(Clone, Debug)]
pub struct RangeQuery {
    pub range_id: String,
    pub query: Query,
}

/// Buckets `items` by the range owning each item's effective partition key.
///
/// Fails with [`Error::RangeNotFound`] when a key falls outside every known
/// range, which callers must treat as a staleness signal: refresh the range
/// map and retry.
pub fn group_items_by_range(
    items: &[ItemIdentity],
    definition: &PartitionKeyDefinition,
    ranges: &[PartitionKeyRange],
    hasher: &dyn EffectivePartitionKeyHasher,
) -> Result<GroupedItems> {
    let mut grouped = GroupedItems::default();
    for item in items {
        let epk = hasher.effective_partition_key(&item.partition_key, definition)?;
        let range = find_range_for_epk(&epk, ranges).ok_or(Error::RangeNotFound { epk })?;
        match grouped.by_range.entry(range.id.clone()) {
            Entry::Occupied(mut bucket) => bucket.get_mut().push(item.clone()),
            Entry::Vacant(bucket) => {
                grouped.range_order.push(range.id.clone());
                bucket.insert(vec![item.clone()]);
            }
        }
    }
    Ok(grouped)
}

/// Builds the queries for every bucketed range, in first-seen range order.
///
/// Three shapes, cheapest first:
/// 1. the container is partitioned by `id` and every item's key equals its
///    id: a bare `id IN (...)` query;
/// 2. every item in the range shares one logical partition key: one key
///    equality plus `id IN (...)`;
/// 3. otherwise: an OR of per-item (id AND key) conjunctions.
///
/// Each shape chunks its item list at `max_items_per_query`, so one range
/// can produce several queries.
pub fn build_query_chunks_for_ranges(
    grouped: &GroupedItems,
    definition: &PartitionKeyDefinition,
    max_items_per_query: usize,
) -> Result<Vec<RangeQuery>> {
    let max_items_per_query = max_items_per_query.max(1);
    let mut queries = Vec::new();
    for range_id in grouped.range_ids() {
        let items = grouped.items_for(range_id);

        let id_only = definition.is_id_partitioned()
            && items
                .iter()
                .all(|item| item.partition_key.as_single_string() == Some(item.id.as_str()));
        let shared_key = items
            .first()
            .filter(|first| {
                items
                    .iter()
                    .all(|item| item.partition_key == first.partition_key)
            })
            .map(|first| &first.partition_key);

        for chunk in items.chunks(max_items_per_query) {
            let query = if id_only {
                build_id_in_query(chunk, None, definition)?
            } else if let Some(key) = shared_key {
                build_id_in_query(chunk, Some(key), definition)?
            } else {
                build_disjunction_query(chunk, definition)?
            };
            queries.push(RangeQuery {
                range_id: range_id.clone(),
                query,
            });
        }
    }
    Ok(queries)
}

/// `SELECT * FROM c WHERE [pk equality AND] c.id IN (@id0, ...)`.
fn build_id_in_query(
    items: &[ItemIdentity],
    shared_key: Option<&PartitionKey>,
    definition: &PartitionKeyDefinition,
) -> Result<Query> {
    let mut clauses = Vec::new();
    let mut parameters: Vec<(String, serde_json::Value)> = Vec::new();

    if let Some(key) = shared_key {
        for (index, (path, component)) in definition
            .paths
            .iter()
            .zip(key.components().iter())
            .enumerate()
        {
            let name = format!("@pkValue{index}");
            clauses.push(format!("{} = {}", property_accessor(path), name));
            parameters.push((name, component.to_json()));
        }
    }

    let mut id_names = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let name = format!("@id{index}");
        parameters.push((name.clone(), serde_json::Value::String(item.id.clone())));
        id_names.push(name);
    }
    clauses.push(format!("c.id IN ({})", id_names.join(", ")));

    let mut query = Query::from(format!(
        "SELECT * FROM c WHERE {}",
        clauses.join(" AND ")
    ));
    for (name, value) in parameters {
        query = query.with_parameter(name, value)?;
    }
    Ok(query)
}

/// `SELECT * FROM c WHERE (c.id = @id0 AND pk = @pk0x0) OR ...`.
fn build_disjunction_query(
    items: &[ItemIdentity],
    definition: &PartitionKeyDefinition,
) -> Result<Query> {
    let mut disjuncts = Vec::with_capacity(items.len());
    let mut parameters: Vec<(String, serde_json::Value)> = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let id_name = format!("@id{index}");
        let mut conjuncts = vec![format!("c.id = {id_name}")];
        parameters.push((id_name, serde_json::Value::String(item.id.clone())));

        for (component_index, (path, component)) in definition
            .paths
            .iter()
            .zip(item.partition_key.components().iter())
            .enumerate()
        {
            let name = format!("@pk{index}x{component_index}");
            conjuncts.push(format!("{} = {}", property_accessor(path), name));
            parameters.push((name, component.to_json()));
        }
        disjuncts.push(format!("({})", conjuncts.join(" AND ")));
    }

    let mut query = Query::from(format!(
        "SELECT * FROM c WHERE {}",
        disjuncts.join(" OR ")
    ));
    for (name, value) in parameters {
        query = query.with_parameter(name, value)?;
    }
    Ok(query)
}

/// `/a/b` becomes `c["a"]["b"]`.
fn property_accessor(path: &str) -> String {
    let mut accessor = String::from("c");
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        accessor.push_str("[\"");
        accessor.push_str(segment);
        accessor.push_str("\"]");
    }
    accessor
}

/// Plans a multi-item point read: resolves the container's range map,
/// buckets the items, and emits the per-range queries.
pub struct ReadManyPlanner {
    range_cache: Arc<PartitionKeyRangeCache>,
    hasher: Arc<dyn EffectivePartitionKeyHasher>,
    max_items_per_query: usize,
    range_map_max_age: Duration,
}

impl ReadManyPlanner {
    pub fn new(
        range_cache: Arc<PartitionKeyRangeCache>,
        hasher: Arc<dyn EffectivePartitionKeyHasher>,
        options: &ClientOptions,
    ) -> Self {
        Self {
            range_cache,
            hasher,
            max_items_per_query: options.max_items_per_query_chunk,
            range_map_max_age: options.range_map_max_age,
        }
    }

    pub async fn plan(
        &self,
        container: &ResourceLink,
        definition: &PartitionKeyDefinition,
        items: &[ItemIdentity],
    ) -> Result<Vec<RangeQuery>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = self
            .range_cache
            .ranges(container, self.range_map_max_age)
            .await?;
        let grouped = match group_items_by_range(
            items,
            definition,
            &snapshot.ranges,
            self.hasher.as_ref(),
        ) {
            Ok(grouped) => grouped,
            Err(Error::RangeNotFound { epk }) => {
                // The cached map predates a split or merge; force a refresh
                // and re-resolve before giving up.
                tracing::debug!(%epk, "effective partition key outside cached range map, refreshing");
                let refreshed = self.refresh_after_miss(container, &snapshot).await?;
                group_items_by_range(items, definition, &refreshed.ranges, self.hasher.as_ref())?
            }
            Err(error) => return Err(error),
        };
        build_query_chunks_for_ranges(&grouped, definition, self.max_items_per_query)
    }

    async fn refresh_after_miss(
        &self,
        container: &ResourceLink,
        known_stale: &RangeMapSnapshot,
    ) -> Result<RangeMapSnapshot> {
        self.range_cache.refresh(container, Some(known_stale)).await
    }
}
