// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Wire models for the account topology document and the partition key
//! range feed.

use serde::{Deserialize, Serialize};

use crate::constants;

/// One regional deployment of the account, as reported by the service.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRegion {
    /// Display name of the region, e.g. `"East US"`.
    pub name: String,

    /// Root endpoint of the regional deployment.
    pub endpoint: String,
}

/// The consistency guarantees configured on the account.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyPolicy {
    pub default_consistency_level: ConsistencyLevel,
}

/// Well-known consistency levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum ConsistencyLevel {
    Strong,
    BoundedStaleness,
    #[default]
    Session,
    ConsistentPrefix,
    Eventual,
}

impl ConsistencyLevel {
    /// The header value used when overriding consistency per request.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::Strong => "Strong",
            ConsistencyLevel::BoundedStaleness => "BoundedStaleness",
            ConsistencyLevel::Session => "Session",
            ConsistencyLevel::ConsistentPrefix => "ConsistentPrefix",
            ConsistencyLevel::Eventual => "Eventual",
        }
    }
}

/// The account topology document, fetched from the account root resource.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProperties {
    #[serde(default)]
    pub id: Option<String>,

    /// Regions this account can serve reads from, in service-preferred order.
    #[serde(default)]
    pub read_regions: Vec<AccountRegion>,

    /// Regions this account accepts writes in, in service-preferred order.
    #[serde(default)]
    pub write_regions: Vec<AccountRegion>,

    #[serde(default)]
    pub enable_multiple_write_locations: bool,

    #[serde(default)]
    pub consistency_policy: ConsistencyPolicy,
}

/// One physical partition key range of a container.
///
/// Ranges tile the effective partition key hash space contiguously: each one
/// owns the half-open interval `[min_inclusive, max_exclusive)`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKeyRange {
    pub id: String,
    pub min_inclusive: String,
    pub max_exclusive: String,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub throughput_fraction: Option<f64>,

    /// Range ids this range descends from through splits and merges.
    #[serde(default)]
    pub parents: Vec<String>,
}

impl PartitionKeyRange {
    /// Whether this range's half-open interval owns `epk`.
    ///
    /// An empty `min_inclusive` means "from the start of the hash space";
    /// an empty or `"FF"` `max_exclusive` means "to the end".
    pub fn contains(&self, epk: &str) -> bool {
        let above_min = self.min_inclusive.is_empty() || epk >= self.min_inclusive.as_str();
        let below_max = self.max_exclusive.is_empty()
            || self.max_exclusive == constants::EPK_RANGE_MAX
            || epk < self.max_exclusive.as_str();
        above_min && below_max
    }
}

/// The partition key range feed for a container.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct PartitionKeyRangeResult {
    #[serde(rename = "resourceId")]
    pub resource_id: String,

    #[serde(rename = "ranges", default)]
    pub ranges: Vec<PartitionKeyRange>,
}

/// Hashing scheme used to place logical partition keys in the hash space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum PartitionKeyKind {
    #[default]
    Hash,
    MultiHash,
}

/// The partition key definition of a container.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKeyDefinition {
    /// JSON paths of the partition key properties, e.g. `["/tenantId"]`.
    pub paths: Vec<String>,

    #[serde(default)]
    pub kind: PartitionKeyKind,

    #[serde(default = "default_pk_version")]
    pub version: u32,
}

fn default_pk_version() -> u32 {
    2
}

impl PartitionKeyDefinition {
    pub fn hash(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            kind: PartitionKeyKind::Hash,
            version: 2,
        }
    }

    /// True when items are partitioned by their own `id` property.
    pub fn is_id_partitioned(&self) -> bool {
        self.paths.len() == 1 && self.paths[0] == "/id"
    }
}
