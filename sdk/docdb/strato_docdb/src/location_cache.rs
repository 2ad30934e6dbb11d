// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Tracks the account's regional topology and answers "which endpoint should
//! this attempt target".
//!
//! The cache holds the server-reported read/write regions, the caller's
//! preferred-region ordering, and a time-boxed map of endpoints recently seen
//! failing. The derived endpoint lists are recomputed on every mutation so
//! the resolution hot path is a plain indexed read under a shared lock.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use url::Url;

use crate::models::AccountRegion;
use crate::ClientOptions;

/// A canonicalized region name: case- and whitespace-insensitive.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Region(String);

impl Region {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(
            name.as_ref()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase(),
        )
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Region({})", self.0)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of operation an endpoint is resolved or marked unavailable for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Read,
    Write,
}

impl OperationKind {
    pub fn is_write(&self) -> bool {
        matches!(self, OperationKind::Write)
    }
}

/// Bitmask of operation kinds an endpoint is unavailable for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct UnavailableOps(u8);

impl UnavailableOps {
    const READ: u8 = 1;
    const WRITE: u8 = 2;

    fn bit(op: OperationKind) -> u8 {
        match op {
            OperationKind::Read => Self::READ,
            OperationKind::Write => Self::WRITE,
        }
    }

    fn contains(&self, op: OperationKind) -> bool {
        self.0 & Self::bit(op) != 0
    }

    fn insert(&mut self, op: OperationKind) {
        self.0 |= Self::bit(op);
    }
}

#[derive(Clone, Copy, Debug)]
struct UnavailabilityInfo {
    last_marked: Instant,
    ops: UnavailableOps,
}

/// The account's regional layout plus the endpoint lists derived from it.
#[derive(Clone, Debug, Default)]
struct LocationInfo {
    preferred_locations: Vec<Region>,
    available_write_locations: Vec<Region>,
    available_read_locations: Vec<Region>,
    write_endpoints_by_location: HashMap<Region, Url>,
    read_endpoints_by_location: HashMap<Region, Url>,

    /// Ordered, unavailability-filtered endpoint lists. Preferred regions
    /// first, then the remaining available regions, deduplicated.
    write_endpoints: Vec<Url>,
    read_endpoints: Vec<Url>,
}

struct CacheState {
    location_info: LocationInfo,
    unavailability: HashMap<Url, UnavailabilityInfo>,
    enable_multiple_write_locations: bool,
}

/// See the module docs.
pub struct LocationCache {
    default_endpoint: Url,
    enable_endpoint_discovery: bool,
    enable_cross_region_retries: bool,
    unavailable_endpoint_ttl: Duration,
    state: RwLock<CacheState>,
}

impl LocationCache {
    pub fn new(default_endpoint: Url, options: &ClientOptions) -> Self {
        Self {
            default_endpoint,
            enable_endpoint_discovery: options.enable_endpoint_discovery,
            enable_cross_region_retries: options.enable_cross_region_retries,
            unavailable_endpoint_ttl: options.unavailable_endpoint_ttl,
            state: RwLock::new(CacheState {
                location_info: LocationInfo::default(),
                unavailability: HashMap::new(),
                enable_multiple_write_locations: false,
            }),
        }
    }

    /// Recomputes the regional layout from a freshly fetched topology
    /// document. This is the only mutator of the region lists.
    pub fn update(
        &self,
        write_regions: &[AccountRegion],
        read_regions: &[AccountRegion],
        preferred_regions: &[String],
        enable_multiple_write_locations: bool,
    ) {
        let (write_locations, write_endpoints_by_location) = parse_regions(write_regions);
        let (read_locations, read_endpoints_by_location) = parse_regions(read_regions);

        let mut state = self.state.write().unwrap();
        state.enable_multiple_write_locations = enable_multiple_write_locations;
        state.location_info = LocationInfo {
            preferred_locations: preferred_regions.iter().map(Region::new).collect(),
            available_write_locations: write_locations,
            available_read_locations: read_locations,
            write_endpoints_by_location,
            read_endpoints_by_location,
            write_endpoints: Vec::new(),
            read_endpoints: Vec::new(),
        };
        self.refresh_derived(&mut state);
        tracing::debug!(
            writes = state.location_info.write_endpoints.len(),
            reads = state.location_info.read_endpoints.len(),
            multi_write = enable_multiple_write_locations,
            "location cache updated"
        );
    }

    /// Ordered write endpoints for the current topology.
    pub fn write_endpoints(&self) -> Vec<Url> {
        self.purge_expired_if_any();
        self.state.read().unwrap().location_info.write_endpoints.clone()
    }

    /// Ordered read endpoints for the current topology.
    pub fn read_endpoints(&self) -> Vec<Url> {
        self.purge_expired_if_any();
        self.state.read().unwrap().location_info.read_endpoints.clone()
    }

    /// Picks the endpoint for a specific attempt.
    ///
    /// Attempt 0 always resolves to the primary endpoint for the operation
    /// kind; later attempts walk the ordered endpoint list, wrapping at its
    /// end. `force_write_endpoint` routes the attempt onto the write list
    /// regardless of the operation kind (used by the single-write-region
    /// session retry).
    pub fn resolve_service_endpoint(
        &self,
        attempt: usize,
        op: OperationKind,
        force_write_endpoint: bool,
    ) -> Url {
        self.purge_expired_if_any();
        let state = self.state.read().unwrap();
        let endpoints = if force_write_endpoint || op.is_write() {
            &state.location_info.write_endpoints
        } else {
            &state.location_info.read_endpoints
        };
        if endpoints.is_empty() {
            return self.default_endpoint.clone();
        }
        endpoints[attempt % endpoints.len()].clone()
    }

    /// Records `endpoint` as unavailable for `op`.
    ///
    /// Re-marking an endpoint already unavailable for the same operation is
    /// a no-op and leaves the expiry clock untouched, so a persistently
    /// failing endpoint still gets re-probed once its original record
    /// expires.
    pub fn mark_unavailable(&self, endpoint: &Url, op: OperationKind) {
        let mut state = self.state.write().unwrap();
        match state.unavailability.entry(endpoint.clone()) {
            Entry::Occupied(mut occupied) => {
                let info = occupied.get_mut();
                if info.ops.contains(op) {
                    return;
                }
                info.ops.insert(op);
                info.last_marked = Instant::now();
            }
            Entry::Vacant(vacant) => {
                let mut ops = UnavailableOps::default();
                ops.insert(op);
                vacant.insert(UnavailabilityInfo {
                    last_marked: Instant::now(),
                    ops,
                });
            }
        }
        tracing::debug!(%endpoint, ?op, "endpoint marked unavailable");
        self.refresh_derived(&mut state);
    }

    /// Whether `endpoint` is currently excluded from resolution for `op`.
    pub fn is_unavailable(&self, endpoint: &Url, op: OperationKind) -> bool {
        let state = self.state.read().unwrap();
        Self::is_unavailable_in(&state.unavailability, self.unavailable_endpoint_ttl, endpoint, op)
    }

    /// Drops expired unavailability records and recomputes the endpoint
    /// lists.
    pub fn refresh_stale_endpoints(&self) {
        let mut state = self.state.write().unwrap();
        let ttl = self.unavailable_endpoint_ttl;
        let before = state.unavailability.len();
        state
            .unavailability
            .retain(|_, info| info.last_marked.elapsed() < ttl);
        if state.unavailability.len() != before {
            self.refresh_derived(&mut state);
        }
    }

    /// Reverse lookup: the region owning `endpoint`, writes first.
    pub fn location_of(&self, endpoint: &Url) -> Option<Region> {
        let state = self.state.read().unwrap();
        let info = &state.location_info;
        info.write_endpoints_by_location
            .iter()
            .chain(info.read_endpoints_by_location.iter())
            .find(|(_, url)| *url == endpoint)
            .map(|(region, _)| region.clone())
    }

    pub fn can_use_multiple_write_locations(&self) -> bool {
        self.state.read().unwrap().enable_multiple_write_locations
    }

    pub fn cross_region_retries_enabled(&self) -> bool {
        self.enable_cross_region_retries
    }

    /// Number of regions the account can serve `op` from.
    pub fn available_location_count(&self, op: OperationKind) -> usize {
        let state = self.state.read().unwrap();
        match op {
            OperationKind::Read => state.location_info.available_read_locations.len(),
            OperationKind::Write => state.location_info.available_write_locations.len(),
        }
    }

    pub fn preferred_location_count(&self) -> usize {
        self.state.read().unwrap().location_info.preferred_locations.len()
    }

    pub fn default_endpoint(&self) -> &Url {
        &self.default_endpoint
    }

    /// Recomputes the derived endpoint lists. Callers hold the write lock.
    fn refresh_derived(&self, state: &mut CacheState) {
        let multi_write = state.enable_multiple_write_locations;
        state.location_info.write_endpoints = self.order_endpoints(
            &state.location_info,
            &state.unavailability,
            OperationKind::Write,
            multi_write,
        );
        state.location_info.read_endpoints = self.order_endpoints(
            &state.location_info,
            &state.unavailability,
            OperationKind::Read,
            multi_write,
        );
    }

    fn order_endpoints(
        &self,
        info: &LocationInfo,
        unavailability: &HashMap<Url, UnavailabilityInfo>,
        op: OperationKind,
        multi_write: bool,
    ) -> Vec<Url> {
        let (available_locations, endpoints_by_location) = match op {
            OperationKind::Write => (
                &info.available_write_locations,
                &info.write_endpoints_by_location,
            ),
            OperationKind::Read => (
                &info.available_read_locations,
                &info.read_endpoints_by_location,
            ),
        };

        if !self.enable_endpoint_discovery || available_locations.is_empty() {
            return vec![self.default_endpoint.clone()];
        }

        // A single-write-region account has exactly one usable write target;
        // there is nothing to order or filter.
        if op.is_write() && !multi_write {
            return vec![available_locations
                .first()
                .and_then(|region| endpoints_by_location.get(region))
                .cloned()
                .unwrap_or_else(|| self.default_endpoint.clone())];
        }

        let mut candidates: Vec<Url> = Vec::new();
        let ordered_regions = info
            .preferred_locations
            .iter()
            .filter(|region| available_locations.contains(region))
            .chain(
                available_locations
                    .iter()
                    .filter(|region| !info.preferred_locations.contains(*region)),
            );
        for region in ordered_regions {
            if let Some(endpoint) = endpoints_by_location.get(region) {
                if !candidates.contains(endpoint) {
                    candidates.push(endpoint.clone());
                }
            }
        }

        let usable: Vec<Url> = candidates
            .iter()
            .filter(|endpoint| {
                !Self::is_unavailable_in(
                    unavailability,
                    self.unavailable_endpoint_ttl,
                    endpoint,
                    op,
                )
            })
            .cloned()
            .collect();

        // When every known endpoint is unavailable, degrade to trying them
        // all anyway rather than returning nothing.
        let endpoints = if usable.is_empty() { candidates } else { usable };
        if endpoints.is_empty() {
            vec![self.default_endpoint.clone()]
        } else {
            endpoints
        }
    }

    fn is_unavailable_in(
        unavailability: &HashMap<Url, UnavailabilityInfo>,
        ttl: Duration,
        endpoint: &Url,
        op: OperationKind,
    ) -> bool {
        unavailability
            .get(endpoint)
            .map(|info| info.ops.contains(op) && info.last_marked.elapsed() < ttl)
            .unwrap_or(false)
    }

    /// Cheap read-locked check for expired records, escalating to the write
    /// path only when something actually expired.
    fn purge_expired_if_any(&self) {
        let expired = {
            let state = self.state.read().unwrap();
            state
                .unavailability
                .values()
                .any(|info| info.last_marked.elapsed() >= self.unavailable_endpoint_ttl)
        };
        if expired {
            self.refresh_stale_endpoints();
        }
    }

    #[cfg(test)]
    fn backdate_unavailability(&self, endpoint: &Url, age: Duration) {
        let mut state = self.state.write().unwrap();
        if let Some(info) = state.unavailability.get_mut(endpoint) {
            info.last_marked = Instant::now().checked_sub(age).unwrap();
        }
    }
}

fn parse_regions(regions: &[AccountRegion]) -> (Vec<Region>, HashMap<Region, Url>) {
    let mut locations = Vec::new();
    let mut endpoints = HashMap::new();
    for region in regions {
        let name = Region::new(&region.name);
        match Url::parse(&region.endpoint) {
            Ok(endpoint) => {
                if !locations.contains(&name) {
                    locations.push(name.clone());
                }
                endpoints.insert(name, endpoint);
            }
            Err(error) => {
                tracing::warn!(
                    region = %name,
                    endpoint = %region.endpoint,
                    %error,
                    "skipping region with unparseable endpoint"
                );
            }
        }
    }
    (locations, endpoints)
}
