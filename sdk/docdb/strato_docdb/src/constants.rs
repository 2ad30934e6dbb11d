// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Wire-level constants shared across the client core.

use std::time::Duration;

/// Session token request/response header.
pub const SESSION_TOKEN: &str = "x-sdb-session-token";

/// Substatus response header qualifying a top-level HTTP status.
pub const SUB_STATUS: &str = "x-sdb-substatus";

/// Throttle backoff hint, in milliseconds.
pub const RETRY_AFTER_MS: &str = "x-sdb-retry-after-ms";

/// Standard retry-after header, in seconds. Consulted when the
/// millisecond-precision header is absent.
pub const RETRY_AFTER: &str = "retry-after";

/// Server-assigned resource id of the resource a response refers to.
pub const RESOURCE_ID: &str = "x-sdb-resource-id";

/// Logical address of the resource a response refers to, used to key
/// session state by container path.
pub const ALT_CONTENT_PATH: &str = "x-sdb-alt-content-path";

/// Consistency level override request header.
pub const CONSISTENCY_LEVEL: &str = "x-sdb-consistency-level";

pub const CONTENT_TYPE: &str = "content-type";
pub const APPLICATION_JSON: &str = "application/json";

// Substatus codes qualifying 403/404 responses.
pub const SUBSTATUS_WRITE_FORBIDDEN: u32 = 3;
pub const SUBSTATUS_READ_SESSION_NOT_AVAILABLE: u32 = 1002;
pub const SUBSTATUS_DATABASE_ACCOUNT_NOT_FOUND: u32 = 1008;

/// Lower bound of the effective partition key hash space.
pub const EPK_RANGE_MIN: &str = "";

/// Upper bound of the effective partition key hash space.
pub const EPK_RANGE_MAX: &str = "FF";

/// How often the background loop re-fetches the account topology.
pub const DEFAULT_TOPOLOGY_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// How long an endpoint marked unavailable stays excluded from resolution.
pub const DEFAULT_UNAVAILABLE_ENDPOINT_TTL: Duration = Duration::from_secs(5 * 60);

/// Maximum number of throttle (429) retries per request.
pub const DEFAULT_THROTTLE_MAX_RETRY_ATTEMPTS: u32 = 9;

/// Cap on the cumulative time spent waiting out 429 responses per request.
pub const DEFAULT_THROTTLE_MAX_CUMULATIVE_WAIT: Duration = Duration::from_secs(60);

/// Backoff applied to a 429 response that carries no retry-after hint.
pub const DEFAULT_THROTTLE_BACKOFF: Duration = Duration::from_millis(500);

/// Hard cap on regional failover retries per request.
pub const DEFAULT_FAILOVER_MAX_RETRY_ATTEMPTS: usize = 120;

/// Fixed backoff between regional failover retries.
pub const DEFAULT_FAILOVER_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum number of item identities placed into a single routed query.
pub const DEFAULT_MAX_ITEMS_PER_QUERY_CHUNK: usize = 1000;

/// How old a cached partition key range map may get before a routed read
/// refreshes it.
pub const DEFAULT_RANGE_MAP_MAX_AGE: Duration = Duration::from_secs(5 * 60);
