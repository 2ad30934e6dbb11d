// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

use std::time::Duration;

use crate::constants;
use crate::http::AsHeaders;
use crate::models::ConsistencyLevel;

/// Client-wide configuration consumed by the resilience core.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Regions to prefer for endpoint selection and failover, most preferred
    /// first. Names are matched case- and whitespace-insensitively.
    pub preferred_regions: Vec<String>,

    /// Interval of the background account topology refresh loop.
    pub topology_refresh_interval: Duration,

    /// How long an endpoint marked unavailable stays excluded from
    /// resolution before its record expires.
    pub unavailable_endpoint_ttl: Duration,

    /// When false, every request targets the account's default endpoint and
    /// the regional topology is ignored.
    pub enable_endpoint_discovery: bool,

    /// When false, regional failover retries (403/503) are disabled.
    pub enable_cross_region_retries: bool,

    pub throttle_retry: ThrottleRetryOptions,

    pub failover_retry: FailoverRetryOptions,

    /// Maximum number of item identities per routed query chunk.
    pub max_items_per_query_chunk: usize,

    /// Maximum age of the cached partition key range map before a routed
    /// read triggers a refresh.
    pub range_map_max_age: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            preferred_regions: Vec::new(),
            topology_refresh_interval: constants::DEFAULT_TOPOLOGY_REFRESH_INTERVAL,
            unavailable_endpoint_ttl: constants::DEFAULT_UNAVAILABLE_ENDPOINT_TTL,
            enable_endpoint_discovery: true,
            enable_cross_region_retries: true,
            throttle_retry: ThrottleRetryOptions::default(),
            failover_retry: FailoverRetryOptions::default(),
            max_items_per_query_chunk: constants::DEFAULT_MAX_ITEMS_PER_QUERY_CHUNK,
            range_map_max_age: constants::DEFAULT_RANGE_MAP_MAX_AGE,
        }
    }
}

/// Configuration of the throttle (429) retry policy.
#[derive(Clone, Debug)]
pub struct ThrottleRetryOptions {
    /// Maximum number of retries. Zero disables the policy entirely.
    pub max_retry_attempts: u32,

    /// Cap on the cumulative wait across all throttle retries of one
    /// request; a single wait that would push past it stops retrying.
    pub max_cumulative_wait: Duration,
}

impl Default for ThrottleRetryOptions {
    fn default() -> Self {
        Self {
            max_retry_attempts: constants::DEFAULT_THROTTLE_MAX_RETRY_ATTEMPTS,
            max_cumulative_wait: constants::DEFAULT_THROTTLE_MAX_CUMULATIVE_WAIT,
        }
    }
}

/// Configuration of the regional failover retry policy.
#[derive(Clone, Debug)]
pub struct FailoverRetryOptions {
    /// Hard cap on failover retries per request.
    pub max_retry_attempts: usize,

    /// Fixed backoff applied before each regional failover retry.
    pub backoff: Duration,
}

impl Default for FailoverRetryOptions {
    fn default() -> Self {
        Self {
            max_retry_attempts: constants::DEFAULT_FAILOVER_MAX_RETRY_ATTEMPTS,
            backoff: constants::DEFAULT_FAILOVER_BACKOFF,
        }
    }
}

/// Per-operation options for item requests.
#[derive(Clone, Debug, Default)]
pub struct ItemOptions {
    /// Explicit session token, overriding the one tracked by the client's
    /// session container.
    pub session_token: Option<String>,

    /// Consistency level override for this request.
    pub consistency_level: Option<ConsistencyLevel>,
}

impl AsHeaders for ItemOptions {
    fn as_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(token) = &self.session_token {
            headers.push((constants::SESSION_TOKEN, token.clone()));
        }
        if let Some(level) = self.consistency_level {
            headers.push((constants::CONSISTENCY_LEVEL, level.as_str().to_string()));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = ClientOptions::default();
        assert_eq!(options.throttle_retry.max_retry_attempts, 9);
        assert_eq!(
            options.throttle_retry.max_cumulative_wait,
            Duration::from_secs(60)
        );
        assert_eq!(options.failover_retry.max_retry_attempts, 120);
        assert_eq!(
            options.topology_refresh_interval,
            Duration::from_secs(300)
        );
        assert!(options.enable_cross_region_retries);
    }

    #[test]
    fn item_options_contribute_headers() {
        let options = ItemOptions {
            session_token: Some("0:1#10".into()),
            consistency_level: Some(ConsistencyLevel::Eventual),
        };
        let headers = options.as_headers();
        assert!(headers.contains(&(constants::SESSION_TOKEN, "0:1#10".to_string())));
        assert!(headers.contains(&(constants::CONSISTENCY_LEVEL, "Eventual".to_string())));
        assert!(ItemOptions::default().as_headers().is_empty());
    }
}
