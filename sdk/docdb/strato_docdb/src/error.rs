// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

use std::sync::Arc;

use crate::http::StatusCode;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the client core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport collaborator failed before a response was produced.
    ///
    /// `retryable` marks connection-level failures (DNS resolution, refused
    /// connections) that the failover policy is allowed to retry against
    /// another regional endpoint.
    #[error("transport error: {source}")]
    Transport {
        retryable: bool,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The service returned a non-success status and every applicable retry
    /// was exhausted. Carries the last observed status and substatus.
    #[error("service error: status {status}, substatus {sub_status:?}")]
    Service {
        status: StatusCode,
        sub_status: Option<u32>,
    },

    /// A session token string could not be parsed.
    #[error(transparent)]
    Session(#[from] crate::session::SessionError),

    /// A wire document (account topology, partition key range feed, query)
    /// could not be serialized or deserialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A previously failed single-flight computation, replayed to a waiter.
    #[error("cached computation error: {0}")]
    Cached(Arc<Error>),

    /// A refresh kept producing the value the caller already proved stale,
    /// even after the bounded number of re-fetches.
    #[error("refreshed value still matched the obsolete value after {attempts} attempts")]
    StillObsolete { attempts: usize },

    /// No entry exists in the cache for the requested key.
    #[error("no cache entry for the requested key")]
    CacheMiss,

    /// The effective partition key fell outside every known partition key
    /// range. Treated as a cache-staleness signal, not a terminal failure.
    #[error("no partition key range owns effective partition key '{epk}'")]
    RangeNotFound { epk: String },

    /// The partition key was rejected by the effective-partition-key
    /// collaborator (malformed components, nested arrays, non-empty objects).
    #[error("invalid partition key: {0}")]
    InvalidPartitionKey(String),
}

impl Error {
    /// True for transport failures the failover policy may retry against
    /// another endpoint.
    pub fn is_retryable_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport {
                retryable: true,
                ..
            }
        )
    }

    /// The HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Service { status, .. } => Some(*status),
            Error::Cached(inner) => inner.status(),
            _ => None,
        }
    }
}
