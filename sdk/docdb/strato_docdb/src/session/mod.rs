// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Session consistency bookkeeping.
//!
//! Writes return per-partition session tokens; session-consistent reads
//! must present them back to observe their own writes across regions. The
//! [`SessionContainer`] tracks these tokens per container and physical
//! partition, keyed by the container's server-assigned resource id.

mod container;
mod error;
mod partition;
mod vector;

pub use container::*;
pub use error::*;
pub use partition::*;
pub use vector::*;

/// Extracts the container path (`dbs/{db}/colls/{container}`) from a
/// resource address, which may point at the container itself or at an item
/// within it.
pub(crate) fn container_path(resource_address: &str) -> Option<String> {
    let segments: Vec<&str> = resource_address
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();
    if segments.len() >= 4 && segments[0] == "dbs" && segments[2] == "colls" {
        Some(format!("dbs/{}/colls/{}", segments[1], segments[3]))
    } else {
        None
    }
}
