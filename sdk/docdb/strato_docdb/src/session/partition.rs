// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Partition-scoped session tokens.

use std::fmt;
use std::str::FromStr;

use super::{SessionError, VectorSessionToken};
use crate::PartitionKeyRangeId;

/// A session token scoped to one physical partition:
/// `{partitionKeyRangeId}:{vectorSessionToken}`.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSessionToken {
    /// The partition key range this token applies to.
    pub pkrange_id: PartitionKeyRangeId,

    /// The replication progress recorded for that partition.
    pub vector_token: VectorSessionToken,
}

impl FromStr for PartitionSessionToken {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let (pkrange_part, vector_part) = s
            .split_once(':')
            .filter(|(id, vector)| !id.is_empty() && !vector.is_empty())
            .ok_or(SessionError::MissingComponents)?;

        Ok(PartitionSessionToken {
            pkrange_id: PartitionKeyRangeId::new(pkrange_part),
            vector_token: vector_part.parse()?,
        })
    }
}

impl fmt::Display for PartitionSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pkrange_id.value(), self.vector_token)
    }
}
