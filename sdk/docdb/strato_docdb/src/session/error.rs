// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Session token error types.

/// Errors that can occur when parsing or merging session tokens.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// The input string is empty.
    #[error("input string is empty")]
    EmptyInput,

    /// The input string does not contain the required minimum components.
    #[error("missing required components (version and global LSN)")]
    MissingComponents,

    /// The version component could not be parsed as a u64.
    #[error("invalid version: '{0}'")]
    InvalidVersion(String),

    /// The global LSN component could not be parsed as a u64.
    #[error("invalid global LSN: '{0}'")]
    InvalidGlobalLsn(String),

    /// A region ID component could not be parsed as a u32.
    #[error("invalid region ID: '{0}'")]
    InvalidRegionId(String),

    /// A region LSN component could not be parsed as a u64.
    #[error("invalid region LSN: '{0}'")]
    InvalidRegionLsn(String),

    /// A regional component is missing the required '=' separator or one of
    /// its sides.
    #[error("malformed regional component: '{0}'")]
    MalformedRegionalComponent(String),

    /// Two session tokens cannot be merged.
    #[error("incompatible tokens: {0}")]
    TokensCannotBeMerged(String),
}
