// Copyright (c) Strato Data, Inc. All rights reserved.
// Licensed under the MIT License.

//! Vector session tokens.

use std::{collections::HashMap, fmt, str::FromStr};

use super::SessionError;
use crate::{Lsn, RegionId};

/// A vector session token: `{version}#{globalLsn}[#{regionId}={lsn}]...`
///
/// Tracks replication progress at both the global and the per-region level,
/// which is what lets a session token survive regional failover without a
/// server round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSessionToken {
    /// The version of the session token format. Bumped by the service when
    /// a partition's replica set is reconfigured.
    pub version: u64,

    /// The global logical sequence number.
    pub global_lsn: Lsn,

    /// Per-region logical sequence numbers.
    pub regional_lsns: HashMap<RegionId, Lsn>,
}

/// Parses an unsigned decimal integer, rejecting signs, whitespace, and
/// anything else `u64::from_str` would be lenient about.
fn parse_unsigned<T: FromStr>(s: &str) -> Result<T, ()> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(());
    }
    s.parse().map_err(|_| ())
}

impl FromStr for VectorSessionToken {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let mut parts = s.split('#');
        let version_str = parts.next().unwrap_or_default();
        let global_lsn_str = parts.next().ok_or(SessionError::MissingComponents)?;
        if global_lsn_str.is_empty() && parts.clone().next().is_none() {
            return Err(SessionError::MissingComponents);
        }

        let version = parse_unsigned(version_str)
            .map_err(|()| SessionError::InvalidVersion(version_str.to_string()))?;
        let global_lsn = parse_unsigned(global_lsn_str)
            .map(Lsn::new)
            .map_err(|()| SessionError::InvalidGlobalLsn(global_lsn_str.to_string()))?;

        let mut regional_lsns = HashMap::new();
        for component in parts {
            let (region_str, lsn_str) = component
                .split_once('=')
                .filter(|(r, l)| !r.is_empty() && !l.is_empty())
                .ok_or_else(|| {
                    SessionError::MalformedRegionalComponent(component.to_string())
                })?;

            let region = parse_unsigned(region_str)
                .map(RegionId::new)
                .map_err(|()| SessionError::InvalidRegionId(region_str.to_string()))?;
            let lsn = parse_unsigned(lsn_str)
                .map(Lsn::new)
                .map_err(|()| SessionError::InvalidRegionLsn(lsn_str.to_string()))?;
            regional_lsns.insert(region, lsn);
        }

        Ok(VectorSessionToken {
            version,
            global_lsn,
            regional_lsns,
        })
    }
}

impl VectorSessionToken {
    /// Merges two tokens into one representing the highest progress seen by
    /// either. Commutative.
    ///
    /// Tokens of the same version must describe the same region set; tokens
    /// of different versions merge onto the higher version's region set.
    pub fn merge(self, other: VectorSessionToken) -> Result<VectorSessionToken, SessionError> {
        let (higher, lower) = if self.version >= other.version {
            (self, other)
        } else {
            (other, self)
        };

        if higher.version == lower.version {
            let higher_regions: std::collections::HashSet<_> =
                higher.regional_lsns.keys().collect();
            let lower_regions: std::collections::HashSet<_> =
                lower.regional_lsns.keys().collect();
            if higher_regions != lower_regions {
                return Err(SessionError::TokensCannotBeMerged(
                    "tokens have same version but different regions".to_string(),
                ));
            }
        }

        let global_lsn = if higher.version == lower.version {
            higher.global_lsn.max(lower.global_lsn)
        } else {
            higher.global_lsn
        };

        // Regions present only in the lower-version token are dropped; the
        // service no longer reports them.
        let regional_lsns = higher
            .regional_lsns
            .iter()
            .map(|(region, lsn)| {
                let merged = match lower.regional_lsns.get(region) {
                    Some(other_lsn) => *lsn.max(other_lsn),
                    None => *lsn,
                };
                (*region, merged)
            })
            .collect();

        Ok(VectorSessionToken {
            version: higher.version,
            global_lsn,
            regional_lsns,
        })
    }
}

impl fmt::Display for VectorSessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.version, self.global_lsn.value())?;
        for (region, lsn) in &self.regional_lsns {
            write!(f, "#{}={}", region.value(), lsn.value())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_token() {
        let token: VectorSessionToken = "1#1000".parse().unwrap();
        assert_eq!(token.version, 1);
        assert_eq!(token.global_lsn, Lsn::new(1000));
        assert!(token.regional_lsns.is_empty());
    }

    #[test]
    fn parse_token_with_regions() {
        let token: VectorSessionToken = "3#3000#100=1500#200=2500".parse().unwrap();
        assert_eq!(token.version, 3);
        assert_eq!(token.global_lsn, Lsn::new(3000));
        assert_eq!(token.regional_lsns.len(), 2);
        assert_eq!(token.regional_lsns[&RegionId::new(100)], Lsn::new(1500));
        assert_eq!(token.regional_lsns[&RegionId::new(200)], Lsn::new(2500));
    }

    #[test]
    fn parse_empty_fails() {
        assert_eq!(
            "".parse::<VectorSessionToken>().unwrap_err(),
            SessionError::EmptyInput
        );
    }

    #[test]
    fn parse_missing_global_lsn_fails() {
        assert_eq!(
            "1".parse::<VectorSessionToken>().unwrap_err(),
            SessionError::MissingComponents
        );
        assert_eq!(
            "1#".parse::<VectorSessionToken>().unwrap_err(),
            SessionError::MissingComponents
        );
    }

    #[test]
    fn parse_invalid_numbers_fail() {
        assert_eq!(
            "x#1000".parse::<VectorSessionToken>().unwrap_err(),
            SessionError::InvalidVersion("x".to_string())
        );
        assert_eq!(
            "1#x".parse::<VectorSessionToken>().unwrap_err(),
            SessionError::InvalidGlobalLsn("x".to_string())
        );
        assert_eq!(
            "1#1000#x=5".parse::<VectorSessionToken>().unwrap_err(),
            SessionError::InvalidRegionId("x".to_string())
        );
        assert_eq!(
            "1#1000#100=x".parse::<VectorSessionToken>().unwrap_err(),
            SessionError::InvalidRegionLsn("x".to_string())
        );
    }

    #[test]
    fn parse_overflow_fails() {
        assert_eq!(
            "18446744073709551616#1000"
                .parse::<VectorSessionToken>()
                .unwrap_err(),
            SessionError::InvalidVersion("18446744073709551616".to_string())
        );
        assert_eq!(
            "1#1000#4294967296=5"
                .parse::<VectorSessionToken>()
                .unwrap_err(),
            SessionError::InvalidRegionId("4294967296".to_string())
        );
    }

    #[test]
    fn parse_malformed_regional_components_fail() {
        for input in ["1#1000#100", "1#1000#100=", "1#1000#=1500"] {
            assert!(matches!(
                input.parse::<VectorSessionToken>().unwrap_err(),
                SessionError::MalformedRegionalComponent(_)
            ));
        }
    }

    #[test]
    fn parse_duplicate_regions_keeps_last() {
        let token: VectorSessionToken = "1#1000#100=1500#100=2500".parse().unwrap();
        assert_eq!(token.regional_lsns.len(), 1);
        assert_eq!(token.regional_lsns[&RegionId::new(100)], Lsn::new(2500));
    }

    #[test]
    fn display_roundtrips() {
        let original = "3#3000#100=1500#200=2500";
        let token: VectorSessionToken = original.parse().unwrap();
        let reparsed: VectorSessionToken = token.to_string().parse().unwrap();
        assert_eq!(token, reparsed);
    }

    #[test]
    fn merge_same_version_takes_max_components() {
        let a: VectorSessionToken = "2#1000#100=500#200=600".parse().unwrap();
        let b: VectorSessionToken = "2#1200#100=800#200=400".parse().unwrap();

        let merged = a.merge(b).unwrap();
        assert_eq!(merged.version, 2);
        assert_eq!(merged.global_lsn, Lsn::new(1200));
        assert_eq!(merged.regional_lsns[&RegionId::new(100)], Lsn::new(800));
        assert_eq!(merged.regional_lsns[&RegionId::new(200)], Lsn::new(600));
    }

    #[test]
    fn merge_prefers_higher_version() {
        let a: VectorSessionToken = "1#2000#100=1000".parse().unwrap();
        let b: VectorSessionToken = "2#1000#100=500#200=600".parse().unwrap();

        let merged = a.merge(b).unwrap();
        assert_eq!(merged.version, 2);
        assert_eq!(merged.global_lsn, Lsn::new(1000));
        assert_eq!(merged.regional_lsns.len(), 2);
        assert_eq!(merged.regional_lsns[&RegionId::new(100)], Lsn::new(1000));
        assert_eq!(merged.regional_lsns[&RegionId::new(200)], Lsn::new(600));
    }

    #[test]
    fn merge_is_commutative() {
        let a: VectorSessionToken = "2#1000#100=500#200=600".parse().unwrap();
        let b: VectorSessionToken = "2#1200#100=800#200=400".parse().unwrap();
        assert_eq!(
            a.clone().merge(b.clone()).unwrap(),
            b.merge(a).unwrap()
        );
    }

    #[test]
    fn merge_same_version_region_mismatch_fails() {
        let a: VectorSessionToken = "2#1000#100=500".parse().unwrap();
        let b: VectorSessionToken = "2#1200#200=600".parse().unwrap();
        assert!(matches!(
            a.merge(b).unwrap_err(),
            SessionError::TokensCannotBeMerged(_)
        ));
    }
}
