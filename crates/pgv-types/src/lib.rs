#![forbid(unsafe_code)]

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Suffix of the live (non-snapshot) on-disk directory of a placement group.
pub const HEAD_SUFFIX: &str = "_head";

/// Default directory-name prefix of storage nodes under the data root.
pub const DEFAULT_NODE_PREFIX: &str = "osd";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid pool id {raw:?}")]
    InvalidPoolId { raw: String },
    #[error("invalid placement group {raw:?}: {reason}")]
    InvalidPg { raw: String, reason: &'static str },
}

/// Numeric pool id as reported by the cluster admin CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(pub u64);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PoolId {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| ParseError::InvalidPoolId {
                raw: raw.to_owned(),
            })
    }
}

/// Kind of pool a test object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Replicated,
    Erasure,
}

impl PoolKind {
    /// Erasure-coded pools reject map header and map entry writes.
    #[must_use]
    pub fn supports_omap(self) -> bool {
        matches!(self, Self::Replicated)
    }

    /// Word used by the admin CLI when creating a pool of this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replicated => "replicated",
            Self::Erasure => "erasure",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placement group id, rendered `"<pool>.<shard>"`.
///
/// The shard part is kept verbatim (hex seed, optionally with an `s<n>`
/// erasure shard suffix). Ordering is lexical on the rendered form so that
/// sorted PG lists match what a directory listing sort would produce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PgId {
    pool: PoolId,
    shard: String,
}

impl PgId {
    pub fn new(pool: PoolId, shard: &str) -> Result<Self, ParseError> {
        validate_shard(shard).map_err(|reason| ParseError::InvalidPg {
            raw: format!("{pool}.{shard}"),
            reason,
        })?;
        Ok(Self {
            pool,
            shard: shard.to_owned(),
        })
    }

    #[must_use]
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    #[must_use]
    pub fn shard(&self) -> &str {
        &self.shard
    }

    /// Parse a head-generation directory name such as `1.a_head`.
    ///
    /// Returns `None` for anything that is not a head directory of a
    /// well-formed PG (snapshot generations, temp dirs, `meta`, ...).
    #[must_use]
    pub fn from_head_dir(name: &str) -> Option<Self> {
        name.strip_suffix(HEAD_SUFFIX)?.parse().ok()
    }

    /// Name of this PG's head-generation directory.
    #[must_use]
    pub fn head_dir(&self) -> String {
        format!("{self}{HEAD_SUFFIX}")
    }
}

fn validate_shard(shard: &str) -> Result<(), &'static str> {
    if shard.is_empty() {
        return Err("empty shard");
    }
    if !shard.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err("shard must be alphanumeric");
    }
    Ok(())
}

impl fmt::Display for PgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pool, self.shard)
    }
}

impl FromStr for PgId {
    type Err = ParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (pool, shard) = raw.split_once('.').ok_or_else(|| ParseError::InvalidPg {
            raw: raw.to_owned(),
            reason: "missing '.' separator",
        })?;
        let pool = pool
            .parse::<u64>()
            .map_err(|_| ParseError::InvalidPg {
                raw: raw.to_owned(),
                reason: "pool part is not a number",
            })?;
        Self::new(PoolId(pool), shard)
    }
}

impl Ord for PgId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl PartialOrd for PgId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for PgId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PgId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Storage node name, e.g. `osd0`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(pub String);

impl NodeName {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical object identifier emitted by the per-PG tool's listing.
///
/// Opaque: it is passed back to the tool verbatim as a single argument.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonId(pub String);

impl JsonId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JsonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
