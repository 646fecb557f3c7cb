//! Object name → canonical JSON identifier resolution.
//!
//! The per-PG tool addresses objects by the identifier its own `list`
//! operation prints. Lines are parsed when they are JSON (a bare
//! `{"oid": ...}` object or a `[pgid, {...}]` pair); anything else falls
//! back to matching the quoted name as a substring.

use crate::tool::PgTool;
use pgv_error::Result;
use pgv_types::{JsonId, NodeName, PgId, PoolId};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Structured view of one listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub oid: String,
    pub pool: Option<i64>,
    pub namespace: Option<String>,
    /// Present only for the `[pgid, {...}]` form.
    pub pgid: Option<String>,
}

impl ListedObject {
    /// Parse one listing line; `None` when it is not a recognised JSON shape.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        match value {
            Value::Object(_) => Self::from_object(&value, None),
            Value::Array(items) => match items.as_slice() {
                [Value::String(pgid), object @ Value::Object(_)] => {
                    Self::from_object(object, Some(pgid.clone()))
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn from_object(value: &Value, pgid: Option<String>) -> Option<Self> {
        let oid = value.get("oid")?.as_str()?.to_owned();
        Some(Self {
            oid,
            pool: value.get("pool").and_then(Value::as_i64),
            namespace: value
                .get("namespace")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
            pgid,
        })
    }

    fn in_pool(&self, pool: PoolId) -> bool {
        if let Some(id) = self.pool {
            return u64::try_from(id).is_ok_and(|id| id == pool.0);
        }
        self.pgid
            .as_deref()
            .and_then(|raw| raw.parse::<PgId>().ok())
            .is_some_and(|pg| pg.pool() == pool)
    }
}

/// First line of `lines` naming `name`.
fn first_match<'a, I>(lines: I, name: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    let quoted = format!("\"{name}\"");
    lines
        .into_iter()
        .find(|line| match ListedObject::parse(line) {
            Some(listed) => listed.oid == name,
            None => line.contains(&quoted),
        })
        .map(String::as_str)
}

/// Raw identifier lines of one PG on one node; `None` when `list` fails.
pub fn list_pg(tool: &PgTool<'_>, pg: &PgId, node: &NodeName) -> Result<Option<Vec<String>>> {
    let out = tool.list(node, pg)?;
    if !out.success() {
        debug!(target: "pgv::resolver", %pg, %node, status = %out.status_text(), "list failed");
        return Ok(None);
    }
    Ok(Some(out.stdout_lines()))
}

/// Identifier for `name` from a fresh listing of one (PG, node).
pub fn resolve(tool: &PgTool<'_>, pg: &PgId, node: &NodeName, name: &str) -> Result<Option<JsonId>> {
    let Some(lines) = list_pg(tool, pg, node)? else {
        return Ok(None);
    };
    Ok(first_match(&lines, name).map(|line| JsonId(line.to_owned())))
}

/// Deduplicated, sorted union of listing lines across PGs and nodes.
#[derive(Debug, Clone, Default)]
pub struct IdentifierCorpus {
    lines: BTreeSet<String>,
}

impl IdentifierCorpus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        self.lines
            .extend(lines.into_iter().filter(|line| !line.trim().is_empty()));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// First identifier (in sorted order) naming `name`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<JsonId> {
        let found = first_match(&self.lines, name).map(|line| JsonId(line.to_owned()));
        debug!(target: "pgv::resolver", name, found = found.is_some(), "resolve");
        found
    }

    /// Like [`IdentifierCorpus::resolve`] but only among parsed lines of `pool`.
    #[must_use]
    pub fn resolve_in_pool(&self, pool: PoolId, name: &str) -> Option<JsonId> {
        self.lines
            .iter()
            .find(|line| {
                ListedObject::parse(line)
                    .is_some_and(|listed| listed.oid == name && listed.in_pool(pool))
            })
            .map(|line| JsonId(line.clone()))
    }
}
