//! Expected-state model of every generated object.
//!
//! Each [`ObjectRecord`] is produced by [`GenerationRule::record`], a pure
//! function of (pool kind, name prefix, ordinal). The workload writes what
//! the rule says; the verifier compares what the tool reports against it.

use pgv_error::Result;
use pgv_types::PoolKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Expected ground truth for one logical object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectRecord {
    pub name: String,
    pub kind: PoolKind,
    pub ordinal: u32,
    pub content_path: PathBuf,
    pub xattrs: BTreeMap<String, String>,
    pub omap_header: Option<String>,
    pub omap: BTreeMap<String, String>,
}

/// Deterministic generation rule for object names, content and metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRule {
    /// Number of repeated content lines per object.
    pub data_line_count: usize,
}

impl GenerationRule {
    #[must_use]
    pub fn new(data_line_count: usize) -> Self {
        Self { data_line_count }
    }

    #[must_use]
    pub fn object_name(prefix: &str, ordinal: u32) -> String {
        format!("{prefix}{ordinal}")
    }

    /// The single line repeated to form an object's content.
    #[must_use]
    pub fn content_line(kind: PoolKind, name: &str) -> String {
        match kind {
            PoolKind::Replicated => format!("This is the replicated data for {name}\n"),
            PoolKind::Erasure => format!("This is the erasure coded data for {name}\n"),
        }
    }

    #[must_use]
    pub fn content(&self, kind: PoolKind, name: &str) -> Vec<u8> {
        Self::content_line(kind, name)
            .repeat(self.data_line_count)
            .into_bytes()
    }

    /// `key{i}-{k}` → `val{i}-{k}` for `k` in `1..i`.
    #[must_use]
    pub fn xattrs(ordinal: u32) -> BTreeMap<String, String> {
        (1..ordinal)
            .map(|k| (format!("key{ordinal}-{k}"), format!("val{ordinal}-{k}")))
            .collect()
    }

    /// Header on every object but the first, and never on erasure pools.
    #[must_use]
    pub fn omap_header(kind: PoolKind, ordinal: u32) -> Option<String> {
        (kind.supports_omap() && ordinal != 1).then(|| format!("hdr{ordinal}"))
    }

    /// `okey{i}-{k}` → `oval{i}-{k}` for `k` in `1..i`; empty on erasure pools.
    #[must_use]
    pub fn omap(kind: PoolKind, ordinal: u32) -> BTreeMap<String, String> {
        if !kind.supports_omap() {
            return BTreeMap::new();
        }
        (1..ordinal)
            .map(|k| (format!("okey{ordinal}-{k}"), format!("oval{ordinal}-{k}")))
            .collect()
    }

    /// Full record for one ordinal; content is expected at `<data_dir>/<name>`.
    #[must_use]
    pub fn record(kind: PoolKind, prefix: &str, ordinal: u32, data_dir: &Path) -> ObjectRecord {
        let name = Self::object_name(prefix, ordinal);
        ObjectRecord {
            content_path: data_dir.join(&name),
            xattrs: Self::xattrs(ordinal),
            omap_header: Self::omap_header(kind, ordinal),
            omap: Self::omap(kind, ordinal),
            kind,
            ordinal,
            name,
        }
    }

    /// Write the record's content file, replacing any previous one.
    pub fn write_content(&self, record: &ObjectRecord) -> Result<()> {
        let file = fs::File::create(&record.content_path)?;
        let mut writer = BufWriter::new(file);
        let line = Self::content_line(record.kind, &record.name);
        for _ in 0..self.data_line_count {
            writer.write_all(line.as_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Name-keyed collection of expected object state.
#[derive(Debug, Clone, Default)]
pub struct ExpectedState {
    objects: BTreeMap<String, ObjectRecord>,
}

impl ExpectedState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record. Records are never replaced once present.
    pub fn insert(&mut self, record: ObjectRecord) {
        self.objects.entry(record.name.clone()).or_insert(record);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ObjectRecord> {
        self.objects.get(name)
    }

    /// All records in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.objects.values()
    }

    /// Records of one pool kind in name order.
    pub fn objects_of(&self, kind: PoolKind) -> impl Iterator<Item = &ObjectRecord> {
        self.objects.values().filter(move |record| record.kind == kind)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
