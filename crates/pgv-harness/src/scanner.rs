//! On-disk discovery of nodes, placement groups and object files.
//!
//! Layout: `<root>/<node>/current/<pool>.<shard>_head/<object>_<suffix>`.
//! The scanner only observes what currently exists; missing directories
//! mean "nothing there" because PGs come and go during the round trip.

use pgv_types::{NodeName, PgId, PoolId};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

const CURRENT_DIR: &str = "current";

/// Filesystem scanner rooted at the cluster's data directory.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    node_prefix: String,
}

impl Scanner {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, node_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            node_prefix: node_prefix.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store directory of a node.
    #[must_use]
    pub fn node_dir(&self, node: &NodeName) -> PathBuf {
        self.root.join(node.as_str())
    }

    /// Journal path of a node (`<root>/<node>.journal`).
    #[must_use]
    pub fn journal_path(&self, node: &NodeName) -> PathBuf {
        self.root.join(format!("{node}.journal"))
    }

    /// Head-generation directory of `pg` on `node`.
    #[must_use]
    pub fn head_dir(&self, node: &NodeName, pg: &PgId) -> PathBuf {
        self.node_dir(node).join(CURRENT_DIR).join(pg.head_dir())
    }

    /// Every directory under the root whose name starts with the node prefix.
    #[must_use]
    pub fn list_nodes(&self) -> BTreeSet<NodeName> {
        entries(&self.root)
            .into_iter()
            .filter(|(name, path)| name.starts_with(&self.node_prefix) && path.is_dir())
            .map(|(name, _)| NodeName(name))
            .collect()
    }

    /// PGs of `pool` present on any node, deduplicated and sorted.
    #[must_use]
    pub fn list_pgs(&self, pool: PoolId) -> BTreeSet<PgId> {
        let mut pgs = BTreeSet::new();
        for node in self.list_nodes() {
            let current = self.node_dir(&node).join(CURRENT_DIR);
            for (name, path) in entries(&current) {
                if !path.is_dir() {
                    continue;
                }
                if let Some(pg) = PgId::from_head_dir(&name) {
                    if pg.pool() == pool {
                        pgs.insert(pg);
                    }
                }
            }
        }
        pgs
    }

    /// Subset of `candidates` where some node holds a file starting with `prefix`.
    #[must_use]
    pub fn list_pgs_with_object_prefix(
        &self,
        candidates: &BTreeSet<PgId>,
        prefix: &str,
    ) -> BTreeSet<PgId> {
        let nodes = self.list_nodes();
        candidates
            .iter()
            .filter(|pg| {
                nodes.iter().any(|node| {
                    entries(&self.head_dir(node, pg))
                        .iter()
                        .any(|(name, path)| name.starts_with(prefix) && path.is_file())
                })
            })
            .cloned()
            .collect()
    }

    /// Nodes whose `current/` holds the PG's head directory, sorted.
    #[must_use]
    pub fn list_owning_nodes(&self, pg: &PgId) -> Vec<NodeName> {
        self.list_nodes()
            .into_iter()
            .filter(|node| self.head_dir(node, pg).is_dir())
            .collect()
    }

    /// First file in `dir` named `<basename>_...`.
    #[must_use]
    pub fn find_object_file(dir: &Path, basename: &str) -> Option<String> {
        let prefix = format!("{basename}_");
        entries(dir)
            .into_iter()
            .find(|(name, path)| name.starts_with(&prefix) && path.is_file())
            .map(|(name, _)| name)
    }

    /// Regular files directly inside `dir`, sorted.
    #[must_use]
    pub fn regular_files(dir: &Path) -> Vec<PathBuf> {
        entries(dir)
            .into_iter()
            .filter(|(_, path)| path.is_file())
            .map(|(_, path)| path)
            .collect()
    }

    /// PGs of `pool`, the subset holding `object_prefix` files, and owners.
    #[must_use]
    pub fn scan_pool(&self, pool: PoolId, object_prefix: &str) -> PoolScan {
        let pgs = self.list_pgs(pool);
        let with_objects = self.list_pgs_with_object_prefix(&pgs, object_prefix);
        let owners = pgs
            .iter()
            .map(|pg| (pg.clone(), self.list_owning_nodes(pg)))
            .collect();
        PoolScan {
            pool,
            object_prefix: object_prefix.to_owned(),
            pgs,
            with_objects,
            owners,
        }
    }

    /// Every file under the root named `<basename>_...`, at any depth.
    #[must_use]
    pub fn find_object_copies(&self, basename: &str) -> Vec<PathBuf> {
        let prefix = format!("{basename}_");
        let mut found = Vec::new();
        walk_files(&self.root, &mut |name, path| {
            if name.starts_with(&prefix) {
                found.push(path.to_path_buf());
            }
        });
        found.sort();
        found
    }
}

/// Snapshot of one pool's on-disk placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolScan {
    pub pool: PoolId,
    pub object_prefix: String,
    pub pgs: BTreeSet<PgId>,
    pub with_objects: BTreeSet<PgId>,
    pub owners: BTreeMap<PgId, Vec<NodeName>>,
}

/// Sorted `(name, path)` pairs of a directory; empty when it is unreadable.
fn entries(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut out: Vec<(String, PathBuf)> = read_dir
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(target: "pgv::scanner", dir = %dir.display(), %err, "skipping unreadable entry");
                None
            }
        })
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            Some((name, entry.path()))
        })
        .collect();
    out.sort();
    out
}

fn walk_files(dir: &Path, visit: &mut dyn FnMut(&str, &Path)) {
    for (name, path) in entries(dir) {
        let Ok(meta) = fs::symlink_metadata(&path) else {
            continue;
        };
        if meta.is_dir() {
            walk_files(&path, visit);
        } else if meta.is_file() {
            visit(&name, &path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, b"data").expect("write");
    }

    fn pg(raw: &str) -> PgId {
        raw.parse().expect("pg")
    }

    /// osd0: 1.0 (REPobject1), 1.1 (empty), 2.0s0 (ECobject1)
    /// osd1: 1.0 (REPobject1), 1.2 (REPobject2)
    /// plus noise: a file named osd9, a non-node dir, a snapshot generation.
    fn layout() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        touch(&root.join("osd0/current/1.0_head/REPobject1__head_0001"));
        fs::create_dir_all(root.join("osd0/current/1.1_head")).expect("mkdir");
        touch(&root.join("osd0/current/2.0s0_head/ECobject1__head_0002"));
        touch(&root.join("osd1/current/1.0_head/REPobject1__head_0001"));
        touch(&root.join("osd1/current/1.2_head/REPobject2__head_0003"));
        fs::create_dir_all(root.join("osd1/current/1.2_4")).expect("mkdir");
        touch(&root.join("osd9"));
        fs::create_dir_all(root.join("mon.a")).expect("mkdir");
        touch(&root.join("osd0.journal"));
        dir
    }

    #[test]
    fn lists_only_prefixed_directories() {
        let dir = layout();
        let scanner = Scanner::new(dir.path(), "osd");
        let nodes: Vec<String> = scanner.list_nodes().into_iter().map(|n| n.0).collect();
        assert_eq!(nodes, vec!["osd0", "osd1"]);
    }

    #[test]
    fn lists_pgs_per_pool_sorted_and_unique() {
        let dir = layout();
        let scanner = Scanner::new(dir.path(), "osd");
        let rep: Vec<PgId> = scanner.list_pgs(PoolId(1)).into_iter().collect();
        assert_eq!(rep, vec![pg("1.0"), pg("1.1"), pg("1.2")]);
        let ec: Vec<PgId> = scanner.list_pgs(PoolId(2)).into_iter().collect();
        assert_eq!(ec, vec![pg("2.0s0")]);
        assert!(scanner.list_pgs(PoolId(11)).is_empty());
    }

    #[test]
    fn pool_id_is_matched_exactly() {
        let dir = layout();
        touch(&dir.path().join("osd0/current/11.3_head/Other_x"));
        let scanner = Scanner::new(dir.path(), "osd");
        assert!(scanner.list_pgs(PoolId(1)).iter().all(|p| p.pool() == PoolId(1)));
        assert_eq!(scanner.list_pgs(PoolId(11)).len(), 1);
    }

    #[test]
    fn filters_pgs_holding_objects() {
        let dir = layout();
        let scanner = Scanner::new(dir.path(), "osd");
        let all = scanner.list_pgs(PoolId(1));
        let with_objects: Vec<PgId> = scanner
            .list_pgs_with_object_prefix(&all, "REPobject")
            .into_iter()
            .collect();
        assert_eq!(with_objects, vec![pg("1.0"), pg("1.2")]);
        assert!(scanner.list_pgs_with_object_prefix(&all, "ECobject").is_empty());
    }

    #[test]
    fn owning_nodes_are_sorted() {
        let dir = layout();
        let scanner = Scanner::new(dir.path(), "osd");
        let owners: Vec<String> = scanner
            .list_owning_nodes(&pg("1.0"))
            .into_iter()
            .map(|n| n.0)
            .collect();
        assert_eq!(owners, vec!["osd0", "osd1"]);
        assert_eq!(scanner.list_owning_nodes(&pg("1.2")).len(), 1);
        assert!(scanner.list_owning_nodes(&pg("1.9")).is_empty());
    }

    #[test]
    fn finds_object_file_by_name_prefix() {
        let dir = layout();
        let scanner = Scanner::new(dir.path(), "osd");
        let head = scanner.head_dir(&NodeName("osd0".into()), &pg("1.0"));
        assert_eq!(
            Scanner::find_object_file(&head, "REPobject1").as_deref(),
            Some("REPobject1__head_0001")
        );
        // The separator keeps REPobject1 from matching REPobject10.
        touch(&head.join("REPobject10__head_0009"));
        assert_eq!(
            Scanner::find_object_file(&head, "REPobject10").as_deref(),
            Some("REPobject10__head_0009")
        );
        assert_eq!(Scanner::find_object_file(&head, "REPobject2"), None);
        assert_eq!(Scanner::find_object_file(&dir.path().join("nope"), "x"), None);
    }

    #[test]
    fn finds_all_copies_recursively() {
        let dir = layout();
        let scanner = Scanner::new(dir.path(), "osd");
        let copies = scanner.find_object_copies("REPobject1");
        assert_eq!(copies.len(), 2);
        assert!(copies.iter().all(|p| p.ends_with("REPobject1__head_0001")));
        assert!(scanner.find_object_copies("REPobject3").is_empty());
    }

    #[test]
    fn pool_scan_snapshot() {
        let dir = layout();
        let scanner = Scanner::new(dir.path(), "osd");
        let scan = scanner.scan_pool(PoolId(1), "REPobject");
        assert_eq!(scan.pgs.len(), 3);
        assert_eq!(scan.with_objects.len(), 2);
        assert_eq!(scan.owners[&pg("1.0")].len(), 2);
        let json = serde_json::to_value(&scan).expect("json");
        assert_eq!(json["pool"], 1);
        assert_eq!(json["pgs"][0], "1.0");
    }

    #[test]
    fn regular_files_skips_directories() {
        let dir = layout();
        let files = Scanner::regular_files(&dir.path().join("osd0/current/1.0_head"));
        assert_eq!(files.len(), 1);
        assert!(Scanner::regular_files(&dir.path().join("osd0/current")).is_empty());
    }

    #[test]
    fn missing_root_is_empty_not_error() {
        let scanner = Scanner::new("/nonexistent/pgverify/root", "osd");
        assert!(scanner.list_nodes().is_empty());
        assert!(scanner.list_pgs(PoolId(1)).is_empty());
        assert!(scanner.find_object_copies("x").is_empty());
    }

    #[test]
    fn node_paths() {
        let scanner = Scanner::new("dev", "osd");
        let node = NodeName("osd2".into());
        assert_eq!(scanner.node_dir(&node), PathBuf::from("dev/osd2"));
        assert_eq!(scanner.journal_path(&node), PathBuf::from("dev/osd2.journal"));
        assert_eq!(
            scanner.head_dir(&node, &pg("1.a")),
            PathBuf::from("dev/osd2/current/1.a_head")
        );
    }
}
