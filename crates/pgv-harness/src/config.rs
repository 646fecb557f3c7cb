//! Harness configuration.
//!
//! Defaults reproduce the developer-cluster layout the harness was written
//! for: run from the build directory, node stores under `dev/osd*`, admin and
//! client binaries next to the start/stop scripts.

use pgv_error::{HarnessError, Result};
use pgv_types::{DEFAULT_NODE_PREFIX, PoolKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// On-disk layout of the cluster's node stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Directory containing one store directory per node.
    pub root: PathBuf,
    /// Prefix identifying node store directories.
    pub node_prefix: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("dev"),
            node_prefix: DEFAULT_NODE_PREFIX.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub name: String,
    /// Object names are `<object_prefix><ordinal>`.
    pub object_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolsConfig {
    pub replicated: PoolSpec,
    pub erasure: PoolSpec,
    pub pg_count: u32,
    pub pgp_count: u32,
    pub ec_profile: String,
    pub ec_profile_params: Vec<String>,
}

impl PoolsConfig {
    #[must_use]
    pub fn spec(&self, kind: PoolKind) -> &PoolSpec {
        match kind {
            PoolKind::Replicated => &self.replicated,
            PoolKind::Erasure => &self.erasure,
        }
    }
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            replicated: PoolSpec {
                name: "rep_pool".to_owned(),
                object_prefix: "REPobject".to_owned(),
            },
            erasure: PoolSpec {
                name: "ec_pool".to_owned(),
                object_prefix: "ECobject".to_owned(),
            },
            pg_count: 12,
            pgp_count: 12,
            ec_profile: "testecprofile".to_owned(),
            ec_profile_params: vec!["ruleset-failure-domain=osd".to_owned()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Objects written per pool.
    pub object_count: u32,
    /// Repeated lines per object content file.
    pub data_line_count: usize,
    /// Abort after the workload phase if any setup write failed.
    pub strict_setup: bool,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            object_count: 40,
            data_line_count: 10_000,
            strict_setup: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Cluster admin CLI (`osd pool create`, `health`, ...).
    pub admin_bin: String,
    /// Cluster client CLI (`put`, `get`, `setxattr`, ...).
    pub client_bin: String,
    /// Start/stop the cluster around the workload and post-import phases.
    pub manage_lifecycle: bool,
    pub start_command: Vec<String>,
    /// Extra argument for a fresh (new) cluster.
    pub start_fresh_flag: String,
    pub start_env: BTreeMap<String, String>,
    pub stop_command: Vec<String>,
    pub health_interval_secs: u64,
    /// Upper bound on health polls; `None` polls forever.
    pub health_max_polls: Option<u64>,
}

impl ClusterConfig {
    #[must_use]
    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            admin_bin: "./ceph".to_owned(),
            client_bin: "./rados".to_owned(),
            manage_lifecycle: true,
            start_command: vec!["./vstart.sh".to_owned(), "-l".to_owned(), "-d".to_owned()],
            start_fresh_flag: "-n".to_owned(),
            start_env: BTreeMap::from([("OSD".to_owned(), "4".to_owned())]),
            stop_command: vec!["./stop.sh".to_owned()],
            health_interval_secs: 5,
            health_max_polls: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Per-PG data tool binary.
    pub program: String,
    /// Flag naming a node's object store directory.
    pub store_flag: String,
    /// Flag naming a node's journal.
    pub journal_flag: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "./ceph_filestore_dump".to_owned(),
            store_flag: "--store-path".to_owned(),
            journal_flag: "--journal-path".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Parent of the per-run `pgverify.<pid>` directory.
    pub root: PathBuf,
    /// Leave the scratch tree behind for post-mortem inspection.
    pub keep: bool,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir(),
            keep: false,
        }
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Working directory for every collaborator; ours when unset.
    pub workdir: Option<PathBuf>,
    pub layout: LayoutConfig,
    pub pools: PoolsConfig,
    pub workload: WorkloadConfig,
    pub cluster: ClusterConfig,
    pub tool: ToolConfig,
    pub scratch: ScratchConfig,
}

impl HarnessConfig {
    /// Load a JSON config file; omitted fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|err| HarnessError::Config(format!("{}: {err}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workload.object_count == 0 {
            return Err(HarnessError::Config("workload.object_count must be > 0".into()));
        }
        if self.workload.data_line_count == 0 {
            return Err(HarnessError::Config(
                "workload.data_line_count must be > 0".into(),
            ));
        }
        if self.pools.pg_count == 0 || self.pools.pgp_count == 0 {
            return Err(HarnessError::Config(
                "pools.pg_count and pools.pgp_count must be > 0".into(),
            ));
        }
        for kind in [PoolKind::Replicated, PoolKind::Erasure] {
            let spec = self.pools.spec(kind);
            if spec.name.is_empty() || spec.object_prefix.is_empty() {
                return Err(HarnessError::Config(format!(
                    "{kind} pool needs a name and an object prefix"
                )));
            }
        }
        if self.pools.replicated.object_prefix == self.pools.erasure.object_prefix {
            return Err(HarnessError::Config(
                "replicated and erasure object prefixes must differ".into(),
            ));
        }
        if self.layout.node_prefix.is_empty() {
            return Err(HarnessError::Config("layout.node_prefix must not be empty".into()));
        }
        if self.cluster.manage_lifecycle
            && (self.cluster.start_command.is_empty() || self.cluster.stop_command.is_empty())
        {
            return Err(HarnessError::Config(
                "cluster lifecycle management needs start and stop commands".into(),
            ));
        }
        Ok(())
    }
}
