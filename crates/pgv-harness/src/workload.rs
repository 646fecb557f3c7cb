//! Pool creation and deterministic object population.

use crate::accumulator::{ErrorAccumulator, FailureCategory};
use crate::cluster::Cluster;
use crate::config::{PoolsConfig, WorkloadConfig};
use crate::exec::CommandOutput;
use crate::model::{ExpectedState, GenerationRule, ObjectRecord};
use pgv_error::{HarnessError, Result};
use pgv_types::{PoolId, PoolKind};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};

/// Cluster ids of the two test pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolIds {
    pub replicated: PoolId,
    pub erasure: PoolId,
}

impl PoolIds {
    #[must_use]
    pub fn get(&self, kind: PoolKind) -> PoolId {
        match kind {
            PoolKind::Replicated => self.replicated,
            PoolKind::Erasure => self.erasure,
        }
    }
}

fn require(out: &CommandOutput, what: &str) -> Result<()> {
    if out.success() {
        return Ok(());
    }
    let detail = out.first_stderr_line().unwrap_or_default();
    Err(HarnessError::Setup(format!(
        "{what} exited with {} {detail}",
        out.status_text()
    )))
}

/// Drives the live cluster to create the test objects and records them.
pub struct WorkloadGenerator<'a> {
    cluster: &'a Cluster<'a>,
    pools: &'a PoolsConfig,
    workload: &'a WorkloadConfig,
    rule: GenerationRule,
    data_dir: PathBuf,
}

impl<'a> WorkloadGenerator<'a> {
    #[must_use]
    pub fn new(
        cluster: &'a Cluster<'a>,
        pools: &'a PoolsConfig,
        workload: &'a WorkloadConfig,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            cluster,
            pools,
            workload,
            rule: GenerationRule::new(workload.data_line_count),
            data_dir,
        }
    }

    /// Set the erasure profile, create both pools and resolve their ids.
    pub fn create_pools(&self) -> Result<PoolIds> {
        let pools = self.pools;
        let out = self
            .cluster
            .set_erasure_profile(&pools.ec_profile, &pools.ec_profile_params)?;
        require(&out, "erasure-code-profile set")?;

        let rep = &pools.replicated.name;
        let out = self.cluster.create_pool(
            rep,
            pools.pg_count,
            pools.pgp_count,
            PoolKind::Replicated,
            None,
        )?;
        require(&out, &format!("create pool {rep}"))?;

        let ec = &pools.erasure.name;
        let out = self.cluster.create_pool(
            ec,
            pools.pg_count,
            pools.pgp_count,
            PoolKind::Erasure,
            Some(&pools.ec_profile),
        )?;
        require(&out, &format!("create pool {ec}"))?;

        let ids = PoolIds {
            replicated: self.cluster.pool_id(rep)?,
            erasure: self.cluster.pool_id(ec)?,
        };
        info!(
            target: "pgv::workload",
            replicated = %ids.replicated,
            erasure = %ids.erasure,
            "pools created"
        );
        Ok(ids)
    }

    /// Write every object of both pools, recording each into `model`.
    pub fn populate(&self, model: &mut ExpectedState, acc: &mut ErrorAccumulator) -> Result<()> {
        for kind in [PoolKind::Replicated, PoolKind::Erasure] {
            info!(
                target: "pgv::workload",
                %kind,
                objects = self.workload.object_count,
                "creating objects"
            );
            for ordinal in 1..=self.workload.object_count {
                let record = self.write_object(kind, ordinal, acc)?;
                model.insert(record);
            }
        }
        Ok(())
    }

    fn write_object(
        &self,
        kind: PoolKind,
        ordinal: u32,
        acc: &mut ErrorAccumulator,
    ) -> Result<ObjectRecord> {
        let spec = self.pools.spec(kind);
        let pool = spec.name.as_str();
        let record = GenerationRule::record(kind, &spec.object_prefix, ordinal, &self.data_dir);
        let name = record.name.as_str();

        self.rule.write_content(&record)?;
        let out = self.cluster.put(pool, name, &record.content_path)?;
        require(&out, &format!("put {name}"))?;

        for (key, value) in &record.xattrs {
            let out = self.cluster.set_xattr(pool, name, key, value)?;
            if !out.success() {
                error!(target: "pgv::workload", object = name, key, "setxattr failed");
                acc.increment(FailureCategory::Setup);
            }
        }

        if let Some(header) = &record.omap_header {
            let out = self.cluster.set_omap_header(pool, name, header)?;
            if !out.success() {
                error!(target: "pgv::workload", object = name, "setomapheader failed");
                acc.increment(FailureCategory::Setup);
            }
        }

        // Map-entry write failures are reported but never counted.
        for (key, value) in &record.omap {
            let out = self.cluster.set_omap_value(pool, name, key, value)?;
            if !out.success() {
                error!(target: "pgv::workload", object = name, key, "setomapval failed");
            }
        }

        Ok(record)
    }
}
