//! Verification stages.
//!
//! Stages run in a fixed order over one [`VerifyContext`]. Each stage
//! records one step-log entry per check and counts failures in the
//! context's [`ErrorAccumulator`]; the destructive round-trip stages consult
//! the accumulator before doing anything that depends on an earlier stage.
//!
//! A stage returns `Err` only for conditions that make further checking
//! meaningless (a collaborator that cannot be spawned, local I/O failure).

pub mod attrs;
pub mod bytes;
pub mod info;
pub mod invalid_args;
pub mod listing;
pub mod pglog;
pub mod post_import;
pub mod roundtrip;

use crate::accumulator::{ErrorAccumulator, FailureCategory};
use crate::cluster::Cluster;
use crate::config::HarnessConfig;
use crate::exec::CommandRunner;
use crate::model::{ExpectedState, ObjectRecord};
use crate::resolver::{self, IdentifierCorpus};
use crate::scanner::Scanner;
use crate::scratch::RunScratch;
use crate::steplog::{StepEntry, StepLog};
use crate::tool::PgTool;
use crate::workload::PoolIds;
use pgv_error::Result;
use pgv_types::{JsonId, NodeName, PgId, PoolKind};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{error, warn};

pub use roundtrip::RoundTripState;

/// Whether object content on disk still equals the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentState {
    Pristine,
    /// Mutated by the byte stage and not (yet) fully restored.
    Dirty,
}

/// PGs discovered on disk for both test pools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PgInventory {
    pub replicated: BTreeSet<PgId>,
    pub erasure: BTreeSet<PgId>,
    pub replicated_with_objects: BTreeSet<PgId>,
    pub erasure_with_objects: BTreeSet<PgId>,
}

impl PgInventory {
    #[must_use]
    pub fn discover(scanner: &Scanner, pools: PoolIds, config: &HarnessConfig) -> Self {
        let rep = scanner.scan_pool(pools.replicated, &config.pools.replicated.object_prefix);
        let ec = scanner.scan_pool(pools.erasure, &config.pools.erasure.object_prefix);
        Self {
            replicated: rep.pgs,
            erasure: ec.pgs,
            replicated_with_objects: rep.with_objects,
            erasure_with_objects: ec.with_objects,
        }
    }

    /// Every PG, replicated pool first.
    #[must_use]
    pub fn all(&self) -> Vec<PgId> {
        self.replicated.iter().chain(&self.erasure).cloned().collect()
    }

    /// PGs holding test objects, replicated pool first.
    #[must_use]
    pub fn with_objects(&self) -> Vec<PgId> {
        self.replicated_with_objects
            .iter()
            .chain(&self.erasure_with_objects)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn holds_objects(&self, pg: &PgId) -> bool {
        self.replicated_with_objects.contains(pg) || self.erasure_with_objects.contains(pg)
    }
}

/// One place an object can be addressed through the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTarget {
    pub pg: PgId,
    pub node: NodeName,
    pub id: JsonId,
}

/// Shared state threaded through every stage.
pub struct VerifyContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub config: &'a HarnessConfig,
    pub scanner: &'a Scanner,
    pub scratch: &'a RunScratch,
    pub model: &'a ExpectedState,
    pub pool_ids: PoolIds,
    pub inventory: PgInventory,
    /// A controlling terminal is available for tty-dependent checks.
    pub terminal: bool,
    pub acc: ErrorAccumulator,
    pub log: StepLog,
    pub corpus: IdentifierCorpus,
    pub content: ContentState,
    pub round_trip: RoundTripState,
}

impl<'a> VerifyContext<'a> {
    #[must_use]
    pub fn tool(&self) -> PgTool<'a> {
        let config: &'a HarnessConfig = self.config;
        PgTool::new(self.runner, &config.tool, self.scanner)
    }

    #[must_use]
    pub fn cluster(&self) -> Cluster<'a> {
        let config: &'a HarnessConfig = self.config;
        Cluster::new(self.runner, &config.cluster)
    }

    pub fn pass(
        &mut self,
        stage: &str,
        step: &str,
        input: serde_json::Value,
        output: serde_json::Value,
        started: Instant,
    ) {
        self.log
            .push(StepEntry::ok(stage, step, input, output, started.elapsed()));
    }

    /// Count one failure and record it.
    pub fn fail(
        &mut self,
        category: FailureCategory,
        stage: &str,
        step: &str,
        input: serde_json::Value,
        started: Instant,
        message: &str,
    ) {
        error!(target: "pgv::verify", stage, step, %category, "{message}");
        self.acc.increment(category);
        self.log.push(StepEntry::err(
            stage,
            step,
            input,
            started.elapsed(),
            &format!("{category}: {message}"),
        ));
    }

    pub fn skip(&mut self, stage: &str, step: &str, reason: &str) {
        warn!(target: "pgv::verify", stage, step, "{reason}");
        self.log.push(StepEntry::skip(stage, step, reason));
    }

    /// Corpus identifier for `name`, preferring lines attributed to its pool.
    #[must_use]
    pub fn identifier(&self, kind: PoolKind, name: &str) -> Option<JsonId> {
        self.corpus
            .resolve_in_pool(self.pool_ids.get(kind), name)
            .or_else(|| self.corpus.resolve(name))
    }

    /// Every (PG, node) of the replicated pool whose head directory holds a
    /// file for `record`, paired with the identifier to address it by.
    ///
    /// Objects missing from the corpus are looked up in a fresh per-node
    /// listing; a copy that cannot be identified at all is dropped.
    pub fn replicated_targets(&self, record: &ObjectRecord) -> Result<Vec<ObjectTarget>> {
        let corpus_id = self.identifier(record.kind, &record.name);
        let tool = self.tool();
        let mut targets = Vec::new();
        for pg in &self.inventory.replicated_with_objects {
            for node in self.scanner.list_owning_nodes(pg) {
                let head = self.scanner.head_dir(&node, pg);
                if Scanner::find_object_file(&head, &record.name).is_none() {
                    continue;
                }
                let id = match &corpus_id {
                    Some(id) => Some(id.clone()),
                    None => resolver::resolve(&tool, pg, &node, &record.name)?,
                };
                if let Some(id) = id {
                    targets.push(ObjectTarget {
                        pg: pg.clone(),
                        node,
                        id,
                    });
                }
            }
        }
        Ok(targets)
    }
}

/// Step name for a check on one PG copy.
#[must_use]
pub fn step_name(pg: &PgId, node: &NodeName) -> String {
    format!("{pg}@{node}")
}

/// Run every stage in order.
pub fn run_all(ctx: &mut VerifyContext<'_>) -> Result<()> {
    invalid_args::run(ctx)?;
    listing::run(ctx)?;
    bytes::run(ctx)?;
    attrs::run(ctx)?;
    info::run(ctx)?;
    pglog::run(ctx)?;
    roundtrip::run(ctx)?;
    post_import::run(ctx)?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::fixture::*;
    use super::*;
    use crate::exec::CommandOutput;
    use crate::testing::ScriptedRunner;

    #[test]
    fn inventory_from_layout() {
        let fx = fixture();
        let inv = PgInventory::discover(&fx.scanner, pool_ids(), &fx.config);
        assert_eq!(inv.replicated.len(), 2);
        assert_eq!(inv.replicated_with_objects.len(), 1);
        assert_eq!(inv.erasure_with_objects.len(), 1);
        let all: Vec<String> = inv.all().iter().map(ToString::to_string).collect();
        assert_eq!(all, vec!["1.0", "1.1", "2.0s0"]);
        assert!(inv.holds_objects(&"2.0s0".parse().expect("pg")));
        assert!(!inv.holds_objects(&"1.1".parse().expect("pg")));
    }

    #[test]
    fn targets_cover_every_owning_copy() {
        let fx = fixture();
        let runner = ScriptedRunner::always(CommandOutput::exited(0));
        let mut ctx = fx.context(&runner);
        ctx.corpus = fx.full_corpus();
        let record = fx.model.get("REPobject2").expect("record");
        let targets = ctx.replicated_targets(record).expect("targets");
        let nodes: Vec<&str> = targets.iter().map(|t| t.node.as_str()).collect();
        assert_eq!(nodes, vec!["osd0", "osd1"]);
        assert!(targets[0].id.as_str().contains("\"REPobject2\""));
        // Corpus hit: no per-node listing needed.
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn corpus_miss_falls_back_to_node_listing() {
        let fx = fixture();
        let line = listing_line("REPobject1", REP_POOL);
        let runner = ScriptedRunner::always(CommandOutput::exited(0).with_stdout(format!("{line}\n")));
        let ctx = fx.context(&runner);
        let record = fx.model.get("REPobject1").expect("record");
        let targets = ctx.replicated_targets(record).expect("targets");
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id.as_str(), line);
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn fail_counts_and_logs() {
        let fx = fixture();
        let runner = ScriptedRunner::always(CommandOutput::exited(0));
        let mut ctx = fx.context(&runner);
        ctx.fail(
            FailureCategory::InfoMismatch,
            "info",
            "1.0@osd0",
            serde_json::json!({}),
            Instant::now(),
            "pgid missing",
        );
        ctx.skip("export", "all", "nothing to do");
        assert_eq!(ctx.acc.count(FailureCategory::InfoMismatch), 1);
        assert_eq!(ctx.log.counts().error, 1);
        assert_eq!(ctx.log.counts().skip, 1);
        assert!(
            ctx.log.entries()[0]
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("info-mismatch"))
        );
    }
}
