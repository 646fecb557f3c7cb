//! Whole-run orchestration: cluster bring-up, workload, verification, report.

use crate::accumulator::ErrorAccumulator;
use crate::cluster::Cluster;
use crate::config::HarnessConfig;
use crate::exec::{self, CommandRunner};
use crate::model::ExpectedState;
use crate::resolver::IdentifierCorpus;
use crate::scanner::Scanner;
use crate::scratch::RunScratch;
use crate::steplog::{StepCounts, StepLog};
use crate::verify::{self, ContentState, PgInventory, RoundTripState, VerifyContext};
use crate::workload::{PoolIds, WorkloadGenerator};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, info_span, warn};

/// Per-run options that are not part of the persisted configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Directory receiving `steps.ndjson` and `report.json`.
    pub artifacts: Option<PathBuf>,
    /// Overrides the controlling-terminal probe.
    pub terminal: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PgCounts {
    pub replicated: usize,
    pub erasure: usize,
    pub replicated_with_objects: usize,
    pub erasure_with_objects: usize,
}

impl From<&PgInventory> for PgCounts {
    fn from(inventory: &PgInventory) -> Self {
        Self {
            replicated: inventory.replicated.len(),
            erasure: inventory.erasure.len(),
            replicated_with_objects: inventory.replicated_with_objects.len(),
            erasure_with_objects: inventory.erasure_with_objects.len(),
        }
    }
}

/// JSON summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub verdict: Verdict,
    pub total_failures: u64,
    pub failures: BTreeMap<String, u64>,
    pub pools: PoolIds,
    pub objects: usize,
    pub pgs: PgCounts,
    pub identifiers: usize,
    pub content: ContentState,
    pub round_trip: RoundTripState,
    pub steps: StepCounts,
    pub duration_ms: u64,
}

impl RunReport {
    /// Final human-readable line.
    #[must_use]
    pub fn verdict_line(&self) -> String {
        match self.verdict {
            Verdict::Passed => "TEST PASSED".to_owned(),
            Verdict::Failed => format!("TEST FAILED WITH {} ERRORS", self.total_failures),
        }
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.verdict == Verdict::Failed)
    }
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub report: RunReport,
    pub log: StepLog,
    pub accumulator: ErrorAccumulator,
}

/// Resolve the layout root against the collaborators' working directory.
#[must_use]
pub fn layout_root(config: &HarnessConfig) -> PathBuf {
    match &config.workdir {
        Some(workdir) if config.layout.root.is_relative() => workdir.join(&config.layout.root),
        _ => config.layout.root.clone(),
    }
}

/// Run the full harness.
///
/// Fatal setup problems are returned as errors; verification failures are
/// counted in the returned report.
pub fn run(
    config: &HarnessConfig,
    runner: &dyn CommandRunner,
    options: &RunOptions,
) -> Result<RunOutcome> {
    config.validate().context("invalid configuration")?;
    let span = info_span!(target: "pgv::pipeline", "run", pid = std::process::id());
    let _guard = span.enter();
    let started = Instant::now();

    let mut scratch = RunScratch::create(&config.scratch.root)
        .with_context(|| format!("create scratch under {}", config.scratch.root.display()))?;
    if config.scratch.keep {
        scratch.preserve();
        info!(target: "pgv::pipeline", root = %scratch.root().display(), "keeping scratch");
    }

    let cluster = Cluster::new(runner, &config.cluster);
    let lifecycle = config.cluster.manage_lifecycle;
    if lifecycle {
        cluster.start(true).context("start cluster")?;
        cluster.wait_for_health().context("wait for cluster health")?;
    }

    let mut model = ExpectedState::new();
    let mut acc = ErrorAccumulator::new();
    let generator =
        WorkloadGenerator::new(&cluster, &config.pools, &config.workload, scratch.data_dir());
    let pool_ids = generator.create_pools().context("create pools")?;
    generator
        .populate(&mut model, &mut acc)
        .context("create objects")?;
    info!(target: "pgv::pipeline", objects = model.len(), setup_failures = acc.total(), "workload written");

    if lifecycle {
        cluster.stop().context("stop cluster")?;
    }
    if config.workload.strict_setup && acc.total() > 0 {
        bail!("unable to set up test: {} setup failure(s)", acc.total());
    }

    let scanner = Scanner::new(layout_root(config), &config.layout.node_prefix);
    let inventory = PgInventory::discover(&scanner, pool_ids, config);
    info!(
        target: "pgv::pipeline",
        replicated = inventory.replicated.len(),
        erasure = inventory.erasure.len(),
        "placement groups discovered"
    );

    let terminal = options.terminal.unwrap_or_else(exec::terminal_available);
    if !terminal {
        warn!(target: "pgv::pipeline", "no controlling terminal; tty checks will be skipped");
    }

    let mut ctx = VerifyContext {
        runner,
        config,
        scanner: &scanner,
        scratch: &scratch,
        model: &model,
        pool_ids,
        inventory,
        terminal,
        acc,
        log: StepLog::new(),
        corpus: IdentifierCorpus::new(),
        content: ContentState::Pristine,
        round_trip: RoundTripState::NotStarted,
    };
    verify::run_all(&mut ctx).context("verification aborted")?;

    let total = ctx.acc.total();
    let report = RunReport {
        verdict: if total == 0 {
            Verdict::Passed
        } else {
            Verdict::Failed
        },
        total_failures: total,
        failures: ctx.acc.snapshot(),
        pools: pool_ids,
        objects: model.len(),
        pgs: PgCounts::from(&ctx.inventory),
        identifiers: ctx.corpus.len(),
        content: ctx.content,
        round_trip: ctx.round_trip,
        steps: ctx.log.counts(),
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    };
    let outcome = RunOutcome {
        report,
        log: ctx.log,
        accumulator: ctx.acc,
    };

    if let Some(dir) = &options.artifacts {
        write_artifacts(dir, &outcome)?;
    }
    Ok(outcome)
}

/// Write `steps.ndjson` and `report.json` into `dir`.
pub fn write_artifacts(dir: &Path, outcome: &RunOutcome) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    outcome.log.write_to(&dir.join("steps.ndjson"))?;
    let report = serde_json::to_string_pretty(&outcome.report)?;
    let path = dir.join("report.json");
    fs::write(&path, report).with_context(|| format!("write {}", path.display()))?;
    info!(target: "pgv::pipeline", dir = %dir.display(), "artifacts written");
    Ok(())
}
