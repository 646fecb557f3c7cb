//! Export every PG copy, remove it, import it back.
//!
//! Each destructive step runs only when every earlier step succeeded:
//!
//! ```text
//! NotStarted -> Exported -> Removed -> Imported -> Verified
//!      \____________\___________\__________\______> Skipped
//! ```
//!
//! The export tree (`<scratch>/export/<node>/<pg>`) is removed when the stage
//! returns, on every path.

use super::{VerifyContext, step_name};
use crate::accumulator::FailureCategory;
use crate::scanner::Scanner;
use crate::scratch::ScratchDir;
use pgv_error::Result;
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::time::Instant;
use tracing::{info, warn};

pub const SKIP_IMPORT: &str = "skipping import tests due to previous failures";
pub const SKIP_IMPORT_CHECKS: &str = "skipping import data checks due to previous failures";

/// Progress of the export → remove → import → verify sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoundTripState {
    NotStarted,
    Exported,
    Removed,
    Imported,
    Verified,
    Skipped,
}

impl RoundTripState {
    /// The state a successful step leads to; `None` from terminal states.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::Exported),
            Self::Exported => Some(Self::Removed),
            Self::Removed => Some(Self::Imported),
            Self::Imported => Some(Self::Verified),
            Self::Verified | Self::Skipped => None,
        }
    }

    /// Advance when `ok`, otherwise fall into `Skipped`.
    #[must_use]
    pub fn advance(self, ok: bool) -> Self {
        match self.next() {
            Some(next) if ok => next,
            _ => Self::Skipped,
        }
    }
}

pub fn run(ctx: &mut VerifyContext<'_>) -> Result<()> {
    let export_root = ScratchDir::create(ctx.scratch.export_dir())?;
    export(ctx, &export_root)?;
    ctx.round_trip = ctx
        .round_trip
        .advance(ctx.acc.gate(&[FailureCategory::Export]));
    if ctx.round_trip != RoundTripState::Exported {
        warn!(target: "pgv::verify", "{SKIP_IMPORT}");
        ctx.skip("remove", "all", SKIP_IMPORT);
        ctx.skip("import", "all", SKIP_IMPORT);
        return Ok(());
    }

    remove(ctx)?;
    ctx.round_trip = ctx
        .round_trip
        .advance(ctx.acc.gate(&[FailureCategory::Export, FailureCategory::Remove]));
    if ctx.round_trip != RoundTripState::Removed {
        ctx.skip("import", "all", SKIP_IMPORT);
        return Ok(());
    }

    import(ctx, &export_root)?;
    ctx.round_trip = ctx.round_trip.advance(ctx.acc.gate(&[
        FailureCategory::Export,
        FailureCategory::Remove,
        FailureCategory::Import,
    ]));
    Ok(())
}

fn export(ctx: &mut VerifyContext<'_>, export_root: &ScratchDir) -> Result<()> {
    info!(target: "pgv::verify", "testing pg export");
    for node in ctx.scanner.list_nodes() {
        fs::create_dir_all(export_root.path().join(node.as_str()))?;
    }
    let tool = ctx.tool();
    for pg in ctx.inventory.all() {
        for node in ctx.scanner.list_owning_nodes(&pg) {
            let started = Instant::now();
            let file = export_root.path().join(node.as_str()).join(pg.to_string());
            let step = step_name(&pg, &node);
            let input = json!({ "pg": pg, "node": node, "file": file.display().to_string() });
            let out = tool.export(&node, &pg, &file)?;
            if out.success() {
                ctx.pass("export", &step, input, json!({}), started);
            } else {
                ctx.fail(
                    FailureCategory::Export,
                    "export",
                    &step,
                    input,
                    started,
                    &format!("exporting failed with {}", out.status_text()),
                );
            }
        }
    }
    Ok(())
}

fn remove(ctx: &mut VerifyContext<'_>) -> Result<()> {
    info!(target: "pgv::verify", "testing pg removal");
    let tool = ctx.tool();
    for pg in ctx.inventory.all() {
        for node in ctx.scanner.list_owning_nodes(&pg) {
            let started = Instant::now();
            let step = step_name(&pg, &node);
            let input = json!({ "pg": pg, "node": node });
            let out = tool.remove(&node, &pg)?;
            if out.success() {
                ctx.pass("remove", &step, input, json!({}), started);
            } else {
                ctx.fail(
                    FailureCategory::Remove,
                    "remove",
                    &step,
                    input,
                    started,
                    &format!("removing failed with {}", out.status_text()),
                );
            }
        }
    }
    Ok(())
}

fn import(ctx: &mut VerifyContext<'_>, export_root: &ScratchDir) -> Result<()> {
    info!(target: "pgv::verify", "testing pg import");
    let tool = ctx.tool();
    for node in ctx.scanner.list_nodes() {
        for file in Scanner::regular_files(&export_root.path().join(node.as_str())) {
            let started = Instant::now();
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let step = format!("{name}@{node}");
            let input = json!({ "node": node, "file": file.display().to_string() });
            let out = tool.import(&node, &file)?;
            if out.success() {
                ctx.pass("import", &step, input, json!({}), started);
            } else {
                ctx.fail(
                    FailureCategory::Import,
                    "import",
                    &step,
                    input,
                    started,
                    &format!("import failed with {}", out.status_text()),
                );
            }
        }
    }
    Ok(())
}
