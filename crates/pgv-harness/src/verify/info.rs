//! `--type info` must identify the PG it was asked about.

use super::{VerifyContext, step_name};
use crate::accumulator::FailureCategory;
use pgv_error::Result;
use pgv_types::PgId;
use serde_json::json;
use std::time::Instant;
use tracing::info;

const STAGE: &str = "info";

/// True when `output` names `pg` as its `pgid`.
///
/// JSON output is inspected structurally; anything else (or JSON without a
/// top-level `pgid`) is searched for the literal `"pgid": "<pg>"`.
#[must_use]
pub fn info_names_pg(output: &str, pg: &PgId) -> bool {
    let rendered = pg.to_string();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(output) {
        if let Some(pgid) = value.get("pgid").and_then(serde_json::Value::as_str) {
            return pgid == rendered;
        }
    }
    output.contains(&format!("\"pgid\": \"{rendered}\""))
}

pub fn run(ctx: &mut VerifyContext<'_>) -> Result<()> {
    info!(target: "pgv::verify", "testing pg info");
    let tool = ctx.tool();
    for pg in ctx.inventory.all() {
        for node in ctx.scanner.list_owning_nodes(&pg) {
            let started = Instant::now();
            let step = step_name(&pg, &node);
            let input = json!({ "pg": pg, "node": node });
            let out = tool.info(&node, &pg)?;
            if !out.success() {
                ctx.fail(
                    FailureCategory::InfoMismatch,
                    STAGE,
                    &step,
                    input,
                    started,
                    &format!("getting info failed with {}", out.status_text()),
                );
            } else if info_names_pg(&String::from_utf8_lossy(&out.stdout), &pg) {
                ctx.pass(STAGE, &step, input, json!({ "pgid": pg }), started);
            } else {
                ctx.fail(
                    FailureCategory::InfoMismatch,
                    STAGE,
                    &step,
                    input,
                    started,
                    "info does not carry the requested pgid",
                );
            }
        }
    }
    Ok(())
}
