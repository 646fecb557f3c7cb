//! `--type log` holds a `modify` entry exactly when the PG holds test objects.

use super::{VerifyContext, step_name};
use crate::accumulator::FailureCategory;
use pgv_error::Result;
use serde_json::json;
use std::time::Instant;
use tracing::info;

const STAGE: &str = "log";

#[must_use]
pub fn has_modify_entry(lines: &[String]) -> bool {
    lines.iter().any(|line| line.contains("modify"))
}

pub fn run(ctx: &mut VerifyContext<'_>) -> Result<()> {
    info!(target: "pgv::verify", "testing pg logging");
    let tool = ctx.tool();
    for pg in ctx.inventory.all() {
        let holds_objects = ctx.inventory.holds_objects(&pg);
        for node in ctx.scanner.list_owning_nodes(&pg) {
            let started = Instant::now();
            let step = step_name(&pg, &node);
            let input = json!({ "pg": pg, "node": node, "holds_objects": holds_objects });
            let out = tool.log(&node, &pg)?;
            if !out.success() {
                ctx.fail(
                    FailureCategory::LogMismatch,
                    STAGE,
                    &step,
                    input,
                    started,
                    &format!("getting log failed with {}", out.status_text()),
                );
                continue;
            }
            let modified = has_modify_entry(&out.stdout_lines());
            if modified == holds_objects {
                ctx.pass(STAGE, &step, input, json!({ "modify": modified }), started);
            } else {
                let should = if holds_objects { "" } else { "NOT " };
                ctx.fail(
                    FailureCategory::LogMismatch,
                    STAGE,
                    &step,
                    input,
                    started,
                    &format!("bad log: it should {should}have a modify entry"),
                );
            }
        }
    }
    Ok(())
}
