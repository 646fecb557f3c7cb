//! `list-attrs` / `get-attr` against the model's extended attributes.

use super::{ObjectTarget, VerifyContext, step_name};
use crate::accumulator::FailureCategory;
use crate::model::ObjectRecord;
use pgv_error::Result;
use pgv_types::PoolKind;
use serde_json::json;
use std::time::Instant;
use tracing::info;

const STAGE: &str = "attrs";

/// Attribute keys the store maintains for itself.
pub const RESERVED_KEYS: [&str; 2] = ["_", "snapset"];

/// User attribute name from a `list-attrs` line, `None` for reserved keys.
#[must_use]
pub fn user_key(listed: &str) -> Option<&str> {
    if RESERVED_KEYS.contains(&listed) {
        return None;
    }
    Some(listed.trim_matches('_'))
}

pub fn run(ctx: &mut VerifyContext<'_>) -> Result<()> {
    info!(target: "pgv::verify", "testing list-attrs and get-attr");
    let model = ctx.model;
    for record in model.objects_of(PoolKind::Replicated) {
        if ctx.identifier(record.kind, &record.name).is_none() {
            // Counted once by the byte stage.
            ctx.skip(STAGE, &record.name, "object missing from the identifier corpus");
        }
        for target in ctx.replicated_targets(record)? {
            check_copy(ctx, record, &target)?;
        }
    }
    Ok(())
}

fn check_copy(ctx: &mut VerifyContext<'_>, record: &ObjectRecord, target: &ObjectTarget) -> Result<()> {
    let tool = ctx.tool();
    let ObjectTarget { pg, node, id } = target;
    let step = format!("{}:{}", record.name, step_name(pg, node));
    let input = json!({ "object": record.name, "pg": pg, "node": node });
    let started = Instant::now();

    let out = tool.list_attrs(node, pg, id)?;
    if !out.success() {
        ctx.fail(
            FailureCategory::ToolFailure,
            STAGE,
            &step,
            input,
            started,
            &format!("list-attrs failed with {}", out.status_text()),
        );
        return Ok(());
    }

    let mut remaining = record.xattrs.clone();
    let mut checked = 0_usize;
    for listed in out.stdout_lines() {
        let Some(key) = user_key(&listed) else {
            continue;
        };
        let key_step = format!("{step}:{key}");
        let Some(expected) = remaining.remove(key) else {
            ctx.fail(
                FailureCategory::AttributeMismatch,
                STAGE,
                &key_step,
                input.clone(),
                started,
                &format!("the key {key} should not be present"),
            );
            continue;
        };
        let started = Instant::now();
        let out = tool.get_attr(node, pg, id, &format!("_{key}"))?;
        if !out.success() {
            ctx.fail(
                FailureCategory::ToolFailure,
                STAGE,
                &key_step,
                input.clone(),
                started,
                &format!("get-attr failed with {}", out.status_text()),
            );
            continue;
        }
        let got = out.stdout_lines().into_iter().next().unwrap_or_default();
        if got == expected {
            checked += 1;
        } else {
            ctx.fail(
                FailureCategory::AttributeMismatch,
                STAGE,
                &key_step,
                input.clone(),
                started,
                &format!("for key {key} got value {got} instead of {expected}"),
            );
        }
    }

    for key in remaining.keys() {
        ctx.fail(
            FailureCategory::AttributeMissing,
            STAGE,
            &format!("{step}:{key}"),
            input.clone(),
            started,
            &format!("attribute {key} not listed"),
        );
    }
    if remaining.is_empty() {
        ctx.pass(STAGE, &step, input, json!({ "checked": checked }), started);
    }
    Ok(())
}
