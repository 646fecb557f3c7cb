//! `get-bytes` / `set-bytes` round trip on every on-disk copy of every
//! replicated object, finishing with a restore from the model content.
//!
//! While this stage runs the on-disk content is [`ContentState::Dirty`]; it
//! returns to `Pristine` only if every restore succeeded.

use super::{ContentState, ObjectTarget, VerifyContext, step_name};
use crate::accumulator::FailureCategory;
use crate::model::ObjectRecord;
use crate::scratch::ScratchFile;
use crate::tool::STDOUT_TARGET;
use pgv_error::Result;
use pgv_types::PoolKind;
use serde_json::json;
use std::fs;
use std::time::Instant;
use tracing::{debug, info};

const STAGE: &str = "bytes";

/// Payload written with `set-bytes` for the object backed by `record`.
#[must_use]
pub fn payload(record: &ObjectRecord) -> String {
    format!("put-bytes going into {}\n", record.content_path.display())
}

struct Files {
    get: ScratchFile,
    test: ScratchFile,
    set: ScratchFile,
}

pub fn run(ctx: &mut VerifyContext<'_>) -> Result<()> {
    info!(target: "pgv::verify", "testing get-bytes and set-bytes");
    let files = Files {
        get: ctx.scratch.file("getbytes"),
        test: ctx.scratch.file("testbytes"),
        set: ctx.scratch.file("setbytes"),
    };
    let model = ctx.model;
    let mut restore_failures = 0_u64;
    for record in model.objects_of(PoolKind::Replicated) {
        let started = Instant::now();
        if ctx.identifier(record.kind, &record.name).is_none() {
            ctx.fail(
                FailureCategory::Listing,
                STAGE,
                &record.name,
                json!({ "object": record.name }),
                started,
                "object missing from the identifier corpus",
            );
        }
        let expected = fs::read(&record.content_path)?;
        for target in ctx.replicated_targets(record)? {
            if !check_copy(ctx, &files, record, &expected, &target)? {
                restore_failures += 1;
            }
        }
    }
    if restore_failures == 0 {
        ctx.content = ContentState::Pristine;
    }
    debug!(target: "pgv::verify", restore_failures, content = ?ctx.content, "byte stage finished");
    Ok(())
}

/// Returns `false` when the copy was mutated and could not be restored.
fn check_copy(
    ctx: &mut VerifyContext<'_>,
    files: &Files,
    record: &ObjectRecord,
    expected: &[u8],
    target: &ObjectTarget,
) -> Result<bool> {
    let tool = ctx.tool();
    let ObjectTarget { pg, node, id } = target;
    let step = format!("{}:{}", record.name, step_name(pg, node));
    let input = json!({ "object": record.name, "pg": pg, "node": node });

    let started = Instant::now();
    files.get.clear()?;
    let out = tool.get_bytes(node, pg, id, &files.get.path().display().to_string())?;
    if !out.success() {
        ctx.fail(
            FailureCategory::ToolFailure,
            STAGE,
            &format!("{step}:get-bytes"),
            input,
            started,
            &format!("bad exit status {} from get-bytes", out.status_text()),
        );
        return Ok(true);
    }
    if files.get.read()?.as_deref() != Some(expected) {
        ctx.fail(
            FailureCategory::ContentMismatch,
            STAGE,
            &format!("{step}:get-bytes"),
            input.clone(),
            started,
            "data from get-bytes differ",
        );
    }

    let started = Instant::now();
    let written = payload(record);
    fs::write(files.set.path(), written.as_bytes())?;
    ctx.content = ContentState::Dirty;
    let out = tool.set_bytes_from(node, pg, id, files.set.path())?;
    if !out.success() {
        ctx.fail(
            FailureCategory::ToolFailure,
            STAGE,
            &format!("{step}:set-bytes"),
            input.clone(),
            started,
            &format!("bad exit status {} from set-bytes", out.status_text()),
        );
    }

    let started = Instant::now();
    files.test.clear()?;
    let out = tool.get_bytes(node, pg, id, &files.test.path().display().to_string())?;
    if !out.success() {
        ctx.fail(
            FailureCategory::ToolFailure,
            STAGE,
            &format!("{step}:readback-file"),
            input.clone(),
            started,
            &format!("bad exit status {} from get-bytes", out.status_text()),
        );
    } else if files.test.read()?.as_deref() != Some(written.as_bytes()) {
        ctx.fail(
            FailureCategory::ContentMismatch,
            STAGE,
            &format!("{step}:readback-file"),
            input.clone(),
            started,
            "data after set-bytes differ",
        );
    }

    let started = Instant::now();
    let out = tool.get_bytes(node, pg, id, STDOUT_TARGET)?;
    if !out.success() {
        ctx.fail(
            FailureCategory::ToolFailure,
            STAGE,
            &format!("{step}:readback-stdout"),
            input.clone(),
            started,
            &format!("bad exit status {} from get-bytes", out.status_text()),
        );
    } else if out.stdout != written.as_bytes() {
        ctx.fail(
            FailureCategory::ContentMismatch,
            STAGE,
            &format!("{step}:readback-stdout"),
            input.clone(),
            started,
            "data after set-bytes differ",
        );
    }

    let started = Instant::now();
    let out = tool.set_bytes_stdin(node, pg, id, &record.content_path)?;
    if !out.success() {
        ctx.fail(
            FailureCategory::ToolFailure,
            STAGE,
            &format!("{step}:restore"),
            input,
            started,
            &format!("bad exit status {} from set-bytes to restore object", out.status_text()),
        );
        return Ok(false);
    }
    ctx.pass(STAGE, &step, input, json!({ "restored": true }), started);
    Ok(true)
}
