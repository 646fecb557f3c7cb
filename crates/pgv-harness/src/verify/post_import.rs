//! Imported data must be byte-identical to the model: replicated objects are
//! compared on disk, erasure-coded objects are read back through a running
//! cluster.

use super::roundtrip::SKIP_IMPORT_CHECKS;
use super::{ContentState, RoundTripState, VerifyContext};
use crate::accumulator::FailureCategory;
use pgv_error::Result;
use pgv_types::PoolKind;
use serde_json::json;
use std::fs;
use std::time::Instant;
use tracing::info;

const STAGE: &str = "post-import";

/// Whether the imported data can be meaningfully compared with the model.
#[must_use]
pub fn ready(ctx: &VerifyContext<'_>) -> bool {
    ctx.round_trip == RoundTripState::Imported
        && ctx.acc.gate(&[
            FailureCategory::Export,
            FailureCategory::Remove,
            FailureCategory::Import,
        ])
        && ctx.content == ContentState::Pristine
}

pub fn run(ctx: &mut VerifyContext<'_>) -> Result<()> {
    if !ready(ctx) {
        ctx.round_trip = RoundTripState::Skipped;
        ctx.skip(STAGE, "all", SKIP_IMPORT_CHECKS);
        return Ok(());
    }
    let before = ctx.acc.count(FailureCategory::ContentMismatch);

    verify_replicated(ctx)?;

    let lifecycle = ctx.config.cluster.manage_lifecycle;
    let cluster = ctx.cluster();
    if lifecycle {
        cluster.start(false)?;
        cluster.wait_for_health()?;
    }
    let outcome = verify_erasure(ctx);
    if lifecycle {
        cluster.stop()?;
    }
    outcome?;

    // Mismatches leave the state at Imported: the data was checked, not skipped.
    if ctx.acc.count(FailureCategory::ContentMismatch) == before {
        ctx.round_trip = ctx.round_trip.advance(true);
    }
    Ok(())
}

fn verify_replicated(ctx: &mut VerifyContext<'_>) -> Result<()> {
    info!(target: "pgv::verify", "verifying replicated import data");
    let model = ctx.model;
    for record in model.objects_of(PoolKind::Replicated) {
        let started = Instant::now();
        let expected = fs::read(&record.content_path)?;
        let copies = ctx.scanner.find_object_copies(&record.name);
        let input = json!({ "object": record.name });
        if copies.is_empty() {
            ctx.fail(
                FailureCategory::ContentMismatch,
                STAGE,
                &record.name,
                input,
                started,
                "can't find imported object",
            );
            continue;
        }
        let mut bad = 0_usize;
        for copy in &copies {
            if fs::read(copy)? != expected {
                bad += 1;
                ctx.fail(
                    FailureCategory::ContentMismatch,
                    STAGE,
                    &format!("{}:{}", record.name, copy.display()),
                    input.clone(),
                    started,
                    "data not imported properly",
                );
            }
        }
        if bad == 0 {
            ctx.pass(STAGE, &record.name, input, json!({ "copies": copies.len() }), started);
        }
    }
    Ok(())
}

fn verify_erasure(ctx: &mut VerifyContext<'_>) -> Result<()> {
    info!(target: "pgv::verify", "verifying erasure coded import data");
    let model = ctx.model;
    let cluster = ctx.cluster();
    let pool = ctx.config.pools.erasure.name.clone();
    let readback = ctx.scratch.file("ecread");
    for record in model.objects_of(PoolKind::Erasure) {
        let started = Instant::now();
        let expected = fs::read(&record.content_path)?;
        readback.clear()?;
        // The exit status is not consulted: a failed get leaves nothing to compare.
        cluster.get(&pool, &record.name, readback.path())?;
        let input = json!({ "object": record.name, "pool": pool });
        if readback.read()?.as_deref() == Some(expected.as_slice()) {
            ctx.pass(STAGE, &record.name, input, json!({}), started);
        } else {
            ctx.fail(
                FailureCategory::ContentMismatch,
                STAGE,
                &record.name,
                input,
                started,
                "data not imported properly",
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{CommandOutput, Invocation};
    use crate::testing::ScriptedRunner;
    use crate::verify::fixture::fixture;

    /// A cluster whose `get` serves erasure objects from the model files.
    fn serving_cluster(data_dir: std::path::PathBuf) -> impl Fn(&Invocation) -> CommandOutput {
        move |inv: &Invocation| {
            if inv.program == "./rados" && inv.args.get(2).map(String::as_str) == Some("get") {
                let name = &inv.args[3];
                let target = &inv.args[4];
                if let Ok(data) = fs::read(data_dir.join(name)) {
                    fs::write(target, data).expect("write readback");
                    return CommandOutput::exited(0);
                }
                return CommandOutput::exited(2);
            }
            if inv.program == "./ceph" {
                return CommandOutput::exited(0).with_stdout("HEALTH_OK\n");
            }
            CommandOutput::exited(0)
        }
    }

    #[test]
    fn verified_after_clean_import() {
        let fx = fixture();
        let runner = ScriptedRunner::handler(serving_cluster(fx.scratch.data_dir()));
        let mut ctx = fx.context(&runner);
        ctx.round_trip = RoundTripState::Imported;
        run(&mut ctx).expect("stage");
        assert_eq!(ctx.acc.total(), 0);
        assert_eq!(ctx.round_trip, RoundTripState::Verified);
        let programs: Vec<String> = runner.calls().iter().map(|c| c.program.clone()).collect();
        // restart, health, one erasure get, stop
        assert_eq!(programs, vec!["./vstart.sh", "./ceph", "./rados", "./stop.sh"]);
        assert!(!runner.calls()[0].args.contains(&"-n".to_owned()));
    }

    #[test]
    fn corrupt_copy_and_missing_ec_object_are_counted() {
        let fx = fixture();
        let copy = fx.config.layout.root.join("osd1/current/1.0_head/REPobject2__head_0000");
        fs::write(&copy, b"corrupt").expect("corrupt");
        let runner = ScriptedRunner::handler(serving_cluster("/nonexistent/pgverify/data".into()));
        let mut ctx = fx.context(&runner);
        ctx.round_trip = RoundTripState::Imported;
        run(&mut ctx).expect("stage");
        assert_eq!(ctx.acc.count(FailureCategory::ContentMismatch), 2);
        assert_eq!(ctx.round_trip, RoundTripState::Imported);
    }

    #[test]
    fn dirty_content_skips() {
        let fx = fixture();
        let runner = ScriptedRunner::always(CommandOutput::exited(0));
        let mut ctx = fx.context(&runner);
        ctx.round_trip = RoundTripState::Imported;
        ctx.content = ContentState::Dirty;
        run(&mut ctx).expect("stage");
        assert_eq!(ctx.round_trip, RoundTripState::Skipped);
        assert!(runner.calls().is_empty());
        assert_eq!(ctx.log.counts().skip, 1);
    }

    #[test]
    fn without_lifecycle_reads_without_restart() {
        let mut fx = fixture();
        fx.config.cluster.manage_lifecycle = false;
        let runner = ScriptedRunner::handler(serving_cluster(fx.scratch.data_dir()));
        let mut ctx = fx.context(&runner);
        ctx.round_trip = RoundTripState::Imported;
        run(&mut ctx).expect("stage");
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "./rados");
        assert_eq!(ctx.round_trip, RoundTripState::Verified);
    }
}
