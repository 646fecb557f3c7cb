//! `--type list` on every copy of every PG holding test objects; builds the
//! identifier corpus used by the object-level stages.

use super::{VerifyContext, step_name};
use crate::accumulator::FailureCategory;
use crate::resolver;
use pgv_error::Result;
use serde_json::json;
use std::time::Instant;
use tracing::info;

const STAGE: &str = "listing";

pub fn run(ctx: &mut VerifyContext<'_>) -> Result<()> {
    info!(target: "pgv::verify", "testing --type list by generating json for all objects");
    let tool = ctx.tool();
    for pg in ctx.inventory.with_objects() {
        for node in ctx.scanner.list_owning_nodes(&pg) {
            let started = Instant::now();
            let step = step_name(&pg, &node);
            let input = json!({ "pg": pg, "node": node });
            match resolver::list_pg(&tool, &pg, &node)? {
                Some(lines) => {
                    let count = lines.len();
                    ctx.corpus.extend(lines);
                    ctx.pass(STAGE, &step, input, json!({ "lines": count }), started);
                }
                None => ctx.fail(
                    FailureCategory::Listing,
                    STAGE,
                    &step,
                    input,
                    started,
                    "bad exit status from --type list request",
                ),
            }
        }
    }
    info!(target: "pgv::verify", identifiers = ctx.corpus.len(), "identifier corpus built");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{CommandOutput, Invocation};
    use crate::testing::ScriptedRunner;
    use crate::verify::fixture::{EC_POOL, REP_POOL, fixture, listing_line};

    fn lister(inv: &Invocation) -> CommandOutput {
        let stdout = match inv.flag_value("--pgid") {
            Some("1.0") => format!(
                "{}\n{}\n",
                listing_line("REPobject1", REP_POOL),
                listing_line("REPobject2", REP_POOL)
            ),
            Some("2.0s0") => format!("{}\n", listing_line("ECobject1", EC_POOL)),
            _ => String::new(),
        };
        CommandOutput::exited(0).with_stdout(stdout)
    }

    #[test]
    fn replicated_copies_deduplicate() {
        let fx = fixture();
        let runner = ScriptedRunner::handler(lister);
        let mut ctx = fx.context(&runner);
        run(&mut ctx).expect("stage");
        // 1.0 on two nodes, 2.0s0 on one; the empty 1.1 is never listed.
        assert_eq!(runner.calls().len(), 3);
        assert_eq!(ctx.corpus.len(), 3);
        assert_eq!(ctx.acc.total(), 0);
        assert!(ctx.corpus.resolve("ECobject1").is_some());
    }

    #[test]
    fn failed_listing_is_counted() {
        let fx = fixture();
        let runner = ScriptedRunner::always(CommandOutput::exited(1));
        let mut ctx = fx.context(&runner);
        run(&mut ctx).expect("stage");
        assert_eq!(ctx.acc.count(FailureCategory::Listing), 3);
        assert!(ctx.corpus.is_empty());
    }
}
