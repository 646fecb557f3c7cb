//! The tool must refuse malformed invocations with a precise diagnostic.

use super::{VerifyContext, step_name};
use crate::accumulator::FailureCategory;
use crate::exec::{Input, Invocation, Output};
use crate::tool::PgOp;
use pgv_error::{HarnessError, Result};
use serde_json::json;
use std::fs;
use std::time::Instant;
use tracing::info;

const STAGE: &str = "invalid-args";

pub const STDOUT_TTY: &str = "stdout is a tty and no --file option specified";
pub const PGID_WITH_IMPORT: &str = "--pgid option invalid with import";
pub const OPEN_ENOENT: &str = "open: No such file or directory";
pub const STDIN_TTY: &str = "stdin is a tty and no --file option specified";

struct Case {
    step: &'static str,
    invocation: Invocation,
    expected: &'static str,
    needs_terminal: bool,
}

pub fn run(ctx: &mut VerifyContext<'_>) -> Result<()> {
    info!(target: "pgv::verify", "testing invalid parameters");
    let started = Instant::now();
    let Some(pg) = ctx.inventory.replicated.first().cloned() else {
        ctx.fail(
            FailureCategory::Setup,
            STAGE,
            "discover",
            json!({ "pool": ctx.pool_ids.replicated }),
            started,
            "no replicated PG on disk",
        );
        return Ok(());
    };
    let Some(node) = ctx.scanner.list_owning_nodes(&pg).into_iter().next() else {
        ctx.fail(
            FailureCategory::Setup,
            STAGE,
            "discover",
            json!({ "pg": pg }),
            started,
            "replicated PG has no owning node",
        );
        return Ok(());
    };

    let tool = ctx.tool();
    let empty = ctx.scratch.file("invalid-args.empty");
    fs::write(empty.path(), b"")?;
    let missing = ctx.scratch.file("invalid-args.missing");
    missing.clear()?;

    let cases = [
        Case {
            step: "export-stdout-tty",
            invocation: tool
                .pg_op(&node, PgOp::Export, Some(&pg), None)
                .stdin(Input::Terminal)
                .stdout(Output::Terminal),
            expected: STDOUT_TTY,
            needs_terminal: true,
        },
        Case {
            step: "import-with-pgid",
            invocation: tool.pg_op(&node, PgOp::Import, Some(&pg), Some(empty.path())),
            expected: PGID_WITH_IMPORT,
            needs_terminal: false,
        },
        Case {
            step: "import-missing-file",
            invocation: tool.pg_op(&node, PgOp::Import, None, Some(missing.path())),
            expected: OPEN_ENOENT,
            needs_terminal: false,
        },
        Case {
            step: "import-stdin-tty",
            invocation: tool
                .pg_op(&node, PgOp::Import, None, None)
                .stdin(Input::Terminal)
                .stdout(Output::Terminal),
            expected: STDIN_TTY,
            needs_terminal: true,
        },
    ];

    let target = step_name(&pg, &node);
    for case in cases {
        check(ctx, &target, case)?;
    }
    Ok(())
}

fn check(ctx: &mut VerifyContext<'_>, target: &str, case: Case) -> Result<()> {
    let step = format!("{}:{target}", case.step);
    if case.needs_terminal && !ctx.terminal {
        ctx.skip(STAGE, &step, "no controlling terminal");
        return Ok(());
    }
    let started = Instant::now();
    let input = json!({ "command": case.invocation.to_string(), "expected": case.expected });
    let out = match ctx.tool().run(&case.invocation) {
        Ok(out) => out,
        Err(HarnessError::TerminalUnavailable) => {
            ctx.skip(STAGE, &step, "no controlling terminal");
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    if out.success() {
        ctx.fail(
            FailureCategory::InvalidArgument,
            STAGE,
            &step,
            input,
            started,
            "should have failed, but got exit 0",
        );
        return Ok(());
    }
    let line = out.first_stderr_line().unwrap_or_default();
    if line == case.expected {
        info!(target: "pgv::verify", "correctly failed with message \"{line}\"");
        ctx.pass(STAGE, &step, input, json!({ "stderr": line }), started);
    } else {
        ctx.fail(
            FailureCategory::InvalidArgument,
            STAGE,
            &step,
            input,
            started,
            &format!("bad message to stderr \"{line}\""),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use crate::testing::ScriptedRunner;
    use crate::verify::fixture::fixture;

    /// A tool that rejects every malformed invocation correctly.
    fn well_behaved(inv: &Invocation) -> CommandOutput {
        let has = |flag: &str| inv.arg_position(flag).is_some();
        let message = match inv.flag_value("--type") {
            Some("export") if !has("--file") => STDOUT_TTY,
            Some("import") if has("--pgid") => PGID_WITH_IMPORT,
            Some("import") if has("--file") => OPEN_ENOENT,
            Some("import") => STDIN_TTY,
            _ => return CommandOutput::exited(0),
        };
        CommandOutput::exited(1).with_stderr(format!("{message}\n"))
    }

    #[test]
    fn correct_diagnostics_pass() {
        let fx = fixture();
        let runner = ScriptedRunner::handler(well_behaved);
        let mut ctx = fx.context(&runner);
        ctx.terminal = true;
        run(&mut ctx).expect("stage");
        assert_eq!(ctx.acc.total(), 0);
        assert_eq!(ctx.log.counts().ok, 4);
        let calls = runner.calls();
        assert_eq!(calls[0].stdout, Output::Terminal);
        assert_eq!(calls[1].flag_value("--pgid"), Some("1.0"));
        assert_eq!(calls[3].arg_position("--pgid"), None);
    }

    #[test]
    fn terminal_checks_skip_without_tty() {
        let fx = fixture();
        let runner = ScriptedRunner::handler(well_behaved);
        let mut ctx = fx.context(&runner);
        run(&mut ctx).expect("stage");
        assert_eq!(ctx.acc.total(), 0);
        assert_eq!(ctx.log.counts().skip, 2);
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn zero_exit_and_wrong_message_are_counted() {
        let fx = fixture();
        let runner = ScriptedRunner::sequence(vec![
            CommandOutput::exited(0),
            CommandOutput::exited(1).with_stderr("something else\n"),
        ]);
        let mut ctx = fx.context(&runner);
        run(&mut ctx).expect("stage");
        assert_eq!(ctx.acc.count(FailureCategory::InvalidArgument), 2);
    }

    #[test]
    fn no_replicated_pg_counts_setup() {
        let fx = fixture();
        let runner = ScriptedRunner::always(CommandOutput::exited(0));
        let mut ctx = fx.context(&runner);
        ctx.inventory.replicated.clear();
        run(&mut ctx).expect("stage");
        assert_eq!(ctx.acc.count(FailureCategory::Setup), 1);
        assert!(runner.calls().is_empty());
    }
}
