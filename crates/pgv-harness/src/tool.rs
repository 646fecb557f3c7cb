//! Invocation builders for the per-PG data tool.
//!
//! `<tool> <store-flag> <root>/<node> <journal-flag> <root>/<node>.journal
//!  [--type <op>] [--pgid <pg>] [--file <path>] [<json-id> <object-op> ...]`

use crate::config::ToolConfig;
use crate::exec::{CommandOutput, CommandRunner, Input, Invocation, Output};
use crate::scanner::Scanner;
use pgv_error::Result;
use pgv_types::{JsonId, NodeName, PgId};
use std::fmt;
use std::path::Path;

/// PG-level operations selected with `--type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgOp {
    Export,
    Import,
    List,
    Info,
    Log,
    Remove,
}

impl PgOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::Import => "import",
            Self::List => "list",
            Self::Info => "info",
            Self::Log => "log",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for PgOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stdout target argument meaning "write to standard output".
pub const STDOUT_TARGET: &str = "-";

/// Builds and runs tool invocations against one node's store.
pub struct PgTool<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a ToolConfig,
    scanner: &'a Scanner,
}

impl<'a> PgTool<'a> {
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner, config: &'a ToolConfig, scanner: &'a Scanner) -> Self {
        Self {
            runner,
            config,
            scanner,
        }
    }

    pub fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.runner.run(invocation)
    }

    /// Invocation with only the store and journal selected.
    #[must_use]
    pub fn base(&self, node: &NodeName) -> Invocation {
        Invocation::new(&self.config.program).args([
            self.config.store_flag.clone(),
            self.scanner.node_dir(node).display().to_string(),
            self.config.journal_flag.clone(),
            self.scanner.journal_path(node).display().to_string(),
        ])
    }

    /// `--type <op> [--pgid <pg>] [--file <file>]`.
    #[must_use]
    pub fn pg_op(&self, node: &NodeName, op: PgOp, pg: Option<&PgId>, file: Option<&Path>) -> Invocation {
        let mut invocation = self.base(node).args(["--type", op.as_str()]);
        if let Some(pg) = pg {
            invocation = invocation.arg("--pgid").arg(pg.to_string());
        }
        if let Some(file) = file {
            invocation = invocation.arg("--file").arg(file.display().to_string());
        }
        invocation
    }

    /// `--pgid <pg> <json-id> <op> [extra...]`.
    #[must_use]
    pub fn object_op(&self, node: &NodeName, pg: &PgId, id: &JsonId, op: &str, extra: &[&str]) -> Invocation {
        self.base(node)
            .arg("--pgid")
            .arg(pg.to_string())
            .arg(id.as_str())
            .arg(op)
            .args(extra.iter().copied())
    }

    pub fn list(&self, node: &NodeName, pg: &PgId) -> Result<CommandOutput> {
        self.run(&self.pg_op(node, PgOp::List, Some(pg), None).stderr(Output::Null))
    }

    pub fn info(&self, node: &NodeName, pg: &PgId) -> Result<CommandOutput> {
        self.run(&self.pg_op(node, PgOp::Info, Some(pg), None).stderr(Output::Null))
    }

    pub fn log(&self, node: &NodeName, pg: &PgId) -> Result<CommandOutput> {
        self.run(&self.pg_op(node, PgOp::Log, Some(pg), None).stderr(Output::Null))
    }

    pub fn export(&self, node: &NodeName, pg: &PgId, file: &Path) -> Result<CommandOutput> {
        self.run(
            &self
                .pg_op(node, PgOp::Export, Some(pg), Some(file))
                .stdout(Output::Null)
                .stderr(Output::Null),
        )
    }

    pub fn remove(&self, node: &NodeName, pg: &PgId) -> Result<CommandOutput> {
        self.run(&self.pg_op(node, PgOp::Remove, Some(pg), None).stdout(Output::Null))
    }

    pub fn import(&self, node: &NodeName, file: &Path) -> Result<CommandOutput> {
        self.run(&self.pg_op(node, PgOp::Import, None, Some(file)).stdout(Output::Null))
    }

    /// `get-bytes <target>`; `target` may be [`STDOUT_TARGET`].
    pub fn get_bytes(&self, node: &NodeName, pg: &PgId, id: &JsonId, target: &str) -> Result<CommandOutput> {
        self.run(&self.object_op(node, pg, id, "get-bytes", &[target]))
    }

    /// `set-bytes <source>`.
    pub fn set_bytes_from(&self, node: &NodeName, pg: &PgId, id: &JsonId, source: &Path) -> Result<CommandOutput> {
        let source = source.display().to_string();
        self.run(&self.object_op(node, pg, id, "set-bytes", &[source.as_str()]))
    }

    /// `set-bytes` with no source argument, fed `source` on stdin.
    pub fn set_bytes_stdin(&self, node: &NodeName, pg: &PgId, id: &JsonId, source: &Path) -> Result<CommandOutput> {
        self.run(
            &self
                .object_op(node, pg, id, "set-bytes", &[])
                .stdin(Input::File(source.to_path_buf())),
        )
    }

    pub fn list_attrs(&self, node: &NodeName, pg: &PgId, id: &JsonId) -> Result<CommandOutput> {
        self.run(&self.object_op(node, pg, id, "list-attrs", &[]))
    }

    pub fn get_attr(&self, node: &NodeName, pg: &PgId, id: &JsonId, key: &str) -> Result<CommandOutput> {
        self.run(&self.object_op(node, pg, id, "get-attr", &[key]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    fn fixture() -> (ToolConfig, Scanner) {
        (ToolConfig::default(), Scanner::new("dev", "osd"))
    }

    #[test]
    fn pg_op_argv() {
        let (config, scanner) = fixture();
        let runner = ScriptedRunner::always(CommandOutput::exited(0));
        let tool = PgTool::new(&runner, &config, &scanner);
        let pg: PgId = "1.4".parse().expect("pg");
        let inv = tool.pg_op(
            &NodeName("osd1".into()),
            PgOp::Export,
            Some(&pg),
            Some(Path::new("/tmp/x/osd1/1.4")),
        );
        assert_eq!(inv.program, "./ceph_filestore_dump");
        assert_eq!(
            inv.args,
            vec![
                "--store-path",
                "dev/osd1",
                "--journal-path",
                "dev/osd1.journal",
                "--type",
                "export",
                "--pgid",
                "1.4",
                "--file",
                "/tmp/x/osd1/1.4"
            ]
        );
    }

    #[test]
    fn object_op_passes_identifier_as_one_argument() {
        let (config, scanner) = fixture();
        let runner = ScriptedRunner::always(CommandOutput::exited(0));
        let tool = PgTool::new(&runner, &config, &scanner);
        let pg: PgId = "1.4".parse().expect("pg");
        let id = JsonId(r#"{"oid":"REPobject1","key":"","snapid":-2}"#.into());
        tool.get_attr(&NodeName("osd0".into()), &pg, &id, "_key2-1")
            .expect("run");
        let call = &runner.calls()[0];
        assert_eq!(call.args[4..], ["--pgid", "1.4", id.as_str(), "get-attr", "_key2-1"]);
    }

    #[test]
    fn restore_feeds_stdin() {
        let (config, scanner) = fixture();
        let runner = ScriptedRunner::always(CommandOutput::exited(0));
        let tool = PgTool::new(&runner, &config, &scanner);
        let pg: PgId = "1.0".parse().expect("pg");
        tool.set_bytes_stdin(
            &NodeName("osd0".into()),
            &pg,
            &JsonId("{}".into()),
            Path::new("/data/REPobject1"),
        )
        .expect("run");
        let call = &runner.calls()[0];
        assert_eq!(call.args.last().map(String::as_str), Some("set-bytes"));
        assert_eq!(call.stdin, Input::File("/data/REPobject1".into()));
    }
}
