//! Synchronous command execution seam.
//!
//! Every collaborator (cluster admin CLI, cluster client, per-PG tool,
//! lifecycle scripts) is reached through [`CommandRunner`]. Production code
//! uses [`SystemRunner`]; tests substitute an in-process fake.

use pgv_error::{HarnessError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

const TERMINAL_DEVICE: &str = "/dev/tty";

/// Where a child's stdin comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Null,
    Terminal,
    File(PathBuf),
}

/// Where a child's stdout or stderr goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Capture,
    Null,
    Terminal,
    File { path: PathBuf, append: bool },
}

/// One external program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub stdin: Input,
    pub stdout: Output,
    pub stderr: Output,
}

impl Invocation {
    /// Invocation with stdin from `/dev/null` and both output streams captured.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            stdin: Input::Null,
            stdout: Output::Capture,
            stderr: Output::Capture,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn stdin(mut self, input: Input) -> Self {
        self.stdin = input;
        self
    }

    #[must_use]
    pub fn stdout(mut self, output: Output) -> Self {
        self.stdout = output;
        self
    }

    #[must_use]
    pub fn stderr(mut self, output: Output) -> Self {
        self.stderr = output;
        self
    }

    /// Send stdout to a file, truncating it.
    #[must_use]
    pub fn stdout_to(self, path: &Path) -> Self {
        self.stdout(Output::File {
            path: path.to_path_buf(),
            append: false,
        })
    }

    /// Position of `needle` in the argument vector.
    #[must_use]
    pub fn arg_position(&self, needle: &str) -> Option<usize> {
        self.args.iter().position(|arg| arg == needle)
    }

    /// Value following a `--flag value` pair.
    #[must_use]
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let index = self.arg_position(flag)?;
        self.args.get(index + 1).map(String::as_str)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) || arg.contains('"') {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Exit status and captured streams of a finished invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the child was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    #[must_use]
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<Vec<u8>>) -> Self {
        self.stdout = stdout.into();
        self
    }

    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<Vec<u8>>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Non-empty stdout lines, trailing newlines removed.
    #[must_use]
    pub fn stdout_lines(&self) -> Vec<String> {
        non_empty_lines(&self.stdout)
    }

    /// First stderr line, if any.
    #[must_use]
    pub fn first_stderr_line(&self) -> Option<String> {
        non_empty_lines(&self.stderr).into_iter().next()
    }

    /// Short human form of the exit status for log messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| "signal".to_owned(), |code| code.to_string())
    }
}

fn non_empty_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Narrow process-execution interface.
///
/// A non-zero exit is reported through [`CommandOutput::code`], never as an
/// `Err`; `Err` means the invocation could not be carried out at all.
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        (**self).run(invocation)
    }
}

/// Runs invocations as real child processes, blocking until they exit.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    /// Working directory for every child; inherits ours when `None`.
    pub workdir: Option<PathBuf>,
}

impl SystemRunner {
    #[must_use]
    pub fn new(workdir: Option<PathBuf>) -> Self {
        Self { workdir }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(target: "pgv::exec", cmd = %invocation, "run");

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        command.envs(&invocation.env);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }
        command.stdin(stdin_for(&invocation.stdin)?);
        command.stdout(output_for(&invocation.stdout)?);
        command.stderr(output_for(&invocation.stderr)?);

        let output = command.output().map_err(|source| HarnessError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

fn open_terminal() -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(TERMINAL_DEVICE)
        .map_err(|_| HarnessError::TerminalUnavailable)
}

fn stdin_for(input: &Input) -> Result<Stdio> {
    Ok(match input {
        Input::Null => Stdio::null(),
        Input::Terminal => Stdio::from(open_terminal()?),
        Input::File(path) => Stdio::from(File::open(path)?),
    })
}

fn output_for(output: &Output) -> Result<Stdio> {
    Ok(match output {
        Output::Capture => Stdio::piped(),
        Output::Null => Stdio::null(),
        Output::Terminal => Stdio::from(open_terminal()?),
        Output::File { path, append } => {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .append(*append)
                .truncate(!*append)
                .open(path)?;
            Stdio::from(file)
        }
    })
}

/// Whether a controlling terminal can be opened by this process.
#[must_use]
pub fn terminal_available() -> bool {
    open_terminal().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_builder_and_display() {
        let inv = Invocation::new("./tool")
            .args(["--type", "list"])
            .arg("{\"oid\":\"a b\"}")
            .env("OSD", "4");
        assert_eq!(inv.flag_value("--type"), Some("list"));
        assert_eq!(inv.flag_value("--pgid"), None);
        assert_eq!(inv.env.get("OSD").map(String::as_str), Some("4"));
        assert_eq!(inv.to_string(), "./tool --type list '{\"oid\":\"a b\"}'");
    }

    #[test]
    fn output_helpers() {
        let out = CommandOutput::exited(1)
            .with_stdout("a\n\nb\r\n")
            .with_stderr("\nfirst\nsecond\n");
        assert!(!out.success());
        assert_eq!(out.stdout_lines(), vec!["a", "b"]);
        assert_eq!(out.first_stderr_line().as_deref(), Some("first"));
        assert_eq!(out.status_text(), "1");
        assert_eq!(CommandOutput::default().status_text(), "signal");
    }

    #[test]
    fn system_runner_captures_streams_and_status() {
        let runner = SystemRunner::default();
        let out = runner
            .run(&Invocation::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .expect("sh available");
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout_lines(), vec!["out"]);
        assert_eq!(out.first_stderr_line().as_deref(), Some("err"));
    }

    #[test]
    fn system_runner_file_redirection() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("in");
        let dst = dir.path().join("out");
        std::fs::write(&src, b"payload\n").expect("write input");

        let inv = Invocation::new("cat")
            .stdin(Input::File(src))
            .stdout_to(&dst);
        let out = SystemRunner::default().run(&inv).expect("cat available");
        assert!(out.success());
        assert_eq!(std::fs::read(&dst).expect("read output"), b"payload\n");

        let append = Invocation::new("echo").arg("more").stdout(Output::File {
            path: dst.clone(),
            append: true,
        });
        SystemRunner::default().run(&append).expect("echo");
        assert_eq!(
            std::fs::read_to_string(&dst).expect("read output"),
            "payload\nmore\n"
        );
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = SystemRunner::default()
            .run(&Invocation::new("/nonexistent/pgverify-probe"))
            .expect_err("spawn must fail");
        assert!(matches!(err, HarnessError::Spawn { .. }));
    }
}
