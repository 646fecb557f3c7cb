#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pgv_harness::config::HarnessConfig;
use pgv_harness::exec::SystemRunner;
use pgv_harness::pipeline::{self, RunOptions};
use pgv_harness::scanner::Scanner;
use pgv_types::PoolId;
use std::env::VarError;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── Logging ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    const ENV_KEY: &'static str = "PGV_LOG_FORMAT";

    fn parse(raw: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(raw.trim(), true)
            .map_err(|_| anyhow::anyhow!("invalid {}: {raw:?} (human|json)", Self::ENV_KEY))
    }

    fn from_env() -> Result<Option<Self>> {
        match std::env::var(Self::ENV_KEY) {
            Ok(raw) => Self::parse(&raw).map(Some),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => {
                anyhow::bail!("{} is not valid unicode", Self::ENV_KEY)
            }
        }
    }
}

fn default_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_logging(format_override: Option<LogFormat>) -> Result<()> {
    let format = match format_override {
        Some(format) => format,
        None => LogFormat::from_env()?.unwrap_or(LogFormat::Human),
    };
    match format {
        LogFormat::Human => tracing_subscriber::fmt()
            .with_env_filter(default_env_filter())
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .compact()
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize logging: {err}")),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_env_filter(default_env_filter())
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize logging: {err}")),
    }
}

// ── CLI ─────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "pgv-harness", about = "Verify per-PG export/import and object attribute tooling")]
struct Cli {
    /// Log output format (overrides PGV_LOG_FORMAT).
    #[arg(long, value_enum, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full verification against a developer cluster.
    Run {
        /// JSON configuration file; defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Working directory for the cluster scripts and tools.
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Directory holding the node stores.
        #[arg(long)]
        root: Option<PathBuf>,
        /// Objects written per pool.
        #[arg(long)]
        objects: Option<u32>,
        /// Content lines per object.
        #[arg(long)]
        lines: Option<usize>,
        /// Leave the scratch directory behind.
        #[arg(long)]
        keep_scratch: bool,
        /// Abort when any workload write fails.
        #[arg(long)]
        strict_setup: bool,
        /// Assume the cluster is managed elsewhere.
        #[arg(long)]
        no_cluster_lifecycle: bool,
        /// Write steps.ndjson and report.json into this directory.
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },
    /// Print the placement groups found on disk for a pool.
    Scan {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long)]
        pool: PoolId,
    },
    /// Print the effective configuration as JSON.
    PrintConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<HarnessConfig> {
    match path {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(HarnessConfig::default()),
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format)?;

    match cli.command {
        Command::Run {
            config,
            workdir,
            root,
            objects,
            lines,
            keep_scratch,
            strict_setup,
            no_cluster_lifecycle,
            artifacts,
        } => {
            let mut config = load_config(config.as_ref())?;
            if workdir.is_some() {
                config.workdir = workdir;
            }
            if let Some(root) = root {
                config.layout.root = root;
            }
            if let Some(objects) = objects {
                config.workload.object_count = objects;
            }
            if let Some(lines) = lines {
                config.workload.data_line_count = lines;
            }
            config.scratch.keep |= keep_scratch;
            config.workload.strict_setup |= strict_setup;
            if no_cluster_lifecycle {
                config.cluster.manage_lifecycle = false;
            }

            let span = tracing::info_span!(target: "pgv::cli", "command", name = "run");
            let _guard = span.enter();
            let runner = SystemRunner::new(config.workdir.clone());
            let outcome = pipeline::run(&config, &runner, &RunOptions {
                artifacts,
                terminal: None,
            })?;
            for (category, count) in &outcome.report.failures {
                info!(target: "pgv::cli", category = %category, count, "failures");
            }
            println!("{}", outcome.report.verdict_line());
            std::process::exit(outcome.accumulator.exit_code());
        }
        Command::Scan { config, root, pool } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(root) = root {
                config.layout.root = root;
            }
            let scanner = Scanner::new(pipeline::layout_root(&config), &config.layout.node_prefix);
            let scans = [
                scanner.scan_pool(pool, &config.pools.replicated.object_prefix),
                scanner.scan_pool(pool, &config.pools.erasure.object_prefix),
            ];
            println!("{}", serde_json::to_string_pretty(&scans)?);
            Ok(())
        }
        Command::PrintConfig { config } => {
            let config = load_config(config.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::parse("json").expect("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" Human ").expect("human"), LogFormat::Human);
        assert!(LogFormat::parse("xml").is_err());
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "pgv-harness",
            "--log-format",
            "json",
            "run",
            "--objects",
            "5",
            "--no-cluster-lifecycle",
        ])
        .expect("parse");
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        match cli.command {
            Command::Run {
                objects,
                no_cluster_lifecycle,
                ..
            } => {
                assert_eq!(objects, Some(5));
                assert!(no_cluster_lifecycle);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn scan_requires_pool() {
        assert!(Cli::try_parse_from(["pgv-harness", "scan"]).is_err());
        assert!(Cli::try_parse_from(["pgv-harness", "scan", "--pool", "3"]).is_ok());
    }
}
