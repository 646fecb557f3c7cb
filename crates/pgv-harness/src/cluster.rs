//! Cluster admin, client and lifecycle collaborators.
//!
//! Thin wrappers that turn intent into [`Invocation`]s. Exit statuses are
//! returned to the caller except where this module owns the policy (start
//! failure, health bound, unparsable pool id).

use crate::config::ClusterConfig;
use crate::exec::{CommandOutput, CommandRunner, Invocation, Output};
use pgv_error::{HarnessError, Result};
use pgv_types::{PoolId, PoolKind};
use std::path::Path;
use std::thread;
use tracing::{debug, info, warn};

/// Handle on the live cluster's command-line surfaces.
pub struct Cluster<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a ClusterConfig,
}

impl<'a> Cluster<'a> {
    #[must_use]
    pub fn new(runner: &'a dyn CommandRunner, config: &'a ClusterConfig) -> Self {
        Self { runner, config }
    }

    fn admin(&self) -> Invocation {
        Invocation::new(&self.config.admin_bin)
    }

    fn client(&self, pool: &str) -> Invocation {
        Invocation::new(&self.config.client_bin).args(["-p", pool])
    }

    fn command(parts: &[String]) -> Result<Invocation> {
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| HarnessError::Config("empty lifecycle command".into()))?;
        Ok(Invocation::new(program).args(args.iter().cloned()))
    }

    /// Bring the cluster up; `fresh` wipes any previous state.
    pub fn start(&self, fresh: bool) -> Result<()> {
        info!(target: "pgv::cluster", fresh, "starting cluster");
        let mut invocation = Self::command(&self.config.start_command)?
            .stdout(Output::Null)
            .stderr(Output::Null);
        if fresh && !self.config.start_fresh_flag.is_empty() {
            invocation = invocation.arg(&self.config.start_fresh_flag);
        }
        for (key, value) in &self.config.start_env {
            invocation = invocation.env(key, value);
        }
        let out = self.runner.run(&invocation)?;
        if !out.success() {
            return Err(HarnessError::Cluster(format!(
                "start command exited with {}",
                out.status_text()
            )));
        }
        Ok(())
    }

    /// Stop the cluster. A failing stop is logged, not fatal.
    pub fn stop(&self) -> Result<()> {
        info!(target: "pgv::cluster", "stopping cluster");
        let invocation = Self::command(&self.config.stop_command)?
            .stdout(Output::Null)
            .stderr(Output::Null);
        let out = self.runner.run(&invocation)?;
        if !out.success() {
            warn!(target: "pgv::cluster", status = %out.status_text(), "stop command failed");
        }
        Ok(())
    }

    /// One health probe: ok iff exit 0 and the report starts with `HEALTH_OK`.
    pub fn health(&self) -> Result<bool> {
        let out = self
            .runner
            .run(&self.admin().arg("health").stderr(Output::Null))?;
        Ok(out.success()
            && out
                .stdout_lines()
                .first()
                .is_some_and(|line| line.trim_start().starts_with("HEALTH_OK")))
    }

    /// Poll [`Cluster::health`] at a fixed interval until it reports ok.
    pub fn wait_for_health(&self) -> Result<()> {
        info!(target: "pgv::cluster", "waiting for health ok");
        let mut polls = 0_u64;
        loop {
            if self.health()? {
                info!(target: "pgv::cluster", polls, "cluster healthy");
                return Ok(());
            }
            polls = polls.saturating_add(1);
            if let Some(max) = self.config.health_max_polls {
                if polls >= max {
                    return Err(HarnessError::Cluster(format!(
                        "cluster not healthy after {polls} polls"
                    )));
                }
            }
            debug!(target: "pgv::cluster", polls, "not healthy yet");
            thread::sleep(self.config.health_interval());
        }
    }

    pub fn set_erasure_profile(&self, profile: &str, params: &[String]) -> Result<CommandOutput> {
        self.runner.run(
            &self
                .admin()
                .args(["osd", "erasure-code-profile", "set", profile])
                .args(params.iter().cloned()),
        )
    }

    pub fn create_pool(
        &self,
        name: &str,
        pg_count: u32,
        pgp_count: u32,
        kind: PoolKind,
        profile: Option<&str>,
    ) -> Result<CommandOutput> {
        let mut invocation = self.admin().args([
            "osd".to_owned(),
            "pool".to_owned(),
            "create".to_owned(),
            name.to_owned(),
            pg_count.to_string(),
            pgp_count.to_string(),
            kind.as_str().to_owned(),
        ]);
        if let Some(profile) = profile {
            invocation = invocation.arg(profile);
        }
        self.runner.run(&invocation)
    }

    /// Pool id from `osd pool stats <name>` (`pool <name> id <n> ...`).
    pub fn pool_id(&self, name: &str) -> Result<PoolId> {
        let out = self
            .runner
            .run(&self.admin().args(["osd", "pool", "stats", name]))?;
        if !out.success() {
            return Err(HarnessError::Setup(format!(
                "pool stats for {name} exited with {}",
                out.status_text()
            )));
        }
        parse_pool_id(&String::from_utf8_lossy(&out.stdout))
    }

    pub fn put(&self, pool: &str, object: &str, file: &Path) -> Result<CommandOutput> {
        self.runner.run(
            &self
                .client(pool)
                .args(["put", object])
                .arg(file.display().to_string())
                .stderr(Output::Null),
        )
    }

    pub fn get(&self, pool: &str, object: &str, file: &Path) -> Result<CommandOutput> {
        self.runner.run(
            &self
                .client(pool)
                .args(["get", object])
                .arg(file.display().to_string())
                .stdout(Output::Null)
                .stderr(Output::Null),
        )
    }

    pub fn set_xattr(&self, pool: &str, object: &str, key: &str, value: &str) -> Result<CommandOutput> {
        self.runner
            .run(&self.client(pool).args(["setxattr", object, key, value]))
    }

    pub fn set_omap_header(&self, pool: &str, object: &str, header: &str) -> Result<CommandOutput> {
        self.runner
            .run(&self.client(pool).args(["setomapheader", object, header]))
    }

    pub fn set_omap_value(&self, pool: &str, object: &str, key: &str, value: &str) -> Result<CommandOutput> {
        self.runner
            .run(&self.client(pool).args(["setomapval", object, key, value]))
    }
}

fn parse_pool_id(stats: &str) -> Result<PoolId> {
    let field = stats
        .split_whitespace()
        .nth(3)
        .ok_or_else(|| HarnessError::Parse(format!("short pool stats output: {stats:?}")))?;
    field
        .parse()
        .map_err(|err| HarnessError::Parse(format!("{err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRunner;

    fn quick_config() -> ClusterConfig {
        ClusterConfig {
            health_interval_secs: 0,
            ..ClusterConfig::default()
        }
    }

    #[test]
    fn parses_pool_id_from_stats() {
        assert_eq!(
            parse_pool_id("pool rep_pool id 3\n  nothing is going on\n").expect("id"),
            PoolId(3)
        );
        assert!(parse_pool_id("pool rep_pool").is_err());
        assert!(parse_pool_id("pool rep_pool id x").is_err());
    }

    #[test]
    fn pool_creation_argv() {
        let runner = ScriptedRunner::always(CommandOutput::exited(0));
        let config = quick_config();
        let cluster = Cluster::new(&runner, &config);
        cluster
            .create_pool("ec_pool", 12, 12, PoolKind::Erasure, Some("prof"))
            .expect("run");
        let calls = runner.calls();
        assert_eq!(calls[0].program, "./ceph");
        assert_eq!(
            calls[0].args,
            vec!["osd", "pool", "create", "ec_pool", "12", "12", "erasure", "prof"]
        );
    }

    #[test]
    fn start_adds_fresh_flag_and_env() {
        let runner = ScriptedRunner::always(CommandOutput::exited(0));
        let config = quick_config();
        let cluster = Cluster::new(&runner, &config);
        cluster.start(true).expect("fresh start");
        cluster.start(false).expect("restart");
        let calls = runner.calls();
        assert_eq!(calls[0].args, vec!["-l", "-d", "-n"]);
        assert_eq!(calls[0].env.get("OSD").map(String::as_str), Some("4"));
        assert_eq!(calls[1].args, vec!["-l", "-d"]);
    }

    #[test]
    fn failed_start_is_fatal() {
        let runner = ScriptedRunner::always(CommandOutput::exited(1));
        let config = quick_config();
        let err = Cluster::new(&runner, &config).start(true).expect_err("fatal");
        assert!(matches!(err, HarnessError::Cluster(_)));
    }

    #[test]
    fn waits_until_healthy() {
        let runner = ScriptedRunner::sequence(vec![
            CommandOutput::exited(0).with_stdout("HEALTH_WARN 12 pgs stuck\n"),
            CommandOutput::exited(1),
            CommandOutput::exited(0).with_stdout("HEALTH_OK\n"),
        ]);
        let config = quick_config();
        Cluster::new(&runner, &config)
            .wait_for_health()
            .expect("eventually healthy");
        assert_eq!(runner.calls().len(), 3);
    }

    #[test]
    fn bounded_health_wait_gives_up() {
        let runner = ScriptedRunner::always(CommandOutput::exited(0).with_stdout("HEALTH_ERR\n"));
        let config = ClusterConfig {
            health_max_polls: Some(2),
            ..quick_config()
        };
        let err = Cluster::new(&runner, &config)
            .wait_for_health()
            .expect_err("bound reached");
        assert!(matches!(err, HarnessError::Cluster(_)));
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn client_calls_name_the_pool() {
        let runner = ScriptedRunner::always(CommandOutput::exited(0));
        let config = quick_config();
        let cluster = Cluster::new(&runner, &config);
        cluster.set_omap_value("rep_pool", "REPobject2", "okey2-1", "oval2-1").expect("run");
        cluster.put("rep_pool", "REPobject2", Path::new("/tmp/d/REPobject2")).expect("run");
        let calls = runner.calls();
        assert_eq!(calls[0].program, "./rados");
        assert_eq!(
            calls[0].args,
            vec!["-p", "rep_pool", "setomapval", "REPobject2", "okey2-1", "oval2-1"]
        );
        assert_eq!(calls[1].args[2..], ["put", "REPobject2", "/tmp/d/REPobject2"]);
    }
}
