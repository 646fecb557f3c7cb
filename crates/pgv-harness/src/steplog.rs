//! Structured per-step log.
//!
//! Every verification check appends one [`StepEntry`]; the collected
//! [`StepLog`] is written as NDJSON next to the run report when an artifact
//! directory is configured.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Ok,
    Error,
    Skip,
}

/// A single structured log entry for one check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEntry {
    pub ts: u64,
    pub stage: String,
    pub step: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub duration_us: u64,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepEntry {
    fn now() -> u64 {
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }

    fn micros(duration: Duration) -> u64 {
        u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
    }

    #[must_use]
    pub fn ok(
        stage: &str,
        step: &str,
        input: serde_json::Value,
        output: serde_json::Value,
        duration: Duration,
    ) -> Self {
        Self {
            ts: Self::now(),
            stage: stage.to_owned(),
            step: step.to_owned(),
            input,
            output,
            duration_us: Self::micros(duration),
            status: StepStatus::Ok,
            error: None,
        }
    }

    #[must_use]
    pub fn err(
        stage: &str,
        step: &str,
        input: serde_json::Value,
        duration: Duration,
        error: &str,
    ) -> Self {
        Self {
            ts: Self::now(),
            stage: stage.to_owned(),
            step: step.to_owned(),
            input,
            output: serde_json::Value::Object(serde_json::Map::new()),
            duration_us: Self::micros(duration),
            status: StepStatus::Error,
            error: Some(error.to_owned()),
        }
    }

    #[must_use]
    pub fn skip(stage: &str, step: &str, reason: &str) -> Self {
        Self {
            ts: Self::now(),
            stage: stage.to_owned(),
            step: step.to_owned(),
            input: serde_json::json!({ "reason": reason }),
            output: serde_json::Value::Object(serde_json::Map::new()),
            duration_us: 0,
            status: StepStatus::Skip,
            error: None,
        }
    }
}

/// Step counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub ok: u64,
    pub error: u64,
    pub skip: u64,
}

/// Ordered collection of step entries for one run.
#[derive(Debug, Clone, Default)]
pub struct StepLog {
    entries: Vec<StepEntry>,
}

impl StepLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: StepEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[StepEntry] {
        &self.entries
    }

    /// Entries of one stage, in order.
    pub fn stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a StepEntry> + 'a {
        self.entries.iter().filter(move |entry| entry.stage == stage)
    }

    #[must_use]
    pub fn counts(&self) -> StepCounts {
        let mut counts = StepCounts::default();
        for entry in &self.entries {
            let slot = match entry.status {
                StepStatus::Ok => &mut counts.ok,
                StepStatus::Error => &mut counts.error,
                StepStatus::Skip => &mut counts.skip,
            };
            *slot = slot.saturating_add(1);
        }
        counts
    }

    /// Serialize all entries as newline-delimited JSON.
    pub fn to_ndjson(&self) -> Result<String> {
        let mut out = String::new();
        for entry in &self.entries {
            let line = serde_json::to_string(entry).context("failed to serialize step entry")?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let ndjson = self.to_ndjson()?;
        fs::write(path, ndjson).with_context(|| format!("write step log to {}", path.display()))?;
        Ok(())
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.status == StepStatus::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndjson_has_one_line_per_entry() {
        let mut log = StepLog::new();
        log.push(StepEntry::ok(
            "info",
            "1.0@osd0",
            serde_json::json!({"pg": "1.0"}),
            serde_json::json!({"matched": true}),
            Duration::from_micros(42),
        ));
        log.push(StepEntry::skip("post-import", "ec-reads", "previous failures"));
        let ndjson = log.to_ndjson().expect("ndjson");
        let lines: Vec<&str> = ndjson.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["status"], "ok");
        assert_eq!(first["duration_us"], 42);
        assert!(first.get("error").is_none());
        let second: StepEntry = serde_json::from_str(lines[1]).expect("entry");
        assert_eq!(second.status, StepStatus::Skip);
        assert_eq!(second.input["reason"], "previous failures");
    }

    #[test]
    fn counts_and_error_detection() {
        let mut log = StepLog::new();
        assert!(!log.has_errors());
        log.push(StepEntry::err(
            "export",
            "1.0@osd0",
            serde_json::json!({}),
            Duration::ZERO,
            "exit 1",
        ));
        log.push(StepEntry::skip("remove", "all", "export failed"));
        assert!(log.has_errors());
        assert_eq!(
            log.counts(),
            StepCounts {
                ok: 0,
                error: 1,
                skip: 1
            }
        );
        assert_eq!(log.stage("export").count(), 1);
    }

    #[test]
    fn writes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("steps.ndjson");
        let mut log = StepLog::new();
        log.push(StepEntry::skip("a", "b", "c"));
        log.write_to(&path).expect("write");
        let text = fs::read_to_string(&path).expect("read");
        assert!(text.ends_with('\n'));
        assert!(text.contains("\"stage\":\"a\""));
    }
}
