#![forbid(unsafe_code)]
//! Error types for pgverify.
//!
//! # Error Taxonomy
//!
//! The harness separates three kinds of failure:
//!
//! | Kind | Where it lives | Effect on the run |
//! |------|----------------|-------------------|
//! | Fatal setup error | `HarnessError` (this crate) | Aborts the run; `main` exits 1 |
//! | Accumulated verification failure | `FailureCategory` counters in `pgv-harness` | Counted, run continues |
//! | Stage-gating failure | export/remove/import counters | Counted, dependent stages skipped |
//!
//! Only the first kind is a Rust error value. A collaborator that exits
//! non-zero is *not* a `HarnessError`: the command runner reports the exit
//! status and the caller decides whether it is fatal (pool creation, object
//! put) or merely counted (every verification check).
//!
//! ## Design Constraints
//!
//! - `pgv-error` MUST NOT depend on `pgv-types` or `pgv-harness`.
//! - All payloads are owned `String`s so errors can be logged after the
//!   invocation that produced them is gone.

use thiserror::Error;

/// Unified error type for fatal harness conditions.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Operating system I/O error on a local file or directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An external program could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A stream was requested on the controlling terminal but none exists.
    #[error("no controlling terminal available")]
    TerminalUnavailable,

    /// The workload could not be established (pool or object creation).
    #[error("setup failed: {0}")]
    Setup(String),

    /// Collaborator output could not be interpreted.
    #[error("parse error: {0}")]
    Parse(String),

    /// Harness configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Cluster lifecycle command failed (start, stop, health bound).
    #[error("cluster error: {0}")]
    Cluster(String),
}

impl HarnessError {
    /// Whether this error means a terminal-dependent check cannot run here.
    ///
    /// Callers use it to log such checks as skipped instead of failed.
    #[must_use]
    pub fn is_terminal_unavailable(&self) -> bool {
        matches!(self, Self::TerminalUnavailable)
    }
}

/// Result alias using `HarnessError`.
pub type Result<T> = std::result::Result<T, HarnessError>;
