#![forbid(unsafe_code)]
//! Black-box verification harness for per-PG export, import and object
//! attribute tooling.
//!
//! A run brings up a developer cluster, writes a known workload into one
//! replicated and one erasure-coded pool, stops the cluster and then drives
//! the per-PG tool directly against the node stores: listing, byte and
//! attribute access, info and log dumps, and a full export/remove/import
//! round trip whose result is compared with the workload model.

pub mod accumulator;
pub mod cluster;
pub mod config;
pub mod exec;
pub mod model;
pub mod pipeline;
pub mod resolver;
pub mod scanner;
pub mod scratch;
pub mod steplog;
pub mod tool;
pub mod verify;
pub mod workload;

#[cfg(test)]
pub(crate) mod testing;

pub use accumulator::{ErrorAccumulator, FailureCategory};
pub use config::HarnessConfig;
pub use exec::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use pipeline::{RunOptions, RunOutcome, RunReport, Verdict};
