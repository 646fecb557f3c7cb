//! Run-scoped failure accounting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category of a counted verification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCategory {
    Setup,
    InvalidArgument,
    Listing,
    ToolFailure,
    ContentMismatch,
    AttributeMismatch,
    AttributeMissing,
    InfoMismatch,
    LogMismatch,
    Export,
    Remove,
    Import,
}

impl FailureCategory {
    pub const ALL: [Self; 12] = [
        Self::Setup,
        Self::InvalidArgument,
        Self::Listing,
        Self::ToolFailure,
        Self::ContentMismatch,
        Self::AttributeMismatch,
        Self::AttributeMissing,
        Self::InfoMismatch,
        Self::LogMismatch,
        Self::Export,
        Self::Remove,
        Self::Import,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::InvalidArgument => "invalid-argument",
            Self::Listing => "listing",
            Self::ToolFailure => "tool-failure",
            Self::ContentMismatch => "content-mismatch",
            Self::AttributeMismatch => "attribute-mismatch",
            Self::AttributeMissing => "attribute-missing",
            Self::InfoMismatch => "info-mismatch",
            Self::LogMismatch => "log-mismatch",
            Self::Export => "export",
            Self::Remove => "remove",
            Self::Import => "import",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure counters for one run.
///
/// `increment` is the only mutator. Stages consult [`ErrorAccumulator::gate`]
/// before doing work that depends on an earlier stage's universal success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorAccumulator {
    counts: BTreeMap<FailureCategory, u64>,
}

impl ErrorAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, category: FailureCategory) {
        let slot = self.counts.entry(category).or_insert(0);
        *slot = slot.saturating_add(1);
    }

    #[must_use]
    pub fn count(&self, category: FailureCategory) -> u64 {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().fold(0_u64, |acc, n| acc.saturating_add(*n))
    }

    /// True only when every named category is still zero.
    #[must_use]
    pub fn gate(&self, categories: &[FailureCategory]) -> bool {
        categories.iter().all(|category| self.count(*category) == 0)
    }

    /// Non-zero counters keyed by category name.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(category, count)| (category.as_str().to_owned(), *count))
            .collect()
    }

    /// Process exit code for this run: `0` iff nothing failed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.total() > 0)
    }
}
