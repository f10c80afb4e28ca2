//! Validation results and reports.

use crate::environment::Environment;
use crate::error::{GuardError, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// The verdict of one check on one table (or one foreign-key edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    /// The replica satisfies the check
    Ok,
    /// The check ran and found a problem in the data
    Warning,
    /// The check could not be completed
    Error,
    /// The check does not apply to this table
    Skip,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warning => "WARNING",
            CheckStatus::Error => "ERROR",
            CheckStatus::Skip => "SKIP",
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, CheckStatus::Skip)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four quality dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Count,
    Duplicates,
    ReferentialIntegrity,
    Freshness,
}

impl CheckKind {
    /// All check kinds, in the order a full run executes them.
    pub const ALL: [CheckKind; 4] = [
        CheckKind::Count,
        CheckKind::Duplicates,
        CheckKind::ReferentialIntegrity,
        CheckKind::Freshness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Count => "count",
            CheckKind::Duplicates => "duplicates",
            CheckKind::ReferentialIntegrity => "referential",
            CheckKind::Freshness => "freshness",
        }
    }

    /// Heading used in human-readable reports.
    pub fn title(&self) -> &'static str {
        match self {
            CheckKind::Count => "ROW COUNT VALIDATION",
            CheckKind::Duplicates => "DUPLICATE KEY VALIDATION",
            CheckKind::ReferentialIntegrity => "REFERENTIAL INTEGRITY VALIDATION",
            CheckKind::Freshness => "FRESHNESS VALIDATION",
        }
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckKind {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "count" | "counts" => Ok(CheckKind::Count),
            "duplicates" | "duplicate" => Ok(CheckKind::Duplicates),
            "referential" | "referential_integrity" | "fk" => Ok(CheckKind::ReferentialIntegrity),
            "freshness" => Ok(CheckKind::Freshness),
            other => Err(GuardError::Configuration(format!(
                "Unknown check '{other}'. Expected one of: count, duplicates, referential, freshness"
            ))),
        }
    }
}

/// Check-specific payload of a [`ValidationResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckDetails {
    Count {
        source_count: i64,
        destination_count: i64,
        /// `source_count - destination_count`
        difference: i64,
    },
    Duplicates {
        key_column: String,
        /// Distinct key values that occur more than once
        duplicate_count: u64,
        /// Rows beyond the first for each duplicated key
        excess_rows: u64,
        /// Offending key values, possibly capped
        duplicate_keys: Vec<String>,
    },
    Orphans {
        fk_column: String,
        parent_table: String,
        orphan_count: u64,
    },
    Freshness {
        column: String,
        newest_update: Option<DateTime<Utc>>,
        cutoff: DateTime<Utc>,
    },
}

/// Result of one check on one table or foreign-key edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<CheckDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok(details: CheckDetails) -> Self {
        Self {
            status: CheckStatus::Ok,
            details: Some(details),
            message: None,
            error: None,
        }
    }

    pub fn warning(details: CheckDetails, message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warning,
            details: Some(details),
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn skip(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Skip,
            details: None,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn error(error: impl fmt::Display) -> Self {
        Self {
            status: CheckStatus::Error,
            details: None,
            message: None,
            error: Some(error.to_string()),
        }
    }

    /// An error that still carries a (defaulted) payload.
    pub fn error_with(details: CheckDetails, error: impl fmt::Display) -> Self {
        Self {
            details: Some(details),
            ..Self::error(error)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// `table -> result`, in the order tables were requested.
pub type TableResults = IndexMap<String, ValidationResult>;

/// Referential integrity outcome for one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReferentialOutcome {
    /// The table declares no relations
    Skipped(ValidationResult),
    /// `fk column -> result`, one per declared edge
    Edges(IndexMap<String, ValidationResult>),
}

impl ReferentialOutcome {
    /// Every result held by this outcome.
    pub fn results(&self) -> Vec<&ValidationResult> {
        match self {
            ReferentialOutcome::Skipped(result) => vec![result],
            ReferentialOutcome::Edges(edges) => edges.values().collect(),
        }
    }
}

/// `table -> outcome`, in the order tables were requested.
pub type ReferentialResults = IndexMap<String, ReferentialOutcome>;

/// Counts of results per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusTally {
    pub ok: usize,
    pub warning: usize,
    pub error: usize,
    pub skip: usize,
}

impl StatusTally {
    pub fn record(&mut self, status: CheckStatus) {
        match status {
            CheckStatus::Ok => self.ok += 1,
            CheckStatus::Warning => self.warning += 1,
            CheckStatus::Error => self.error += 1,
            CheckStatus::Skip => self.skip += 1,
        }
    }

    pub fn merge(&mut self, other: StatusTally) {
        self.ok += other.ok;
        self.warning += other.warning;
        self.error += other.error;
        self.skip += other.skip;
    }

    pub fn total(&self) -> usize {
        self.ok + self.warning + self.error + self.skip
    }
}

/// The output of one validator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "check", content = "results", rename_all = "snake_case")]
pub enum CheckSection {
    Count(TableResults),
    Duplicates(TableResults),
    ReferentialIntegrity(ReferentialResults),
    Freshness(TableResults),
}

impl CheckSection {
    pub fn kind(&self) -> CheckKind {
        match self {
            CheckSection::Count(_) => CheckKind::Count,
            CheckSection::Duplicates(_) => CheckKind::Duplicates,
            CheckSection::ReferentialIntegrity(_) => CheckKind::ReferentialIntegrity,
            CheckSection::Freshness(_) => CheckKind::Freshness,
        }
    }

    /// Every result in the section, referential edges flattened.
    pub fn results(&self) -> Vec<&ValidationResult> {
        match self {
            CheckSection::Count(results)
            | CheckSection::Duplicates(results)
            | CheckSection::Freshness(results) => results.values().collect(),
            CheckSection::ReferentialIntegrity(results) => {
                results.values().flat_map(ReferentialOutcome::results).collect()
            }
        }
    }

    pub fn tally(&self) -> StatusTally {
        let mut tally = StatusTally::default();
        for result in self.results() {
            tally.record(result.status);
        }
        tally
    }
}

/// All sections produced by one validation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub environment: Environment,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<CheckSection>,
}

impl QualityReport {
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            generated_at: Utc::now(),
            sections: Vec::new(),
        }
    }

    pub fn push(&mut self, section: CheckSection) {
        self.sections.push(section);
    }

    pub fn section(&self, kind: CheckKind) -> Option<&CheckSection> {
        self.sections.iter().find(|s| s.kind() == kind)
    }

    pub fn tally(&self) -> StatusTally {
        let mut tally = StatusTally::default();
        for section in &self.sections {
            tally.merge(section.tally());
        }
        tally
    }

    pub fn has_errors(&self) -> bool {
        self.tally().error > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.tally().warning > 0
    }
}
