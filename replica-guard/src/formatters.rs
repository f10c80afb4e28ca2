//! Rendering of validation reports.
//!
//! Formatters are pure: they read a [`QualityReport`] and return text.
//!
//! # Examples
//!
//! ```rust
//! use replica_guard::environment::Environment;
//! use replica_guard::formatters::{FormatterConfig, HumanFormatter, ResultFormatter};
//! use replica_guard::result::QualityReport;
//!
//! let report = QualityReport::new(Environment::Local);
//! let formatter = HumanFormatter::with_config(FormatterConfig::ci());
//! let output = formatter.format(&report).unwrap();
//! assert!(output.contains("local"));
//! ```

use crate::error::{GuardError, Result};
use crate::result::{
    CheckDetails, CheckSection, CheckStatus, QualityReport, ReferentialOutcome, StatusTally,
    ValidationResult,
};
use std::fmt::Write;

const RULE: &str = "==================================================";
const THIN_RULE: &str = "--------------------------------------------------";

/// Configuration options for formatting reports.
#[derive(Debug, Clone)]
pub struct FormatterConfig {
    /// Whether to use colorized output (for human formatter)
    pub use_colors: bool,
    /// Maximum number of duplicated keys listed per table
    pub max_keys_shown: usize,
    /// Whether to include the generation timestamp
    pub include_timestamps: bool,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            use_colors: true,
            max_keys_shown: 10,
            include_timestamps: true,
        }
    }
}

impl FormatterConfig {
    /// Creates a configuration suitable for CI/CD logs.
    pub fn ci() -> Self {
        Self {
            use_colors: false,
            max_keys_shown: 10,
            include_timestamps: true,
        }
    }

    /// Creates a configuration without colors or timestamps.
    pub fn minimal() -> Self {
        Self {
            use_colors: false,
            max_keys_shown: 5,
            include_timestamps: false,
        }
    }

    /// Sets whether to use colorized output.
    pub fn with_colors(mut self, use_colors: bool) -> Self {
        self.use_colors = use_colors;
        self
    }

    /// Sets the maximum number of duplicated keys listed per table.
    pub fn with_max_keys_shown(mut self, max: usize) -> Self {
        self.max_keys_shown = max;
        self
    }
}

/// Trait for turning reports into text.
pub trait ResultFormatter {
    /// Formats a whole report.
    fn format(&self, report: &QualityReport) -> Result<String>;

    /// Formats a single check section.
    fn format_section(&self, section: &CheckSection) -> Result<String>;
}

/// Formats reports as JSON.
#[derive(Debug, Clone)]
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    /// Sets whether to use pretty-printed JSON.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn to_json<T: serde::Serialize>(&self, value: &T) -> Result<String> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        encoded.map_err(|e| GuardError::Internal(format!("Failed to serialize report to JSON: {e}")))
    }
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultFormatter for JsonFormatter {
    fn format(&self, report: &QualityReport) -> Result<String> {
        self.to_json(report)
    }

    fn format_section(&self, section: &CheckSection) -> Result<String> {
        self.to_json(section)
    }
}

/// Formats reports for terminals and pipeline logs.
///
/// One line per table (per edge for referential integrity), prefixed with
/// a status glyph, followed by a per-section tally.
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter {
    config: FormatterConfig,
}

impl HumanFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FormatterConfig) -> Self {
        Self { config }
    }

    fn write_report(&self, out: &mut String, report: &QualityReport) -> std::fmt::Result {
        writeln!(out, "Replica quality report ({})", report.environment)?;
        if self.config.include_timestamps {
            writeln!(out, "Generated at: {}", report.generated_at.to_rfc3339())?;
        }

        for section in &report.sections {
            writeln!(out)?;
            self.write_section(out, section)?;
        }

        let tally = report.tally();
        writeln!(out)?;
        writeln!(out, "{RULE}")?;
        let verdict = if tally.error > 0 {
            self.paint(CheckStatus::Error, "FAILED")
        } else if tally.warning > 0 {
            self.paint(CheckStatus::Warning, "PASSED WITH WARNINGS")
        } else {
            self.paint(CheckStatus::Ok, "PASSED")
        };
        writeln!(out, "Overall: {verdict}")?;
        self.write_tally(out, &tally)
    }

    fn write_section(&self, out: &mut String, section: &CheckSection) -> std::fmt::Result {
        writeln!(out, "{RULE}")?;
        writeln!(out, "{}", section.kind().title())?;
        writeln!(out, "{RULE}")?;

        match section {
            CheckSection::Count(results)
            | CheckSection::Duplicates(results)
            | CheckSection::Freshness(results) => {
                if results.is_empty() {
                    writeln!(out, "(no tables)")?;
                }
                for (table, result) in results {
                    self.write_line(out, table, result)?;
                }
            }
            CheckSection::ReferentialIntegrity(results) => {
                if results.is_empty() {
                    writeln!(out, "(no tables)")?;
                }
                for (table, outcome) in results {
                    match outcome {
                        ReferentialOutcome::Skipped(result) => {
                            self.write_line(out, table, result)?
                        }
                        ReferentialOutcome::Edges(edges) => {
                            for (fk_column, result) in edges {
                                self.write_line(out, &format!("{table}.{fk_column}"), result)?;
                            }
                        }
                    }
                }
            }
        }

        writeln!(out, "{THIN_RULE}")?;
        self.write_tally(out, &section.tally())
    }

    fn write_line(&self, out: &mut String, label: &str, result: &ValidationResult) -> std::fmt::Result {
        let glyph = glyph(result.status);
        let status = self.paint(result.status, result.status.as_str());

        if let Some(error) = &result.error {
            return writeln!(out, "{glyph} {label}: {status} - {error}");
        }
        if result.status.is_skip() {
            let reason = result.message.as_deref().unwrap_or("not applicable");
            return writeln!(out, "{glyph} {label}: {status} - {reason}");
        }

        let body = match &result.details {
            Some(details) => self.describe(details),
            None => String::new(),
        };
        match (&result.message, body.is_empty()) {
            (Some(message), false) => writeln!(out, "{glyph} {label}: {status} {body} - {message}"),
            (Some(message), true) => writeln!(out, "{glyph} {label}: {status} - {message}"),
            (None, _) => writeln!(out, "{glyph} {label}: {status} {body}"),
        }
    }

    fn describe(&self, details: &CheckDetails) -> String {
        match details {
            CheckDetails::Count {
                source_count,
                destination_count,
                difference,
            } => format!("source={source_count} destination={destination_count} (diff {difference:+})"),
            CheckDetails::Duplicates {
                key_column,
                duplicate_count,
                excess_rows,
                duplicate_keys,
            } => {
                if *duplicate_count == 0 {
                    return format!("no duplicated {key_column} values");
                }
                let shown: Vec<&str> = duplicate_keys
                    .iter()
                    .take(self.config.max_keys_shown)
                    .map(String::as_str)
                    .collect();
                let hidden = (*duplicate_count as usize).saturating_sub(shown.len());
                let more = if hidden > 0 {
                    format!(", ... {hidden} more")
                } else {
                    String::new()
                };
                format!(
                    "{duplicate_count} duplicated {key_column} value(s), {excess_rows} extra row(s) [{}{more}]",
                    shown.join(", ")
                )
            }
            CheckDetails::Orphans {
                parent_table,
                orphan_count,
                ..
            } => format!("{orphan_count} orphan(s) -> {parent_table}"),
            CheckDetails::Freshness {
                column,
                newest_update,
                cutoff,
            } => match newest_update {
                Some(ts) => format!(
                    "newest {column}={} cutoff={}",
                    ts.to_rfc3339(),
                    cutoff.to_rfc3339()
                ),
                None => format!("no {column} values, cutoff={}", cutoff.to_rfc3339()),
            },
        }
    }

    fn write_tally(&self, out: &mut String, tally: &StatusTally) -> std::fmt::Result {
        writeln!(
            out,
            "{} {}  {} {}  {} {}  {} {}",
            glyph(CheckStatus::Ok),
            self.paint(CheckStatus::Ok, &tally.ok.to_string()),
            glyph(CheckStatus::Warning),
            self.paint(CheckStatus::Warning, &tally.warning.to_string()),
            glyph(CheckStatus::Error),
            self.paint(CheckStatus::Error, &tally.error.to_string()),
            glyph(CheckStatus::Skip),
            self.paint(CheckStatus::Skip, &tally.skip.to_string()),
        )
    }

    fn paint(&self, status: CheckStatus, text: &str) -> String {
        if !self.config.use_colors {
            return text.to_string();
        }
        let code = match status {
            CheckStatus::Ok => "32",
            CheckStatus::Warning => "33",
            CheckStatus::Error => "31",
            CheckStatus::Skip => "90",
        };
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

impl ResultFormatter for HumanFormatter {
    fn format(&self, report: &QualityReport) -> Result<String> {
        let mut output = String::new();
        self.write_report(&mut output, report)
            .map_err(|e| GuardError::Internal(format!("Failed to render report: {e}")))?;
        Ok(output)
    }

    fn format_section(&self, section: &CheckSection) -> Result<String> {
        let mut output = String::new();
        self.write_section(&mut output, section)
            .map_err(|e| GuardError::Internal(format!("Failed to render section: {e}")))?;
        Ok(output)
    }
}

fn glyph(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Ok => "✅",
        CheckStatus::Warning => "⚠️",
        CheckStatus::Skip => "⏭️",
        CheckStatus::Error => "❌",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use chrono::{TimeZone, Utc};
    use indexmap::IndexMap;

    fn create_test_report() -> QualityReport {
        let mut report = QualityReport::new(Environment::Staging);
        report.push(CheckSection::Count(IndexMap::from([
            (
                "accounts".to_string(),
                ValidationResult::ok(CheckDetails::Count {
                    source_count: 10,
                    destination_count: 10,
                    difference: 0,
                }),
            ),
            (
                "contents".to_string(),
                ValidationResult::warning(
                    CheckDetails::Count {
                        source_count: 12,
                        destination_count: 10,
                        difference: 2,
                    },
                    "row counts differ by +2",
                ),
            ),
        ])));
        report.push(CheckSection::Duplicates(IndexMap::from([
            (
                "contents".to_string(),
                ValidationResult::warning(
                    CheckDetails::Duplicates {
                        key_column: "content_id".to_string(),
                        duplicate_count: 3,
                        excess_rows: 4,
                        duplicate_keys: vec!["1".into(), "3".into(), "8".into()],
                    },
                    "3 duplicated value(s)",
                ),
            ),
            (
                "audit_log".to_string(),
                ValidationResult::skip("no primary key known for 'audit_log'"),
            ),
        ])));
        report.push(CheckSection::ReferentialIntegrity(IndexMap::from([(
            "contents".to_string(),
            ReferentialOutcome::Edges(IndexMap::from([(
                "account_id".to_string(),
                ValidationResult::error("Query failed on Trino: TABLE_NOT_FOUND"),
            )])),
        )])));
        report.push(CheckSection::Freshness(IndexMap::from([(
            "contents".to_string(),
            ValidationResult::ok(CheckDetails::Freshness {
                column: "updated_at".to_string(),
                newest_update: Some(Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap()),
                cutoff: Utc.with_ymd_and_hms(2024, 4, 30, 9, 0, 0).unwrap(),
            })
            .with_message("updated within the last 48h"),
        )])));
        report
    }

    #[test]
    fn test_human_formatter() {
        let formatter = HumanFormatter::with_config(FormatterConfig::minimal().with_max_keys_shown(2));
        let output = formatter.format(&create_test_report()).unwrap();

        assert!(output.contains("Replica quality report (staging)"));
        assert!(output.contains("ROW COUNT VALIDATION"));
        assert!(output.contains("✅ accounts: OK source=10 destination=10 (diff +0)"));
        assert!(output.contains("⚠️ contents: WARNING source=12 destination=10 (diff +2) - row counts differ by +2"));
        assert!(output.contains("[1, 3, ... 1 more]"));
        assert!(output.contains("⏭️ audit_log: SKIP - no primary key known for 'audit_log'"));
        assert!(output.contains("❌ contents.account_id: ERROR - Query failed on Trino"));
        assert!(output.contains("newest updated_at=2024-05-02T08:00:00+00:00"));
        assert!(output.contains("Overall: FAILED"));
        assert!(!output.contains("\x1b["));
        assert!(!output.contains("Generated at"));
    }

    #[test]
    fn test_ok_line_keeps_its_message() {
        let formatter = HumanFormatter::with_config(FormatterConfig::minimal());
        let output = formatter.format(&create_test_report()).unwrap();
        assert!(output.contains(
            "✅ contents: OK newest updated_at=2024-05-02T08:00:00+00:00 \
             cutoff=2024-04-30T09:00:00+00:00 - updated within the last 48h"
        ));
        assert!(output.contains("✅ accounts: OK source=10 destination=10 (diff +0)\n"));
    }

    #[test]
    fn test_human_formatter_colors() {
        let formatter = HumanFormatter::new();
        let output = formatter.format(&create_test_report()).unwrap();
        assert!(output.contains("\x1b[31mERROR\x1b[0m"));
    }

    #[test]
    fn test_empty_section() {
        let formatter = HumanFormatter::with_config(FormatterConfig::minimal());
        let output = formatter
            .format_section(&CheckSection::Count(IndexMap::new()))
            .unwrap();
        assert!(output.contains("(no tables)"));
    }

    #[test]
    fn test_json_formatter() {
        let formatter = JsonFormatter::new().with_pretty(false);
        let output = formatter.format(&create_test_report()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed["environment"], "staging");
        assert_eq!(parsed["sections"][0]["check"], "count");
        assert_eq!(parsed["sections"][0]["results"]["contents"]["status"], "WARNING");
        assert_eq!(
            parsed["sections"][2]["results"]["contents"]["account_id"]["status"],
            "ERROR"
        );
        assert_eq!(
            parsed["sections"][1]["results"]["contents"]["details"]["duplicate_keys"][1],
            "3"
        );
    }
}
