//! # replica-guard - Replication quality checks
//!
//! replica-guard verifies that tables copied from a transactional
//! PostgreSQL database into an analytical warehouse arrived intact. It runs
//! four fixed checks and reports a verdict per table:
//!
//! - **Row counts**: source and destination hold the same number of rows.
//! - **Duplicate keys**: no primary-key value appears twice in the destination.
//! - **Referential integrity**: every foreign key in the destination has a
//!   parent row.
//! - **Freshness**: the newest update is within the lookback window.
//!
//! The destination is chosen by [`Environment`](environment::Environment):
//! `local` runs an embedded DataFusion engine over a Parquet directory,
//! `staging` and `production` talk to a Trino-compatible query service.
//! Validators never see which one they are using.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use replica_guard::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let config = Arc::new(ValidationConfig::load("replica-guard.toml")?);
//! let engine = ValidationEngine::from_config(config.clone())?;
//!
//! let report = engine
//!     .run(Environment::Local, Some(&config.default_tables), &CheckKind::ALL)
//!     .await?;
//!
//! println!("{}", HumanFormatter::new().format(&report)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Statuses
//!
//! | Status | Meaning |
//! |---|---|
//! | `OK` | The check passed |
//! | `WARNING` | The data has a problem (mismatch, duplicates, orphans, staleness) |
//! | `ERROR` | The check itself could not run for this table |
//! | `SKIP` | The check does not apply (no primary key, no relations, no update column) |
//!
//! Failures are contained per table: one table's `ERROR` never affects
//! another table. Only connection, configuration and schema-document
//! failures abort a run.

pub mod backend;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod formatters;
pub mod logging;
pub mod prelude;
pub mod result;
pub mod security;
pub mod validators;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;
