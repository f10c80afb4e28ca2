//! Deployment environments.

use crate::error::{GuardError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The deployment context a validation run targets.
///
/// The environment selects which destination backend is used and which
/// dataset namespace holds the replicated tables. It is a `Copy` value and
/// is passed by value, so it cannot change during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Developer machine; the destination is the embedded engine.
    Local,
    /// Shared pre-production; the destination is the distributed service.
    Staging,
    /// Production; the destination is the distributed service.
    Production,
}

/// The kind of engine a destination handle talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Transactional source database.
    Postgres,
    /// In-process DataFusion engine over the local warehouse files.
    Embedded,
    /// Remote Trino-compatible query service.
    Distributed,
}

impl Environment {
    /// All environments, in promotion order.
    pub const ALL: [Environment; 3] = [
        Environment::Local,
        Environment::Staging,
        Environment::Production,
    ];

    /// Returns the canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Returns the destination backend used by this environment.
    pub fn destination_kind(&self) -> BackendKind {
        match self {
            Environment::Local => BackendKind::Embedded,
            Environment::Staging | Environment::Production => BackendKind::Distributed,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "staging" | "dev" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(GuardError::Configuration(format!(
                "Unknown environment '{other}'. Expected one of: local, staging (dev), production (prod)"
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Postgres => "PostgreSQL",
            BackendKind::Embedded => "DataFusion",
            BackendKind::Distributed => "Trino",
        };
        f.write_str(name)
    }
}
