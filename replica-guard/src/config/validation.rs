//! Configuration validation.

use super::ValidationConfig;
use crate::error::{GuardError, Result};
use crate::security::SqlSecurity;

/// Validate the configuration.
pub fn validate(config: &ValidationConfig) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(GuardError::Configuration("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(GuardError::Configuration(
            "source.database is required".into(),
        ));
    }
    if config.source.username.is_empty() {
        return Err(GuardError::Configuration(
            "source.username is required".into(),
        ));
    }
    if let Some(schema) = &config.source.schema {
        identifier("source.schema", schema)?;
    }

    // Every name below ends up in SQL text
    identifier("datasets.local", &config.datasets.local)?;
    identifier("datasets.staging", &config.datasets.staging)?;
    identifier("datasets.production", &config.datasets.production)?;
    identifier("checks.freshness_column", &config.checks.freshness_column)?;
    for table in &config.default_tables {
        identifier("default_tables", table)?;
    }
    for (child, edges) in &config.relations {
        identifier("relations", child)?;
        for (column, relation) in edges {
            identifier(&format!("relations.{child}"), column)?;
            identifier(&format!("relations.{child}.{column}"), &relation.parent_table)?;
            if let Some(parent_column) = &relation.parent_column {
                identifier(&format!("relations.{child}.{column}"), parent_column)?;
            }
        }
    }

    if config.checks.freshness_lookback_hours == 0 {
        return Err(GuardError::Configuration(
            "checks.freshness_lookback_hours must be at least 1".into(),
        ));
    }
    if config.checks.max_reported_keys == 0 {
        return Err(GuardError::Configuration(
            "checks.max_reported_keys must be at least 1".into(),
        ));
    }

    if let Some(remote) = &config.destination.remote {
        if remote.endpoint.is_empty() {
            return Err(GuardError::Configuration(
                "destination.remote.endpoint is required".into(),
            ));
        }
        if remote.user.is_empty() {
            return Err(GuardError::Configuration(
                "destination.remote.user is required".into(),
            ));
        }
        if remote.poll_interval_ms == 0 || remote.max_wait_secs == 0 {
            return Err(GuardError::Configuration(
                "destination.remote poll_interval_ms and max_wait_secs must be positive".into(),
            ));
        }
    }

    Ok(())
}

fn identifier(field: &str, value: &str) -> Result<()> {
    SqlSecurity::validate_identifier(value)
        .map_err(|e| GuardError::Configuration(format!("{field}: {e}")))
}
