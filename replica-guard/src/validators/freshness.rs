//! Freshness of the most recent update in the destination.

use super::{log_result, single_value, LazyDestination, ValidationContext};
use crate::backend::{execute_destination_query, execute_source_query, release, QueryBackend};
use crate::environment::Environment;
use crate::error::Result;
use crate::result::{CheckDetails, CheckStatus, TableResults, ValidationResult};
use crate::security::SqlSecurity;
use chrono::{DateTime, Duration, Utc};
use tracing::instrument;

/// Classifies the newest update timestamp against `now` and `now - lookback`.
///
/// Timestamps after `now` are reported separately: they usually mean a
/// clock or timezone problem upstream rather than fresh data.
pub fn classify_freshness(
    newest: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    lookback: Duration,
) -> (CheckStatus, String) {
    let cutoff = now - lookback;
    match newest {
        None => (CheckStatus::Warning, "no timestamped records".to_string()),
        Some(ts) if ts > now => (
            CheckStatus::Warning,
            format!("newest update {} is in the future", ts.to_rfc3339()),
        ),
        Some(ts) if ts > cutoff => (
            CheckStatus::Ok,
            format!(
                "updated within the last {}h (newest {})",
                lookback.num_hours(),
                ts.to_rfc3339()
            ),
        ),
        Some(ts) => (
            CheckStatus::Warning,
            format!(
                "stale: newest update {} is older than {}h",
                ts.to_rfc3339(),
                lookback.num_hours()
            ),
        ),
    }
}

/// Checks that each table received updates within the lookback window.
///
/// The update column is looked up in the source schema; tables without it
/// are `SKIP`ped. `now` is captured once so every table is judged against
/// the same cutoff.
#[instrument(skip_all, fields(env = %env, tables = tables.len()))]
pub async fn validate_freshness(
    ctx: &ValidationContext<'_>,
    env: Environment,
    tables: &[String],
) -> Result<TableResults> {
    let source = ctx.connector.connect_source(env).await?;
    let mut destination = LazyDestination::new(ctx.connector, env);
    let outcome = check_tables(ctx, env, tables, source.as_ref(), &mut destination).await;
    release(source).await;
    destination.release().await;
    outcome
}

async fn check_tables(
    ctx: &ValidationContext<'_>,
    env: Environment,
    tables: &[String],
    source: &dyn QueryBackend,
    destination: &mut LazyDestination<'_>,
) -> Result<TableResults> {
    let column = ctx.settings.freshness_column.as_str();
    let lookback = Duration::hours(i64::from(ctx.settings.freshness_lookback_hours));
    let now = Utc::now();

    let mut results = TableResults::new();
    for table in tables {
        if results.contains_key(table) {
            continue;
        }

        let result = match has_column(ctx, source, table, column).await {
            Ok(false) => ValidationResult::skip(format!("'{table}' has no {column} column")),
            Ok(true) => {
                let handle = destination.get().await?;
                match newest_update(ctx, env, handle, table, column).await {
                    Ok(newest) => {
                        let (status, message) = classify_freshness(newest, now, lookback);
                        ValidationResult {
                            status,
                            details: Some(CheckDetails::Freshness {
                                column: column.to_string(),
                                newest_update: newest,
                                cutoff: now - lookback,
                            }),
                            message: Some(message),
                            error: None,
                        }
                    }
                    Err(e) => ValidationResult::error(e),
                }
            }
            Err(e) => ValidationResult::error(e),
        };
        log_result("freshness", table, &result);
        results.insert(table.clone(), result);
    }
    Ok(results)
}

async fn has_column(
    ctx: &ValidationContext<'_>,
    source: &dyn QueryBackend,
    table: &str,
    column: &str,
) -> Result<bool> {
    SqlSecurity::validate_identifier(table)?;
    SqlSecurity::validate_identifier(column)?;
    let query = format!(
        "SELECT column_name FROM information_schema.columns \
         WHERE table_name = {} AND column_name = {}",
        SqlSecurity::quote_literal(table),
        SqlSecurity::quote_literal(column)
    );
    Ok(execute_source_query(source, &query, ctx.log).await?.is_some())
}

async fn newest_update(
    ctx: &ValidationContext<'_>,
    env: Environment,
    destination: &dyn QueryBackend,
    table: &str,
    column: &str,
) -> Result<Option<DateTime<Utc>>> {
    let qualified = ctx.destination_table(env, table)?;
    let query = format!("SELECT MAX({column}) AS newest_update FROM {qualified}");
    single_value(execute_destination_query(env, destination, &query, ctx.log).await?)?
        .as_timestamp()
}
