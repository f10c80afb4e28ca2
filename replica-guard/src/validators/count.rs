//! Row-count parity between source and destination.

use super::{log_result, single_count, ValidationContext};
use crate::backend::{execute_destination_query, execute_source_query, release, QueryBackend};
use crate::environment::Environment;
use crate::error::Result;
use crate::result::{CheckDetails, TableResults, ValidationResult};
use crate::security::SqlSecurity;
use tracing::instrument;

/// Compares row counts for every table.
///
/// Equal counts are `OK`, any difference is a `WARNING`. A table whose
/// count cannot be obtained on either side is an `ERROR` with both counts
/// reported as zero.
#[instrument(skip_all, fields(env = %env, tables = tables.len()))]
pub async fn validate_counts(
    ctx: &ValidationContext<'_>,
    env: Environment,
    tables: &[String],
) -> Result<TableResults> {
    let source = ctx.connector.connect_source(env).await?;
    let destination = match ctx.connector.connect_destination(env).await {
        Ok(handle) => handle,
        Err(e) => {
            release(source).await;
            return Err(e);
        }
    };

    let mut results = TableResults::new();
    for table in tables {
        if results.contains_key(table) {
            continue;
        }
        let result = match count_table(ctx, env, source.as_ref(), destination.as_ref(), table).await
        {
            Ok(result) => result,
            Err(e) => ValidationResult::error_with(counts(0, 0), e),
        };
        log_result("count", table, &result);
        results.insert(table.clone(), result);
    }

    release(source).await;
    release(destination).await;
    Ok(results)
}

async fn count_table(
    ctx: &ValidationContext<'_>,
    env: Environment,
    source: &dyn QueryBackend,
    destination: &dyn QueryBackend,
    table: &str,
) -> Result<ValidationResult> {
    SqlSecurity::validate_identifier(table)?;
    let qualified = ctx.destination_table(env, table)?;

    let source_count = single_count(
        execute_source_query(source, &format!("SELECT COUNT(*) FROM {table}"), ctx.log).await?,
    )?;
    let destination_count = single_count(
        execute_destination_query(
            env,
            destination,
            &format!("SELECT COUNT(*) FROM {qualified}"),
            ctx.log,
        )
        .await?,
    )?;

    let details = counts(source_count as i64, destination_count as i64);
    if source_count == destination_count {
        Ok(ValidationResult::ok(details))
    } else {
        let difference = source_count as i64 - destination_count as i64;
        Ok(ValidationResult::warning(
            details,
            format!("row counts differ by {difference:+}"),
        ))
    }
}

fn counts(source_count: i64, destination_count: i64) -> CheckDetails {
    CheckDetails::Count {
        source_count,
        destination_count,
        difference: source_count - destination_count,
    }
}
