//! Duplicate primary keys in the destination.

use super::{log_result, LazyDestination, ValidationContext};
use crate::backend::{execute_destination_query_rows, QueryBackend, Value};
use crate::environment::Environment;
use crate::error::{GuardError, Result};
use crate::result::{CheckDetails, TableResults, ValidationResult};
use crate::security::SqlSecurity;
use tracing::instrument;

/// Looks for primary-key values that occur more than once in the destination.
///
/// Tables without a known primary key are `SKIP`ped before any connection
/// is made, so an unreachable destination does not affect them.
#[instrument(skip_all, fields(env = %env, tables = tables.len()))]
pub async fn validate_duplicates(
    ctx: &ValidationContext<'_>,
    env: Environment,
    tables: &[String],
) -> Result<TableResults> {
    let mut destination = LazyDestination::new(ctx.connector, env);
    let outcome = check_tables(ctx, env, tables, &mut destination).await;
    destination.release().await;
    outcome
}

async fn check_tables(
    ctx: &ValidationContext<'_>,
    env: Environment,
    tables: &[String],
    destination: &mut LazyDestination<'_>,
) -> Result<TableResults> {
    let mut results = TableResults::new();
    for table in tables {
        if results.contains_key(table) {
            continue;
        }
        let Some(key_column) = ctx.catalog.primary_key(table) else {
            let result = ValidationResult::skip(format!("no primary key known for '{table}'"));
            log_result("duplicates", table, &result);
            results.insert(table.clone(), result);
            continue;
        };

        let handle = destination.get().await?;
        let result = match find_duplicates(ctx, env, handle, table, key_column).await {
            Ok(result) => result,
            Err(e) => ValidationResult::error(e),
        };
        log_result("duplicates", table, &result);
        results.insert(table.clone(), result);
    }
    Ok(results)
}

async fn find_duplicates(
    ctx: &ValidationContext<'_>,
    env: Environment,
    destination: &dyn QueryBackend,
    table: &str,
    key_column: &str,
) -> Result<ValidationResult> {
    SqlSecurity::validate_identifier(key_column)?;
    let qualified = ctx.destination_table(env, table)?;
    let query = format!(
        "SELECT CAST({key_column} AS VARCHAR) AS key_value, COUNT(*) AS occurrences \
         FROM {qualified} WHERE {key_column} IS NOT NULL \
         GROUP BY {key_column} HAVING COUNT(*) > 1 ORDER BY key_value"
    );

    let rows = execute_destination_query_rows(env, destination, &query, ctx.log).await?;

    let mut duplicate_keys = Vec::new();
    let mut excess_rows = 0u64;
    for row in &rows {
        let [key, occurrences] = row.as_slice() else {
            return Err(GuardError::Parse(format!(
                "expected 2 columns in duplicate scan, found {}",
                row.len()
            )));
        };
        let occurrences = occurrences.as_i64()?;
        excess_rows += u64::try_from(occurrences - 1).unwrap_or(0);
        if duplicate_keys.len() < ctx.settings.max_reported_keys {
            duplicate_keys.push(render_key(key));
        }
    }

    let duplicate_count = rows.len() as u64;
    let details = CheckDetails::Duplicates {
        key_column: key_column.to_string(),
        duplicate_count,
        excess_rows,
        duplicate_keys,
    };

    if duplicate_count == 0 {
        Ok(ValidationResult::ok(details))
    } else {
        Ok(ValidationResult::warning(
            details,
            format!("{duplicate_count} duplicated value(s) of {key_column} ({excess_rows} extra row(s))"),
        ))
    }
}

fn render_key(value: &Value) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RelationMap, SchemaCatalog};
    use crate::result::CheckStatus;
    use crate::test_helpers::SessionConnector;
    use crate::validators::test_support::Fixture;
    use indexmap::IndexMap;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_parts(
            IndexMap::from([
                ("contents".to_string(), "content_id".to_string()),
                ("accounts".to_string(), "id".to_string()),
            ]),
            RelationMap::new(),
        )
    }

    #[tokio::test]
    async fn test_duplicates_found_and_counted() -> Result<()> {
        let connector = SessionConnector::new("raw_local").await;
        connector
            .destination_sql(
                "CREATE TABLE raw_local.contents AS \
                 SELECT column1 AS content_id FROM (VALUES (1), (1), (2), (3), (3), (3))",
            )
            .await;
        connector
            .destination_sql(
                "CREATE TABLE raw_local.accounts AS SELECT column1 AS id FROM (VALUES (1), (2))",
            )
            .await;

        let fixture = Fixture::new(catalog());
        let ctx = fixture.context(&connector);
        let tables = vec!["contents".to_string(), "accounts".to_string()];
        let results = validate_duplicates(&ctx, Environment::Local, &tables).await?;

        let contents = &results["contents"];
        assert_eq!(contents.status, CheckStatus::Warning);
        assert_eq!(
            contents.details,
            Some(CheckDetails::Duplicates {
                key_column: "content_id".to_string(),
                duplicate_count: 2,
                excess_rows: 3,
                duplicate_keys: vec!["1".to_string(), "3".to_string()],
            })
        );

        let accounts = &results["accounts"];
        assert_eq!(accounts.status, CheckStatus::Ok);
        match &accounts.details {
            Some(CheckDetails::Duplicates { duplicate_keys, .. }) => {
                assert!(duplicate_keys.is_empty())
            }
            other => panic!("unexpected details {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_reported_keys_are_capped() -> Result<()> {
        let connector = SessionConnector::new("raw_local").await;
        connector
            .destination_sql(
                "CREATE TABLE raw_local.accounts AS \
                 SELECT column1 AS id FROM (VALUES (1), (1), (2), (2), (3), (3))",
            )
            .await;

        let mut fixture = Fixture::new(catalog());
        fixture.settings.max_reported_keys = 2;
        let ctx = fixture.context(&connector);
        let results = validate_duplicates(&ctx, Environment::Local, &["accounts".to_string()]).await?;

        match &results["accounts"].details {
            Some(CheckDetails::Duplicates {
                duplicate_count,
                duplicate_keys,
                ..
            }) => {
                assert_eq!(*duplicate_count, 3);
                assert_eq!(duplicate_keys.len(), 2);
            }
            other => panic!("unexpected details {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_null_keys_are_not_duplicates() -> Result<()> {
        let connector = SessionConnector::new("raw_local").await;
        connector
            .destination_sql(
                "CREATE TABLE raw_local.accounts AS \
                 SELECT CAST(column1 AS BIGINT) AS id FROM (VALUES (1), (NULL), (NULL), (2), (2))",
            )
            .await;

        let fixture = Fixture::new(catalog());
        let ctx = fixture.context(&connector);
        let results = validate_duplicates(&ctx, Environment::Local, &["accounts".to_string()]).await?;

        assert_eq!(results["accounts"].status, CheckStatus::Warning);
        assert_eq!(
            results["accounts"].details,
            Some(CheckDetails::Duplicates {
                key_column: "id".to_string(),
                duplicate_count: 1,
                excess_rows: 1,
                duplicate_keys: vec!["2".to_string()],
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_tables_without_key_skip_before_connecting() -> Result<()> {
        let connector = SessionConnector::unreachable_destination();
        let fixture = Fixture::new(catalog());
        let ctx = fixture.context(&connector);

        let results =
            validate_duplicates(&ctx, Environment::Local, &["audit_log".to_string()]).await?;

        assert_eq!(results["audit_log"].status, CheckStatus::Skip);
        assert_eq!(connector.connects(), 0);
        Ok(())
    }
}
