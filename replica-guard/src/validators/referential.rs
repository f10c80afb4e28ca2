//! Orphaned foreign keys in the destination.

use super::{log_result, single_count, LazyDestination, ValidationContext};
use crate::backend::{execute_destination_query, QueryBackend};
use crate::catalog::FkRelation;
use crate::environment::Environment;
use crate::error::{GuardError, Result};
use crate::result::{CheckDetails, ReferentialOutcome, ReferentialResults, ValidationResult};
use crate::security::SqlSecurity;
use indexmap::IndexMap;
use tracing::instrument;

/// Counts child rows whose foreign key has no matching parent row.
///
/// Every declared edge of a table is checked independently and gets its own
/// result. Tables with no declared relations get a single table-level `SKIP`.
#[instrument(skip_all, fields(env = %env, tables = tables.len()))]
pub async fn validate_referential_integrity(
    ctx: &ValidationContext<'_>,
    env: Environment,
    tables: &[String],
) -> Result<ReferentialResults> {
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
) -> Result<ReferentialResults> {
    let mut results = ReferentialResults::new();
    for table in tables {
        if results.contains_key(table) {
            continue;
        }
        let Some(edges) = ctx.catalog.relations_for(table) else {
            let result = ValidationResult::skip(format!("no foreign keys declared for '{table}'"));
            log_result("referential", table, &result);
            results.insert(table.clone(), ReferentialOutcome::Skipped(result));
            continue;
        };

        let handle = destination.get().await?;
        let mut edge_results = IndexMap::new();
        for (fk_column, relation) in edges {
            let result = match count_orphans(ctx, env, handle, table, fk_column, relation).await {
                Ok(result) => result,
                Err(e) => ValidationResult::error(e),
            };
            log_result("referential", &format!("{table}.{fk_column}"), &result);
            edge_results.insert(fk_column.clone(), result);
        }
        results.insert(table.clone(), ReferentialOutcome::Edges(edge_results));
    }
    Ok(results)
}

async fn count_orphans(
    ctx: &ValidationContext<'_>,
    env: Environment,
    destination: &dyn QueryBackend,
    table: &str,
    fk_column: &str,
    relation: &FkRelation,
) -> Result<ValidationResult> {
    let parent_key = ctx.catalog.parent_key(relation).ok_or_else(|| {
        GuardError::SchemaCatalog(format!(
            "no key column known for parent table '{}'",
            relation.parent_table
        ))
    })?;
    SqlSecurity::validate_identifier(fk_column)?;
    SqlSecurity::validate_identifier(parent_key)?;
    let child = ctx.destination_table(env, table)?;
    let parent = ctx.destination_table(env, &relation.parent_table)?;

    let query = format!(
        "SELECT COUNT(*) AS orphan_count FROM {child} c \
         LEFT JOIN {parent} p ON c.{fk_column} = p.{parent_key} \
         WHERE c.{fk_column} IS NOT NULL AND p.{parent_key} IS NULL"
    );
    let orphan_count =
        single_count(execute_destination_query(env, destination, &query, ctx.log).await?)?;

    let details = CheckDetails::Orphans {
        fk_column: fk_column.to_string(),
        parent_table: relation.parent_table.clone(),
        orphan_count,
    };
    if orphan_count == 0 {
        Ok(ValidationResult::ok(details))
    } else {
        Ok(ValidationResult::warning(
            details,
            format!(
                "{orphan_count} row(s) reference missing {}",
                relation.parent_table
            ),
        ))
    }
}
