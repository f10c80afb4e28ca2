//! Parsing of the declarative schema document.

use crate::error::{GuardError, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    tables: IndexMap<String, Option<TableDocument>>,
}

#[derive(Debug, Default, Deserialize)]
struct TableDocument {
    #[serde(default)]
    columns: Option<IndexMap<String, Option<ColumnDocument>>>,
}

#[derive(Debug, Default, Deserialize)]
struct ColumnDocument {
    #[serde(default)]
    primary_key: bool,
}

/// Extracts `table -> primary key column` from a schema document.
///
/// Tables and columns are scanned in document order and the first column
/// marked `primary_key: true` wins. Later marked columns are ignored.
pub(crate) fn primary_keys_from_yaml(yaml: &str) -> Result<IndexMap<String, String>> {
    let document: SchemaDocument = serde_yaml::from_str(yaml)
        .map_err(|e| GuardError::SchemaCatalog(format!("malformed schema document: {e}")))?;

    let mut keys = IndexMap::new();
    for (table, spec) in document.tables {
        let columns = spec.and_then(|t| t.columns).unwrap_or_default();
        let mut marked = columns
            .into_iter()
            .filter(|(_, column)| column.as_ref().is_some_and(|c| c.primary_key))
            .map(|(name, _)| name);

        if let Some(first) = marked.next() {
            let ignored: Vec<String> = marked.collect();
            if !ignored.is_empty() {
                debug!(table = %table, key = %first, ?ignored, "composite key; using first column only");
            }
            keys.insert(table, first);
        }
    }
    Ok(keys)
}
