//! Table metadata used by the validators.
//!
//! Primary keys come from the declarative schema document that describes
//! the replicated tables. Foreign-key relations are a curated table supplied
//! through configuration; they are never inferred from column names or from
//! the schema document.
//!
//! Only single-column primary keys are supported. When a table marks
//! several columns, the first one in document order is used.

mod document;

use crate::error::{GuardError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, instrument};

/// A foreign-key edge from a child column to a parent table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RelationSpec")]
pub struct FkRelation {
    /// Table the foreign key points at
    pub parent_table: String,
    /// Parent column the key references. Defaults to the parent's primary key.
    pub parent_column: Option<String>,
}

impl FkRelation {
    /// A relation to `parent_table`'s primary key.
    pub fn to(parent_table: impl Into<String>) -> Self {
        Self {
            parent_table: parent_table.into(),
            parent_column: None,
        }
    }

    /// A relation to an explicit parent column.
    pub fn to_column(parent_table: impl Into<String>, parent_column: impl Into<String>) -> Self {
        Self {
            parent_table: parent_table.into(),
            parent_column: Some(parent_column.into()),
        }
    }
}

/// Accepted configuration shapes: `"accounts"` or `{ table = "accounts", column = "id" }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RelationSpec {
    Table(String),
    Detailed {
        table: String,
        column: Option<String>,
    },
}

impl From<RelationSpec> for FkRelation {
    fn from(spec: RelationSpec) -> Self {
        match spec {
            RelationSpec::Table(table) => FkRelation::to(table),
            RelationSpec::Detailed { table, column } => FkRelation {
                parent_table: table,
                parent_column: column,
            },
        }
    }
}

/// `child table -> (fk column -> relation)`, in declaration order.
pub type RelationMap = IndexMap<String, IndexMap<String, FkRelation>>;

/// Everything the catalog knows about one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub name: String,
    pub primary_key: Option<String>,
    pub foreign_keys: IndexMap<String, FkRelation>,
}

/// Resolved table metadata for one engine instance.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    primary_keys: IndexMap<String, String>,
    relations: RelationMap,
}

impl SchemaCatalog {
    /// Loads the schema document from disk.
    ///
    /// A missing or malformed document is a fatal [`GuardError::SchemaCatalog`].
    #[instrument(skip(relations), fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>, relations: RelationMap) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            GuardError::SchemaCatalog(format!(
                "cannot read schema document '{}': {e}",
                path.display()
            ))
        })?;
        let catalog = Self::from_yaml_str(&yaml, relations)?;
        info!(
            tables_with_keys = catalog.primary_keys.len(),
            relation_tables = catalog.relations.len(),
            "loaded schema catalog"
        );
        Ok(catalog)
    }

    /// Builds a catalog from schema document text.
    pub fn from_yaml_str(yaml: &str, relations: RelationMap) -> Result<Self> {
        Ok(Self {
            primary_keys: document::primary_keys_from_yaml(yaml)?,
            relations,
        })
    }

    /// Builds a catalog from already-resolved parts.
    pub fn from_parts(primary_keys: IndexMap<String, String>, relations: RelationMap) -> Self {
        Self {
            primary_keys,
            relations,
        }
    }

    /// `table -> primary key column` for every table that declares one.
    pub fn primary_keys(&self) -> &IndexMap<String, String> {
        &self.primary_keys
    }

    pub fn primary_key(&self, table: &str) -> Option<&str> {
        self.primary_keys.get(table).map(String::as_str)
    }

    /// The curated foreign-key table.
    pub fn fk_relations(&self) -> &RelationMap {
        &self.relations
    }

    /// Declared foreign keys of `table`, if it has any.
    pub fn relations_for(&self, table: &str) -> Option<&IndexMap<String, FkRelation>> {
        self.relations.get(table).filter(|edges| !edges.is_empty())
    }

    /// Column on the parent side of `relation`: the explicit column, or the
    /// parent's primary key.
    pub fn parent_key<'a>(&'a self, relation: &'a FkRelation) -> Option<&'a str> {
        relation
            .parent_column
            .as_deref()
            .or_else(|| self.primary_key(&relation.parent_table))
    }

    pub fn table_spec(&self, table: &str) -> TableSpec {
        TableSpec {
            name: table.to_string(),
            primary_key: self.primary_key(table).map(str::to_string),
            foreign_keys: self.relations.get(table).cloned().unwrap_or_default(),
        }
    }
}
