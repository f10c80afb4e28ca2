//! Shared fixtures for integration tests.
//!
//! The session connector lives in `replica_guard::test_helpers`; this module
//! adds the schema document and relation map the suites share.

#![allow(dead_code, unused_imports)]

use replica_guard::catalog::{FkRelation, RelationMap, SchemaCatalog};

pub use replica_guard::test_helpers::{exec, session, timestamp_sql, SessionConnector};

pub const DATASET: &str = "raw_local";

pub const SCHEMA_YAML: &str = r#"
tables:
  accounts:
    columns:
      id: { type: integer, primary_key: true }
      email: { type: varchar }
      updated_at: { type: timestamp }
  subscriptions:
    columns:
      id: { type: integer, primary_key: true }
      plan: { type: varchar }
  accounts_subscription:
    columns:
      id: { type: integer, primary_key: true }
      account_id: { type: integer }
      subscription_id: { type: integer }
  contents:
    columns:
      content_id: { type: integer, primary_key: true }
      account_id: { type: integer }
      updated_at: { type: timestamp }
  audit_log:
    columns:
      message: { type: text }
"#;

pub fn relations() -> RelationMap {
    let mut relations = RelationMap::new();
    relations.insert(
        "contents".to_string(),
        [("account_id".to_string(), FkRelation::to("accounts"))]
            .into_iter()
            .collect(),
    );
    relations.insert(
        "accounts_subscription".to_string(),
        [
            ("account_id".to_string(), FkRelation::to("accounts")),
            (
                "subscription_id".to_string(),
                FkRelation::to_column("subscriptions", "id"),
            ),
        ]
        .into_iter()
        .collect(),
    );
    relations
}

pub fn catalog() -> SchemaCatalog {
    SchemaCatalog::from_yaml_str(SCHEMA_YAML, relations()).expect("valid schema document")
}

/// A connector whose destination registers tables under [`DATASET`].
pub async fn connector() -> SessionConnector {
    SessionConnector::new(DATASET).await
}
