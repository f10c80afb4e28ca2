//! Security utilities for replica-guard.
//!
//! Table, column and dataset names come from configuration and from the
//! caller's table list, and all of them end up interpolated into SQL text
//! sent to three different engines. Every such name goes through
//! [`SqlSecurity::validate_identifier`] first; string literals built from
//! validated identifiers go through [`SqlSecurity::quote_literal`].

use crate::error::{GuardError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use zeroize::ZeroizeOnDrop;

/// A secure string that automatically clears its contents when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SecureString(String);

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecureString(***)")
    }
}

impl SecureString {
    /// Create a new secure string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the string value. Use carefully and avoid storing the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

}

impl From<String> for SecureString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecureString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for SecureString {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecureString)
    }
}

/// Words that may not be used as a whole identifier segment.
const RESERVED_SEGMENTS: &[&str] = &[
    "select", "insert", "update", "delete", "drop", "create", "alter", "truncate", "union",
    "exec", "execute", "declare", "grant", "revoke",
];

/// SQL identifier validation utilities.
pub struct SqlSecurity;

impl SqlSecurity {
    /// Validates a SQL identifier (table, column or dataset name).
    ///
    /// Accepted identifiers start with a letter or underscore and contain
    /// only ASCII letters, digits and underscores, optionally qualified with
    /// dots (`dataset.table`). A segment that is exactly a reserved DDL/DML
    /// keyword is rejected; keywords inside longer names (`updated_at`,
    /// `created_by`) are fine.
    ///
    /// # Examples
    /// ```rust
    /// use replica_guard::security::SqlSecurity;
    ///
    /// assert!(SqlSecurity::validate_identifier("updated_at").is_ok());
    /// assert!(SqlSecurity::validate_identifier("raw_local.contents").is_ok());
    /// assert!(SqlSecurity::validate_identifier("id; DROP TABLE users--").is_err());
    /// assert!(SqlSecurity::validate_identifier(&"very_long_name_".repeat(100)).is_err());
    /// ```
    pub fn validate_identifier(identifier: &str) -> Result<()> {
        if identifier.trim().is_empty() {
            return Err(GuardError::Security(
                "SQL identifier cannot be empty or whitespace-only".to_string(),
            ));
        }

        if identifier.len() > 128 {
            return Err(GuardError::Security(
                "SQL identifier too long (max 128 characters)".to_string(),
            ));
        }

        static IDENTIFIER_REGEX: Lazy<Regex> = Lazy::new(|| {
            #[allow(clippy::expect_used)]
            Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*(\.[a-zA-Z_][a-zA-Z0-9_]*)*$")
                .expect("Hard-coded regex pattern should be valid")
        });

        if !IDENTIFIER_REGEX.is_match(identifier) {
            return Err(GuardError::Security(format!(
                "Invalid SQL identifier format: '{identifier}'. Identifiers must start with a letter or underscore and contain only letters, numbers, underscores, and dots"
            )));
        }

        for segment in identifier.split('.') {
            let lower = segment.to_ascii_lowercase();
            if RESERVED_SEGMENTS.contains(&lower.as_str()) {
                return Err(GuardError::Security(format!(
                    "SQL identifier uses reserved word: '{segment}'"
                )));
            }
        }

        Ok(())
    }

    /// Validates each identifier and joins them with dots.
    ///
    /// ```rust
    /// use replica_guard::security::SqlSecurity;
    ///
    /// let name = SqlSecurity::qualified(&["raw_local", "contents"]).unwrap();
    /// assert_eq!(name, "raw_local.contents");
    /// ```
    pub fn qualified(parts: &[&str]) -> Result<String> {
        for part in parts {
            Self::validate_identifier(part)?;
        }
        Ok(parts.join("."))
    }

    /// Quotes a string literal for SQL, doubling embedded single quotes.
    pub fn quote_literal(value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_string_redacts_debug() {
        let secret = SecureString::new("hunter2");
        assert_eq!(format!("{secret:?}"), "SecureString(***)");
        assert_eq!(secret.expose(), "hunter2");
        assert!(!secret.is_empty());
        assert!(SecureString::from("").is_empty());
    }

    #[test]
    fn test_valid_sql_identifiers() {
        assert!(SqlSecurity::validate_identifier("customer_id").is_ok());
        assert!(SqlSecurity::validate_identifier("table1").is_ok());
        assert!(SqlSecurity::validate_identifier("_private_col").is_ok());
        assert!(SqlSecurity::validate_identifier("schema.table").is_ok());
        assert!(SqlSecurity::validate_identifier("updated_at").is_ok());
        assert!(SqlSecurity::validate_identifier("created_at").is_ok());
    }

    #[test]
    fn test_invalid_sql_identifiers() {
        assert!(SqlSecurity::validate_identifier("").is_err());
        assert!(SqlSecurity::validate_identifier("   ").is_err());
        assert!(SqlSecurity::validate_identifier(&"a".repeat(200)).is_err());

        assert!(SqlSecurity::validate_identifier("id; DROP TABLE").is_err());
        assert!(SqlSecurity::validate_identifier("col--comment").is_err());
        assert!(SqlSecurity::validate_identifier("raw.select").is_err());
        assert!(SqlSecurity::validate_identifier("DROP").is_err());

        assert!(SqlSecurity::validate_identifier("col name").is_err());
        assert!(SqlSecurity::validate_identifier("col-name").is_err());
        assert!(SqlSecurity::validate_identifier("123col").is_err());
        assert!(SqlSecurity::validate_identifier("col\"quoted\"").is_err());
    }

    #[test]
    fn test_qualified_rejects_bad_part() {
        assert!(SqlSecurity::qualified(&["raw_local", "contents"]).is_ok());
        assert!(SqlSecurity::qualified(&["raw_local", "contents; --"]).is_err());
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(SqlSecurity::quote_literal("contents"), "'contents'");
        assert_eq!(SqlSecurity::quote_literal("it's"), "'it''s'");
    }
}
