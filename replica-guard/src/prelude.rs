//! Prelude for commonly used types and traits in replica-guard.

pub use crate::backend::{BackendConnector, QueryBackend};
pub use crate::catalog::{FkRelation, SchemaCatalog};
pub use crate::config::{ConfiguredConnector, ValidationConfig};
pub use crate::engine::ValidationEngine;
pub use crate::environment::Environment;
pub use crate::error::{ErrorContext, GuardError, Result};
pub use crate::formatters::{FormatterConfig, HumanFormatter, JsonFormatter, ResultFormatter};
pub use crate::logging::LogConfig;
pub use crate::result::{CheckKind, CheckStatus, QualityReport, ValidationResult};
pub use std::sync::Arc;
