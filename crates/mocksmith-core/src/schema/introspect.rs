use std::path::Path;

use crate::error::{MockSmithError, Result};
use crate::schema::types::{DatabaseType, SchemaModel};

/// Trait for database schema introspection.
/// Each database backend implements this to extract a schema model.
pub trait SchemaIntrospector: Send + Sync {
    /// Introspect the database and return the full schema model.
    fn introspect(&self) -> impl std::future::Future<Output = Result<SchemaModel>> + Send;
}

/// Determine the database type from a connection URL.
pub fn database_type_from_url(url: &str) -> Result<DatabaseType> {
    let scheme = url.split(':').next().unwrap_or("");
    match scheme {
        "postgres" | "postgresql" => Ok(DatabaseType::PostgreSQL),
        "sqlite" | "file" => Ok(DatabaseType::SQLite),
        other => Err(MockSmithError::UnsupportedDatabase {
            scheme: other.to_string(),
        }),
    }
}

/// Load a schema model previously written as JSON (for example by
/// `mocksmith analyse --format json`).
pub fn load_schema_file(path: &Path) -> Result<SchemaModel> {
    let content = std::fs::read_to_string(path).map_err(|e| MockSmithError::Config {
        message: format!("Failed to read schema file {}: {}", path.display(), e),
    })?;
    serde_json::from_str(&content).map_err(|e| MockSmithError::Config {
        message: format!("Failed to parse schema file {}: {}", path.display(), e),
    })
}
