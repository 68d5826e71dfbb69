pub mod config;
pub mod error;
pub mod generate;
pub mod llm;
pub mod output;
pub mod schema;

// Re-export key types for convenience
pub use error::{MockSmithError, Result};
pub use generate::{CancelHandle, GenerateOptions, GenerationReport, MockRow, Pipeline, Record};
pub use schema::types::{DatabaseType, SchemaModel};

#[doc(hidden)]
pub use serde_json as __serde_json;
