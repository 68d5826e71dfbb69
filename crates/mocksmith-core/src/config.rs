//! # Configuration File Parser
//!
//! Reads `mocksmith.toml`, the optional project file that supplies defaults
//! for the CLI so common flags don't have to be repeated. Supports:
//!
//! - `[database]`: default connection URL
//! - `[llm]`: provider, model, and request timeout
//! - `[generate]`: locale, row count, batch size, retries, ignored columns
//! - `[entities.<name>]`: per-entity row count and ignored columns
//!
//! Example `mocksmith.toml`:
//!
//! ```toml
//! [database]
//! url = "sqlite://shop.db"
//!
//! [llm]
//! provider = "claude"
//! timeout_secs = 60
//!
//! [generate]
//! locale = "de-DE"
//! rows = 20
//! batch_size = 5
//! seed_hint = "an online bakery"
//! ignore = ["created_by", "updated_by"]
//!
//! [entities.orders]
//! rows = 50
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{MockSmithError, Result};
use crate::generate::pipeline::GenerateOptions;

/// Default config file name.
pub const CONFIG_FILE_NAME: &str = "mocksmith.toml";

/// Top-level mocksmith.toml structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MockSmithConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub generate: GenerateConfig,
    /// Per-entity overrides, keyed by table name.
    pub entities: BTreeMap<String, EntityConfig>,

    /// Directory the file was read from.
    #[serde(skip)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "claude" or "openai".
    pub provider: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerateConfig {
    pub locale: Option<String>,
    pub rows: Option<usize>,
    pub batch_size: Option<usize>,
    pub seed_hint: Option<String>,
    pub max_retries: Option<usize>,
    pub ignore: Option<Vec<String>>,
    /// Seed for foreign-key sampling, for reproducible bindings.
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    pub rows: Option<usize>,
    /// Added to `[generate] ignore` for this entity.
    pub ignore: Option<Vec<String>>,
}

/// Read and parse mocksmith.toml from the given directory.
///
/// Returns `None` if the file doesn't exist; an error if it exists but does
/// not parse or validate.
pub fn read_config(dir: &Path) -> Result<Option<MockSmithConfig>> {
    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&path).map_err(|e| MockSmithError::Config {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;

    let mut config: MockSmithConfig =
        toml::from_str(&content).map_err(|e| MockSmithError::Config {
            message: format!("Failed to parse {}: {}", path.display(), e),
        })?;

    config.config_dir = Some(std::fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf()));
    config.validate()?;

    Ok(Some(config))
}

impl MockSmithConfig {
    /// Check constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.generate.batch_size == Some(0) {
            return Err(MockSmithError::Config {
                message: "[generate] batch_size must be greater than 0".to_string(),
            });
        }
        if self.llm.timeout_secs == Some(0) {
            return Err(MockSmithError::Config {
                message: "[llm] timeout_secs must be greater than 0".to_string(),
            });
        }
        if let Some(provider) = &self.llm.provider {
            if !matches!(provider.to_lowercase().as_str(), "claude" | "openai") {
                return Err(MockSmithError::Config {
                    message: format!(
                        "[llm] provider '{}' is not supported. Use \"claude\" or \"openai\".",
                        provider
                    ),
                });
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.llm.timeout_secs.map(Duration::from_secs)
    }

    /// Generation options for `entity`: per-entity settings over `[generate]`
    /// over the library defaults.
    pub fn options_for(&self, entity: &str) -> GenerateOptions {
        let defaults = GenerateOptions::default();
        let overrides = self.entities.get(entity);

        let mut ignored_columns = self.generate.ignore.clone().unwrap_or_default();
        if let Some(extra) = overrides.and_then(|e| e.ignore.as_ref()) {
            ignored_columns.extend(extra.iter().cloned());
        }

        GenerateOptions {
            locale: self.generate.locale.clone().unwrap_or(defaults.locale),
            total_rows: overrides
                .and_then(|e| e.rows)
                .or(self.generate.rows)
                .unwrap_or(defaults.total_rows),
            batch_size: self.generate.batch_size.unwrap_or(defaults.batch_size),
            seed_hint: self.generate.seed_hint.clone().unwrap_or(defaults.seed_hint),
            max_retries: self.generate.max_retries.unwrap_or(defaults.max_retries),
            ignored_columns,
            request_timeout: self.request_timeout(),
            ..defaults
        }
    }

    /// Entity names in `[entities]` that the schema does not contain.
    pub fn unknown_entities(&self, known: &[String]) -> Vec<String> {
        self.entities
            .keys()
            .filter(|name| !known.iter().any(|k| k.eq_ignore_ascii_case(name)))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[database]
url = "postgres://localhost/shop"

[llm]
provider = "openai"
model = "gpt-4o-mini"
timeout_secs = 30

[generate]
locale = "fr-FR"
rows = 20
batch_size = 4
seed_hint = "a bakery"
max_retries = 5
ignore = ["created_by"]
rng_seed = 7

[entities.orders]
rows = 50
ignore = ["legacy_code"]
"#;

        let config: MockSmithConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/shop"));
        assert_eq!(config.llm.provider.as_deref(), Some("openai"));
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.generate.rng_seed, Some(7));
        assert_eq!(config.entities["orders"].rows, Some(50));
    }

    #[test]
    fn test_parse_empty_config() {
        let config: MockSmithConfig = toml::from_str("").unwrap();
        assert!(config.database.url.is_none());
        assert!(config.entities.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_options_layering() {
        let toml = r#"
[generate]
locale = "fr-FR"
rows = 20
ignore = ["created_by"]

[entities.orders]
rows = 50
ignore = ["legacy_code"]
"#;
        let config: MockSmithConfig = toml::from_str(toml).unwrap();

        let orders = config.options_for("orders");
        assert_eq!(orders.total_rows, 50);
        assert_eq!(orders.locale, "fr-FR");
        assert_eq!(orders.batch_size, 5);
        assert_eq!(
            orders.ignored_columns,
            vec!["created_by".to_string(), "legacy_code".to_string()]
        );

        let customers = config.options_for("customers");
        assert_eq!(customers.total_rows, 20);
        assert_eq!(customers.ignored_columns, vec!["created_by".to_string()]);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config: MockSmithConfig = toml::from_str("[generate]\nbatch_size = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config: MockSmithConfig = toml::from_str("[llm]\nprovider = \"gemini\"\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_entities() {
        let config: MockSmithConfig =
            toml::from_str("[entities.orders]\nrows = 1\n[entities.ghosts]\nrows = 1\n").unwrap();
        let unknown = config.unknown_entities(&["Orders".to_string()]);
        assert_eq!(unknown, vec!["ghosts".to_string()]);
    }

    #[test]
    fn test_read_config_nonexistent() {
        let result = read_config(Path::new("/nonexistent/dir")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_read_config_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[database]\nurl = \"sqlite://dev.db\"\n",
        )
        .unwrap();

        let config = read_config(dir.path()).unwrap().unwrap();
        assert_eq!(config.database.url.as_deref(), Some("sqlite://dev.db"));
        assert!(config.config_dir.is_some());
    }

    #[test]
    fn test_read_config_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[database\nurl = ").unwrap();
        let err = read_config(dir.path()).unwrap_err();
        assert!(matches!(err, MockSmithError::Config { .. }));
    }
}
