use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "mocksmith",
    about = "Generate realistic mock rows for database tables with an LLM",
    version,
    after_help = "Examples:\n  mocksmith analyse --db sqlite://shop.db\n  mocksmith generate customers --db sqlite://shop.db --rows 20 --output customers.json\n  mocksmith seed customers orders --db postgres://localhost/shop --rows 50\n  mocksmith seed customers orders --schema-file schema.json --dry-run --output seed.json"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show how each table is described to the model
    Analyse(AnalyseArgs),

    /// Generate rows for one table without inserting them
    Generate(GenerateArgs),

    /// Generate and insert rows for tables in the given order, binding foreign keys
    Seed(SeedArgs),
}

/// Where the schema model comes from.
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Database connection URL (postgres://, sqlite://)
    /// Falls back to DATABASE_URL env var, .env file, or mocksmith.toml
    #[arg(long, env = "DATABASE_URL")]
    pub db: Option<String>,

    /// Read the schema model from a JSON file (as written by `analyse --format json --model`)
    /// instead of introspecting the database
    #[arg(long)]
    pub schema_file: Option<PathBuf>,

    /// PostgreSQL schema to introspect (default: public)
    #[arg(long)]
    pub pg_schema: Option<String>,
}

#[derive(Args, Debug)]
pub struct LlmArgs {
    /// LLM provider (claude or openai); auto-detected from API keys if omitted
    #[arg(long)]
    pub provider: Option<String>,

    /// Model name override
    #[arg(long)]
    pub model: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Args, Debug)]
pub struct GenerationArgs {
    /// Number of rows to generate per table
    #[arg(long)]
    pub rows: Option<usize>,

    /// Largest number of rows requested from the model at once
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Locale for generated text (e.g., en-US, de-DE)
    #[arg(long)]
    pub locale: Option<String>,

    /// Free-text hint steering the content (e.g., "an online bakery")
    #[arg(long)]
    pub seed_hint: Option<String>,

    /// Malformed responses tolerated per table
    #[arg(long)]
    pub retries: Option<usize>,

    /// Columns to leave out of prompts and inserts
    #[arg(long, value_delimiter = ',')]
    pub ignore: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct AnalyseArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Only show these tables
    #[arg(value_name = "TABLE")]
    pub entities: Vec<String>,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: AnalyseFormat,

    /// With --format json, print the raw schema model instead of descriptors
    #[arg(long)]
    pub model: bool,
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Table to generate rows for
    #[arg(value_name = "TABLE")]
    pub entity: String,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub llm: LlmArgs,

    #[command(flatten)]
    pub generation: GenerationArgs,

    /// Write rows as JSON to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct SeedArgs {
    /// Tables to seed, principals before dependents
    #[arg(value_name = "TABLE", required = true)]
    pub entities: Vec<String>,

    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub llm: LlmArgs,

    #[command(flatten)]
    pub generation: GenerationArgs,

    /// Per-table row count overrides (e.g., customers=20,orders=100)
    #[arg(long, value_delimiter = ',')]
    pub table_rows: Vec<String>,

    /// Seed for foreign-key sampling, for reproducible bindings
    #[arg(long)]
    pub rng_seed: Option<u64>,

    /// Keep rows in memory instead of inserting them
    #[arg(long)]
    pub dry_run: bool,

    /// Also write every seeded row as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum AnalyseFormat {
    Table,
    Json,
}

impl SeedArgs {
    /// Parse table row overrides like "customers=20,orders=100".
    pub fn parse_table_rows(&self) -> std::collections::BTreeMap<String, usize> {
        let mut map = std::collections::BTreeMap::new();
        for entry in &self.table_rows {
            if let Some((table, count)) = entry.split_once('=') {
                if let Ok(n) = count.trim().parse::<usize>() {
                    map.insert(table.trim().to_string(), n);
                } else {
                    tracing::warn!("Ignoring --table-rows entry '{}': not a number", entry);
                }
            } else {
                tracing::warn!(
                    "Ignoring --table-rows entry '{}'. Expected format 'table=rows'",
                    entry
                );
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seed_args() {
        let cli = Cli::parse_from([
            "mocksmith",
            "seed",
            "customers",
            "orders",
            "--schema-file",
            "schema.json",
            "--rows",
            "10",
            "--ignore",
            "created_by,updated_by",
            "--table-rows",
            "orders=40,bogus",
            "--dry-run",
        ]);

        let Command::Seed(args) = cli.command else {
            panic!("expected seed");
        };
        assert_eq!(args.entities, vec!["customers", "orders"]);
        assert_eq!(args.generation.rows, Some(10));
        assert_eq!(args.generation.ignore, vec!["created_by", "updated_by"]);
        assert!(args.dry_run);

        let overrides = args.parse_table_rows();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides["orders"], 40);
    }

    #[test]
    fn test_negative_counts_are_rejected() {
        for flag in ["--rows=-3", "--batch-size=-1"] {
            let parsed = Cli::try_parse_from(["mocksmith", "generate", "customers", flag]);
            assert!(parsed.is_err(), "{} should not parse", flag);
        }
    }

    #[test]
    fn test_seed_requires_a_table() {
        assert!(Cli::try_parse_from(["mocksmith", "seed", "--dry-run"]).is_err());
    }
}
