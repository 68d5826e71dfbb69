use std::fs::File;
use std::io::BufWriter;

use anyhow::{bail, Context, Result};

use mocksmith_core::generate::session::Session;
use mocksmith_core::llm::RowGeneratorClient;
use mocksmith_core::output::json::write_session;
use mocksmith_core::output::{MemoryRepository, RowRepository, SqlRepository};
use mocksmith_core::schema::analyse::{ModelAnalyser, SchemaAnalyser};
use mocksmith_core::{Pipeline, Record};

use crate::args::SeedArgs;
use crate::commands::common;

pub async fn run(args: &SeedArgs) -> Result<()> {
    let config = common::read_config()?;
    let (model, connection) = common::load_schema(&args.source, config.as_ref()).await?;
    let client = common::build_client(&args.llm, config.as_ref())?;

    let rng_seed = args
        .rng_seed
        .or_else(|| config.as_ref().and_then(|c| c.generate.rng_seed));
    let session = match rng_seed {
        Some(seed) => Session::seeded(seed),
        None => Session::new(),
    };
    let mut pipeline = Pipeline::with_session(client, ModelAnalyser::new(model), session);

    if args.dry_run {
        let repo = MemoryRepository::new();
        seed_all(args, config.as_ref(), &mut pipeline, &repo).await?;
    } else {
        let repo: SqlRepository = match connection {
            Some(repo) => repo,
            None => common::connect(&args.source, config.as_ref())
                .await
                .context("Inserting rows needs a database; use --dry-run to skip it")?,
        };
        seed_all(args, config.as_ref(), &mut pipeline, &repo).await?;
    }

    if let Some(path) = &args.output {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        write_session(&mut writer, pipeline.session())?;
        eprintln!("Wrote seeded rows to {}", path.display());
    }

    Ok(())
}

async fn seed_all<C, R>(
    args: &SeedArgs,
    config: Option<&mocksmith_core::config::MockSmithConfig>,
    pipeline: &mut Pipeline<C, ModelAnalyser>,
    repo: &R,
) -> Result<()>
where
    C: RowGeneratorClient,
    R: RowRepository,
{
    // Catch unknown tables before spending any requests
    for entity in &args.entities {
        pipeline.analyser().analyse_entity(entity)?;
    }
    if let Some(config) = config {
        for name in config.unknown_entities(&pipeline.analyser().entity_types()) {
            tracing::warn!(
                "mocksmith.toml: [entities.{}] does not match any table in the schema",
                name
            );
        }
    }

    let cancel = common::cancel_on_ctrl_c();
    let overrides = args.parse_table_rows();
    let total = args.entities.len();
    let mut rows_seeded = 0usize;

    for (index, entity) in args.entities.iter().enumerate() {
        if cancel.is_cancelled() {
            bail!("Interrupted before seeding {}", entity);
        }

        let mut options =
            common::build_options(entity, &args.generation, &args.llm, config, &cancel);
        if let Some(rows) = overrides.get(entity) {
            options.total_rows = *rows;
        }

        let pb = common::spinner(
            &format!("{}/{}", index + 1, total),
            format!("Seeding {} ({} rows)...", entity, options.total_rows),
        );

        match pipeline
            .generate_and_insert::<Record, R>(entity, &options, repo)
            .await
        {
            Ok(report) => {
                rows_seeded += report.rows;
                pb.finish_with_message(format!(
                    "Seeding {}... ✓ {} rows in {} requests ({} retries)",
                    report.entity, report.rows, report.requests, report.retries_used
                ));
            }
            Err(e) => {
                pb.abandon_with_message(format!("Seeding {}... failed", entity));
                return Err(e).with_context(|| {
                    format!("Seeding stopped at {} ({} of {})", entity, index + 1, total)
                });
            }
        }
    }

    eprintln!("Seeded {} rows across {} tables", rows_seeded, total);
    Ok(())
}
