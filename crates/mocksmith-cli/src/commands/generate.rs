use std::fs::File;
use std::io::BufWriter;

use anyhow::{Context, Result};

use mocksmith_core::output::json::write_rows;
use mocksmith_core::schema::analyse::ModelAnalyser;
use mocksmith_core::{Pipeline, Record};

use crate::args::GenerateArgs;
use crate::commands::common;

pub async fn run(args: &GenerateArgs) -> Result<()> {
    let config = common::read_config()?;
    let (model, _) = common::load_schema(&args.source, config.as_ref()).await?;
    let client = common::build_client(&args.llm, config.as_ref())?;
    let cancel = common::cancel_on_ctrl_c();

    let options = common::build_options(
        &args.entity,
        &args.generation,
        &args.llm,
        config.as_ref(),
        &cancel,
    );

    let pb = common::spinner(
        "1/1",
        format!("Generating {} rows for {}...", options.total_rows, args.entity),
    );

    let mut pipeline = Pipeline::new(client, ModelAnalyser::new(model));
    let result = pipeline
        .generate_with_report::<Record>(&args.entity, &options)
        .await;
    let (rows, report) = match result {
        Ok(generated) => generated,
        Err(e) => {
            pb.abandon_with_message(format!("Generating {}... failed", args.entity));
            return Err(e.into());
        }
    };

    pb.finish_with_message(format!(
        "Generating {}... ✓ {} rows in {} requests ({} retries)",
        report.entity,
        report.rows,
        report.requests,
        report.retries_used
    ));

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            write_rows(&mut writer, &rows)?;
            eprintln!("Wrote {} rows to {}", rows.len(), path.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = stdout.lock();
            write_rows(&mut writer, &rows)?;
        }
    }

    Ok(())
}
