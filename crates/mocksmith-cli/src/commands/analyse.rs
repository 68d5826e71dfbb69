use anyhow::Result;
use comfy_table::{Cell, Table as ComfyTable};

use mocksmith_core::schema::analyse::{ModelAnalyser, SchemaAnalyser};
use mocksmith_core::schema::descriptor::EntityDescriptor;

use crate::args::{AnalyseArgs, AnalyseFormat};
use crate::commands::common;

pub async fn run(args: &AnalyseArgs) -> Result<()> {
    let config = common::read_config()?;
    let (model, _) = common::load_schema(&args.source, config.as_ref()).await?;

    if matches!(args.format, AnalyseFormat::Json) && args.model {
        println!("{}", serde_json::to_string_pretty(&model)?);
        return Ok(());
    }

    let analyser = ModelAnalyser::new(model);
    let names = if args.entities.is_empty() {
        analyser.entity_types()
    } else {
        args.entities.clone()
    };
    let entities = names
        .iter()
        .map(|name| analyser.analyse_entity(name))
        .collect::<mocksmith_core::Result<Vec<_>>>()?;

    if let Some(config) = &config {
        for name in config.unknown_entities(&analyser.entity_types()) {
            tracing::warn!(
                "mocksmith.toml: [entities.{}] does not match any table in the schema",
                name
            );
        }
    }

    match args.format {
        AnalyseFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entities)?);
        }
        AnalyseFormat::Table => {
            let model = analyser.model();
            println!("Database: {} ({})", model.database_name, model.database_type);
            println!(
                "Tables: {}  Foreign Keys: {}",
                model.table_count(),
                model.foreign_key_count()
            );
            println!();

            for entity in &entities {
                println!("━━━ {} ━━━", entity.display_name);
                println!("{}", descriptor_table(entity));
                println!();
            }
        }
    }

    Ok(())
}

fn descriptor_table(entity: &EntityDescriptor) -> ComfyTable {
    let mut t = ComfyTable::new();
    t.set_header(vec!["Column", "Type", "PK", "FK", "Rewritten"]);

    for column in &entity.columns {
        let is_pk = entity.primary_keys.iter().any(|pk| pk.name == column.name);
        let principal = entity
            .foreign_keys
            .iter()
            .find(|fk| fk.column == column.name)
            .map(|fk| match fk.principal() {
                Some(principal) => format!("→ {}", principal),
                None => "→ self".to_string(),
            });

        let rewritten = if is_pk && column.data_type.is_integer() {
            "store-assigned"
        } else if column.data_type.is_date_time() {
            "generation time"
        } else if principal.as_deref().is_some_and(|p| p != "→ self") {
            "sampled"
        } else {
            ""
        };

        t.add_row(vec![
            Cell::new(&column.name),
            Cell::new(column.data_type.to_string()),
            Cell::new(if is_pk { "PK" } else { "" }),
            Cell::new(principal.as_deref().unwrap_or("")),
            Cell::new(rewritten),
        ]);
    }

    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use mocksmith_core::schema::descriptor::{ColumnDescriptor, ForeignKeyDescriptor};
    use mocksmith_core::schema::types::DataType;

    #[test]
    fn test_descriptor_table_marks_rewritten_columns() {
        let mut entity = EntityDescriptor::new("orders");
        let id = ColumnDescriptor::new("id", DataType::Integer);
        entity.columns = vec![
            id.clone(),
            ColumnDescriptor::new("customer_id", DataType::Integer),
            ColumnDescriptor::new("placed_at", DataType::Timestamp),
        ];
        entity.primary_keys = vec![id];
        entity.foreign_keys = vec![ForeignKeyDescriptor {
            column: "customer_id".to_string(),
            principals: vec!["orders".to_string(), "customers".to_string()],
        }];

        let rendered = descriptor_table(&entity).to_string();
        assert!(rendered.contains("store-assigned"));
        assert!(rendered.contains("→ customers"));
        assert!(rendered.contains("sampled"));
        assert!(rendered.contains("generation time"));
    }
}
