//! # Prompt Templates
//!
//! Builds the row-generation prompt for one sub-batch. The prompt describes
//! the entity as a compact column list and asks for a `{"data": [...]}`
//! envelope so responses can be deserialized directly into row types.

use crate::generate::foreign_key::is_ignored;
use crate::schema::descriptor::EntityDescriptor;

pub const SYSTEM_PROMPT: &str = "You generate realistic mock data for relational databases. \
You always answer with a single JSON object and nothing else.";

/// Generate the user prompt for `row_count` rows of `entity`.
///
/// Ignored columns are left out entirely. Foreign-key columns are listed but
/// flagged: their values are replaced after generation, so any value of the
/// column's type will do.
pub fn row_generation_prompt(
    entity: &EntityDescriptor,
    locale: &str,
    row_count: usize,
    seed_hint: &str,
    ignored_columns: &[String],
) -> String {
    let columns = entity_to_column_list(entity, ignored_columns);

    let hint = if seed_hint.trim().is_empty() {
        String::new()
    } else {
        format!("\nUse this as inspiration for the content: {}\n", seed_hint.trim())
    };

    format!(
        r#"Generate {row_count} rows of mock data for the table "{table}".

Write all human-readable text for the locale {locale}. Values must be plausible for the column names and must respect the declared types.
{hint}
Columns:
{columns}

Return ONLY a JSON object of this exact form, with one object per row using the column names above as keys:
{{"data": [{{"column": "value"}}]}}"#,
        row_count = row_count,
        table = entity.display_name,
        locale = locale,
        hint = hint,
        columns = columns,
    )
}

/// Render the entity's columns as `- name: type` lines.
pub fn entity_to_column_list(entity: &EntityDescriptor, ignored_columns: &[String]) -> String {
    let mut lines = Vec::new();
    for column in &entity.columns {
        if is_ignored(ignored_columns, &column.name) {
            continue;
        }

        let mut line = format!("- {}: {}", column.name, column.data_type);
        if entity.primary_keys.iter().any(|pk| pk.name == column.name) {
            line.push_str(" (primary key)");
        }
        if entity.is_foreign_key(&column.name) {
            line.push_str(" (foreign key, any value of this type)");
        }
        lines.push(line);
    }
    lines.join("\n")
}
