use std::io::Write;

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{MockSmithError, Result};
use crate::generate::session::Session;
use crate::generate::value::RowSnapshot;

/// Write typed rows as a pretty-printed JSON array.
pub fn write_rows<W: Write, K: Serialize>(writer: &mut W, rows: &[K]) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, rows).map_err(|e| MockSmithError::Output {
        message: "Failed to write JSON".to_string(),
        source: e.into(),
    })?;
    finish(writer)
}

/// Write every entity recorded in `session` as `{"<entity>": [rows...]}`, in
/// generation order.
pub fn write_session<W: Write>(writer: &mut W, session: &Session) -> Result<()> {
    let tables: IndexMap<&str, Vec<serde_json::Value>> = session
        .entities()
        .iter()
        .map(|entity| {
            let rows = entity.generated.iter().map(snapshot_to_json).collect();
            (entity.display_name.as_str(), rows)
        })
        .collect();

    serde_json::to_writer_pretty(&mut *writer, &tables).map_err(|e| MockSmithError::Output {
        message: "Failed to write JSON".to_string(),
        source: e.into(),
    })?;
    finish(writer)
}

/// A snapshot as a plain JSON object, values in their text forms.
pub fn snapshot_to_json(row: &RowSnapshot) -> serde_json::Value {
    serde_json::Value::Object(
        row.iter()
            .map(|(column, value)| (column.clone(), value.to_json()))
            .collect(),
    )
}

fn finish<W: Write>(writer: &mut W) -> Result<()> {
    writeln!(writer)
        .and_then(|_| writer.flush())
        .map_err(|e| MockSmithError::Output {
            message: "Failed to write JSON".to_string(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::row::Record;
    use crate::generate::value::Value;
    use crate::schema::descriptor::{ColumnDescriptor, EntityDescriptor};
    use crate::schema::types::DataType;

    #[test]
    fn test_write_rows_is_valid_json() {
        let rows: Vec<Record> = vec![
            serde_json::from_str(r#"{"id": 1, "name": "Ann"}"#).unwrap(),
            serde_json::from_str(r#"{"id": 2, "name": "Bob"}"#).unwrap(),
        ];
        let mut buf = Vec::new();
        write_rows(&mut buf, &rows).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed[1]["name"], "Bob");
    }

    #[test]
    fn test_write_session_keeps_generation_order() {
        let mut session = Session::seeded(3);
        for name in ["users", "orders"] {
            let mut entity = EntityDescriptor::new(name);
            let id = ColumnDescriptor::new("id", DataType::Integer);
            entity.columns = vec![id.clone()];
            entity.primary_keys = vec![id];
            let mut row = RowSnapshot::new();
            row.insert("id".to_string(), Value::Int(1));
            session.record(entity, vec![row]).unwrap();
        }

        let mut buf = Vec::new();
        write_session(&mut buf, &session).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let users = text.find("\"users\"").unwrap();
        let orders = text.find("\"orders\"").unwrap();
        assert!(users < orders);
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["orders"][0]["id"], 1);
    }

    #[test]
    fn test_snapshot_to_json_uses_text_forms() {
        let ts = chrono::NaiveDate::from_ymd_opt(2026, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let mut row = RowSnapshot::new();
        row.insert("at".to_string(), Value::Timestamp(ts));
        assert_eq!(snapshot_to_json(&row)["at"], "2026-01-02T03:04:05");
    }
}
