//! # Foreign Key Binding
//!
//! Rewrites freshly parsed rows before they are persisted: foreign keys are
//! pointed at random rows of principal entities already recorded in the
//! session, store-assigned primary keys are cleared, and date-time columns
//! are stamped with the generation time.
//!
//! Ignored columns are never written. Neither are columns the row type
//! does not carry, except foreign keys, which must be bindable.

use chrono::{DateTime, FixedOffset};

use crate::error::{MockSmithError, Result};
use crate::generate::row::MockRow;
use crate::generate::session::Session;
use crate::generate::value::Value;
use crate::schema::descriptor::{ColumnDescriptor, EntityDescriptor};
use crate::schema::types::DataType;

/// Prepare rows for insertion.
///
/// Every integer-family primary key is reset to `0` so the store assigns
/// the identity, every date-time column is set to `now`, and every foreign
/// key with an external principal is bound to the primary key of a
/// principal row drawn independently for each row.
///
/// Fails with `UnsatisfiedForeignKey` if a principal has not been recorded
/// in the session or has no rows.
pub fn resolve_rows<K: MockRow>(
    entity: &EntityDescriptor,
    rows: &mut [K],
    session: &mut Session,
    now: DateTime<FixedOffset>,
    ignored: &[String],
) -> Result<()> {
    let bindings: Vec<(&str, &str)> = entity
        .foreign_keys
        .iter()
        .filter(|fk| !is_ignored(ignored, &fk.column))
        .filter_map(|fk| fk.principal().map(|p| (fk.column.as_str(), p)))
        .collect();

    for (column, principal) in &bindings {
        let satisfied = session
            .find(principal)
            .is_some_and(|p| !p.generated.is_empty() && !p.primary_keys.is_empty());
        if !satisfied {
            return Err(MockSmithError::UnsatisfiedForeignKey {
                entity: entity.display_name.clone(),
                column: column.to_string(),
                principal: principal.to_string(),
            });
        }
    }

    for row in rows.iter_mut() {
        for pk in entity.integer_primary_keys() {
            if writable(row, &pk.name, ignored) {
                row.set(&pk.name, Value::Int(0))?;
            }
        }

        stamp_date_times(entity, row, now, ignored)?;

        for (column, principal) in &bindings {
            let value = session.sample_primary_key(principal).ok_or_else(|| {
                MockSmithError::UnsatisfiedForeignKey {
                    entity: entity.display_name.clone(),
                    column: column.to_string(),
                    principal: principal.to_string(),
                }
            })?;
            row.set(column, value)?;
        }
    }

    Ok(())
}

/// The generate-only rewrite: stamp date-time columns, nothing else.
pub fn touch_date_times<K: MockRow>(
    entity: &EntityDescriptor,
    rows: &mut [K],
    now: DateTime<FixedOffset>,
    ignored: &[String],
) -> Result<()> {
    for row in rows.iter_mut() {
        stamp_date_times(entity, row, now, ignored)?;
    }
    Ok(())
}

/// Case-insensitive match against the caller's ignored columns.
pub(crate) fn is_ignored(ignored: &[String], column: &str) -> bool {
    ignored.iter().any(|name| name.eq_ignore_ascii_case(column))
}

fn writable<K: MockRow>(row: &K, column: &str, ignored: &[String]) -> bool {
    !is_ignored(ignored, column) && row.has_column(column)
}

fn stamp_date_times<K: MockRow>(
    entity: &EntityDescriptor,
    row: &mut K,
    now: DateTime<FixedOffset>,
    ignored: &[String],
) -> Result<()> {
    for column in entity.date_time_columns() {
        if writable(row, &column.name, ignored) {
            row.set(&column.name, stamp_for(column, now))?;
        }
    }
    Ok(())
}

fn stamp_for(column: &ColumnDescriptor, now: DateTime<FixedOffset>) -> Value {
    match column.data_type {
        DataType::TimestampTz => Value::TimestampTz(now),
        _ => Value::Timestamp(now.naive_local()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::row::Record;
    use crate::generate::value::RowSnapshot;
    use crate::schema::descriptor::{ColumnDescriptor, ForeignKeyDescriptor};
    use chrono::{NaiveDateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2026-10-15T12:00:00+02:00").unwrap()
    }

    fn customers() -> EntityDescriptor {
        let mut entity = EntityDescriptor::new("Customer");
        let id = ColumnDescriptor::new("id", DataType::Integer);
        entity.columns = vec![id.clone(), ColumnDescriptor::new("name", DataType::Text)];
        entity.primary_keys = vec![id];
        entity
    }

    fn orders() -> EntityDescriptor {
        let mut entity = EntityDescriptor::new("Order");
        let id = ColumnDescriptor::new("id", DataType::BigInt);
        entity.columns = vec![
            id.clone(),
            ColumnDescriptor::new("customer_id", DataType::Integer),
            ColumnDescriptor::new("parent_id", DataType::Integer),
            ColumnDescriptor::new("placed_at", DataType::Timestamp),
        ];
        entity.primary_keys = vec![id];
        entity.foreign_keys = vec![
            ForeignKeyDescriptor {
                column: "customer_id".to_string(),
                principals: vec!["Order".to_string(), "Customer".to_string()],
            },
            ForeignKeyDescriptor {
                column: "parent_id".to_string(),
                principals: vec!["Order".to_string()],
            },
        ];
        entity
    }

    fn session_with_customers(ids: &[i64]) -> Session {
        let mut session = Session::seeded(42);
        let rows = ids
            .iter()
            .map(|id| {
                let mut row = RowSnapshot::new();
                row.insert("id".to_string(), Value::Int(*id));
                row.insert("name".to_string(), Value::String(format!("c{}", id)));
                row
            })
            .collect();
        session.record(customers(), rows).unwrap();
        session
    }

    fn order_rows(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                serde_json::from_value(serde_json::json!({
                    "id": i + 100,
                    "customer_id": 999,
                    "parent_id": 5,
                    "placed_at": "1999-01-01T00:00:00"
                }))
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_fk_values_come_from_principal_keys() {
        let mut session = session_with_customers(&[10, 20, 30]);
        let mut rows = order_rows(100);

        resolve_rows(&orders(), &mut rows, &mut session, now(), &[]).unwrap();

        for row in &rows {
            let fk = row.get("customer_id").and_then(|v| v.as_int()).unwrap();
            assert!([10, 20, 30].contains(&fk), "unexpected fk {}", fk);
        }
    }

    #[test]
    fn test_fk_distribution_is_roughly_even() {
        let mut session = session_with_customers(&[10, 20, 30]);
        let mut counts: HashMap<i64, usize> = HashMap::new();

        for _ in 0..30 {
            let mut rows = order_rows(100);
            resolve_rows(&orders(), &mut rows, &mut session, now(), &[]).unwrap();
            for row in &rows {
                let fk = row.get("customer_id").and_then(|v| v.as_int()).unwrap();
                *counts.entry(fk).or_default() += 1;
            }
        }

        // 3000 draws, expect ~1000 each
        assert_eq!(counts.len(), 3);
        for (id, count) in &counts {
            assert!(
                (800..=1200).contains(count),
                "principal {} drawn {} times",
                id,
                count
            );
        }
    }

    #[test]
    fn test_self_reference_is_left_alone() {
        let mut session = session_with_customers(&[10]);
        let mut rows = order_rows(3);
        resolve_rows(&orders(), &mut rows, &mut session, now(), &[]).unwrap();
        for row in &rows {
            assert_eq!(row.get("parent_id"), Some(Value::Int(5)));
        }
    }

    #[test]
    fn test_integer_primary_key_reset_and_dates_stamped() {
        let mut session = session_with_customers(&[10]);
        let mut rows = order_rows(4);
        resolve_rows(&orders(), &mut rows, &mut session, now(), &[]).unwrap();
        for row in &rows {
            assert_eq!(row.get("id"), Some(Value::Int(0)));
            assert_eq!(
                row.get("placed_at"),
                Some(Value::String("2026-10-15T12:00:00".to_string()))
            );
        }
    }

    #[test]
    fn test_non_integer_primary_key_is_kept() {
        let mut entity = customers();
        entity.primary_keys = vec![ColumnDescriptor::new("code", DataType::Uuid)];
        let mut rows: Vec<Record> =
            vec![serde_json::from_str(r#"{"code": "abc", "id": 9}"#).unwrap()];
        resolve_rows(&entity, &mut rows, &mut Session::seeded(1), now(), &[]).unwrap();
        assert_eq!(rows[0].get("code"), Some(Value::String("abc".to_string())));
    }

    #[test]
    fn test_principal_without_rows_is_unsatisfied() {
        let mut session = Session::seeded(1);
        session.record(customers(), Vec::new()).unwrap();
        let mut rows = order_rows(2);

        let err = resolve_rows(&orders(), &mut rows, &mut session, now(), &[]).unwrap_err();
        match err {
            MockSmithError::UnsatisfiedForeignKey {
                entity,
                column,
                principal,
            } => {
                assert_eq!(entity, "Order");
                assert_eq!(column, "customer_id");
                assert_eq!(principal, "Customer");
            }
            other => panic!("Expected UnsatisfiedForeignKey, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_principal_is_unsatisfied() {
        let mut rows = order_rows(1);
        let err = resolve_rows(&orders(), &mut rows, &mut Session::seeded(1), now(), &[]).unwrap_err();
        assert!(matches!(err, MockSmithError::UnsatisfiedForeignKey { .. }));
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Event {
        id: i64,
        at: DateTime<Utc>,
        logged_at: Option<NaiveDateTime>,
    }

    crate::mock_row!(Event { id, at, logged_at });

    fn events() -> EntityDescriptor {
        let mut entity = EntityDescriptor::new("events");
        let id = ColumnDescriptor::new("id", DataType::Integer);
        entity.columns = vec![
            id.clone(),
            ColumnDescriptor::new("at", DataType::TimestampTz),
            ColumnDescriptor::new("logged_at", DataType::Timestamp),
        ];
        entity.primary_keys = vec![id];
        entity
    }

    #[test]
    fn test_timestamptz_column_takes_zoned_stamp() {
        let mut rows: Vec<Event> = vec![serde_json::from_value(serde_json::json!({
            "id": 1,
            "at": "1999-01-01T00:00:00Z",
            "logged_at": null
        }))
        .unwrap()];

        touch_date_times(&events(), &mut rows, now(), &[]).unwrap();

        assert_eq!(rows[0].at.to_rfc3339(), "2026-10-15T10:00:00+00:00");
        assert_eq!(rows[0].logged_at, Some(now().naive_local()));
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct SlimOrder {
        id: i64,
        customer_id: i64,
        parent_id: i64,
    }

    crate::mock_row!(SlimOrder { id, customer_id, parent_id });

    #[test]
    fn test_columns_missing_from_row_type_are_not_stamped() {
        let mut session = session_with_customers(&[10]);
        let mut rows = vec![SlimOrder {
            id: 4,
            customer_id: 999,
            parent_id: 5,
        }];

        resolve_rows(&orders(), &mut rows, &mut session, now(), &[]).unwrap();
        assert_eq!(rows[0].id, 0);
        assert_eq!(rows[0].customer_id, 10);
    }

    #[test]
    fn test_ignored_columns_are_left_untouched() {
        let mut session = session_with_customers(&[10]);
        let mut rows = order_rows(2);
        let ignored = vec!["PLACED_AT".to_string(), "customer_id".to_string()];

        resolve_rows(&orders(), &mut rows, &mut session, now(), &ignored).unwrap();
        for row in &rows {
            assert_eq!(
                row.get("placed_at"),
                Some(Value::String("1999-01-01T00:00:00".to_string()))
            );
            assert_eq!(row.get("customer_id"), Some(Value::Int(999)));
        }

        let mut record: Vec<Record> = vec![serde_json::from_str(r#"{"id": 1}"#).unwrap()];
        touch_date_times(&orders(), &mut record, now(), &ignored).unwrap();
        assert_eq!(record[0].get("placed_at"), None);
    }

    #[test]
    fn test_ignored_foreign_key_needs_no_principal() {
        let mut rows = order_rows(1);
        let ignored = vec!["customer_id".to_string()];
        resolve_rows(&orders(), &mut rows, &mut Session::seeded(1), now(), &ignored).unwrap();
        assert_eq!(rows[0].get("customer_id"), Some(Value::Int(999)));
    }

    #[test]
    fn test_touch_date_times_leaves_keys() {
        let mut rows = order_rows(2);
        touch_date_times(&orders(), &mut rows, now(), &[]).unwrap();
        assert_eq!(rows[0].get("id"), Some(Value::Int(100)));
        assert_eq!(rows[1].get("customer_id"), Some(Value::Int(999)));
        assert_eq!(
            rows[1].get("placed_at"),
            Some(Value::String("2026-10-15T12:00:00".to_string()))
        );
    }
}
