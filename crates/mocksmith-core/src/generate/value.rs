use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::types::DatabaseType;

/// A type-erased copy of one generated row, keyed by column name in the
/// entity's column order. Principal rows are read from snapshots when later
/// entities bind their foreign keys.
pub type RowSnapshot = IndexMap<String, Value>;

/// A scalar column value moved between rows of different types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    Date(NaiveDate),
    Uuid(Uuid),
    Json(serde_json::Value),
}

impl Value {
    /// Lift an untyped JSON value as produced by the model.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map(Value::Float).unwrap_or(Value::Null),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => Value::Json(other.clone()),
        }
    }

    /// Lower to JSON. Timestamps, dates, and UUIDs use the same text forms
    /// chrono and uuid deserialize from, so typed rows accept them.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(ts) => {
                serde_json::Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
            Value::TimestampTz(ts) => serde_json::Value::String(ts.to_rfc3339()),
            Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Value::Uuid(u) => serde_json::Value::String(u.to_string()),
            Value::Json(j) => j.clone(),
        }
    }

    /// Convert to a SQL literal string suitable for INSERT statements.
    pub fn to_sql_literal(&self, db_type: &DatabaseType) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => match db_type {
                DatabaseType::SQLite => {
                    if *b {
                        "1".to_string()
                    } else {
                        "0".to_string()
                    }
                }
                DatabaseType::PostgreSQL => {
                    if *b {
                        "TRUE".to_string()
                    } else {
                        "FALSE".to_string()
                    }
                }
            },
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.is_finite() {
                    format!("{}", f)
                } else {
                    "NULL".to_string()
                }
            }
            Value::String(s) => quote_literal(s),
            Value::Timestamp(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::TimestampTz(ts) => format!("'{}'", ts.format("%Y-%m-%d %H:%M:%S%.f%:z")),
            Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
            Value::Uuid(u) => format!("'{}'", u),
            Value::Json(j) => quote_literal(&j.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => write!(f, "{}", ts),
            Value::TimestampTz(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Date(d) => write!(f, "{}", d),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Json(j) => write!(f, "{}", j),
        }
    }
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(Value::from_json(&json!(null)), Value::Null);
        assert_eq!(Value::from_json(&json!(42)), Value::Int(42));
        assert_eq!(Value::from_json(&json!(1.5)), Value::Float(1.5));
        assert_eq!(
            Value::from_json(&json!("Ada")),
            Value::String("Ada".to_string())
        );
        assert_eq!(
            Value::from_json(&json!({"a": 1})),
            Value::Json(json!({"a": 1}))
        );
    }

    #[test]
    fn test_timestamp_json_is_chrono_readable() {
        let ts = NaiveDate::from_ymd_opt(2026, 10, 15)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let json = Value::Timestamp(ts).to_json();
        let back: NaiveDateTime = serde_json::from_value(json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_timestamptz_json_keeps_offset() {
        let ts = DateTime::parse_from_rfc3339("2026-10-15T09:30:00+02:00").unwrap();
        let json = Value::TimestampTz(ts).to_json();
        assert_eq!(json, json!("2026-10-15T09:30:00+02:00"));

        let utc: DateTime<chrono::Utc> = serde_json::from_value(json).unwrap();
        assert_eq!(utc.to_rfc3339(), "2026-10-15T07:30:00+00:00");
    }

    #[test]
    fn test_timestamptz_sql_literal_carries_offset() {
        let ts = DateTime::parse_from_rfc3339("2026-10-15T09:30:00-05:00").unwrap();
        assert_eq!(
            Value::TimestampTz(ts).to_sql_literal(&DatabaseType::PostgreSQL),
            "'2026-10-15 09:30:00-05:00'"
        );
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        let v = Value::String("O'Brien".to_string());
        assert_eq!(v.to_sql_literal(&DatabaseType::SQLite), "'O''Brien'");
    }

    #[test]
    fn test_sql_literal_bool_per_dialect() {
        assert_eq!(Value::Bool(true).to_sql_literal(&DatabaseType::SQLite), "1");
        assert_eq!(
            Value::Bool(false).to_sql_literal(&DatabaseType::PostgreSQL),
            "FALSE"
        );
    }
}
