//! # Row Types
//!
//! Generated rows are deserialized straight into the caller's row type. The
//! pipeline then needs to read and overwrite individual columns (foreign
//! keys, primary keys, timestamps) without knowing the type, which is what
//! `MockRow` provides: a static table from column name to field.
//!
//! Typed rows get their table from the [`mock_row!`](crate::mock_row) macro;
//! `Record` is the dynamic row used when the shape is only known at runtime.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{MockSmithError, Result};
use crate::generate::value::{RowSnapshot, Value};
use crate::schema::descriptor::EntityDescriptor;

/// A row type the pipeline can deserialize, inspect, and patch.
pub trait MockRow: DeserializeOwned + Serialize + Send {
    /// Read a column, or `None` if the row type has no such column.
    fn get(&self, column: &str) -> Option<Value>;

    /// Overwrite a column. Fails if the column does not exist or the value
    /// does not fit the field's type.
    fn set(&mut self, column: &str, value: Value) -> Result<()>;

    /// Whether the row type carries `column` at all. Columns it lacks are
    /// skipped when stamping generation times.
    fn has_column(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Capture the columns of `entity` this row carries, for insertion and
    /// later principal lookups.
    fn snapshot(&self, entity: &EntityDescriptor) -> RowSnapshot {
        entity
            .columns
            .iter()
            .filter(|c| self.has_column(&c.name))
            .map(|c| (c.name.clone(), self.get(&c.name).unwrap_or(Value::Null)))
            .collect()
    }
}

/// A dynamically shaped row: column name to JSON value, in the order the
/// model produced them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub IndexMap<String, serde_json::Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl MockRow for Record {
    fn get(&self, column: &str) -> Option<Value> {
        self.0.get(column).map(Value::from_json)
    }

    fn set(&mut self, column: &str, value: Value) -> Result<()> {
        self.0.insert(column.to_string(), value.to_json());
        Ok(())
    }

    fn has_column(&self, _column: &str) -> bool {
        true
    }
}

/// Error for a write the row type cannot take.
pub fn column_error(column: &str, reason: impl std::fmt::Display) -> MockSmithError {
    MockSmithError::ProviderFailure {
        message: format!("Failed to update column {}: {}", column, reason),
    }
}

/// Implement [`MockRow`] for a struct by listing the fields that map to
/// columns. Field names are the column names.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Customer { id: i64, name: String, joined_at: Option<NaiveDateTime> }
///
/// mocksmith_core::mock_row!(Customer { id, name, joined_at });
/// ```
#[macro_export]
macro_rules! mock_row {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::generate::row::MockRow for $ty {
            fn get(&self, column: &str) -> Option<$crate::generate::value::Value> {
                match column {
                    $(stringify!($field) => $crate::__serde_json::to_value(&self.$field)
                        .ok()
                        .map(|json| $crate::generate::value::Value::from_json(&json)),)*
                    _ => None,
                }
            }

            fn set(
                &mut self,
                column: &str,
                value: $crate::generate::value::Value,
            ) -> $crate::error::Result<()> {
                match column {
                    $(stringify!($field) => {
                        self.$field = $crate::__serde_json::from_value(value.to_json())
                            .map_err(|e| $crate::generate::row::column_error(column, e))?;
                        Ok(())
                    })*
                    _ => Err($crate::generate::row::column_error(column, "no such field")),
                }
            }

            fn has_column(&self, column: &str) -> bool {
                match column {
                    $(stringify!($field) => true,)*
                    _ => false,
                }
            }
        }
    };
}
