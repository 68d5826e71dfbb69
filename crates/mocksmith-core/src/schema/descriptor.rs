//! # Entity Descriptors
//!
//! The normalized view of one table that the generation pipeline works
//! from: its columns, primary keys, and foreign keys with their principal
//! chains. Descriptors are produced fresh by a `SchemaAnalyser` for every
//! generation call; the `generated` slot is filled once the entity's rows
//! are recorded into a session.

use serde::Serialize;

use crate::generate::value::RowSnapshot;
use crate::schema::types::DataType;

/// One column of an entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A foreign key column and the chain of entities it points through.
///
/// `principals[0]` is the owning entity. A chain of length one, or one whose
/// last element equals its first, is a self-reference and is never bound to
/// another entity's rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeyDescriptor {
    pub column: String,
    pub principals: Vec<String>,
}

impl ForeignKeyDescriptor {
    /// The entity to sample rows from, or `None` for a self-reference.
    pub fn principal(&self) -> Option<&str> {
        match (self.principals.first(), self.principals.last()) {
            (Some(first), Some(last)) if first != last => Some(last),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityDescriptor {
    pub display_name: String,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_keys: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    /// Rows recorded for this entity. Empty until the entity is recorded
    /// into a session, read-only afterwards.
    #[serde(skip)]
    pub generated: Vec<RowSnapshot>,
}

impl EntityDescriptor {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            columns: Vec::new(),
            primary_keys: Vec::new(),
            foreign_keys: Vec::new(),
            generated: Vec::new(),
        }
    }

    pub fn date_time_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.data_type.is_date_time())
    }

    pub fn integer_primary_keys(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.primary_keys.iter().filter(|c| c.data_type.is_integer())
    }

    pub fn is_foreign_key(&self, column: &str) -> bool {
        self.foreign_keys.iter().any(|fk| fk.column == column)
    }
}
