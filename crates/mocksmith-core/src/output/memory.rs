//! In-process stand-in for a database. Assigns identities per entity the way
//! an auto-increment column would and keeps every stored row, so a seeding
//! run can be dry-run and then written out as JSON.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::{MockSmithError, Result};
use crate::generate::value::{RowSnapshot, Value};
use crate::output::repository::{is_unassigned_key, RowRepository};
use crate::schema::descriptor::EntityDescriptor;

#[derive(Default)]
struct Tables {
    next_id: HashMap<String, i64>,
    rows: IndexMap<String, Vec<RowSnapshot>>,
}

#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows stored so far, keyed by entity in insertion order.
    pub fn rows(&self) -> IndexMap<String, Vec<RowSnapshot>> {
        match self.tables.lock() {
            Ok(tables) => tables.rows.clone(),
            Err(poisoned) => poisoned.into_inner().rows.clone(),
        }
    }

    pub fn row_count(&self, entity: &str) -> usize {
        self.rows().get(entity).map_or(0, Vec::len)
    }
}

#[async_trait]
impl RowRepository for MemoryRepository {
    async fn insert(
        &self,
        entity: &EntityDescriptor,
        rows: Vec<RowSnapshot>,
    ) -> Result<Vec<RowSnapshot>> {
        let mut tables = self.tables.lock().map_err(|_| MockSmithError::ProviderFailure {
            message: "memory repository lock poisoned".to_string(),
        })?;
        let Tables { next_id, rows: stored } = &mut *tables;

        let counter = next_id.entry(entity.display_name.clone()).or_insert(1);
        let mut inserted = Vec::with_capacity(rows.len());
        for mut row in rows {
            for pk in entity.integer_primary_keys() {
                if is_unassigned_key(row.get(&pk.name)) {
                    row.insert(pk.name.clone(), Value::Int(*counter));
                    *counter += 1;
                }
            }
            inserted.push(row);
        }

        stored
            .entry(entity.display_name.clone())
            .or_default()
            .extend(inserted.iter().cloned());
        Ok(inserted)
    }
}
