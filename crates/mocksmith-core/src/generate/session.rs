//! # Generation Session
//!
//! The append-only record of entities generated so far and the random source
//! used to bind foreign keys to them. Later entities sample their principals
//! from here, so entities must be generated in dependency order.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{MockSmithError, Result};
use crate::generate::value::{RowSnapshot, Value};
use crate::schema::descriptor::EntityDescriptor;

pub struct Session {
    entities: Vec<EntityDescriptor>,
    rng: StdRng,
}

impl Session {
    /// A session seeded from OS entropy.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// A session whose FK binding is reproducible for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            entities: Vec::new(),
            rng,
        }
    }

    /// Fill the entity's generated slot and append it. An entity name is
    /// recorded at most once per session.
    pub fn record(&mut self, mut entity: EntityDescriptor, rows: Vec<RowSnapshot>) -> Result<()> {
        if self.contains(&entity.display_name) {
            return Err(MockSmithError::EntityAlreadyGenerated {
                entity: entity.display_name,
            });
        }
        tracing::debug!(
            "Recorded {} rows for {} in session",
            rows.len(),
            entity.display_name
        );
        entity.generated = rows;
        self.entities.push(entity);
        Ok(())
    }

    pub fn contains(&self, display_name: &str) -> bool {
        self.find(display_name).is_some()
    }

    pub fn find(&self, display_name: &str) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|e| e.display_name == display_name)
    }

    /// Recorded entities in generation order.
    pub fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    /// Pick a uniformly random principal row of `display_name` and return its
    /// first primary-key value. `None` if the entity is missing or has no
    /// rows.
    pub fn sample_primary_key(&mut self, display_name: &str) -> Option<Value> {
        let entity = self.entities.iter().find(|e| e.display_name == display_name)?;
        if entity.generated.is_empty() {
            return None;
        }
        let key_column = entity.primary_keys.first()?;
        let index = self.rng.random_range(0..entity.generated.len());
        entity.generated[index].get(&key_column.name).cloned()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
