//! # Schema Analyser
//!
//! Turns a `SchemaModel` into the `EntityDescriptor`s the pipeline consumes.
//! The pipeline only depends on the `SchemaAnalyser` trait; `ModelAnalyser`
//! is the implementation over an introspected or file-loaded model.

use crate::error::{MockSmithError, Result};
use crate::schema::descriptor::{ColumnDescriptor, EntityDescriptor, ForeignKeyDescriptor};
use crate::schema::types::{SchemaModel, Table};

/// Produces entity descriptors from some schema source.
pub trait SchemaAnalyser: Send + Sync {
    /// Names of every entity the analyser can describe.
    fn entity_types(&self) -> Vec<String>;

    /// Build a fresh descriptor for one entity.
    fn analyse_entity(&self, name: &str) -> Result<EntityDescriptor>;
}

pub struct ModelAnalyser {
    model: SchemaModel,
}

impl ModelAnalyser {
    pub fn new(model: SchemaModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &SchemaModel {
        &self.model
    }

    fn find_table(&self, name: &str) -> Option<&Table> {
        self.model.tables.get(name).or_else(|| {
            self.model
                .tables
                .values()
                .find(|t| t.name.eq_ignore_ascii_case(name))
        })
    }

    /// The entity chain for a foreign key column: the owning table, then the
    /// referenced table unless the key points back at its own table.
    fn principal_chain(table: &Table, column: &str) -> Vec<String> {
        let mut chain = vec![table.name.clone()];
        if let Some(fk) = table.foreign_key_for(column) {
            if fk.referenced_table != table.name {
                chain.push(fk.referenced_table.clone());
            }
        }
        chain
    }
}

impl SchemaAnalyser for ModelAnalyser {
    fn entity_types(&self) -> Vec<String> {
        self.model.tables.keys().cloned().collect()
    }

    fn analyse_entity(&self, name: &str) -> Result<EntityDescriptor> {
        let table = self
            .find_table(name)
            .ok_or_else(|| MockSmithError::UnknownEntity {
                name: name.to_string(),
                known: self.entity_types().join(", "),
            })?;

        let mut entity = EntityDescriptor::new(table.name.clone());
        entity.columns = table
            .columns
            .values()
            .map(|c| ColumnDescriptor::new(c.name.clone(), c.data_type.clone()))
            .collect();

        if let Some(pk) = &table.primary_key {
            entity.primary_keys = pk
                .columns
                .iter()
                .filter_map(|name| table.columns.get(name))
                .map(|c| ColumnDescriptor::new(c.name.clone(), c.data_type.clone()))
                .collect();
        }

        for fk in &table.foreign_keys {
            for source in &fk.source_columns {
                entity.foreign_keys.push(ForeignKeyDescriptor {
                    column: source.clone(),
                    principals: Self::principal_chain(table, source),
                });
            }
        }

        tracing::debug!(
            "Analysed {}: {} columns, {} primary keys, {} foreign keys",
            entity.display_name,
            entity.columns.len(),
            entity.primary_keys.len(),
            entity.foreign_keys.len(),
        );

        Ok(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::*;

    fn int_column(name: &str) -> Column {
        Column::new(name.to_string(), DataType::Integer, "integer".to_string())
    }

    fn fk(source: &str, table: &str, column: &str) -> ForeignKey {
        ForeignKey {
            name: None,
            source_columns: vec![source.to_string()],
            referenced_table: table.to_string(),
            referenced_columns: vec![column.to_string()],
        }
    }

    fn pk(column: &str) -> Option<PrimaryKey> {
        Some(PrimaryKey {
            columns: vec![column.to_string()],
            name: None,
        })
    }

    fn model() -> SchemaModel {
        let mut model = SchemaModel::new(DatabaseType::SQLite, "shop".to_string());

        let mut customers = Table::new("customers".to_string());
        customers.columns.insert("id".to_string(), int_column("id"));
        customers.columns.insert(
            "name".to_string(),
            Column::new("name".to_string(), DataType::Text, "text".to_string()),
        );
        customers.primary_key = pk("id");
        model.tables.insert("customers".to_string(), customers);

        // 1:1 extension sharing the customer's key
        let mut vip = Table::new("vip_customers".to_string());
        vip.columns.insert("customer_id".to_string(), int_column("customer_id"));
        vip.primary_key = pk("customer_id");
        vip.foreign_keys.push(fk("customer_id", "customers", "id"));
        model.tables.insert("vip_customers".to_string(), vip);

        let mut orders = Table::new("orders".to_string());
        orders.columns.insert("id".to_string(), int_column("id"));
        orders.columns.insert("customer_id".to_string(), int_column("customer_id"));
        orders.columns.insert("vip_id".to_string(), int_column("vip_id"));
        orders.columns.insert("parent_id".to_string(), int_column("parent_id"));
        orders.primary_key = pk("id");
        orders.foreign_keys.push(fk("customer_id", "customers", "id"));
        orders.foreign_keys.push(fk("vip_id", "vip_customers", "customer_id"));
        orders.foreign_keys.push(fk("parent_id", "orders", "id"));
        model.tables.insert("orders".to_string(), orders);

        model
    }

    #[test]
    fn test_entity_types_in_declaration_order() {
        let analyser = ModelAnalyser::new(model());
        assert_eq!(
            analyser.entity_types(),
            vec!["customers", "vip_customers", "orders"]
        );
    }

    #[test]
    fn test_analyse_direct_and_self_reference_chains() {
        let analyser = ModelAnalyser::new(model());
        let orders = analyser.analyse_entity("orders").unwrap();

        assert_eq!(orders.columns.len(), 4);
        assert_eq!(orders.primary_keys[0].name, "id");

        let customer_fk = &orders.foreign_keys[0];
        assert_eq!(customer_fk.principals, vec!["orders", "customers"]);
        assert_eq!(customer_fk.principal(), Some("customers"));

        let parent_fk = &orders.foreign_keys[2];
        assert_eq!(parent_fk.principal(), None);
    }

    #[test]
    fn test_chain_stops_at_referenced_table() {
        let analyser = ModelAnalyser::new(model());
        let orders = analyser.analyse_entity("orders").unwrap();
        let vip_fk = &orders.foreign_keys[1];
        assert_eq!(vip_fk.principals, vec!["orders", "vip_customers"]);
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let analyser = ModelAnalyser::new(model());
        let entity = analyser.analyse_entity("Customers").unwrap();
        assert_eq!(entity.display_name, "customers");
        assert!(entity.generated.is_empty());
    }

    #[test]
    fn test_unknown_entity_lists_known_names() {
        let analyser = ModelAnalyser::new(model());
        let err = analyser.analyse_entity("invoices").unwrap_err();
        match err {
            MockSmithError::UnknownEntity { name, known } => {
                assert_eq!(name, "invoices");
                assert!(known.contains("orders"));
            }
            other => panic!("Expected UnknownEntity, got {other:?}"),
        }
    }
}
