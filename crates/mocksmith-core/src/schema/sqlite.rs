use indexmap::IndexMap;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::{MockSmithError, Result};
use crate::schema::introspect::SchemaIntrospector;
use crate::schema::types::*;

pub struct SqliteIntrospector {
    pool: SqlitePool,
}

impl SqliteIntrospector {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn introspect_tables(&self) -> Result<IndexMap<String, Table>> {
        let query = "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY rowid";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MockSmithError::Introspection {
                query: "fetch tables".to_string(),
                source: e,
            })?;

        let mut tables = IndexMap::new();
        for row in rows {
            let name: String = row.get("name");
            tables.insert(name.clone(), Table::new(name));
        }
        Ok(tables)
    }

    async fn introspect_columns(&self, tables: &mut IndexMap<String, Table>) -> Result<()> {
        let table_names: Vec<String> = tables.keys().cloned().collect();
        for table_name in table_names {
            let query = format!("PRAGMA table_info(\"{}\")", table_name);
            let rows = sqlx::query(&query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| MockSmithError::Introspection {
                    query: format!("PRAGMA table_info({})", table_name),
                    source: e,
                })?;

            // PRAGMA pk is the 1-based position within the key, 0 otherwise
            let mut key_columns: Vec<(i32, String)> = Vec::new();

            for row in rows {
                let name: String = row.get("name");
                let type_str: String = row.get("type");
                let notnull: i32 = row.get("notnull");
                let pk: i32 = row.get("pk");

                let data_type = DataType::from_raw(&type_str);
                let mut column = Column::new(name.clone(), data_type, type_str.clone());
                column.nullable = notnull == 0;
                column.is_auto_increment = pk > 0 && type_str.eq_ignore_ascii_case("integer");

                if pk > 0 {
                    key_columns.push((pk, name.clone()));
                }
                if let Some(table) = tables.get_mut(&table_name) {
                    table.columns.insert(name, column);
                }
            }

            if !key_columns.is_empty() {
                key_columns.sort_by_key(|(position, _)| *position);
                if let Some(table) = tables.get_mut(&table_name) {
                    table.primary_key = Some(PrimaryKey {
                        columns: key_columns.into_iter().map(|(_, name)| name).collect(),
                        name: None,
                    });
                }
            }
        }

        Ok(())
    }

    async fn introspect_foreign_keys(&self, tables: &mut IndexMap<String, Table>) -> Result<()> {
        let table_names: Vec<String> = tables.keys().cloned().collect();
        for table_name in table_names {
            let query = format!("PRAGMA foreign_key_list(\"{}\")", table_name);
            let rows = sqlx::query(&query)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| MockSmithError::Introspection {
                    query: format!("PRAGMA foreign_key_list({})", table_name),
                    source: e,
                })?;

            // Group by id (FK id)
            let mut fk_map: IndexMap<i32, ForeignKey> = IndexMap::new();
            for row in &rows {
                let id: i32 = row.get("id");
                let table: String = row.get("table");
                let from: String = row.get("from");
                // NULL when the key targets the referenced table's primary key
                let to: Option<String> = row.get("to");

                let entry = fk_map.entry(id).or_insert_with(|| ForeignKey {
                    name: None,
                    source_columns: Vec::new(),
                    referenced_table: table,
                    referenced_columns: Vec::new(),
                });
                entry.source_columns.push(from);
                if let Some(to) = to {
                    entry.referenced_columns.push(to);
                }
            }

            if let Some(table) = tables.get_mut(&table_name) {
                table.foreign_keys.extend(fk_map.into_values());
            }
        }

        Ok(())
    }
}

impl SchemaIntrospector for SqliteIntrospector {
    async fn introspect(&self) -> Result<SchemaModel> {
        let mut model = SchemaModel::new(DatabaseType::SQLite, "sqlite".to_string());

        model.tables = self.introspect_tables().await?;
        self.introspect_columns(&mut model.tables).await?;
        self.introspect_foreign_keys(&mut model.tables).await?;

        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn shop_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, joined_at DATETIME)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE orders (
                id INTEGER PRIMARY KEY,
                customer_id INTEGER NOT NULL REFERENCES customers(id),
                parent_id INTEGER REFERENCES orders(id),
                total NUMERIC(10,2)
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_introspect_tables_columns_and_keys() {
        let model = SqliteIntrospector::new(shop_pool().await)
            .introspect()
            .await
            .unwrap();

        assert_eq!(model.table_count(), 2);
        assert_eq!(model.foreign_key_count(), 2);

        let customers = &model.tables["customers"];
        assert_eq!(customers.columns["id"].data_type, DataType::Integer);
        assert!(customers.columns["id"].is_auto_increment);
        assert!(!customers.columns["name"].nullable);
        assert!(customers.columns["joined_at"].data_type.is_date_time());
        assert_eq!(
            customers.primary_key.as_ref().unwrap().columns,
            vec!["id".to_string()]
        );

        let orders = &model.tables["orders"];
        let customer_fk = orders.foreign_key_for("customer_id").unwrap();
        assert_eq!(customer_fk.referenced_table, "customers");
        assert_eq!(customer_fk.referenced_columns, vec!["id".to_string()]);
        assert_eq!(
            orders.foreign_key_for("parent_id").unwrap().referenced_table,
            "orders"
        );
    }
}
