use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use mocksmith_core::llm::client::{
    GenerationMessage, MessageRequest, ProviderOptions, RowGeneratorClient,
};
use mocksmith_core::llm::prompt::{row_generation_prompt, SYSTEM_PROMPT};
use mocksmith_core::schema::descriptor::EntityDescriptor;
use mocksmith_core::schema::types::*;
use mocksmith_core::{MockSmithError, Result};

/// A small shop schema: `customers`, `categories` (self-referencing through
/// `parent_id`), and `orders` referencing `customers`.
pub fn shop_schema() -> SchemaModel {
    let mut schema = SchemaModel::new(DatabaseType::SQLite, "shop".to_string());

    // customers table
    let mut customers = Table::new("customers".to_string());
    customers.columns.insert("id".to_string(), serial_id());
    let mut name = Column::new("name".to_string(), DataType::Text, "text".to_string());
    name.nullable = false;
    customers.columns.insert("name".to_string(), name);
    customers.columns.insert(
        "email".to_string(),
        Column::new(
            "email".to_string(),
            DataType::VarChar,
            "varchar(255)".to_string(),
        ),
    );
    customers.columns.insert(
        "joined_at".to_string(),
        Column::new(
            "joined_at".to_string(),
            DataType::Timestamp,
            "datetime".to_string(),
        ),
    );
    customers.primary_key = Some(primary_key("id"));
    schema.tables.insert("customers".to_string(), customers);

    // categories table
    let mut categories = Table::new("categories".to_string());
    categories.columns.insert("id".to_string(), serial_id());
    categories.columns.insert(
        "title".to_string(),
        Column::new("title".to_string(), DataType::Text, "text".to_string()),
    );
    categories.columns.insert(
        "parent_id".to_string(),
        Column::new(
            "parent_id".to_string(),
            DataType::Integer,
            "integer".to_string(),
        ),
    );
    categories.primary_key = Some(primary_key("id"));
    categories
        .foreign_keys
        .push(foreign_key("parent_id", "categories"));
    schema.tables.insert("categories".to_string(), categories);

    // orders table
    let mut orders = Table::new("orders".to_string());
    orders.columns.insert("id".to_string(), serial_id());
    let mut customer_id = Column::new(
        "customer_id".to_string(),
        DataType::Integer,
        "integer".to_string(),
    );
    customer_id.nullable = false;
    orders.columns.insert("customer_id".to_string(), customer_id);
    orders.columns.insert(
        "total".to_string(),
        Column::new(
            "total".to_string(),
            DataType::Numeric,
            "numeric(10,2)".to_string(),
        ),
    );
    orders.columns.insert(
        "placed_at".to_string(),
        Column::new(
            "placed_at".to_string(),
            DataType::Timestamp,
            "datetime".to_string(),
        ),
    );
    orders.primary_key = Some(primary_key("id"));
    orders
        .foreign_keys
        .push(foreign_key("customer_id", "customers"));
    schema.tables.insert("orders".to_string(), orders);

    schema
}

/// DDL matching [`shop_schema`], for SQLite-backed tests.
pub const SHOP_SQLITE_DDL: &[&str] = &[
    "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email VARCHAR(255), joined_at DATETIME)",
    "CREATE TABLE categories (id INTEGER PRIMARY KEY, title TEXT, parent_id INTEGER REFERENCES categories(id))",
    "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER NOT NULL REFERENCES customers(id), total NUMERIC(10,2), placed_at DATETIME)",
];

/// An in-memory SQLite pool with the shop tables created.
pub async fn shop_sqlite_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("open in-memory sqlite");
    for ddl in SHOP_SQLITE_DDL {
        sqlx::query(ddl)
            .execute(&pool)
            .await
            .expect("create shop table");
    }
    pool
}

/// One PostgreSQL table with a zone-aware timestamp: `events(id, at timestamptz)`.
pub fn events_schema() -> SchemaModel {
    let mut schema = SchemaModel::new(DatabaseType::PostgreSQL, "audit".to_string());
    let mut events = Table::new("events".to_string());
    events.columns.insert("id".to_string(), serial_id());
    events.columns.insert(
        "at".to_string(),
        Column::new(
            "at".to_string(),
            DataType::TimestampTz,
            "timestamptz".to_string(),
        ),
    );
    events.primary_key = Some(primary_key("id"));
    schema.tables.insert("events".to_string(), events);
    schema
}

/// `{"data": [...]}` with `n` event rows.
pub fn events_response(n: usize) -> String {
    let rows: Vec<serde_json::Value> = (0..n)
        .map(|i| serde_json::json!({ "id": i + 1, "at": "2001-01-01T00:00:00Z" }))
        .collect();
    serde_json::json!({ "data": rows }).to_string()
}

fn serial_id() -> Column {
    let mut id = Column::new("id".to_string(), DataType::Integer, "integer".to_string());
    id.is_auto_increment = true;
    id.nullable = false;
    id
}

fn primary_key(column: &str) -> PrimaryKey {
    PrimaryKey {
        columns: vec![column.to_string()],
        name: None,
    }
}

fn foreign_key(column: &str, referenced_table: &str) -> ForeignKey {
    ForeignKey {
        name: None,
        source_columns: vec![column.to_string()],
        referenced_table: referenced_table.to_string(),
        referenced_columns: vec!["id".to_string()],
    }
}

/// `{"data": [...]}` with `n` customer rows.
pub fn customers_response(n: usize) -> String {
    let rows: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            serde_json::json!({
                "id": i + 1,
                "name": format!("Customer {}", i + 1),
                "email": format!("customer{}@example.com", i + 1),
                "joined_at": "2001-01-01T00:00:00"
            })
        })
        .collect();
    serde_json::json!({ "data": rows }).to_string()
}

/// `{"data": [...]}` with `n` order rows, all pointing at a customer id that
/// does not exist.
pub fn orders_response(n: usize) -> String {
    let rows: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            serde_json::json!({
                "id": i + 1,
                "customer_id": 9999,
                "total": 12.5,
                "placed_at": "2001-01-01T00:00:00"
            })
        })
        .collect();
    serde_json::json!({ "data": rows }).to_string()
}

/// One scripted provider reply.
pub enum Reply {
    Text(String),
    /// Fail with `ProviderFailure`.
    Fail(String),
    /// Never resolve.
    Hang,
}

type Fallback = Box<dyn Fn(&GenerationMessage) -> String + Send + Sync>;

/// A `RowGeneratorClient` that answers from a script and records the row
/// count of every request it receives.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<Fallback>,
    requests: Mutex<Vec<usize>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Text-only script.
    pub fn texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| Reply::Text(t.into())).collect())
    }

    /// Answer every request the script does not cover with `fallback`.
    pub fn with_fallback(
        mut self,
        fallback: impl Fn(&GenerationMessage) -> String + Send + Sync + 'static,
    ) -> Self {
        self.fallback = Some(Box::new(fallback));
        self
    }

    /// Row counts of every `generate_mock_data` call, in order.
    pub fn requested_row_counts(&self) -> Vec<usize> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

#[async_trait]
impl RowGeneratorClient for ScriptedClient {
    fn generate_message(
        &self,
        entity: &EntityDescriptor,
        request: &MessageRequest,
    ) -> (GenerationMessage, ProviderOptions) {
        let user = row_generation_prompt(
            entity,
            &request.locale,
            request.row_count,
            &request.seed_hint,
            &request.ignored_columns,
        );
        (
            GenerationMessage {
                system: SYSTEM_PROMPT.to_string(),
                user,
                row_count: request.row_count,
            },
            ProviderOptions::for_rows(request.row_count),
        )
    }

    async fn generate_mock_data(
        &self,
        message: &GenerationMessage,
        _options: &ProviderOptions,
    ) -> Result<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(message.row_count);

        let reply = self.replies.lock().expect("replies lock").pop_front();
        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Fail(message)) => Err(MockSmithError::ProviderFailure { message }),
            Some(Reply::Hang) => std::future::pending().await,
            None => match &self.fallback {
                Some(fallback) => Ok(fallback(message)),
                None => Err(MockSmithError::ProviderFailure {
                    message: "scripted client ran out of replies".to_string(),
                }),
            },
        }
    }
}
