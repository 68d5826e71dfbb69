pub mod analyse;
pub mod descriptor;
pub mod introspect;
pub mod postgres;
pub mod sqlite;
pub mod types;
