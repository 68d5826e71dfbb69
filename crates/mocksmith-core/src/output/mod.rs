pub mod json;
pub mod memory;
pub mod repository;
pub mod sql;

pub use memory::MemoryRepository;
pub use repository::RowRepository;
pub use sql::SqlRepository;
