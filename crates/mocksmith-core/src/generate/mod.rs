pub mod batch;
pub mod foreign_key;
pub mod parse;
pub mod pipeline;
pub mod row;
pub mod session;
pub mod value;

pub use pipeline::{CancelHandle, GenerateOptions, GenerationReport, Pipeline};
pub use row::{MockRow, Record};
pub use session::Session;
