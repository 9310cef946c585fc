pub mod api;
pub mod concurrent_loader;
pub mod database;
pub mod error;
pub mod loader;
pub mod models;
pub mod staging;
pub mod utils;

pub use error::{InsertError, LoadError};
pub use loader::{BulkLoader, Connector, LoadOptions};
pub use models::{Config, LoadResult, StagedRecord, StagedTable, TableRef, Value};
