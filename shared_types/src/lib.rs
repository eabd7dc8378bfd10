pub mod config;
pub mod constant;
pub mod error;

pub use config::{DataPaths, IndexConfig, ParentLookup};
pub use error::StorageError;

pub use constant::{DEFAULT_ORDER, FILE_HEADER_SIZE, MAGIC_NUMBER, MAX_PAGE_SIZE, NULL_OFFSET, PAGE_SIZE};
