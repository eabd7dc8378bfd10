pub mod common;
pub mod database;

pub use common::CatalogError;
pub use database::{IndexCatalog, IndexDefinition, KeyKind};
