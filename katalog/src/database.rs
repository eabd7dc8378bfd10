use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{Read, Write},
    path::Path,
};

use bincode::{Decode, Encode, config::standard};
use log::{debug, info};
use pohon::{Index, Key, keys};
use serde::{Deserialize, Serialize};
use shared_types::{
    IndexConfig,
    config::{PRIMARY_INDEX_FILE, SECONDARY_INDEX_FILE},
};

use crate::common::CatalogError;

/// How a record field becomes an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum KeyKind {
    /// The field is the record id itself.
    Primary,
    /// The field is a title, hashed after normalisation. Distinct titles can
    /// share a key.
    Title,
}

impl KeyKind {
    pub fn derive_key(&self, field: &str) -> Result<Key, CatalogError> {
        match self {
            KeyKind::Primary => field
                .trim()
                .parse::<i32>()
                .map(keys::primary_key)
                .map_err(|e| CatalogError::InvalidKey(format!("'{}' is not a record id: {}", field, e))),
            KeyKind::Title => Ok(keys::title_key(field)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct IndexDefinition {
    pub name: String,
    pub file_name: String,
    pub key_kind: KeyKind,
    pub config: IndexConfig,
}

impl IndexDefinition {
    pub fn new(name: &str, file_name: &str, key_kind: KeyKind, config: IndexConfig) -> Self {
        IndexDefinition {
            name: name.to_string(),
            file_name: file_name.to_string(),
            key_kind,
            config,
        }
    }
}

// Index catalog - single file approach
#[derive(Debug, Clone, Serialize, Deserialize, Encode, Decode)]
pub struct IndexCatalog {
    pub database_name: String,
    pub indexes: HashMap<String, IndexDefinition>,
}

impl IndexCatalog {
    pub fn new(database_name: String) -> Self {
        IndexCatalog {
            database_name,
            indexes: HashMap::new(),
        }
    }

    /// Catalog holding the primary id index and the secondary title index
    /// under their usual file names.
    pub fn standard(database_name: String, config: IndexConfig) -> Self {
        let mut catalog = Self::new(database_name);
        for definition in [
            IndexDefinition::new("primary", PRIMARY_INDEX_FILE, KeyKind::Primary, config),
            IndexDefinition::new("title", SECONDARY_INDEX_FILE, KeyKind::Title, config),
        ] {
            catalog
                .indexes
                .insert(definition.name.clone(), definition);
        }
        catalog
    }

    pub fn register_index(&mut self, definition: IndexDefinition) -> Result<(), CatalogError> {
        if self.indexes.contains_key(&definition.name) {
            return Err(CatalogError::IndexExists(definition.name));
        }
        if self
            .indexes
            .values()
            .any(|existing| existing.file_name == definition.file_name)
        {
            return Err(CatalogError::FileInUse(definition.file_name));
        }
        debug!(
            "registered index '{}' in {}",
            definition.name, definition.file_name
        );
        self.indexes.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Forgets the definition. The index file on disk is left alone.
    pub fn drop_index(&mut self, name: &str) -> Result<IndexDefinition, CatalogError> {
        self.indexes
            .remove(name)
            .ok_or_else(|| CatalogError::IndexNotFound(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.get(name)
    }

    /// Opens the named index inside `dir`, creating the directory if needed.
    pub fn open_index<P: AsRef<Path>>(&self, dir: P, name: &str) -> Result<Index, CatalogError> {
        let definition = self
            .get(name)
            .ok_or_else(|| CatalogError::IndexNotFound(name.to_string()))?;
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Index::open(dir.join(&definition.file_name), definition.config)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CatalogError> {
        Ok(bincode::encode_to_vec(self, standard())?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CatalogError> {
        let (decoded, _len): (IndexCatalog, usize) = bincode::decode_from_slice(data, standard())?;
        Ok(decoded)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CatalogError> {
        let data = self.to_bytes()?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path.as_ref())?;
        file.write_all(&data)?;
        file.flush()?;
        info!(
            "saved catalog '{}' with {} indexes to {}",
            self.database_name,
            self.indexes.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let mut file = File::open(path.as_ref())?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Self::from_bytes(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_parses_record_id() {
        assert_eq!(KeyKind::Primary.derive_key(" 42 ").unwrap(), 42);
        assert_eq!(KeyKind::Primary.derive_key("-7").unwrap(), -7);
        assert!(matches!(
            KeyKind::Primary.derive_key("forty-two"),
            Err(CatalogError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_title_key_ignores_case_and_padding() {
        let key = KeyKind::Title.derive_key("  The Rust Book\t").unwrap();
        assert_eq!(key, KeyKind::Title.derive_key("the rust book").unwrap());
        assert_eq!(key, keys::title_key("THE RUST BOOK"));
    }

    #[test]
    fn test_register_and_drop() {
        let mut catalog = IndexCatalog::new("library".to_string());
        let definition =
            IndexDefinition::new("primary", PRIMARY_INDEX_FILE, KeyKind::Primary, IndexConfig::default());
        catalog.register_index(definition.clone()).unwrap();
        assert_eq!(catalog.get("primary"), Some(&definition));

        assert!(matches!(
            catalog.register_index(definition.clone()),
            Err(CatalogError::IndexExists(_))
        ));
        let mut same_file = definition.clone();
        same_file.name = "other".to_string();
        assert!(matches!(
            catalog.register_index(same_file),
            Err(CatalogError::FileInUse(_))
        ));

        assert_eq!(catalog.drop_index("primary").unwrap(), definition);
        assert!(catalog.get("primary").is_none());
        assert!(matches!(
            catalog.drop_index("primary"),
            Err(CatalogError::IndexNotFound(_))
        ));
    }

    #[test]
    fn test_bytes_round_trip() {
        let config = IndexConfig::with_order(8).sync_writes(true);
        let catalog = IndexCatalog::standard("library".to_string(), config);
        let decoded = IndexCatalog::from_bytes(&catalog.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.database_name, "library");
        assert_eq!(decoded.indexes, catalog.indexes);
        assert_eq!(decoded.get("title").unwrap().file_name, SECONDARY_INDEX_FILE);
        assert_eq!(decoded.get("primary").unwrap().config.order, 8);
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        assert!(matches!(
            IndexCatalog::from_bytes(&[0xff, 0xff, 0xff]),
            Err(CatalogError::DeserializationError(_))
        ));
    }
}
