//! Index and data-directory configuration

use std::path::PathBuf;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::constant::{DEFAULT_ORDER, PAGE_SIZE};

/// How the tree finds the parent of a node that has just split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum ParentLookup {
    /// Reuse the ancestor stack recorded while descending to the leaf.
    Path,
    /// Walk the whole tree from the root looking for the child offset.
    Scan,
}

/// Per-index settings. `order` and `page_size` are persisted in the file
/// header when the index is created and win over these values on reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct IndexConfig {
    pub order: u32,
    pub page_size: u32,
    pub sync_writes: bool,
    pub parent_lookup: ParentLookup,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            page_size: PAGE_SIZE as u32,
            sync_writes: false,
            parent_lookup: ParentLookup::Path,
        }
    }
}

impl IndexConfig {
    pub fn with_order(order: u32) -> Self {
        Self {
            order,
            ..Self::default()
        }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    pub fn parent_lookup(mut self, lookup: ParentLookup) -> Self {
        self.parent_lookup = lookup;
        self
    }

    /// Maximum number of keys a node holds (2m).
    pub fn max_keys(&self) -> usize {
        2 * self.order as usize
    }
}

pub const DATA_DIR_VAR: &str = "DATA_DIR";
pub const DB_DIR_VAR: &str = "DB_DIR";

pub const PRIMARY_INDEX_FILE: &str = "prim_index.idx";
pub const SECONDARY_INDEX_FILE: &str = "sec_index.idx";
pub const CATALOG_FILE: &str = "catalog.bin";

/// Where index files and the catalog live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    pub db_dir: PathBuf,
}

impl DataPaths {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// `DATA_DIR` defaults to `data`, `DB_DIR` to `$DATA_DIR/db`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup(DATA_DIR_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        let db_dir = lookup(DB_DIR_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("db"));
        Self { data_dir, db_dir }
    }

    pub fn primary_index(&self) -> PathBuf {
        self.db_dir.join(PRIMARY_INDEX_FILE)
    }

    pub fn secondary_index(&self) -> PathBuf {
        self.db_dir.join(SECONDARY_INDEX_FILE)
    }

    pub fn catalog(&self) -> PathBuf {
        self.db_dir.join(CATALOG_FILE)
    }
}
