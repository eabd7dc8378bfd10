use std::path::Path;

use shared_types::IndexConfig;

use crate::{
    common::{Key, PageOffset, Result, Rid, StorageError},
    tree::BPlusTree,
    verify::TreeStats,
};

/// Key -> RID index backed by a single file. This is the surface loaders
/// and query tools use; RIDs are stored and returned untouched.
pub struct Index {
    tree: BPlusTree,
}

impl Index {
    /// Opens an existing index file or initialises a new one. No page is
    /// allocated until the first insert.
    pub fn open<P: AsRef<Path>>(path: P, config: IndexConfig) -> Result<Self> {
        Ok(Self {
            tree: BPlusTree::open(path, &config)?,
        })
    }

    pub fn insert(&mut self, key: Key, rid: Rid) -> Result<()> {
        self.tree.insert(key, rid)
    }

    pub fn search(&mut self, key: Key) -> Result<Option<Rid>> {
        self.tree.search(key)
    }

    pub fn search_all(&mut self, key: Key) -> Result<Vec<Rid>> {
        self.tree.search_all(key)
    }

    pub fn locate_leaf(&mut self, key: Key) -> Result<Option<PageOffset>> {
        self.tree.locate_leaf(key)
    }

    pub fn range(&mut self, low: Key, high: Key) -> Result<Vec<(Key, Rid)>> {
        self.tree.range(low, high)
    }

    pub fn entries(&mut self) -> Result<Vec<(Key, Rid)>> {
        self.tree.entries()
    }

    /// Deletion needs a merge/redistribute policy this engine does not have.
    pub fn delete(&mut self, key: Key) -> Result<()> {
        Err(StorageError::Unsupported(format!(
            "cannot delete key {}: the index only grows",
            key
        )))
    }

    pub fn verify(&mut self) -> Result<TreeStats> {
        self.tree.verify()
    }

    pub fn find_parent(&mut self, child: PageOffset) -> Result<Option<(PageOffset, usize)>> {
        let root = self.tree.root_offset();
        self.tree.find_parent(root, child)
    }

    pub fn order(&self) -> u32 {
        self.tree.order()
    }

    pub fn root_offset(&self) -> PageOffset {
        self.tree.root_offset()
    }

    pub fn next_free_offset(&self) -> PageOffset {
        self.tree.manager().next_free_offset()
    }

    pub fn path(&self) -> &Path {
        self.tree.manager().path()
    }

    pub fn pages_read(&self) -> u64 {
        self.tree.manager().pages_read()
    }

    pub fn pages_written(&self) -> u64 {
        self.tree.manager().pages_written()
    }

    pub fn reset_stats(&mut self) {
        self.tree.manager_mut().reset_stats();
    }

    pub fn flush(&mut self) -> Result<()> {
        self.tree.manager_mut().flush()
    }

    /// Persists the header and releases the file.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}
