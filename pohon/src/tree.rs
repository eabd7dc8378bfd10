use std::path::Path;

use log::debug;
use shared_types::{IndexConfig, NULL_OFFSET, ParentLookup};

use crate::{
    common::{Key, PageOffset, Result, Rid, StorageError},
    manager::PageManager,
    node::{InternalNode, LeafNode, Node, lower_bound},
};

/// Deeper than any tree a 64-bit file can hold; reaching it means a cycle.
pub(crate) const MAX_DEPTH: usize = 64;

/// Internal nodes visited on the way down: (node offset, child slot taken).
pub type AncestorPath = Vec<(PageOffset, usize)>;

/// Disk-resident B+Tree. Nodes reference each other only by page offset and
/// there are no parent pointers; the only in-memory state is the cached root.
pub struct BPlusTree {
    pub(crate) manager: PageManager,
    root: PageOffset,
    parent_lookup: ParentLookup,
}

impl BPlusTree {
    pub fn open<P: AsRef<Path>>(path: P, config: &IndexConfig) -> Result<Self> {
        let manager = PageManager::open(path, config)?;
        let root = manager.root_offset();
        Ok(Self {
            manager,
            root,
            parent_lookup: config.parent_lookup,
        })
    }

    pub fn root_offset(&self) -> PageOffset {
        self.root
    }

    pub fn order(&self) -> u32 {
        self.manager.order()
    }

    pub fn manager(&self) -> &PageManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut PageManager {
        &mut self.manager
    }

    fn max_keys(&self) -> usize {
        2 * self.manager.order() as usize
    }

    pub(crate) fn load(&mut self, offset: PageOffset) -> Result<Node> {
        self.manager.read_node(offset)?.ok_or_else(|| {
            StorageError::CorruptedData("null page offset reached inside the tree".into())
        })
    }

    fn set_root(&mut self, offset: PageOffset) -> Result<()> {
        self.manager.update_root(offset)?;
        self.root = offset;
        Ok(())
    }

    // ========== SEARCH OPERATIONS ==========

    /// Descends from the root to the leaf whose key range holds `key`.
    /// Reads exactly one page per level; an empty tree reads nothing.
    pub fn find_leaf_for_key(&mut self, key: Key) -> Result<Option<(PageOffset, LeafNode)>> {
        if self.root == NULL_OFFSET {
            return Ok(None);
        }
        let (_, offset, leaf) = self.descend(key)?;
        Ok(Some((offset, leaf)))
    }

    fn descend(&mut self, key: Key) -> Result<(AncestorPath, PageOffset, LeafNode)> {
        let mut path = AncestorPath::new();
        let mut offset = self.root;
        loop {
            match self.load(offset)? {
                Node::Leaf(leaf) => return Ok((path, offset, leaf)),
                Node::Internal(internal) => {
                    if path.len() >= MAX_DEPTH {
                        return Err(StorageError::CorruptedData(format!(
                            "descent from root {} exceeded {} levels",
                            self.root, MAX_DEPTH
                        )));
                    }
                    let slot = internal.child_index(key);
                    path.push((offset, slot));
                    offset = internal.children[slot];
                }
            }
        }
    }

    /// RID of the first entry with exactly `key`.
    pub fn search(&mut self, key: Key) -> Result<Option<Rid>> {
        let Some((_, leaf)) = self.find_leaf_for_key(key)? else {
            return Ok(None);
        };
        let pos = lower_bound(&leaf.keys, key);
        if pos < leaf.keys.len() && leaf.keys[pos] == key {
            Ok(Some(leaf.rids[pos]))
        } else {
            Ok(None)
        }
    }

    /// Offset of the leaf holding an exact match for `key`.
    pub fn locate_leaf(&mut self, key: Key) -> Result<Option<PageOffset>> {
        match self.find_leaf_for_key(key)? {
            Some((offset, leaf)) if leaf.keys.binary_search(&key).is_ok() => Ok(Some(offset)),
            _ => Ok(None),
        }
    }

    /// Every RID stored under `key` in the leaf that `search` lands on.
    /// Duplicates that a split pushed into the previous leaf are not visited.
    pub fn search_all(&mut self, key: Key) -> Result<Vec<Rid>> {
        match self.find_leaf_for_key(key)? {
            Some((_, leaf)) => Ok(leaf.matches(key)),
            None => Ok(Vec::new()),
        }
    }

    pub fn find_leftmost_leaf(&mut self) -> Result<Option<PageOffset>> {
        let mut offset = self.root;
        if offset == NULL_OFFSET {
            return Ok(None);
        }
        for _ in 0..=MAX_DEPTH {
            match self.load(offset)? {
                Node::Leaf(_) => return Ok(Some(offset)),
                Node::Internal(internal) => offset = internal.children[0],
            }
        }
        Err(StorageError::CorruptedData(format!(
            "leftmost descent exceeded {} levels",
            MAX_DEPTH
        )))
    }

    // ========== INSERT OPERATIONS ==========

    pub fn insert(&mut self, key: Key, rid: Rid) -> Result<()> {
        if self.root == NULL_OFFSET {
            let offset = self.manager.allocate()?;
            let mut leaf = LeafNode::new();
            leaf.insert(key, rid);
            self.manager.write_node(offset, &Node::Leaf(leaf))?;
            self.set_root(offset)?;
            debug!("created root leaf at {}", offset);
            return Ok(());
        }

        let (path, leaf_offset, mut leaf) = self.descend(key)?;
        if leaf.keys.len() < self.max_keys() {
            leaf.insert(key, rid);
            return self.manager.write_node(leaf_offset, &Node::Leaf(leaf));
        }

        let (promoted_key, right_offset) = self.split_leaf_node(leaf_offset, leaf, key, rid)?;
        self.insert_into_parent(path, leaf_offset, promoted_key, right_offset)
    }

    /// Splits a full leaf around the incoming entry. The left half stays at
    /// `offset`, the right half goes to a new page. Returns the separator
    /// (first key of the right leaf) and the new page offset.
    fn split_leaf_node(
        &mut self,
        offset: PageOffset,
        mut node: LeafNode,
        key: Key,
        rid: Rid,
    ) -> Result<(Key, PageOffset)> {
        node.insert(key, rid);
        let split_point = node.keys.len() / 2;

        let new_offset = self.manager.allocate()?;
        let new_node = LeafNode {
            keys: node.keys.split_off(split_point),
            rids: node.rids.split_off(split_point),
            next_leaf: node.next_leaf,
        };
        node.next_leaf = new_offset;
        let promoted_key = new_node.keys[0];

        self.manager.write_node(new_offset, &Node::Leaf(new_node))?;
        self.manager.write_node(offset, &Node::Leaf(node))?;
        debug!(
            "split leaf {} -> {} at key {}",
            offset, new_offset, promoted_key
        );
        Ok((promoted_key, new_offset))
    }

    /// Pushes a promoted separator upwards until some ancestor absorbs it or
    /// a new root is created.
    fn insert_into_parent(
        &mut self,
        mut path: AncestorPath,
        mut child: PageOffset,
        mut key: Key,
        mut right: PageOffset,
    ) -> Result<()> {
        loop {
            let Some((parent_offset, slot)) = self.parent_of(&mut path, child)? else {
                self.create_new_root(child, key, right)?;
                return Ok(());
            };
            match self.insert_internal(parent_offset, slot, child, key, right)? {
                None => return Ok(()),
                Some((promoted_key, new_right)) => {
                    child = parent_offset;
                    key = promoted_key;
                    right = new_right;
                }
            }
        }
    }

    /// Parent of `child` and the slot it occupies there; `None` for the root.
    fn parent_of(
        &mut self,
        path: &mut AncestorPath,
        child: PageOffset,
    ) -> Result<Option<(PageOffset, usize)>> {
        if child == self.root {
            return Ok(None);
        }
        let parent = match self.parent_lookup {
            ParentLookup::Path => path.pop(),
            ParentLookup::Scan => {
                let root = self.root;
                self.find_parent(root, child)?
            }
        };
        match parent {
            Some(found) => Ok(Some(found)),
            None => Err(StorageError::StructuralInconsistency(format!(
                "page {} is not the root (root is {}) but no parent references it",
                child, self.root
            ))),
        }
    }

    /// Inserts `key` and the new right sibling `right` next to `child`, which
    /// sits at `slot` in the parent. Returns the pair to promote further up
    /// when the parent itself had to split.
    fn insert_internal(
        &mut self,
        parent_offset: PageOffset,
        slot: usize,
        child: PageOffset,
        key: Key,
        right: PageOffset,
    ) -> Result<Option<(Key, PageOffset)>> {
        if parent_offset == NULL_OFFSET {
            return Err(StorageError::StructuralInconsistency(format!(
                "promotion of key {} for page {} reached the null parent",
                key, child
            )));
        }
        let mut parent = match self.load(parent_offset)? {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => {
                return Err(StorageError::StructuralInconsistency(format!(
                    "parent page {} of {} is a leaf",
                    parent_offset, child
                )));
            }
        };
        if parent.children.get(slot) != Some(&child) {
            return Err(StorageError::StructuralInconsistency(format!(
                "page {} does not reference child {} at slot {}",
                parent_offset, child, slot
            )));
        }

        if parent.keys.len() < self.max_keys() {
            parent.insert_at(slot, key, right);
            self.manager
                .write_node(parent_offset, &Node::Internal(parent))?;
            return Ok(None);
        }

        self.split_internal_node(parent_offset, parent, slot, key, right)
            .map(Some)
    }

    /// Splits a full internal node around the incoming separator. The middle
    /// key moves up and is kept in neither half.
    fn split_internal_node(
        &mut self,
        offset: PageOffset,
        mut node: InternalNode,
        slot: usize,
        key: Key,
        right: PageOffset,
    ) -> Result<(Key, PageOffset)> {
        node.insert_at(slot, key, right);
        let mid_point = node.keys.len() / 2;

        let new_offset = self.manager.allocate()?;
        let new_node = InternalNode {
            keys: node.keys.split_off(mid_point + 1),
            children: node.children.split_off(mid_point + 1),
        };
        let promoted_key = node.keys.pop().ok_or_else(|| {
            StorageError::InvalidData(format!("internal page {} split with no keys", offset))
        })?;

        self.manager
            .write_node(new_offset, &Node::Internal(new_node))?;
        self.manager.write_node(offset, &Node::Internal(node))?;
        debug!(
            "split internal node {} -> {}, promoting {}",
            offset, new_offset, promoted_key
        );
        Ok((promoted_key, new_offset))
    }

    fn create_new_root(
        &mut self,
        left_child: PageOffset,
        key: Key,
        right_child: PageOffset,
    ) -> Result<PageOffset> {
        let new_root = self.manager.allocate()?;
        let node = InternalNode::new_root(left_child, key, right_child);
        self.manager.write_node(new_root, &Node::Internal(node))?;
        self.set_root(new_root)?;
        debug!(
            "new root {} over {} | {} | {}",
            new_root, left_child, key, right_child
        );
        Ok(new_root)
    }

    /// Depth-first search from `subroot` for the internal node whose child
    /// list contains `child`. Visits every node in the worst case.
    pub fn find_parent(
        &mut self,
        subroot: PageOffset,
        child: PageOffset,
    ) -> Result<Option<(PageOffset, usize)>> {
        self.find_parent_at(subroot, child, 0)
    }

    fn find_parent_at(
        &mut self,
        subroot: PageOffset,
        child: PageOffset,
        depth: usize,
    ) -> Result<Option<(PageOffset, usize)>> {
        if subroot == NULL_OFFSET || subroot == child {
            return Ok(None);
        }
        if depth > MAX_DEPTH {
            return Err(StorageError::CorruptedData(format!(
                "parent search below {} exceeded {} levels",
                subroot, MAX_DEPTH
            )));
        }
        let Node::Internal(internal) = self.load(subroot)? else {
            return Ok(None);
        };
        if let Some(slot) = internal.children.iter().position(|&c| c == child) {
            return Ok(Some((subroot, slot)));
        }
        for &next in &internal.children {
            if let Some(found) = self.find_parent_at(next, child, depth + 1)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn open_tree(temp_file: &NamedTempFile, order: u32) -> BPlusTree {
        BPlusTree::open(temp_file.path(), &IndexConfig::with_order(order)).unwrap()
    }

    fn leaf_at(tree: &mut BPlusTree, offset: PageOffset) -> LeafNode {
        match tree.load(offset).unwrap() {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => panic!("page {} is not a leaf", offset),
        }
    }

    fn internal_at(tree: &mut BPlusTree, offset: PageOffset) -> InternalNode {
        match tree.load(offset).unwrap() {
            Node::Internal(internal) => internal,
            Node::Leaf(_) => panic!("page {} is not an internal node", offset),
        }
    }

    #[test]
    fn test_first_insert_creates_root_leaf() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut tree = open_tree(&temp_file, 2);
        assert_eq!(tree.root_offset(), 0);

        tree.insert(42, 4200).unwrap();
        assert_eq!(tree.root_offset(), 32);
        let root = leaf_at(&mut tree, 32);
        assert_eq!(root.keys, vec![42]);
        assert_eq!(root.rids, vec![4200]);
        assert_eq!(root.next_leaf, 0);
    }

    #[test]
    fn test_leaf_split_links_chain_and_promotes_first_right_key() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut tree = open_tree(&temp_file, 2);
        for key in 1..=5 {
            tree.insert(key, key as i64 * 100).unwrap();
        }

        let root_offset = tree.root_offset();
        let root = internal_at(&mut tree, root_offset);
        assert_eq!(root.keys, vec![3]);
        let left = leaf_at(&mut tree, root.children[0]);
        let right = leaf_at(&mut tree, root.children[1]);
        assert_eq!(left.keys, vec![1, 2]);
        assert_eq!(right.keys, vec![3, 4, 5]);
        assert_eq!(right.rids, vec![300, 400, 500]);
        assert_eq!(left.next_leaf, root.children[1]);
        assert_eq!(right.next_leaf, 0);
        // the split leaf keeps its offset as the left half
        assert_eq!(root.children[0], 32);
    }

    #[test]
    fn test_split_in_middle_of_chain_preserves_link() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut tree = open_tree(&temp_file, 1);
        // order 1: two keys per node
        for key in [10, 20, 30] {
            tree.insert(key, key as i64).unwrap();
        }
        // leaves: [10] -> [20, 30]; now split the left one
        tree.insert(5, 5).unwrap();
        tree.insert(7, 7).unwrap();

        let first = tree.find_leftmost_leaf().unwrap().unwrap();
        let mut keys = Vec::new();
        let mut offset = first;
        while offset != 0 {
            let leaf = leaf_at(&mut tree, offset);
            keys.extend(leaf.keys.iter().copied());
            offset = leaf.next_leaf;
        }
        assert_eq!(keys, vec![5, 7, 10, 20, 30]);
    }

    #[test]
    fn test_internal_split_promotes_middle_key_once() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut tree = open_tree(&temp_file, 1);
        // order 1: the fifth key splits the root's only internal node
        for key in 1..=5 {
            tree.insert(key, key as i64).unwrap();
        }
        let root_offset = tree.root_offset();
        let root = internal_at(&mut tree, root_offset);
        assert_eq!(root.keys, vec![3]);
        assert_eq!(root.keys.len(), 1);
        let left = internal_at(&mut tree, root.children[0]);
        let right = internal_at(&mut tree, root.children[1]);
        assert!(!left.keys.contains(&root.keys[0]));
        assert!(!right.keys.contains(&root.keys[0]));
        assert!(left.keys.iter().all(|&k| k < root.keys[0]));
        assert!(right.keys.iter().all(|&k| k > root.keys[0]));

        for key in 6..=30 {
            tree.insert(key, key as i64).unwrap();
        }
        for key in 1..=30 {
            assert_eq!(tree.search(key).unwrap(), Some(key as i64));
        }
    }

    #[test]
    fn test_find_parent_walks_whole_tree() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut tree = open_tree(&temp_file, 1);
        for key in 1..=20 {
            tree.insert(key, key as i64).unwrap();
        }
        let root = tree.root_offset();
        assert_eq!(tree.find_parent(root, root).unwrap(), None);

        let leaf = tree.locate_leaf(20).unwrap().unwrap();
        let (parent, slot) = tree.find_parent(root, leaf).unwrap().unwrap();
        assert_eq!(internal_at(&mut tree, parent).children[slot], leaf);

        // an offset no node references
        assert_eq!(tree.find_parent(root, 999_999).unwrap(), None);
    }

    #[test]
    fn test_orphaned_node_is_reported() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut tree = open_tree(&temp_file, 1);
        for key in 1..=3 {
            tree.insert(key, key as i64).unwrap();
        }
        let orphan = tree.manager.allocate().unwrap();
        tree.manager
            .write_node(orphan, &Node::Leaf(LeafNode::new()))
            .unwrap();

        let mut path = AncestorPath::new();
        tree.parent_lookup = ParentLookup::Scan;
        assert!(matches!(
            tree.parent_of(&mut path, orphan),
            Err(StorageError::StructuralInconsistency(_))
        ));
        tree.parent_lookup = ParentLookup::Path;
        assert!(matches!(
            tree.parent_of(&mut path, orphan),
            Err(StorageError::StructuralInconsistency(_))
        ));
        assert!(matches!(
            tree.insert_internal(NULL_OFFSET, 0, orphan, 9, orphan),
            Err(StorageError::StructuralInconsistency(_))
        ));
    }

    #[test]
    fn test_search_reads_one_page_per_level() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut tree = open_tree(&temp_file, 2);
        assert_eq!(tree.search(1).unwrap(), None);
        assert_eq!(tree.manager().pages_read(), 0);

        for key in 0..200 {
            tree.insert(key, key as i64).unwrap();
        }
        let mut depth = 1;
        let mut offset = tree.root_offset();
        while let Node::Internal(internal) = tree.load(offset).unwrap() {
            depth += 1;
            offset = internal.children[0];
        }

        tree.manager_mut().reset_stats();
        assert_eq!(tree.search(123).unwrap(), Some(123));
        assert_eq!(tree.manager().pages_read(), depth);
        tree.manager_mut().reset_stats();
        assert_eq!(tree.search(-5).unwrap(), None);
        assert_eq!(tree.manager().pages_read(), depth);
    }
}
