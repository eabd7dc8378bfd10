use shared_types::NULL_OFFSET;

use crate::{
    common::{Key, PageOffset, Result, Rid, StorageError},
    node::{LeafNode, Node, lower_bound},
    tree::{BPlusTree, MAX_DEPTH},
};

/// Sequential access through the leaf chain.
impl BPlusTree {
    fn load_leaf(&mut self, offset: PageOffset) -> Result<LeafNode> {
        match self.load(offset)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(StorageError::StructuralInconsistency(format!(
                "leaf chain points at internal page {}",
                offset
            ))),
        }
    }

    /// Leftmost leaf that can hold a key `>= key`. Descends by lower bound so
    /// that duplicate runs split across two leaves are entered at their start.
    fn seek_leaf(&mut self, key: Key) -> Result<Option<PageOffset>> {
        let mut offset = self.root_offset();
        if offset == NULL_OFFSET {
            return Ok(None);
        }
        for _ in 0..=MAX_DEPTH {
            match self.load(offset)? {
                Node::Leaf(_) => return Ok(Some(offset)),
                Node::Internal(internal) => {
                    offset = internal.children[lower_bound(&internal.keys, key)];
                }
            }
        }
        Err(StorageError::CorruptedData(format!(
            "seek for key {} exceeded {} levels",
            key, MAX_DEPTH
        )))
    }

    /// All entries with `low <= key <= high`, in key order.
    pub fn range(&mut self, low: Key, high: Key) -> Result<Vec<(Key, Rid)>> {
        let mut results = Vec::new();
        if low > high {
            return Ok(results);
        }
        let Some(mut offset) = self.seek_leaf(low)? else {
            return Ok(results);
        };

        while offset != NULL_OFFSET {
            let leaf = self.load_leaf(offset)?;
            let start = lower_bound(&leaf.keys, low);
            for (&key, &rid) in leaf.keys[start..].iter().zip(&leaf.rids[start..]) {
                if key > high {
                    return Ok(results);
                }
                results.push((key, rid));
            }
            offset = leaf.next_leaf;
        }
        Ok(results)
    }

    /// Every entry in the tree, in key order.
    pub fn entries(&mut self) -> Result<Vec<(Key, Rid)>> {
        let mut results = Vec::new();
        for offset in self.leaf_chain()? {
            let leaf = self.load_leaf(offset)?;
            results.extend(leaf.keys.into_iter().zip(leaf.rids));
        }
        Ok(results)
    }

    /// Leaf offsets in chain order, starting at the leftmost leaf.
    pub fn leaf_chain(&mut self) -> Result<Vec<PageOffset>> {
        let mut chain = Vec::new();
        let Some(mut offset) = self.find_leftmost_leaf()? else {
            return Ok(chain);
        };
        // a well-formed chain cannot be longer than the number of allocated pages
        let page_count = self.manager().next_free_offset() / self.manager().page_size() as u64;
        while offset != NULL_OFFSET {
            if chain.len() as u64 > page_count {
                return Err(StorageError::StructuralInconsistency(format!(
                    "leaf chain does not terminate after {} pages",
                    chain.len()
                )));
            }
            chain.push(offset);
            offset = self.load_leaf(offset)?.next_leaf;
        }
        Ok(chain)
    }
}
