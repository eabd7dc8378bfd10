use std::collections::HashSet;

use shared_types::NULL_OFFSET;

use crate::{
    common::{Key, PageOffset, Result, StorageError},
    node::Node,
    tree::{BPlusTree, MAX_DEPTH},
};

/// Shape of a tree that passed `verify`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub height: usize,
    pub internal_nodes: usize,
    pub leaves: usize,
    pub entries: usize,
}

#[derive(Default)]
struct Walk {
    stats: TreeStats,
    leaves: Vec<PageOffset>,
    leaf_depth: Option<usize>,
    seen: HashSet<PageOffset>,
    last_key: Option<Key>,
}

fn inconsistent(msg: String) -> StorageError {
    StorageError::StructuralInconsistency(msg)
}

impl BPlusTree {
    /// Walks every reachable node and checks key order, separator bounds,
    /// uniform leaf depth, and that the leaf chain matches the tree's leaves.
    ///
    /// Separator upper bounds are inclusive: a run of duplicate keys may be
    /// split so that the left leaf still holds the separator value.
    ///
    /// Node capacity is enforced when a page is decoded: a page claiming more
    /// than `2 * order` keys fails with `CorruptedData` before any structural
    /// check runs.
    pub fn verify(&mut self) -> Result<TreeStats> {
        let root = self.root_offset();
        if root == NULL_OFFSET {
            return Ok(TreeStats::default());
        }

        let mut walk = Walk::default();
        self.check_subtree(root, None, None, 1, &mut walk)?;

        let chain = self.leaf_chain()?;
        if chain != walk.leaves {
            return Err(inconsistent(format!(
                "leaf chain visits {} leaves, tree holds {}",
                chain.len(),
                walk.leaves.len()
            )));
        }

        let mut stats = walk.stats;
        stats.height = walk.leaf_depth.unwrap_or(0);
        Ok(stats)
    }

    fn check_subtree(
        &mut self,
        offset: PageOffset,
        low: Option<Key>,
        high: Option<Key>,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(inconsistent(format!("page {} is too deep", offset)));
        }
        if !walk.seen.insert(offset) {
            return Err(inconsistent(format!("page {} is referenced twice", offset)));
        }

        let node = self.load(offset)?;
        let keys = node.keys();
        if keys.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(inconsistent(format!("keys of page {} are not sorted", offset)));
        }
        for &key in keys {
            if low.is_some_and(|low| key < low) || high.is_some_and(|high| key > high) {
                return Err(inconsistent(format!(
                    "key {} in page {} lies outside [{:?}, {:?}]",
                    key, offset, low, high
                )));
            }
        }

        match node {
            Node::Leaf(leaf) => {
                if leaf.keys.is_empty() && depth > 1 {
                    return Err(inconsistent(format!("non-root leaf {} is empty", offset)));
                }
                match walk.leaf_depth {
                    None => walk.leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        return Err(inconsistent(format!(
                            "leaf {} at depth {}, expected {}",
                            offset, depth, expected
                        )));
                    }
                    Some(_) => {}
                }
                if let (Some(last), Some(&first)) = (walk.last_key, leaf.keys.first()) {
                    if first < last {
                        return Err(inconsistent(format!(
                            "leaf {} starts at {} after a leaf ending at {}",
                            offset, first, last
                        )));
                    }
                }
                if let Some(&last) = leaf.keys.last() {
                    walk.last_key = Some(last);
                }
                walk.stats.leaves += 1;
                walk.stats.entries += leaf.keys.len();
                walk.leaves.push(offset);
            }
            Node::Internal(internal) => {
                if internal.keys.is_empty() {
                    return Err(inconsistent(format!(
                        "internal page {} has no separator",
                        offset
                    )));
                }
                walk.stats.internal_nodes += 1;
                let last = internal.keys.len();
                for (i, &child) in internal.children.iter().enumerate() {
                    let child_low = if i == 0 { low } else { Some(internal.keys[i - 1]) };
                    let child_high = if i == last { high } else { Some(internal.keys[i]) };
                    self.check_subtree(child, child_low, child_high, depth + 1, walk)?;
                }
            }
        }
        Ok(())
    }
}
