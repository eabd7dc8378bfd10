use std::{io::Cursor, mem::size_of};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::common::{Key, PageOffset, Result, Rid, StorageError};

/// Node page layout, little-endian:
/// [tag(1)] [pad(3)] [num_keys(4)] [next_leaf(8)] [keys: 2m * i32] [slots: (2m + 1) * i64]
///
/// Slots hold child offsets in internal nodes and RIDs in leaves. Unused
/// key/slot positions are zero.
pub const NODE_HEADER_SIZE: usize = 16;

const LEAF_TAG: u8 = 1;
const INTERNAL_TAG: u8 = 2;

/// Encoded size of a node for the given order, excluding page padding.
pub fn node_size(order: u32) -> usize {
    let max_keys = 2 * order as usize;
    NODE_HEADER_SIZE + max_keys * size_of::<Key>() + (max_keys + 1) * size_of::<u64>()
}

/// Largest order whose nodes still fit in `page_size` bytes.
pub fn max_order_for(page_size: u32) -> u32 {
    let page_size = page_size as usize;
    if page_size < node_size(1) {
        return 0;
    }
    // node_size(m) = 24m + 24
    ((page_size - NODE_HEADER_SIZE - size_of::<u64>()) / (2 * size_of::<Key>() + 2 * size_of::<u64>()))
        as u32
}

/// First index whose key is strictly greater than `key`.
pub fn upper_bound(keys: &[Key], key: Key) -> usize {
    keys.partition_point(|&k| k <= key)
}

/// First index whose key is greater than or equal to `key`.
pub fn lower_bound(keys: &[Key], key: Key) -> usize {
    keys.partition_point(|&k| k < key)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafNode {
    pub keys: Vec<Key>,
    pub rids: Vec<Rid>,
    pub next_leaf: PageOffset,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InternalNode {
    pub keys: Vec<Key>,
    /// Always `keys.len() + 1` entries.
    pub children: Vec<PageOffset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl LeafNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts after any existing entries with an equal key.
    pub fn insert(&mut self, key: Key, rid: Rid) {
        let pos = upper_bound(&self.keys, key);
        self.keys.insert(pos, key);
        self.rids.insert(pos, rid);
    }

    /// All RIDs stored under `key` in this leaf, in insertion order.
    pub fn matches(&self, key: Key) -> Vec<Rid> {
        let start = lower_bound(&self.keys, key);
        self.keys[start..]
            .iter()
            .zip(&self.rids[start..])
            .take_while(|(k, _)| **k == key)
            .map(|(_, rid)| *rid)
            .collect()
    }
}

impl InternalNode {
    pub fn new_root(left: PageOffset, key: Key, right: PageOffset) -> Self {
        Self {
            keys: vec![key],
            children: vec![left, right],
        }
    }

    /// Index of the child whose subtree can contain `key`.
    pub fn child_index(&self, key: Key) -> usize {
        upper_bound(&self.keys, key)
    }

    /// Places `key` at `slot` and `child` right after the child at `slot`.
    pub fn insert_at(&mut self, slot: usize, key: Key, child: PageOffset) {
        self.keys.insert(slot, key);
        self.children.insert(slot + 1, child);
    }
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn keys(&self) -> &[Key] {
        match self {
            Node::Leaf(leaf) => &leaf.keys,
            Node::Internal(internal) => &internal.keys,
        }
    }

    pub fn num_keys(&self) -> usize {
        self.keys().len()
    }

    pub fn to_bytes(&self, order: u32, page_size: usize) -> Result<Vec<u8>> {
        let max_keys = 2 * order as usize;
        let num_keys = self.num_keys();
        if num_keys > max_keys {
            return Err(StorageError::InvalidData(format!(
                "node holds {} keys, capacity is {}",
                num_keys, max_keys
            )));
        }

        let (tag, next_leaf, slots): (u8, PageOffset, Vec<i64>) = match self {
            Node::Leaf(leaf) => {
                if leaf.rids.len() != num_keys {
                    return Err(StorageError::InvalidData(format!(
                        "leaf has {} keys but {} rids",
                        num_keys,
                        leaf.rids.len()
                    )));
                }
                (LEAF_TAG, leaf.next_leaf, leaf.rids.clone())
            }
            Node::Internal(internal) => {
                if internal.children.len() != num_keys + 1 {
                    return Err(StorageError::InvalidData(format!(
                        "internal node has {} keys but {} children",
                        num_keys,
                        internal.children.len()
                    )));
                }
                let slots = internal.children.iter().map(|&c| c as i64).collect();
                (INTERNAL_TAG, 0, slots)
            }
        };

        let mut bytes = Vec::with_capacity(page_size);
        bytes.write_u8(tag)?;
        bytes.extend_from_slice(&[0u8; 3]);
        bytes.write_u32::<LittleEndian>(num_keys as u32)?;
        bytes.write_u64::<LittleEndian>(next_leaf)?;
        for i in 0..max_keys {
            bytes.write_i32::<LittleEndian>(self.keys().get(i).copied().unwrap_or(0))?;
        }
        for i in 0..=max_keys {
            bytes.write_i64::<LittleEndian>(slots.get(i).copied().unwrap_or(0))?;
        }

        if bytes.len() > page_size {
            return Err(StorageError::InvalidInput(format!(
                "node of order {} needs {} bytes, page is {}",
                order,
                bytes.len(),
                page_size
            )));
        }
        bytes.resize(page_size, 0);
        Ok(bytes)
    }

    pub fn from_bytes(data: &[u8], order: u32) -> Result<Self> {
        let max_keys = 2 * order as usize;
        if data.len() < node_size(order) {
            return Err(StorageError::CorruptedData(format!(
                "node buffer is {} bytes, expected at least {}",
                data.len(),
                node_size(order)
            )));
        }

        let mut cursor = Cursor::new(data);
        let tag = cursor.read_u8()?;
        cursor.set_position(4);
        let num_keys = cursor.read_u32::<LittleEndian>()? as usize;
        let next_leaf = cursor.read_u64::<LittleEndian>()?;
        if num_keys > max_keys {
            return Err(StorageError::CorruptedData(format!(
                "node claims {} keys, capacity is {}",
                num_keys, max_keys
            )));
        }

        let mut keys = Vec::with_capacity(num_keys);
        for _ in 0..num_keys {
            keys.push(cursor.read_i32::<LittleEndian>()?);
        }
        cursor.set_position((NODE_HEADER_SIZE + max_keys * size_of::<Key>()) as u64);

        match tag {
            LEAF_TAG => {
                let mut rids = Vec::with_capacity(num_keys);
                for _ in 0..num_keys {
                    rids.push(cursor.read_i64::<LittleEndian>()?);
                }
                Ok(Node::Leaf(LeafNode {
                    keys,
                    rids,
                    next_leaf,
                }))
            }
            INTERNAL_TAG => {
                let mut children = Vec::with_capacity(num_keys + 1);
                for _ in 0..=num_keys {
                    children.push(cursor.read_u64::<LittleEndian>()?);
                }
                Ok(Node::Internal(InternalNode { keys, children }))
            }
            other => Err(StorageError::CorruptedData(format!(
                "unknown node tag {:#x}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_size_and_max_order() {
        assert_eq!(node_size(1), 48);
        assert_eq!(node_size(2), 72);
        assert_eq!(node_size(100), 2424);
        assert_eq!(max_order_for(4096), 169);
        assert!(node_size(max_order_for(4096)) <= 4096);
        assert!(node_size(max_order_for(4096) + 1) > 4096);
        assert_eq!(max_order_for(16), 0);
    }

    #[test]
    fn test_leaf_layout() {
        let leaf = Node::Leaf(LeafNode {
            keys: vec![7, 9],
            rids: vec![-1, 4096],
            next_leaf: 0x1020,
        });
        let bytes = leaf.to_bytes(2, 128).unwrap();
        assert_eq!(bytes.len(), 128);
        assert_eq!(bytes[0], LEAF_TAG);
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
        assert_eq!(&bytes[8..16], &0x1020u64.to_le_bytes());
        assert_eq!(&bytes[16..20], &7i32.to_le_bytes());
        assert_eq!(&bytes[20..24], &9i32.to_le_bytes());
        // slots start after the 4 key positions
        assert_eq!(&bytes[32..40], &(-1i64).to_le_bytes());
        assert!(bytes[node_size(2)..].iter().all(|&b| b == 0));

        assert_eq!(Node::from_bytes(&bytes, 2).unwrap(), leaf);
    }

    #[test]
    fn test_internal_node_decodes_children() {
        let internal = Node::Internal(InternalNode {
            keys: vec![10, 20, 30],
            children: vec![32, 4128, 8224, 12320],
        });
        let bytes = internal.to_bytes(2, 4096).unwrap();
        match Node::from_bytes(&bytes, 2).unwrap() {
            Node::Internal(decoded) => {
                assert_eq!(decoded.keys, vec![10, 20, 30]);
                assert_eq!(decoded.children, vec![32, 4128, 8224, 12320]);
            }
            Node::Leaf(_) => panic!("decoded an internal node as a leaf"),
        }
    }

    #[test]
    fn test_rejects_overfull_and_malformed_nodes() {
        let overfull = Node::Leaf(LeafNode {
            keys: vec![1, 2, 3, 4, 5],
            rids: vec![1, 2, 3, 4, 5],
            next_leaf: 0,
        });
        assert!(matches!(
            overfull.to_bytes(2, 4096),
            Err(StorageError::InvalidData(_))
        ));

        let missing_child = Node::Internal(InternalNode {
            keys: vec![1],
            children: vec![32],
        });
        assert!(missing_child.to_bytes(2, 4096).is_err());

        let too_big = Node::Leaf(LeafNode::new());
        assert!(matches!(
            too_big.to_bytes(200, 4096),
            Err(StorageError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_zeroed_page_is_corrupt() {
        let page = vec![0u8; 4096];
        assert!(matches!(
            Node::from_bytes(&page, 2),
            Err(StorageError::CorruptedData(_))
        ));

        let mut bad_count = Node::Leaf(LeafNode::new()).to_bytes(2, 4096).unwrap();
        bad_count[4..8].copy_from_slice(&9u32.to_le_bytes());
        assert!(matches!(
            Node::from_bytes(&bad_count, 2),
            Err(StorageError::CorruptedData(_))
        ));
    }

    #[test]
    fn test_leaf_insert_keeps_duplicates_in_arrival_order() {
        let mut leaf = LeafNode::new();
        leaf.insert(5, 50);
        leaf.insert(1, 10);
        leaf.insert(5, 51);
        leaf.insert(3, 30);
        leaf.insert(5, 52);
        assert_eq!(leaf.keys, vec![1, 3, 5, 5, 5]);
        assert_eq!(leaf.matches(5), vec![50, 51, 52]);
        assert_eq!(leaf.matches(3), vec![30]);
        assert!(leaf.matches(4).is_empty());
    }

    #[test]
    fn test_bounds_and_child_selection() {
        let keys = [10, 20, 20, 30];
        assert_eq!(lower_bound(&keys, 20), 1);
        assert_eq!(upper_bound(&keys, 20), 3);
        assert_eq!(upper_bound(&keys, 5), 0);
        assert_eq!(upper_bound(&keys, 35), 4);

        let internal = InternalNode {
            keys: vec![10, 20],
            children: vec![1, 2, 3],
        };
        assert_eq!(internal.child_index(9), 0);
        assert_eq!(internal.child_index(10), 1);
        assert_eq!(internal.child_index(19), 1);
        assert_eq!(internal.child_index(20), 2);
    }
}
