pub mod common;
pub mod index;
pub mod keys;
pub mod manager;
pub mod node;
pub mod scan;
pub mod tree;
pub mod verify;

pub use common::{Key, PageOffset, Rid};
pub use index::Index;
pub use verify::TreeStats;
