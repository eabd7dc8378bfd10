pub use shared_types::StorageError;

/// Index key. Primary indexes store raw record ids, secondary indexes a title hash.
pub type Key = i32;
/// Opaque record locator handed back to the heap store.
pub type Rid = i64;
/// Byte offset of a node page inside the index file; `0` means "no page".
pub type PageOffset = u64;

pub type Result<T> = std::result::Result<T, StorageError>;
