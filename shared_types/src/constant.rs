// Constants used across modules
pub const PAGE_SIZE: usize = 4096; // allocation unit, one node per page
pub const MAX_PAGE_SIZE: u32 = 1 << 20;
pub const FILE_HEADER_SIZE: usize = 32; // root(8) + next_free(8) + order(4) + page_size(4) + magic(4) + pad(4)
pub const MAGIC_NUMBER: u32 = 0xB7EE_1DC5; // index file identifier
pub const DEFAULT_ORDER: u32 = 100;
pub const NULL_OFFSET: u64 = 0;
