use std::{
    fs::{File, OpenOptions},
    io::{Cursor, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{error, info, trace, warn};
use shared_types::{FILE_HEADER_SIZE, IndexConfig, MAGIC_NUMBER, MAX_PAGE_SIZE, NULL_OFFSET};

use crate::{
    common::{PageOffset, Result, StorageError},
    node::{Node, max_order_for, node_size},
};

/// Index file header, stored at offset 0.
/// Layout: [root(8)] [next_free(8)] [order(4)] [page_size(4)] [magic(4)] [pad(4)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub root_offset: PageOffset,
    pub next_free_offset: PageOffset,
    pub order: u32,
    pub page_size: u32,
}

impl FileHeader {
    fn new(order: u32, page_size: u32) -> Self {
        Self {
            root_offset: NULL_OFFSET,
            next_free_offset: FILE_HEADER_SIZE as u64,
            order,
            page_size,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(FILE_HEADER_SIZE);
        bytes.write_u64::<LittleEndian>(self.root_offset)?;
        bytes.write_u64::<LittleEndian>(self.next_free_offset)?;
        bytes.write_u32::<LittleEndian>(self.order)?;
        bytes.write_u32::<LittleEndian>(self.page_size)?;
        bytes.write_u32::<LittleEndian>(MAGIC_NUMBER)?;
        bytes.resize(FILE_HEADER_SIZE, 0);
        Ok(bytes)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);
        let root_offset = cursor.read_u64::<LittleEndian>()?;
        let next_free_offset = cursor.read_u64::<LittleEndian>()?;
        let order = cursor.read_u32::<LittleEndian>()?;
        let page_size = cursor.read_u32::<LittleEndian>()?;
        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != MAGIC_NUMBER {
            return Err(StorageError::CorruptedData(format!(
                "invalid index magic number {:#x}",
                magic
            )));
        }
        if page_size > MAX_PAGE_SIZE {
            return Err(StorageError::CorruptedData(format!(
                "page size {} exceeds the {} byte limit",
                page_size, MAX_PAGE_SIZE
            )));
        }
        if next_free_offset < FILE_HEADER_SIZE as u64 {
            return Err(StorageError::CorruptedData(format!(
                "next free offset {} lies inside the header",
                next_free_offset
            )));
        }
        Ok(Self {
            root_offset,
            next_free_offset,
            order,
            page_size,
        })
    }
}

fn check_geometry(order: u32, page_size: u32) -> Result<()> {
    if page_size > MAX_PAGE_SIZE {
        return Err(StorageError::InvalidInput(format!(
            "page size {} exceeds the {} byte limit",
            page_size, MAX_PAGE_SIZE
        )));
    }
    if order == 0 {
        return Err(StorageError::InvalidInput(
            "tree order must be at least 1".into(),
        ));
    }
    if order > max_order_for(page_size) {
        return Err(StorageError::InvalidInput(format!(
            "a node of order {} needs {} bytes but pages are {} bytes",
            order,
            node_size(order),
            page_size
        )));
    }
    Ok(())
}

fn read_header(file: &mut File) -> Result<FileHeader> {
    let mut bytes = [0u8; FILE_HEADER_SIZE];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut bytes)?;
    FileHeader::from_bytes(&bytes)
}

/// Page store for a single index file: owns the header, hands out page
/// offsets from a bump allocator and moves whole node pages to and from disk.
pub struct PageManager {
    file: File,
    path: PathBuf,
    header: FileHeader,
    sync_writes: bool,
    pages_read: u64,
    pages_written: u64,
}

impl PageManager {
    /// Opens `path`, creating and initialising it when missing or empty.
    pub fn open<P: AsRef<Path>>(path: P, config: &IndexConfig) -> Result<Self> {
        check_geometry(config.order, config.page_size)?;

        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        let file_size = file.metadata()?.len();

        if file_size == 0 {
            let mut manager = Self::with_header(
                file,
                path,
                FileHeader::new(config.order, config.page_size),
                config,
            );
            manager.write_header()?;
            info!(
                "created index file {} (order {}, page size {})",
                manager.path.display(),
                config.order,
                config.page_size
            );
            return Ok(manager);
        }

        if file_size < FILE_HEADER_SIZE as u64 {
            return Err(StorageError::CorruptedData(format!(
                "{} is {} bytes, too short for an index header",
                path.display(),
                file_size
            )));
        }

        let header = read_header(&mut file)?;
        check_geometry(header.order, header.page_size)?;
        if header.order != config.order || header.page_size != config.page_size {
            warn!(
                "{} was created with order {} and page size {}; ignoring requested order {} and page size {}",
                path.display(),
                header.order,
                header.page_size,
                config.order,
                config.page_size
            );
        }
        info!(
            "reopened index file {} (root {}, next free {})",
            path.display(),
            header.root_offset,
            header.next_free_offset
        );
        Ok(Self::with_header(file, path, header, config))
    }

    fn with_header(file: File, path: PathBuf, header: FileHeader, config: &IndexConfig) -> Self {
        Self {
            file,
            path,
            header,
            sync_writes: config.sync_writes,
            pages_read: 0,
            pages_written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> FileHeader {
        self.header
    }

    pub fn order(&self) -> u32 {
        self.header.order
    }

    pub fn page_size(&self) -> usize {
        self.header.page_size as usize
    }

    pub fn root_offset(&self) -> PageOffset {
        self.header.root_offset
    }

    pub fn next_free_offset(&self) -> PageOffset {
        self.header.next_free_offset
    }

    fn write_header(&mut self) -> Result<()> {
        let bytes = self.header.to_bytes()?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&bytes)?;
        self.file.flush()?;
        if self.sync_writes {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Reserves the next page. Offsets are never reused.
    pub fn allocate(&mut self) -> Result<PageOffset> {
        let offset = self.header.next_free_offset;
        self.header.next_free_offset += self.header.page_size as u64;
        self.write_header()?;
        trace!("allocated page at {}", offset);
        Ok(offset)
    }

    fn check_offset(&self, offset: PageOffset) -> Result<()> {
        let header_end = FILE_HEADER_SIZE as u64;
        if offset < header_end
            || offset >= self.header.next_free_offset
            || (offset - header_end) % self.header.page_size as u64 != 0
        {
            return Err(StorageError::CorruptedData(format!(
                "page offset {} is not an allocated page (next free {})",
                offset, self.header.next_free_offset
            )));
        }
        Ok(())
    }

    /// Reads the node stored at `offset`. The null offset yields `None`.
    pub fn read_node(&mut self, offset: PageOffset) -> Result<Option<Node>> {
        if offset == NULL_OFFSET {
            return Ok(None);
        }
        self.check_offset(offset)?;

        let mut page = vec![0u8; self.page_size()];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut page)?;
        self.pages_read += 1;
        trace!("read page {}", offset);

        Node::from_bytes(&page, self.header.order).map(Some)
    }

    /// Overwrites the whole page at `offset` and flushes before returning.
    pub fn write_node(&mut self, offset: PageOffset, node: &Node) -> Result<()> {
        self.check_offset(offset)?;
        let page = node.to_bytes(self.header.order, self.page_size())?;

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&page)?;
        self.file.flush()?;
        if self.sync_writes {
            self.file.sync_data()?;
        }
        self.pages_written += 1;
        trace!("wrote page {}", offset);
        Ok(())
    }

    pub fn update_root(&mut self, offset: PageOffset) -> Result<()> {
        self.header.root_offset = offset;
        self.write_header()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.write_header()?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn pages_read(&self) -> u64 {
        self.pages_read
    }

    pub fn pages_written(&self) -> u64 {
        self.pages_written
    }

    pub fn reset_stats(&mut self) {
        self.pages_read = 0;
        self.pages_written = 0;
    }
}

impl Drop for PageManager {
    fn drop(&mut self) {
        if let Err(err) = self.write_header() {
            error!(
                "failed to persist header of {}: {}",
                self.path.display(),
                err
            );
        }
    }
}
