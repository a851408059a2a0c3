use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{PageId, PAGE_SIZE};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),
    #[error("Page {0} is beyond the end of the database file")]
    PageOutOfBounds(PageId),
}

/// The narrow interface the buffer pool consumes. The file layout behind it
/// is the disk manager's own business.
pub trait DiskManager: Send + Sync {
    /// Fill `buf` with the on-disk contents of `page_id`. When
    /// `treat_missing_as_error` is false, a read past the end of the file
    /// zeroes the buffer and succeeds.
    fn read_page(
        &self,
        page_id: PageId,
        buf: &mut [u8],
        treat_missing_as_error: bool,
    ) -> Result<(), DiskManagerError>;

    /// Persist `buf` at the location of `page_id`.
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), DiskManagerError>;

    /// Hand out a fresh page id.
    fn allocate_page(&self) -> Result<PageId, DiskManagerError>;

    /// Return `page_id` to the allocator for later reuse.
    fn deallocate_page(&self, page_id: PageId) -> Result<(), DiskManagerError>;
}

struct DiskFile {
    db_file: File,
    free_pages: Vec<PageId>,
}

/// FileDiskManager stores pages in a single database file, page `n` at
/// offset `(n - 1) * PAGE_SIZE`. The first allocated page id is 1.
pub struct FileDiskManager {
    inner: Mutex<DiskFile>,
}

impl FileDiskManager {
    /// Create a new FileDiskManager over the specified database file
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;

        Ok(Self {
            inner: Mutex::new(DiskFile {
                db_file: file,
                free_pages: Vec::new(),
            }),
        })
    }

    fn page_offset(page_id: PageId) -> u64 {
        (page_id as u64 - 1) * PAGE_SIZE as u64
    }

    fn check_page_id(page_id: PageId) -> Result<(), DiskManagerError> {
        if page_id < 1 {
            return Err(DiskManagerError::InvalidPageId(page_id));
        }
        Ok(())
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(
        &self,
        page_id: PageId,
        buf: &mut [u8],
        treat_missing_as_error: bool,
    ) -> Result<(), DiskManagerError> {
        Self::check_page_id(page_id)?;
        debug_assert_eq!(buf.len(), PAGE_SIZE);

        let offset = Self::page_offset(page_id);
        let mut inner = self.inner.lock();

        let file_size = inner.db_file.metadata()?.len();
        if offset >= file_size {
            if treat_missing_as_error {
                return Err(DiskManagerError::PageOutOfBounds(page_id));
            }
            buf.fill(0);
            return Ok(());
        }

        inner.db_file.seek(SeekFrom::Start(offset))?;
        inner.db_file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), DiskManagerError> {
        Self::check_page_id(page_id)?;
        debug_assert_eq!(buf.len(), PAGE_SIZE);

        let offset = Self::page_offset(page_id);
        let mut inner = self.inner.lock();

        inner.db_file.seek(SeekFrom::Start(offset))?;
        inner.db_file.write_all(buf)?;
        inner.db_file.flush()?;
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageId, DiskManagerError> {
        let mut inner = self.inner.lock();

        // Deallocated pages are handed out again before the file grows.
        if let Some(page_id) = inner.free_pages.pop() {
            return Ok(page_id);
        }

        let file_size = inner.db_file.metadata()?.len();
        let new_page_id = (file_size / PAGE_SIZE as u64) as PageId + 1;

        inner.db_file.seek(SeekFrom::End(0))?;
        let zeros = [0u8; PAGE_SIZE];
        inner.db_file.write_all(&zeros)?;
        inner.db_file.flush()?;

        Ok(new_page_id)
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<(), DiskManagerError> {
        Self::check_page_id(page_id)?;
        let mut inner = self.inner.lock();
        // Deallocation may be retried for a page still in use upstream.
        if !inner.free_pages.contains(&page_id) {
            inner.free_pages.push(page_id);
        }
        Ok(())
    }
}
