use std::sync::Arc;
use parking_lot::RwLock;

/// Page size in bytes (4KB)
pub const PAGE_SIZE: usize = 4096;

/// Page ID type
pub type PageId = i32;

/// Buffer pool frame ID type
pub type FrameId = i32;

/// LSN (Log Sequence Number) type
pub type Lsn = i32;

/// Marks a frame that currently holds no page
pub const INVALID_PAGE_ID: PageId = -1;

/// Marks "no log record applies"; write-ahead flushing treats it as a no-op
pub const INVALID_LSN: Lsn = -1;

/// Page structure
pub struct Page {
    pub data: [u8; PAGE_SIZE],
    pub page_id: PageId,
}

impl Page {
    pub fn new(page_id: PageId) -> Self {
        Self {
            data: [0; PAGE_SIZE],
            page_id,
        }
    }

    /// Fill the buffer with zero bytes
    pub fn zero(&mut self) {
        self.data.fill(0);
    }
}

/// Smart pointer to a page
pub type PagePtr = Arc<RwLock<Page>>;

/// Buffer pool frame structure. Metadata is guarded by the pool latch, not
/// by the frame itself.
pub struct Frame {
    pub page: PagePtr,
    pub pin_count: u32,
    pub is_dirty: bool,
}

impl Frame {
    pub fn new(page: PagePtr) -> Self {
        Self {
            page,
            pin_count: 0,
            is_dirty: false,
        }
    }
}
