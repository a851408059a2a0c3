use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use log::error;
use parking_lot::{Mutex, RwLock};

use crate::common::types::{Frame, FrameId, Page, PageId, PagePtr, INVALID_PAGE_ID};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LRUReplacer;
use crate::storage::disk::{DiskManager, FileDiskManager};
use crate::storage::page::PageHeader;
use crate::wal::LogManager;

/// Everything the pool mutates, behind one latch. Holding the latch for the
/// full body of every public operation is what makes the operations
/// linearizable; no finer-grained locking exists at this layer.
struct PoolInner {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
    replacer: LRUReplacer,
    flush_wait: Duration,
}

pub struct BufferPoolManager {
    pool_size: usize,
    disk_manager: Arc<dyn DiskManager>,
    log_manager: Option<Arc<dyn LogManager>>,
    latch: Mutex<PoolInner>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, disk_manager: Arc<dyn DiskManager>) -> Self {
        Self::build(pool_size, disk_manager, None)
    }

    /// Create a new buffer pool manager with WAL support
    pub fn new_with_wal(
        pool_size: usize,
        disk_manager: Arc<dyn DiskManager>,
        log_manager: Arc<dyn LogManager>,
    ) -> Self {
        Self::build(pool_size, disk_manager, Some(log_manager))
    }

    /// Convenience constructor over a file-backed disk manager.
    pub fn open(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk_manager = Arc::new(FileDiskManager::new(db_path)?);
        Ok(Self::new(pool_size, disk_manager))
    }

    fn build(
        pool_size: usize,
        disk_manager: Arc<dyn DiskManager>,
        log_manager: Option<Arc<dyn LogManager>>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = Vec::with_capacity(pool_size);

        for _ in 0..pool_size {
            frames.push(Frame::new(Arc::new(RwLock::new(Page::new(
                INVALID_PAGE_ID,
            )))));
        }
        // Seeded back-to-front so the LIFO pop hands out frame 0 first.
        for i in (0..pool_size).rev() {
            free_list.push(i as FrameId);
        }

        Self {
            pool_size,
            disk_manager,
            log_manager,
            latch: Mutex::new(PoolInner {
                frames,
                page_table: HashMap::new(),
                free_list,
                replacer: LRUReplacer::new(pool_size),
                flush_wait: Duration::ZERO,
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Fetch a page from the buffer pool, reading it from disk on a miss.
    ///
    /// The returned page is pinned and cannot be evicted until every pin is
    /// released through `unpin_page`. `Ok(None)` means every frame is
    /// pinned. With `treat_missing_as_error` false, a page the disk manager
    /// has never written comes back zeroed instead of as an error.
    pub fn fetch_page(
        &self,
        page_id: PageId,
        treat_missing_as_error: bool,
    ) -> Result<Option<PagePtr>, BufferPoolError> {
        debug_assert_ne!(page_id, INVALID_PAGE_ID);
        let mut inner = self.latch.lock();

        // Hit: pin and hand out the resident frame.
        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let inner = &mut *inner;
            inner.replacer.pin(frame_id);
            let frame = &mut inner.frames[frame_id as usize];
            frame.pin_count += 1;
            return Ok(Some(frame.page.clone()));
        }

        let frame_id = match self.take_victim(&mut inner)? {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };

        inner.page_table.insert(page_id, frame_id);
        {
            let frame = &mut inner.frames[frame_id as usize];
            frame.pin_count = 1;
            frame.is_dirty = false;
            frame.page.write().page_id = page_id;
        }

        let page = inner.frames[frame_id as usize].page.clone();
        let read_result = {
            let mut page = page.write();
            let page = &mut *page;
            self.disk_manager
                .read_page(page_id, &mut page.data, treat_missing_as_error)
        };
        if let Err(err) = read_result {
            // The frame holds no usable contents; pull it back out of
            // service rather than leave a resident page that was never read.
            inner.page_table.remove(&page_id);
            let frame = &mut inner.frames[frame_id as usize];
            frame.pin_count = 0;
            frame.is_dirty = false;
            frame.page.write().page_id = INVALID_PAGE_ID;
            inner.free_list.push(frame_id);
            return Err(err.into());
        }

        Ok(Some(page))
    }

    /// Allocate a fresh disk page and pin it in a frame with a zeroed
    /// buffer. `Ok(None)` means every frame is pinned; capacity is checked
    /// before the disk allocation so exhaustion never leaks a page id.
    pub fn new_page(&self) -> Result<Option<(PageId, PagePtr)>, BufferPoolError> {
        let mut inner = self.latch.lock();

        if inner.free_list.is_empty() && inner.replacer.size() == 0 {
            return Ok(None);
        }

        let page_id = self.disk_manager.allocate_page()?;

        let frame_id = match self.take_victim(&mut inner) {
            Ok(Some(frame_id)) => frame_id,
            Ok(None) => {
                self.disk_manager.deallocate_page(page_id)?;
                return Ok(None);
            }
            Err(err) => {
                // Hand the fresh id back; the eviction failure is the error
                // worth reporting.
                let _ = self.disk_manager.deallocate_page(page_id);
                return Err(err);
            }
        };

        inner.page_table.insert(page_id, frame_id);
        let frame = &mut inner.frames[frame_id as usize];
        frame.pin_count = 1;
        frame.is_dirty = false;
        {
            let mut page = frame.page.write();
            page.page_id = page_id;
            page.zero();
        }

        Ok(Some((page_id, frame.page.clone())))
    }

    /// Release one pin on a page, stickily ORing in the dirty flag.
    ///
    /// Returns false if the page is not resident or its pin count is
    /// already zero; the dirty flag is recorded even then.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut inner = self.latch.lock();
        let inner = &mut *inner;

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };

        let frame = &mut inner.frames[frame_id as usize];
        frame.is_dirty |= is_dirty;

        if frame.pin_count == 0 {
            return false;
        }

        frame.pin_count -= 1;
        if frame.pin_count == 0 {
            inner.replacer.unpin(frame_id);
        }
        true
    }

    /// Write a resident page to disk, honoring the write-ahead rule.
    /// Returns false if the page is not resident. The write happens whether
    /// or not the page is dirty.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        let mut inner = self.latch.lock();

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };

        self.flush_frame(&mut inner, frame_id)?;
        Ok(true)
    }

    /// Flush every resident page to disk.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let mut inner = self.latch.lock();

        for frame_id in 0..self.pool_size as FrameId {
            let page_id = inner.frames[frame_id as usize].page.read().page_id;
            if !inner.page_table.contains_key(&page_id) {
                continue;
            }
            self.flush_frame(&mut inner, frame_id)?;
        }
        Ok(())
    }

    /// Drop a page from the pool and return its disk allocation.
    ///
    /// The disk manager is told to deallocate whether or not the page is
    /// resident. Returns false while the page is pinned; the caller retries
    /// after the holders unpin.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        let mut inner = self.latch.lock();

        self.disk_manager.deallocate_page(page_id)?;

        let frame_id = match inner.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(true),
        };

        {
            let frame = &mut inner.frames[frame_id as usize];
            if frame.pin_count > 0 {
                return Ok(false);
            }
            frame.is_dirty = false;
            frame.page.write().page_id = INVALID_PAGE_ID;
        }

        inner.page_table.remove(&page_id);
        inner.free_list.push(frame_id);
        inner.replacer.pin(frame_id);
        Ok(true)
    }

    /// Cumulative time the flush helper has spent blocked in the log
    /// manager's flush.
    pub fn flush_wait_time(&self) -> Duration {
        self.latch.lock().flush_wait
    }

    /// Diagnostic: true iff no resident page is still pinned. Logs every
    /// offender.
    pub fn check_pin_count(&self) -> bool {
        let inner = self.latch.lock();
        let mut flag = true;

        for frame in inner.frames.iter() {
            let page_id = frame.page.read().page_id;
            if !inner.page_table.contains_key(&page_id) {
                continue;
            }
            if frame.pin_count != 0 {
                error!("page {} has pin count {}", page_id, frame.pin_count);
                flag = false;
            }
        }
        flag
    }

    /// Diagnostic: validate the pool's structural invariants. Every frame
    /// is either free or resident, never both; the replacer holds exactly
    /// the unpinned resident frames; free frames are clean; the page table
    /// and the frames agree on ids.
    pub fn check_consistency(&self) -> bool {
        let inner = self.latch.lock();
        let mut flag = true;

        for (i, frame) in inner.frames.iter().enumerate() {
            let frame_id = i as FrameId;
            let page_id = frame.page.read().page_id;
            let resident = inner.page_table.get(&page_id) == Some(&frame_id);
            let free = inner.free_list.contains(&frame_id);

            if resident == free {
                error!(
                    "frame {} is {}",
                    frame_id,
                    if resident {
                        "both resident and on the free list"
                    } else {
                        "neither resident nor on the free list"
                    }
                );
                flag = false;
            }
            if inner.replacer.contains(frame_id) != (resident && frame.pin_count == 0) {
                error!("frame {} has wrong replacer membership", frame_id);
                flag = false;
            }
            if free && frame.is_dirty {
                error!("frame {} is free but dirty", frame_id);
                flag = false;
            }
        }

        for (&page_id, &frame_id) in inner.page_table.iter() {
            if inner.frames[frame_id as usize].page.read().page_id != page_id {
                error!(
                    "page table maps page {} to frame {} which disagrees",
                    page_id, frame_id
                );
                flag = false;
            }
        }
        flag
    }

    /// Pick a frame to receive a new page: the free list first, then the
    /// replacer. A dirty victim is flushed before its binding is dropped.
    /// `Ok(None)` means every frame is pinned.
    fn take_victim(&self, inner: &mut PoolInner) -> Result<Option<FrameId>, BufferPoolError> {
        if let Some(frame_id) = inner.free_list.pop() {
            return Ok(Some(frame_id));
        }

        let frame_id = match inner.replacer.evict() {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };

        if inner.frames[frame_id as usize].is_dirty {
            if let Err(err) = self.flush_frame(inner, frame_id) {
                // The page was not written; it stays resident, dirty, and
                // evictable for a later attempt.
                inner.replacer.unpin(frame_id);
                return Err(err);
            }
        }

        let old_page_id = inner.frames[frame_id as usize].page.read().page_id;
        if old_page_id != INVALID_PAGE_ID {
            inner.page_table.remove(&old_page_id);
        }
        Ok(Some(frame_id))
    }

    /// Write one frame's page to disk. Write-ahead rule: all log records up
    /// to the LSN in the page header must be durable before the page goes
    /// out, so the log is forced first and the disk write only starts once
    /// that returns. Called with the pool latch held.
    fn flush_frame(&self, inner: &mut PoolInner, frame_id: FrameId) -> Result<(), BufferPoolError> {
        let page = inner.frames[frame_id as usize].page.clone();
        let page = page.read();

        if let Some(log_manager) = &self.log_manager {
            let lsn = PageHeader::read_lsn(&page.data);
            let start = Instant::now();
            log_manager.flush(lsn, true)?;
            inner.flush_wait += start.elapsed();
        }

        self.disk_manager.write_page(page.page_id, &page.data)?;
        drop(page);
        inner.frames[frame_id as usize].is_dirty = false;
        Ok(())
    }
}
