use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use anyhow::Result;
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use tidedb::common::types::{Lsn, PageId};
use tidedb::{
    BufferPoolManager, DiskManager, DiskManagerError, FileDiskManager, LogManager, LogManagerError,
};

// Create a temporary database file for testing
#[allow(dead_code)]
pub fn create_temp_db_file() -> Result<(NamedTempFile, String)> {
    let file = NamedTempFile::new()?;
    let path = file.path().to_str().unwrap().to_string();
    Ok((file, path))
}

// Create a buffer pool manager with a temporary database
#[allow(dead_code)]
pub fn create_test_buffer_pool(pool_size: usize) -> Result<(Arc<BufferPoolManager>, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let buffer_pool = Arc::new(BufferPoolManager::open(pool_size, path)?);
    Ok((buffer_pool, file))
}

/// One entry per observed collaborator call, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    DiskRead(PageId),
    DiskWrite(PageId),
    DiskDeallocate(PageId),
    LogFlush(Lsn),
}

#[allow(dead_code)]
pub type Timeline = Arc<Mutex<Vec<Event>>>;

/// Disk manager that appends every completed call to a shared timeline
/// before a real file-backed manager does the work.
pub struct RecordingDiskManager {
    inner: FileDiskManager,
    timeline: Timeline,
}

#[allow(dead_code)]
impl RecordingDiskManager {
    pub fn new(db_path: impl AsRef<Path>, timeline: Timeline) -> Result<Self, DiskManagerError> {
        Ok(Self {
            inner: FileDiskManager::new(db_path)?,
            timeline,
        })
    }
}

impl DiskManager for RecordingDiskManager {
    fn read_page(
        &self,
        page_id: PageId,
        buf: &mut [u8],
        treat_missing_as_error: bool,
    ) -> Result<(), DiskManagerError> {
        self.inner.read_page(page_id, buf, treat_missing_as_error)?;
        self.timeline.lock().push(Event::DiskRead(page_id));
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), DiskManagerError> {
        self.inner.write_page(page_id, buf)?;
        self.timeline.lock().push(Event::DiskWrite(page_id));
        Ok(())
    }

    fn allocate_page(&self) -> Result<PageId, DiskManagerError> {
        self.inner.allocate_page()
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<(), DiskManagerError> {
        self.inner.deallocate_page(page_id)?;
        self.timeline.lock().push(Event::DiskDeallocate(page_id));
        Ok(())
    }
}

/// Log manager double: records flushes on the shared timeline, and can be
/// switched into a failing mode to exercise the WAL error path.
pub struct RecordingLogManager {
    timeline: Timeline,
    failing: AtomicBool,
}

#[allow(dead_code)]
impl RecordingLogManager {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl LogManager for RecordingLogManager {
    fn flush(&self, lsn: Lsn, _force: bool) -> Result<(), LogManagerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LogManagerError::IoError(io::Error::new(
                io::ErrorKind::Other,
                "log device unavailable",
            )));
        }
        self.timeline.lock().push(Event::LogFlush(lsn));
        Ok(())
    }
}

/// Pool wired to recording collaborators, WAL attached.
#[allow(dead_code)]
pub fn create_recording_pool_with_wal(
    pool_size: usize,
) -> Result<(
    Arc<BufferPoolManager>,
    Arc<RecordingLogManager>,
    Timeline,
    NamedTempFile,
)> {
    let (file, path) = create_temp_db_file()?;
    let timeline: Timeline = Arc::new(Mutex::new(Vec::new()));
    let disk_manager = Arc::new(RecordingDiskManager::new(path, timeline.clone())?);
    let log_manager = Arc::new(RecordingLogManager::new(timeline.clone()));
    let buffer_pool = Arc::new(BufferPoolManager::new_with_wal(
        pool_size,
        disk_manager,
        log_manager.clone(),
    ));
    Ok((buffer_pool, log_manager, timeline, file))
}

/// Pool wired to a recording disk manager, no WAL.
#[allow(dead_code)]
pub fn create_recording_pool(
    pool_size: usize,
) -> Result<(Arc<BufferPoolManager>, Timeline, NamedTempFile)> {
    let (file, path) = create_temp_db_file()?;
    let timeline: Timeline = Arc::new(Mutex::new(Vec::new()));
    let disk_manager = Arc::new(RecordingDiskManager::new(path, timeline.clone())?);
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, disk_manager));
    Ok((buffer_pool, timeline, file))
}

/// Position of the first occurrence of `event`, if any.
#[allow(dead_code)]
pub fn position_of(events: &[Event], event: Event) -> Option<usize> {
    events.iter().position(|&e| e == event)
}

/// How many events satisfy `pred`.
#[allow(dead_code)]
pub fn count_events(events: &[Event], pred: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}
