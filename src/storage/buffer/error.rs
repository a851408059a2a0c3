use thiserror::Error;

use crate::storage::disk::DiskManagerError;
use crate::wal::LogManagerError;

/// Failures a buffer pool operation can surface. Pool exhaustion, unknown
/// pages and in-use pages are ordinary returns, not errors.
#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("Disk manager error: {0}")]
    DiskManager(#[from] DiskManagerError),

    #[error("WAL error: {0}")]
    LogManager(#[from] LogManagerError),
}
