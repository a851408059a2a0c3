use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use log::debug;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Lsn, INVALID_LSN};

/// Error type for log manager operations
#[derive(Error, Debug)]
pub enum LogManagerError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("Invalid log file format")]
    InvalidFormat,
}

/// Result type for log manager operations
pub type Result<T> = std::result::Result<T, LogManagerError>;

/// The one guarantee the buffer pool needs from write-ahead logging.
pub trait LogManager: Send + Sync {
    /// Block until every log record with sequence number <= `lsn` is
    /// durable. `INVALID_LSN` is a no-op. `force` requests synchronous
    /// durability.
    fn flush(&self, lsn: Lsn, force: bool) -> Result<()>;
}

/// Log file header structure
#[derive(Debug, Clone)]
struct LogFileHeader {
    /// Magic number to identify log files
    magic: u32,
    /// Version of the log file format
    version: u32,
    /// Size of the header in bytes
    header_size: u32,
    /// LSN of the first record in the file
    first_lsn: Lsn,
}

impl LogFileHeader {
    /// Magic number for log files: "TIDE" in ASCII
    const MAGIC: u32 = 0x54494445;

    /// Current log file format version
    const VERSION: u32 = 1;

    /// Size of the header in bytes
    const HEADER_SIZE: u32 = 16;

    fn new(first_lsn: Lsn) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            header_size: Self::HEADER_SIZE,
            first_lsn,
        }
    }

    fn write_to(&self, file: &mut File) -> io::Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&self.magic.to_le_bytes())?;
        file.write_all(&self.version.to_le_bytes())?;
        file.write_all(&self.header_size.to_le_bytes())?;
        file.write_all(&self.first_lsn.to_le_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn read_from(file: &mut File) -> io::Result<Self> {
        file.seek(SeekFrom::Start(0))?;

        let mut word = [0; 4];
        file.read_exact(&mut word)?;
        let magic = u32::from_le_bytes(word);

        file.read_exact(&mut word)?;
        let version = u32::from_le_bytes(word);

        file.read_exact(&mut word)?;
        let header_size = u32::from_le_bytes(word);

        file.read_exact(&mut word)?;
        let first_lsn = i32::from_le_bytes(word);

        Ok(Self {
            magic,
            version,
            header_size,
            first_lsn,
        })
    }

    fn validate(&self) -> bool {
        self.magic == Self::MAGIC && self.version == Self::VERSION
    }
}

#[derive(Debug)]
struct PendingRecord {
    lsn: Lsn,
    payload: Vec<u8>,
}

#[derive(Debug)]
struct LogFile {
    log_file: File,
    pending: Vec<PendingRecord>,
    durable_lsn: Lsn,
}

/// FileLogManager appends opaque log records to a single log file. Records
/// are framed as `[lsn: i32][len: u32][payload]` after a fixed 16-byte
/// file header. Appends land in an in-memory buffer; `flush` makes them
/// durable.
#[derive(Debug)]
pub struct FileLogManager {
    inner: Mutex<LogFile>,
    next_lsn: AtomicI32,
}

impl FileLogManager {
    /// Open or create the log file at `log_path`. On reopen the durable LSN
    /// is recovered by scanning the record framing.
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(log_path)?;

        let file_size = file.metadata()?.len();
        let durable_lsn = if file_size == 0 {
            let header = LogFileHeader::new(1);
            header.write_to(&mut file)?;
            0
        } else {
            let header = LogFileHeader::read_from(&mut file)?;
            if !header.validate() {
                return Err(LogManagerError::InvalidFormat);
            }
            Self::scan_max_lsn(&mut file, header.header_size as u64)?
        };

        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            inner: Mutex::new(LogFile {
                log_file: file,
                pending: Vec::new(),
                durable_lsn,
            }),
            next_lsn: AtomicI32::new(durable_lsn + 1),
        })
    }

    /// Find the highest LSN already written to the file. A truncated tail
    /// record ends the scan.
    fn scan_max_lsn(file: &mut File, start_position: u64) -> Result<Lsn> {
        let mut max_lsn = 0;
        let file_size = file.metadata()?.len();

        file.seek(SeekFrom::Start(start_position))?;
        while file.stream_position()? < file_size {
            let mut word = [0; 4];
            if file.read_exact(&mut word).is_err() {
                break;
            }
            let lsn = i32::from_le_bytes(word);

            if file.read_exact(&mut word).is_err() {
                break;
            }
            let payload_len = u32::from_le_bytes(word) as u64;

            // A record whose payload runs past the end of the file never
            // became durable.
            let payload_start = file.stream_position()?;
            if payload_start + payload_len > file_size {
                break;
            }
            file.seek(SeekFrom::Start(payload_start + payload_len))?;
            if lsn > max_lsn {
                max_lsn = lsn;
            }
        }

        Ok(max_lsn)
    }

    /// Append a record to the in-memory buffer and assign it the next LSN.
    /// The record is not durable until a `flush` covers its LSN.
    pub fn append_record(&self, payload: &[u8]) -> Result<Lsn> {
        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.inner.lock();
        inner.pending.push(PendingRecord {
            lsn,
            payload: payload.to_vec(),
        });
        Ok(lsn)
    }

    /// Highest LSN assigned so far, or 0 if none.
    pub fn current_lsn(&self) -> Lsn {
        self.next_lsn.load(Ordering::SeqCst) - 1
    }

    /// Highest LSN known durable.
    pub fn durable_lsn(&self) -> Lsn {
        self.inner.lock().durable_lsn
    }
}

impl LogManager for FileLogManager {
    fn flush(&self, lsn: Lsn, force: bool) -> Result<()> {
        if lsn == INVALID_LSN {
            return Ok(());
        }

        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        if inner.durable_lsn >= lsn {
            return Ok(());
        }

        // Write out everything buffered, not just records up to `lsn`; a
        // group flush keeps the framing append-only. The buffer is only
        // cleared once every byte is down, so a failed flush can be retried.
        inner.pending.sort_by_key(|record| record.lsn);

        inner.log_file.seek(SeekFrom::End(0))?;
        let mut max_written = inner.durable_lsn;
        for record in &inner.pending {
            inner.log_file.write_all(&record.lsn.to_le_bytes())?;
            inner
                .log_file
                .write_all(&(record.payload.len() as u32).to_le_bytes())?;
            inner.log_file.write_all(&record.payload)?;
            if record.lsn > max_written {
                max_written = record.lsn;
            }
        }

        if force {
            inner.log_file.sync_data()?;
        } else {
            inner.log_file.flush()?;
        }

        debug!(
            "flushed {} log records, durable lsn now {}",
            inner.pending.len(),
            max_written
        );
        inner.pending.clear();
        inner.durable_lsn = max_written;
        Ok(())
    }
}
