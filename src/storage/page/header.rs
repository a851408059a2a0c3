use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Lsn, PageId, INVALID_LSN};

/// Number of bytes every page reserves at offset 0 for its header.
pub const PAGE_HEADER_SIZE: usize = 8;

/// Typed view of the fixed prefix of a page buffer: the owning page id at
/// bytes [0..4) and the LSN of the latest mutation at bytes [4..8), both
/// little-endian. Higher layers write the header; the buffer pool only
/// reads the LSN back when it flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_id: PageId,
    pub lsn: Lsn,
}

impl PageHeader {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            lsn: INVALID_LSN,
        }
    }

    // Deserialize header from the start of a page buffer
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            page_id: LittleEndian::read_i32(&bytes[0..4]),
            lsn: LittleEndian::read_i32(&bytes[4..8]),
        }
    }

    // Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; PAGE_HEADER_SIZE] {
        let mut bytes = [0u8; PAGE_HEADER_SIZE];
        LittleEndian::write_i32(&mut bytes[0..4], self.page_id);
        LittleEndian::write_i32(&mut bytes[4..8], self.lsn);
        bytes
    }

    /// Read just the LSN out of a page buffer.
    pub fn read_lsn(bytes: &[u8]) -> Lsn {
        LittleEndian::read_i32(&bytes[4..8])
    }

    /// Stamp an LSN into a page buffer.
    pub fn write_lsn(bytes: &mut [u8], lsn: Lsn) {
        LittleEndian::write_i32(&mut bytes[4..8], lsn);
    }

    /// Stamp a page id into a page buffer.
    pub fn write_page_id(bytes: &mut [u8], page_id: PageId) {
        LittleEndian::write_i32(&mut bytes[0..4], page_id);
    }
}
