//! WAL entry encoding

use serde::{Deserialize, Serialize};

use crate::error::{Result, TenantError};

/// LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,
    pub operation: Operation,
}

impl WalEntry {
    pub fn new(lsn: u64, operation: Operation) -> Self {
        Self { lsn, operation }
    }

    /// Encode header + payload
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = bincode::serialize(&self.operation)?;
        let crc = crc32fast::hash(&data);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + data.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&data);
        Ok(bytes)
    }

    /// Decode one entry from the front of `bytes`
    ///
    /// Returns `Ok(None)` when `bytes` holds only part of an entry (a torn
    /// tail), and `WalCorruption` when the checksum does not match.
    pub fn deserialize(bytes: &[u8]) -> Result<Option<(Self, usize)>> {
        if bytes.len() < HEADER_SIZE {
            return Ok(None);
        }

        let lsn = u64::from_le_bytes(read_array(&bytes[0..8]));
        let crc = u32::from_le_bytes(read_array(&bytes[8..12]));
        let len = u32::from_le_bytes(read_array(&bytes[12..16])) as usize;

        let end = HEADER_SIZE + len;
        if bytes.len() < end {
            return Ok(None);
        }

        let data = &bytes[HEADER_SIZE..end];
        if crc32fast::hash(data) != crc {
            return Err(TenantError::WalCorruption(format!(
                "CRC mismatch for LSN {}",
                lsn
            )));
        }

        let operation: Operation = bincode::deserialize(data)?;
        Ok(Some((Self { lsn, operation }, end)))
    }
}

fn read_array<const N: usize>(slice: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    out
}
