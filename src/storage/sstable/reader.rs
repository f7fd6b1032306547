//! Table Reader
//!
//! Opens table files and answers point lookups through an in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, TenantError};

use super::cursor::TableCursor;
use super::{parse_entry_header, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Outcome of a point lookup in one table
#[derive(Debug, PartialEq)]
pub enum Lookup {
    Found(Vec<u8>),
    /// A tombstone shadows any older value
    Deleted,
    /// The table says nothing about this key
    Absent,
}

/// Shared, read-only view of one table
///
/// Point lookups go through one file handle behind a mutex; every cursor opens
/// its own handle so scans never contend with lookups.
pub struct TableReader {
    path: PathBuf,
    file: Mutex<BufReader<File>>,
    index: Arc<BTreeMap<Vec<u8>, u64>>,
    entry_count: u64,
    /// Start of the index block = end of the data block
    data_end: u64,
}

impl TableReader {
    /// Open a table, verify its data checksum and load the index
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(TenantError::Storage(format!(
                "Table {} is too short ({} bytes)",
                path.display(),
                file_size
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(TenantError::Storage(format!(
                "Invalid table magic in {}: {:?}",
                path.display(),
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(TenantError::Storage(format!(
                "Unsupported table version: {}",
                version
            )));
        }

        let mut count = [0u8; 8];
        count.copy_from_slice(&header[6..14]);
        let entry_count = u64::from_le_bytes(count);

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let mut offset = [0u8; 8];
        offset.copy_from_slice(&footer[0..8]);
        let index_offset = u64::from_le_bytes(offset);
        let data_crc = u32::from_le_bytes([footer[8], footer[9], footer[10], footer[11]]);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(TenantError::Storage(format!(
                "Corrupt footer in {}: index offset {}",
                path.display(),
                index_offset
            )));
        }

        // Verify the data block against the footer checksum
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut data = vec![0u8; (index_offset - HEADER_SIZE) as usize];
        file.read_exact(&mut data)?;
        if crc32fast::hash(&data) != data_crc {
            return Err(TenantError::Storage(format!(
                "Data checksum mismatch in {}",
                path.display()
            )));
        }
        drop(data);

        let mut index_data = vec![0u8; (file_size - FOOTER_SIZE - index_offset) as usize];
        file.read_exact(&mut index_data)?;
        let index = parse_index(&index_data)?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(BufReader::new(file)),
            index: Arc::new(index),
            entry_count,
            data_end: index_offset,
        })
    }

    /// Point lookup via the in-memory index
    pub fn get(&self, key: &[u8]) -> Result<Lookup> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(Lookup::Absent),
        };

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;
        let (key_len, value_len) = parse_entry_header(&header);

        file.seek(SeekFrom::Current(key_len as i64))?;

        match value_len {
            None => Ok(Lookup::Deleted),
            Some(len) => {
                let mut value = vec![0u8; len];
                file.read_exact(&mut value)?;
                Ok(Lookup::Found(value))
            }
        }
    }

    /// Independent sequential cursor over this table
    pub fn cursor(&self) -> Result<TableCursor> {
        TableCursor::open(&self.path, Arc::clone(&self.index), self.data_end)
    }

    /// Range check before touching the file
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.index.keys().next(), self.index.keys().next_back()) {
            (Some(min), Some(max)) => key >= min.as_slice() && key <= max.as_slice(),
            _ => false,
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse `[key_len u32][offset u64][key]` records
fn parse_index(data: &[u8]) -> Result<BTreeMap<Vec<u8>, u64>> {
    let mut index = BTreeMap::new();
    let mut pos = 0;

    while pos < data.len() {
        if pos + 12 > data.len() {
            return Err(TenantError::Storage("Truncated index record".to_string()));
        }
        let key_len =
            u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let mut offset = [0u8; 8];
        offset.copy_from_slice(&data[pos + 4..pos + 12]);
        pos += 12;

        if pos + key_len > data.len() {
            return Err(TenantError::Storage("Truncated index key".to_string()));
        }
        index.insert(data[pos..pos + key_len].to_vec(), u64::from_le_bytes(offset));
        pos += key_len;
    }

    Ok(index)
}
