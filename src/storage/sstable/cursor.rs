//! Table Cursor
//!
//! Forward iteration over one table, positioned with the index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::Bound;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

use super::parse_entry_header;

/// `(key, None)` is a tombstone
pub type TableEntry = (Vec<u8>, Option<Vec<u8>>);

/// Forward cursor with its own file handle
pub struct TableCursor {
    reader: BufReader<File>,
    index: Arc<BTreeMap<Vec<u8>, u64>>,
    data_end: u64,
    next_offset: u64,
    current: Option<TableEntry>,
}

impl TableCursor {
    /// Open unpositioned; call `seek` first
    pub(super) fn open(
        path: &Path,
        index: Arc<BTreeMap<Vec<u8>, u64>>,
        data_end: u64,
    ) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            index,
            data_end,
            next_offset: data_end,
            current: None,
        })
    }

    /// Position at the first entry with key >= target
    pub fn seek(&mut self, target: &[u8]) -> Result<()> {
        let start = self
            .index
            .range::<[u8], _>((Bound::Included(target), Bound::Unbounded))
            .next()
            .map(|(_, &offset)| offset);

        match start {
            Some(offset) => {
                self.reader.seek(SeekFrom::Start(offset))?;
                self.next_offset = offset;
                self.advance()
            }
            None => {
                self.next_offset = self.data_end;
                self.current = None;
                Ok(())
            }
        }
    }

    pub fn current(&self) -> Option<&TableEntry> {
        self.current.as_ref()
    }

    /// Read the next entry; `current()` becomes `None` at the end
    pub fn advance(&mut self) -> Result<()> {
        if self.next_offset >= self.data_end {
            self.current = None;
            return Ok(());
        }

        // Clear first so a failed read never leaves a stale entry behind
        self.current = None;

        let mut header = [0u8; 8];
        self.reader.read_exact(&mut header)?;
        let (key_len, value_len) = parse_entry_header(&header);

        let mut key = vec![0u8; key_len];
        self.reader.read_exact(&mut key)?;

        let mut size = 8 + key_len as u64;
        let value = match value_len {
            Some(len) => {
                let mut value = vec![0u8; len];
                self.reader.read_exact(&mut value)?;
                size += len as u64;
                Some(value)
            }
            None => None,
        };

        self.next_offset += size;
        self.current = Some((key, value));
        Ok(())
    }
}
