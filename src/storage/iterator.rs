//! Snapshot iterator
//!
//! Merges a frozen memtable copy with cursors over every table that existed
//! when the iterator was created. Sources are ordered newest → oldest; on
//! equal keys the newest source wins and tombstones hide the key.

use std::sync::Arc;

use crate::error::{Result, TenantError};

use super::memtable::{MemTableEntry, MemTableSnapshot};
use super::sstable::{TableCursor, TableReader};
use super::EngineIterator;

enum Source {
    Memory { entries: MemTableSnapshot, pos: usize },
    Table(TableCursor),
}

impl Source {
    fn seek(&mut self, target: &[u8]) -> Result<()> {
        match self {
            Source::Memory { entries, pos } => {
                *pos = entries.partition_point(|(k, _)| k.as_slice() < target);
                Ok(())
            }
            Source::Table(cursor) => cursor.seek(target),
        }
    }

    fn current_key(&self) -> Option<&[u8]> {
        match self {
            Source::Memory { entries, pos } => entries.get(*pos).map(|(k, _)| k.as_slice()),
            Source::Table(cursor) => cursor.current().map(|(k, _)| k.as_slice()),
        }
    }

    /// Value at the current position; `None` for a tombstone
    fn current_value(&self) -> Option<&[u8]> {
        match self {
            Source::Memory { entries, pos } => match entries.get(*pos) {
                Some((_, MemTableEntry::Value(v))) => Some(v.as_slice()),
                _ => None,
            },
            Source::Table(cursor) => cursor.current().and_then(|(_, v)| v.as_deref()),
        }
    }

    fn advance(&mut self) -> Result<()> {
        match self {
            Source::Memory { entries, pos } => {
                if *pos < entries.len() {
                    *pos += 1;
                }
                Ok(())
            }
            Source::Table(cursor) => cursor.advance(),
        }
    }
}

/// Forward iterator over a point-in-time view of one database
pub struct SnapshotIter {
    sources: Vec<Source>,
    current: Option<(Vec<u8>, Vec<u8>)>,
    fault: Option<String>,
}

impl SnapshotIter {
    pub(crate) fn new(memtable: MemTableSnapshot, tables: &[Arc<TableReader>]) -> Result<Self> {
        let mut sources = Vec::with_capacity(tables.len() + 1);
        sources.push(Source::Memory {
            entries: memtable,
            pos: 0,
        });
        for table in tables {
            sources.push(Source::Table(table.cursor()?));
        }

        Ok(Self {
            sources,
            current: None,
            fault: None,
        })
    }

    /// Position on the smallest live key at or after every source's cursor
    fn settle(&mut self) -> Result<()> {
        loop {
            let smallest = self
                .sources
                .iter()
                .filter_map(Source::current_key)
                .min()
                .map(<[u8]>::to_vec);

            let key = match smallest {
                Some(key) => key,
                None => {
                    self.current = None;
                    return Ok(());
                }
            };

            // The first (newest) source holding the key decides its value
            let mut winner: Option<Option<Vec<u8>>> = None;
            for source in self.sources.iter_mut() {
                if source.current_key() == Some(key.as_slice()) {
                    if winner.is_none() {
                        winner = Some(source.current_value().map(<[u8]>::to_vec));
                    }
                    source.advance()?;
                }
            }

            if let Some(Some(value)) = winner {
                self.current = Some((key, value));
                return Ok(());
            }
            // Tombstone: keep looking
        }
    }

    fn record(&mut self, result: Result<()>) {
        if let Err(e) = result {
            self.current = None;
            self.fault = Some(e.to_string());
        }
    }
}

impl EngineIterator for SnapshotIter {
    fn seek(&mut self, target: &[u8]) {
        self.fault = None;
        let mut result = Ok(());
        for source in self.sources.iter_mut() {
            if let Err(e) = source.seek(target) {
                result = Err(e);
                break;
            }
        }
        let result = result.and_then(|_| self.settle());
        self.record(result);
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map(|(k, _)| k.as_slice()).unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map(|(_, v)| v.as_slice()).unwrap_or(&[])
    }

    fn next(&mut self) {
        if self.current.is_none() {
            return;
        }
        let result = self.settle();
        self.record(result);
    }

    fn status(&self) -> Result<()> {
        match &self.fault {
            Some(message) => Err(TenantError::IteratorFault(message.clone())),
            None => Ok(()),
        }
    }
}
