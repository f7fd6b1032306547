//! WAL Recovery
//!
//! Replays the WAL after a restart.

use std::fs::{self, OpenOptions};
use std::path::Path;

use crate::error::{Result, TenantError};

use super::WalEntry;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, PartialEq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries dropped (at most one: replay stops there)
    pub entries_corrupted: u64,

    /// Last valid LSN (0 if none)
    pub last_lsn: u64,

    /// Whether trailing bytes were cut off the file
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Read every valid entry in order.
    ///
    /// Replay stops at the first torn or corrupt entry; everything after it
    /// is cut from the file so new appends start from a clean tail.
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let bytes = fs::read(path)?;
        let mut entries = Vec::new();
        let mut result = RecoveryResult::default();
        let mut offset = 0;

        while offset < bytes.len() {
            match WalEntry::deserialize(&bytes[offset..]) {
                Ok(Some((entry, consumed))) => {
                    result.last_lsn = entry.lsn;
                    result.entries_recovered += 1;
                    entries.push(entry);
                    offset += consumed;
                }
                Ok(None) => break,
                Err(TenantError::WalCorruption(msg)) => {
                    tracing::warn!("WAL {}: {}", path.display(), msg);
                    result.entries_corrupted += 1;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if offset < bytes.len() {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset as u64)?;
            file.sync_all()?;
            result.was_truncated = true;
        }

        Ok((entries, result))
    }
}
