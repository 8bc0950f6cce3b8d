// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL reader for iterating and validating entries
//!
//! Invalid entries (checksum mismatch or parse errors) mark the truncation
//! point left by a crash mid-append.

use super::entry::WalEntry;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when reading WAL entries
#[derive(Debug, Error)]
pub enum WalReadError {
    #[error("corrupted entry at line {line}: {reason}")]
    Corrupted { line: u64, reason: String },
    #[error("checksum mismatch at line {line}")]
    ChecksumMismatch { line: u64 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// WAL reader; a missing file reads as empty
pub struct WalReader {
    path: PathBuf,
}

impl WalReader {
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Iterate over entries, stopping at the first invalid one
    pub fn entries(&self) -> Result<WalEntryIter, WalReadError> {
        let reader = if self.path.exists() {
            Some(BufReader::new(File::open(&self.path)?))
        } else {
            None
        };

        Ok(WalEntryIter {
            reader,
            line_number: 0,
            position: 0,
            last_valid_position: 0,
        })
    }
}

/// Iterator over WAL entries with position tracking
pub struct WalEntryIter {
    reader: Option<BufReader<File>>,
    line_number: u64,
    position: u64,
    last_valid_position: u64,
}

impl WalEntryIter {
    /// Byte offset just past the last valid entry read so far
    pub fn last_valid_position(&self) -> u64 {
        self.last_valid_position
    }
}

impl Iterator for WalEntryIter {
    type Item = Result<WalEntry, WalReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;

        loop {
            let mut line = String::new();
            let bytes_read = match reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(n) => n as u64,
                Err(e) => return Some(Err(WalReadError::Io(e))),
            };
            self.line_number += 1;
            self.position += bytes_read;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                self.last_valid_position = self.position;
                continue;
            }

            // A line without its newline was cut short by a crash
            if !line.ends_with('\n') {
                return Some(Err(WalReadError::Corrupted {
                    line: self.line_number,
                    reason: "truncated entry".to_string(),
                }));
            }

            let entry = match WalEntry::from_line(trimmed) {
                Ok(e) => e,
                Err(e) => {
                    return Some(Err(WalReadError::Corrupted {
                        line: self.line_number,
                        reason: e.to_string(),
                    }));
                }
            };

            if !entry.verify() {
                return Some(Err(WalReadError::ChecksumMismatch {
                    line: self.line_number,
                }));
            }

            self.last_valid_position = self.position;
            return Some(Ok(entry));
        }
    }
}

#[cfg(test)]
#[path = "reader_tests.rs"]
mod tests;
