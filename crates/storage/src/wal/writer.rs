// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL writer for durable append operations

use super::entry::WalEntry;
use crate::operation::Operation;
use crate::StorageError;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// WAL writer for durable append operations
pub struct WalWriter {
    path: PathBuf,
    file: File,
    next_sequence: u64,
    machine_id: String,
}

impl WalWriter {
    /// Open or create a WAL file, continuing after `last_sequence`
    pub fn open(
        path: &Path,
        machine_id: &str,
        last_sequence: Option<u64>,
    ) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_sequence: last_sequence.map(|s| s + 1).unwrap_or(0),
            machine_id: machine_id.to_string(),
        })
    }

    /// Append a committed transaction
    ///
    /// The entry is fsync'd before this returns.
    pub fn append(&mut self, operations: Vec<Operation>) -> Result<u64, StorageError> {
        let sequence = self.next_sequence;

        let entry = WalEntry::new(sequence, &self.machine_id, operations);
        let mut line = entry.to_line()?;
        line.push('\n');

        self.file.write_all(line.as_bytes())?;
        self.file.sync_all()?;

        self.next_sequence += 1;
        Ok(sequence)
    }

    /// Next sequence number to be assigned
    pub fn sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[path = "writer_tests.rs"]
mod tests;
