// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Database: materialized state behind a write-ahead log
//!
//! Every change goes through [`MaterializedState::apply`] and is durable once
//! its WAL entry is fsync'd. Opening a database replays the log; a corrupt or
//! truncated tail is cut off so later appends start from a clean line.

use crate::error::StorageError;
use crate::operation::Operation;
use crate::state::{MaterializedState, Undo};
use crate::transaction::Transaction;
use crate::wal::{WalReader, WalWriter};
use chrono::{DateTime, Utc};
use depot_core::{PublicationId, StorageConfig};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// WAL file name inside the data directory
pub const WAL_FILE: &str = "wal.jsonl";

pub(crate) struct Inner {
    pub(crate) writer: WalWriter,
    pub(crate) state: MaterializedState,
    /// Publications with a builder open in this process
    pub(crate) live_publications: HashSet<PublicationId>,
}

impl Inner {
    /// Apply operations and append them as one entry, or change nothing
    pub(crate) fn commit(&mut self, operations: Vec<Operation>) -> Result<(), StorageError> {
        if operations.is_empty() {
            return Ok(());
        }

        let mut undo: Vec<Undo> = Vec::new();
        for op in &operations {
            match self.state.apply(op) {
                Ok(steps) => undo.extend(steps),
                Err(e) => {
                    self.revert(undo);
                    return Err(e.into());
                }
            }
        }

        self.append_or_revert(operations, undo)
    }

    /// Append already-applied operations; on failure revert them
    pub(crate) fn append_or_revert(
        &mut self,
        operations: Vec<Operation>,
        undo: Vec<Undo>,
    ) -> Result<(), StorageError> {
        let count = operations.len();
        match self.writer.append(operations) {
            Ok(sequence) => {
                debug!(sequence, operations = count, "committed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "wal append failed, rolling back");
                self.revert(undo);
                Err(e)
            }
        }
    }

    pub(crate) fn revert(&mut self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            self.state.revert(step);
        }
    }
}

/// Durable store shared by the engine, workers and readers
pub struct Database {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl Database {
    /// Open the database in `dir`, replaying its WAL
    pub fn open(dir: &Path, machine_id: &str) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(WAL_FILE);

        let (state, last_sequence) = replay(&path)?;
        let writer = WalWriter::open(&path, machine_id, last_sequence)?;

        info!(
            path = %path.display(),
            next_sequence = writer.sequence(),
            "database opened"
        );

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                writer,
                state,
                live_publications: HashSet::new(),
            }),
        })
    }

    /// Open the database described by the `[storage]` config section
    pub fn open_with_config(config: &StorageConfig) -> Result<Self, StorageError> {
        Self::open(&config.data_dir, &config.machine_id)
    }

    /// Path of the WAL file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply and commit a single operation
    pub fn execute(&self, op: Operation) -> Result<(), StorageError> {
        self.lock().commit(vec![op])
    }

    /// Apply and commit several operations as one atomic entry
    pub fn execute_all(&self, operations: Vec<Operation>) -> Result<(), StorageError> {
        self.lock().commit(operations)
    }

    /// Start an explicit transaction
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction::new(self)
    }

    /// Read the current state
    ///
    /// The state includes rows staged by open transactions; readers that must
    /// not see them filter on committed markers such as `Publication::complete`.
    pub fn read<R>(&self, f: impl FnOnce(&MaterializedState) -> R) -> R {
        f(&self.lock().state)
    }

    /// Delete incomplete publications created before `cutoff`
    ///
    /// Publications with a builder open in this process are skipped.
    pub fn sweep_incomplete_publications(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PublicationId>, StorageError> {
        let mut inner = self.lock();
        let doomed: Vec<PublicationId> = inner
            .state
            .incomplete_publications_before(cutoff)
            .into_iter()
            .filter(|id| !inner.live_publications.contains(id))
            .collect();

        let operations = doomed
            .iter()
            .map(|id| Operation::PublicationDelete { id: id.clone() })
            .collect();
        inner.commit(operations)?;
        Ok(doomed)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Rebuild state from the WAL, truncating any invalid tail
fn replay(path: &Path) -> Result<(MaterializedState, Option<u64>), StorageError> {
    let mut state = MaterializedState::default();
    let mut last_sequence = None;
    let mut entries = WalReader::open(path).entries()?;
    let mut corrupt = false;

    for entry in entries.by_ref() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "wal corruption detected, stopping replay");
                corrupt = true;
                break;
            }
        };

        for op in &entry.operations {
            if let Err(e) = state.apply(op) {
                warn!(
                    sequence = entry.sequence,
                    op = op.name(),
                    error = %e,
                    "skipping operation that no longer applies"
                );
            }
        }
        last_sequence = Some(entry.sequence);
    }

    if corrupt {
        let valid_len = entries.last_valid_position();
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len)?;
        file.sync_all()?;
        info!(path = %path.display(), valid_len, "truncated wal to last valid entry");
    }

    Ok((state, last_sequence))
}

#[cfg(test)]
#[path = "database_tests.rs"]
mod tests;
