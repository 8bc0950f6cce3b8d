// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Explicit transaction handles
//!
//! Operations apply to the materialized state as they execute and are
//! written to the WAL as a single entry on commit. Rollback, or dropping the
//! handle without committing, reverts them.

use crate::database::Database;
use crate::error::StorageError;
use crate::operation::Operation;
use crate::state::{MaterializedState, Undo};
use tracing::debug;

/// An open transaction against a [`Database`]
pub struct Transaction<'db> {
    db: &'db Database,
    operations: Vec<Operation>,
    undo: Vec<Undo>,
    finished: bool,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self {
            db,
            operations: Vec::new(),
            undo: Vec::new(),
            finished: false,
        }
    }

    /// Apply an operation inside the transaction
    ///
    /// A rejected operation leaves the transaction usable; earlier operations
    /// stay staged.
    pub fn execute(&mut self, op: Operation) -> Result<(), StorageError> {
        let steps = self.db.lock().state.apply(&op)?;
        self.undo.extend(steps);
        self.operations.push(op);
        Ok(())
    }

    /// Read the current state, including this transaction's staged rows
    pub fn read<R>(&self, f: impl FnOnce(&MaterializedState) -> R) -> R {
        self.db.read(f)
    }

    /// Number of staged operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Make the staged operations durable
    ///
    /// If the WAL append fails the staged operations are reverted.
    pub fn commit(mut self) -> Result<(), StorageError> {
        self.finished = true;
        let operations = std::mem::take(&mut self.operations);
        let undo = std::mem::take(&mut self.undo);
        if operations.is_empty() {
            return Ok(());
        }
        self.db.lock().append_or_revert(operations, undo)
    }

    /// Apply a final operation and commit, holding the database lock once
    ///
    /// Readers never see `last` before its WAL entry is written. If `last`
    /// is rejected or the append fails, every staged operation is reverted.
    pub fn commit_with(mut self, last: Operation) -> Result<(), StorageError> {
        self.finished = true;
        let mut operations = std::mem::take(&mut self.operations);
        let mut undo = std::mem::take(&mut self.undo);

        let mut inner = self.db.lock();
        match inner.state.apply(&last) {
            Ok(steps) => undo.extend(steps),
            Err(e) => {
                inner.revert(undo);
                return Err(e.into());
            }
        }
        operations.push(last);
        inner.append_or_revert(operations, undo)
    }

    /// Revert every staged operation
    pub fn rollback(mut self) {
        self.revert();
    }

    fn revert(&mut self) {
        self.finished = true;
        let undo = std::mem::take(&mut self.undo);
        if !undo.is_empty() {
            debug!(operations = self.operations.len(), "rolling back transaction");
            self.db.lock().revert(undo);
        }
        self.operations.clear();
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.revert();
        }
    }
}

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod tests;
