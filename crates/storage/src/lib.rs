// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! depot-storage: durable state for tasks and publications
//!
//! A checksummed write-ahead log replayed into a [`MaterializedState`] that
//! enforces existence checks, uniqueness constraints and cascading deletes.
//! Publications are built through [`PublicationBuilder`] scopes.

mod database;
mod error;
mod operation;
mod publish;
mod state;
mod transaction;
pub mod wal;

pub use database::{Database, WAL_FILE};
pub use error::{ApplyError, StorageError};
pub use operation::Operation;
pub use publish::{delete_publication, publish, PublicationBuilder, ScopeError};
pub use state::{MaterializedState, PublicationRecord, Undo};
pub use transaction::Transaction;
