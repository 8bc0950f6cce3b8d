// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-Ahead Log (WAL)
//!
//! Durable, append-only log of committed transactions. The database state is
//! derived by replaying entries.
//!
//! ```text
//! Transaction → WalEntry → WalWriter → disk (wal.jsonl)
//!                                          ↓
//!                                WalReader → replay → MaterializedState
//! ```
//!
//! - One entry per committed transaction, so a transaction is atomic on replay
//! - Every write is followed by `fsync()` before returning
//! - Checksums detect corruption; a truncated tail is detected on read

mod entry;
mod reader;
mod writer;

pub use entry::WalEntry;
pub use reader::{WalEntryIter, WalReadError, WalReader};
pub use writer::WalWriter;
