// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WAL entry structure with checksum verification

use crate::operation::Operation;
use crate::StorageError;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One committed transaction in the write-ahead log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Monotonically increasing sequence number
    pub sequence: u64,
    /// Microseconds since Unix epoch
    pub timestamp_micros: u64,
    pub machine_id: String,
    /// The transaction's operations, in execution order
    pub operations: Vec<Operation>,
    /// CRC32 checksum of the serialized operations
    pub checksum: u32,
}

impl WalEntry {
    pub fn new(sequence: u64, machine_id: &str, operations: Vec<Operation>) -> Self {
        let checksum = Self::calculate_checksum(&operations);
        let timestamp_micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        Self {
            sequence,
            timestamp_micros,
            machine_id: machine_id.to_string(),
            operations,
            checksum,
        }
    }

    fn calculate_checksum(operations: &[Operation]) -> u32 {
        // Operations hold only strings, integers, bools, timestamps and enums
        let json = serde_json::to_string(operations).unwrap_or_default();
        crc32fast::hash(json.as_bytes())
    }

    pub fn verify(&self) -> bool {
        self.checksum == Self::calculate_checksum(&self.operations)
    }

    /// Serialize to a single line of JSON
    pub fn to_line(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(StorageError::from)
    }

    pub fn from_line(line: &str) -> Result<Self, StorageError> {
        serde_json::from_str(line).map_err(StorageError::from)
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
