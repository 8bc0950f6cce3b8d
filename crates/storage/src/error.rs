// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storage errors

use crate::wal::WalReadError;
use depot_core::{DepotError, PublicationId};
use thiserror::Error;

/// A row-level rule rejected an operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },
    #[error("{constraint} already taken in publication {publication}: {value}")]
    UniqueViolation {
        publication: PublicationId,
        constraint: &'static str,
        value: String,
    },
    #[error("{0}")]
    Conflict(String),
}

/// Errors from the database and its write-ahead log
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("wal read error: {0}")]
    WalRead(#[from] WalReadError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl From<ApplyError> for DepotError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::NotFound { kind, id } => DepotError::NotFound { kind, id },
            ApplyError::AlreadyExists { .. } | ApplyError::Conflict(_) => {
                DepotError::Conflict(err.to_string())
            }
            ApplyError::UniqueViolation {
                publication,
                constraint,
                value,
            } => DepotError::DuplicatePath {
                publication,
                detail: format!("{} {}", constraint, value),
            },
        }
    }
}

impl From<StorageError> for DepotError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Apply(apply) => apply.into(),
            other => DepotError::TransactionAbort(other.to_string()),
        }
    }
}
