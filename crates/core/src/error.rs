// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain error taxonomy
//!
//! Lock and state violations surface synchronously as one of these variants.
//! `kind()` is the stable string recorded on failed tasks.

use crate::id::{PublicationId, TaskId};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the reservation scheduler, the task lifecycle and the
/// publication builder
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DepotError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(
        "task {task_id} waited {} without acquiring its resources",
        humantime::format_duration(*.waited)
    )]
    ResourceTimeout { task_id: TaskId, waited: Duration },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("duplicate path in publication {publication}: {detail}")]
    DuplicatePath {
        publication: PublicationId,
        detail: String,
    },

    #[error("publication transaction aborted: {0}")]
    TransactionAbort(String),
}

impl DepotError {
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        DepotError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable, machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            DepotError::InvalidRequest(_) => "invalid-request",
            DepotError::ResourceTimeout { .. } => "resource-timeout",
            DepotError::Conflict(_) => "conflict",
            DepotError::NotFound { .. } => "not-found",
            DepotError::DuplicatePath { .. } => "duplicate-path",
            DepotError::TransactionAbort(_) => "transaction-abort",
        }
    }
}
