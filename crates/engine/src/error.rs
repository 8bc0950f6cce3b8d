// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for worker logic

use depot_core::{DepotError, TaskError};
use depot_storage::StorageError;
use thiserror::Error;

/// Outcome of a job that did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// The job observed its cancellation flag and stopped
    #[error("canceled")]
    Canceled,
    #[error("{kind}: {description}")]
    Failed { kind: String, description: String },
}

impl JobError {
    pub fn failed(kind: impl Into<String>, description: impl Into<String>) -> Self {
        JobError::Failed {
            kind: kind.into(),
            description: description.into(),
        }
    }
}

impl From<DepotError> for JobError {
    fn from(err: DepotError) -> Self {
        JobError::failed(err.kind(), err.to_string())
    }
}

impl From<StorageError> for JobError {
    fn from(err: StorageError) -> Self {
        DepotError::from(err).into()
    }
}

impl From<JobError> for TaskError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Canceled => TaskError::new("canceled", "worker stopped without a cancel request"),
            JobError::Failed { kind, description } => TaskError::new(kind, description),
        }
    }
}
