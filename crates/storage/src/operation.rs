// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row-level operations recorded in the write-ahead log

use depot_core::{
    CreatedResource, DistributionId, DistributionRecord, Publication, PublicationId,
    PublishedArtifact, PublishedMetadata, RepositoryVersion, RepositoryVersionId, Task, TaskId,
};
use serde::{Deserialize, Serialize};

/// A single change to the materialized state
///
/// Transactions group operations; a committed transaction is one WAL entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Insert or replace a task record
    TaskPut { task: Task },
    /// Delete a task and, by cascade, its created-resource records
    TaskDelete { id: TaskId },

    RepositoryVersionCreate { version: RepositoryVersion },
    /// Delete a repository version and, by cascade, its publications
    RepositoryVersionDelete { id: RepositoryVersionId },

    PublicationCreate { publication: Publication },
    /// Flip `complete` to true
    PublicationComplete { id: PublicationId },
    /// Delete a publication and, by cascade, its artifacts, metadata and
    /// created-resource records. Distributions serving it are cleared.
    PublicationDelete { id: PublicationId },
    PublishedArtifactCreate { artifact: PublishedArtifact },
    PublishedMetadataCreate { metadata: PublishedMetadata },

    CreatedResourceCreate { resource: CreatedResource },

    DistributionCreate { distribution: DistributionRecord },
    DistributionDelete { id: DistributionId },
}

impl Operation {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Operation::TaskPut { .. } => "task_put",
            Operation::TaskDelete { .. } => "task_delete",
            Operation::RepositoryVersionCreate { .. } => "repository_version_create",
            Operation::RepositoryVersionDelete { .. } => "repository_version_delete",
            Operation::PublicationCreate { .. } => "publication_create",
            Operation::PublicationComplete { .. } => "publication_complete",
            Operation::PublicationDelete { .. } => "publication_delete",
            Operation::PublishedArtifactCreate { .. } => "published_artifact_create",
            Operation::PublishedMetadataCreate { .. } => "published_metadata_create",
            Operation::CreatedResourceCreate { .. } => "created_resource_create",
            Operation::DistributionCreate { .. } => "distribution_create",
            Operation::DistributionDelete { .. } => "distribution_delete",
        }
    }
}
