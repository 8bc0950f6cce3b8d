// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Publication model
//!
//! A publication is the servable snapshot of a repository version. It owns
//! its published artifact and metadata rows; deleting it deletes them.
//! Readers only ever look at publications with `complete == true`.

use crate::clock::Clock;
use crate::id::{
    ContentArtifactId, CreatedResourceId, DistributionId, PublicationId, PublisherId, RepositoryId,
    RepositoryVersionId, TaskId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A content artifact at a relative path inside a repository version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub content_artifact: ContentArtifactId,
    pub relative_path: String,
}

/// An immutable version of a repository's content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryVersion {
    pub id: RepositoryVersionId,
    pub repository: RepositoryId,
    pub number: u64,
    pub content: Vec<ContentEntry>,
}

/// A snapshot of a repository version prepared for distribution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub id: PublicationId,
    /// Flips to true exactly once, when the producing scope commits
    pub complete: bool,
    /// Serve every content artifact of the repository version directly
    pub pass_through: bool,
    pub repository_version: RepositoryVersionId,
    pub publisher: Option<PublisherId>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for opening a publication scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationRequest {
    pub repository_version: RepositoryVersionId,
    pub publisher: Option<PublisherId>,
    pub pass_through: bool,
    /// Task on whose behalf the publication is built, for provenance
    pub created_by: Option<TaskId>,
}

impl PublicationRequest {
    pub fn new(repository_version: impl Into<RepositoryVersionId>) -> Self {
        Self {
            repository_version: repository_version.into(),
            publisher: None,
            pass_through: false,
            created_by: None,
        }
    }

    pub fn publisher(mut self, publisher: impl Into<PublisherId>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    pub fn pass_through(mut self, pass_through: bool) -> Self {
        self.pass_through = pass_through;
        self
    }

    pub fn created_by(mut self, task_id: TaskId) -> Self {
        self.created_by = Some(task_id);
        self
    }

    /// Build the incomplete publication row
    pub fn into_publication(self, id: PublicationId, clock: &impl Clock) -> Publication {
        Publication {
            id,
            complete: false,
            pass_through: self.pass_through,
            repository_version: self.repository_version,
            publisher: self.publisher,
            created_at: clock.utc_now(),
        }
    }
}

/// A content artifact exposed by a publication
///
/// Unique per (publication, content_artifact) and per (publication, relative_path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub publication: PublicationId,
    pub content_artifact: ContentArtifactId,
    pub relative_path: String,
}

/// A generated metadata file exposed by a publication
///
/// Unique per (publication, file) and per (publication, relative_path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedMetadata {
    pub publication: PublicationId,
    /// Storage location of the metadata file
    pub file: String,
    pub relative_path: String,
}

/// What a distribution serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionTarget {
    /// A fixed publication; cleared when that publication is deleted
    Publication { publication: Option<PublicationId> },
    /// The newest complete publication of any version of the repository
    Repository { repository: RepositoryId },
}

/// Exposes a publication under a base path
///
/// Names and base paths are unique, and no base path may be a path-prefix
/// of another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRecord {
    pub id: DistributionId,
    pub name: String,
    pub base_path: String,
    pub target: DistributionTarget,
}

impl DistributionRecord {
    pub fn for_publication(
        id: impl Into<DistributionId>,
        name: impl Into<String>,
        base_path: impl Into<String>,
        publication: PublicationId,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_path: base_path.into(),
            target: DistributionTarget::Publication {
                publication: Some(publication),
            },
        }
    }

    pub fn for_repository(
        id: impl Into<DistributionId>,
        name: impl Into<String>,
        base_path: impl Into<String>,
        repository: RepositoryId,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            base_path: base_path.into(),
            target: DistributionTarget::Repository { repository },
        }
    }

    /// Whether either base path contains the other at a segment boundary
    pub fn overlaps(&self, base_path: &str) -> bool {
        paths_overlap(&self.base_path, base_path)
    }
}

fn paths_overlap(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    long.strip_prefix(short)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Kind of object a provenance record points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Publication,
    RepositoryVersion,
    Remote,
    Other,
}

/// Reference to a created domain object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub id: String,
}

impl ObjectRef {
    pub fn publication(id: &PublicationId) -> Self {
        Self {
            kind: ObjectKind::Publication,
            id: id.0.clone(),
        }
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ObjectKind::Publication => "publication",
            ObjectKind::RepositoryVersion => "repository_version",
            ObjectKind::Remote => "remote",
            ObjectKind::Other => "other",
        };
        write!(f, "{}/{}", kind, self.id)
    }
}

/// Provenance record: a task (or publication scope) created an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResource {
    pub id: CreatedResourceId,
    pub task_id: Option<TaskId>,
    pub object: ObjectRef,
}
