// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Distribution reader
//!
//! Serves complete publications only. An incomplete publication is reported
//! as not found, exactly like one that never existed.

use depot_core::{
    ContentArtifactId, DepotError, DistributionTarget, Publication, PublicationId, RepositoryId,
    RepositoryVersionId,
};
use depot_storage::{Database, MaterializedState, PublicationRecord};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a publication serves at a relative path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServedEntry {
    Metadata {
        relative_path: String,
        file: String,
    },
    Artifact {
        relative_path: String,
        content_artifact: ContentArtifactId,
    },
}

impl ServedEntry {
    pub fn relative_path(&self) -> &str {
        match self {
            ServedEntry::Metadata { relative_path, .. }
            | ServedEntry::Artifact { relative_path, .. } => relative_path,
        }
    }
}

/// Read-only view over complete publications
#[derive(Clone)]
pub struct Distribution {
    db: Arc<Database>,
}

impl Distribution {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Complete publications of a repository version, oldest first
    pub fn publications(&self, version: &RepositoryVersionId) -> Vec<Publication> {
        self.db.read(|s| {
            s.complete_publications(version)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    /// Newest complete publication of any version of a repository
    pub fn latest_publication(&self, repository: &RepositoryId) -> Option<Publication> {
        self.db.read(|s| {
            s.complete_publications_for_repository(repository)
                .last()
                .map(|p| (*p).clone())
        })
    }

    /// Complete publication served under a distribution's base path
    ///
    /// Fails with `NotFound` when no distribution owns the base path, when
    /// its publication was deleted, or when nothing complete is available.
    pub fn by_base_path(&self, base_path: &str) -> Result<Publication, DepotError> {
        self.db.read(|s| {
            let distribution = s
                .distribution_at(base_path)
                .ok_or_else(|| DepotError::not_found("distribution", base_path))?;

            let served = match &distribution.target {
                DistributionTarget::Publication {
                    publication: Some(id),
                } => complete(s, id).ok().map(|r| r.publication.clone()),
                DistributionTarget::Publication { publication: None } => None,
                DistributionTarget::Repository { repository } => s
                    .complete_publications_for_repository(repository)
                    .last()
                    .map(|p| (*p).clone()),
            };
            served.ok_or_else(|| DepotError::not_found("publication for base path", base_path))
        })
    }

    /// Resolve a relative path inside a complete publication
    ///
    /// Published metadata wins over published artifacts; pass-through
    /// publications fall back to the repository version's content.
    pub fn resolve(
        &self,
        publication: &PublicationId,
        relative_path: &str,
    ) -> Result<ServedEntry, DepotError> {
        self.db.read(|s| {
            let record = complete(s, publication)?;

            if let Some(m) = record.metadata_at(relative_path) {
                return Ok(ServedEntry::Metadata {
                    relative_path: m.relative_path.clone(),
                    file: m.file.clone(),
                });
            }
            if let Some(a) = record.artifact_at(relative_path) {
                return Ok(ServedEntry::Artifact {
                    relative_path: a.relative_path.clone(),
                    content_artifact: a.content_artifact.clone(),
                });
            }
            if record.publication.pass_through {
                let content = s
                    .repository_version(&record.publication.repository_version)
                    .and_then(|v| v.content.iter().find(|c| c.relative_path == relative_path));
                if let Some(c) = content {
                    return Ok(ServedEntry::Artifact {
                        relative_path: c.relative_path.clone(),
                        content_artifact: c.content_artifact.clone(),
                    });
                }
            }

            Err(DepotError::not_found(
                "path",
                format!("{}/{}", publication, relative_path),
            ))
        })
    }

    /// Every path a complete publication serves, sorted by path
    pub fn listing(&self, publication: &PublicationId) -> Result<Vec<ServedEntry>, DepotError> {
        self.db.read(|s| {
            let record = complete(s, publication)?;
            let mut entries: BTreeMap<String, ServedEntry> = BTreeMap::new();

            // Lowest precedence first so later inserts win
            if record.publication.pass_through {
                if let Some(version) = s.repository_version(&record.publication.repository_version)
                {
                    for c in &version.content {
                        entries.insert(
                            c.relative_path.clone(),
                            ServedEntry::Artifact {
                                relative_path: c.relative_path.clone(),
                                content_artifact: c.content_artifact.clone(),
                            },
                        );
                    }
                }
            }
            for a in record.artifacts() {
                entries.insert(
                    a.relative_path.clone(),
                    ServedEntry::Artifact {
                        relative_path: a.relative_path.clone(),
                        content_artifact: a.content_artifact.clone(),
                    },
                );
            }
            for m in record.metadata() {
                entries.insert(
                    m.relative_path.clone(),
                    ServedEntry::Metadata {
                        relative_path: m.relative_path.clone(),
                        file: m.file.clone(),
                    },
                );
            }

            Ok(entries.into_values().collect())
        })
    }
}

fn complete<'s>(
    state: &'s MaterializedState,
    id: &PublicationId,
) -> Result<&'s PublicationRecord, DepotError> {
    state
        .publication(id)
        .filter(|r| r.publication.complete)
        .ok_or_else(|| DepotError::not_found("publication", id))
}

#[cfg(test)]
#[path = "distribution_tests.rs"]
mod tests;
