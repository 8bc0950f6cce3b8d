// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay
//!
//! The row rules live here: existence checks, uniqueness constraints and
//! cascading deletes. [`MaterializedState::apply`] either rejects an operation
//! without touching the state, or applies it fully and returns the steps that
//! undo it.

use crate::error::ApplyError;
use crate::operation::Operation;
use chrono::{DateTime, Utc};
use depot_core::{
    ContentArtifactId, CreatedResource, CreatedResourceId, DistributionId, DistributionRecord,
    DistributionTarget, ObjectKind, ObjectRef, Publication, PublicationId, PublishedArtifact,
    PublishedMetadata, RepositoryId, RepositoryVersion, RepositoryVersionId, Task, TaskId,
};
use std::collections::BTreeMap;

/// A publication and the rows it owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationRecord {
    pub publication: Publication,
    /// Keyed by relative path
    artifacts: BTreeMap<String, PublishedArtifact>,
    /// Keyed by relative path
    metadata: BTreeMap<String, PublishedMetadata>,
}

impl PublicationRecord {
    fn new(publication: Publication) -> Self {
        Self {
            publication,
            artifacts: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &PublishedArtifact> {
        self.artifacts.values()
    }

    pub fn metadata(&self) -> impl Iterator<Item = &PublishedMetadata> {
        self.metadata.values()
    }

    pub fn artifact_at(&self, relative_path: &str) -> Option<&PublishedArtifact> {
        self.artifacts.get(relative_path)
    }

    pub fn metadata_at(&self, relative_path: &str) -> Option<&PublishedMetadata> {
        self.metadata.get(relative_path)
    }

    fn has_content_artifact(&self, id: &ContentArtifactId) -> bool {
        self.artifacts.values().any(|a| &a.content_artifact == id)
    }

    fn has_file(&self, file: &str) -> bool {
        self.metadata.values().any(|m| m.file == file)
    }
}

/// One step that reverses part of an applied operation
#[derive(Debug, Clone)]
pub enum Undo {
    Task {
        id: TaskId,
        previous: Option<Task>,
    },
    RepositoryVersion {
        id: RepositoryVersionId,
        previous: Option<RepositoryVersion>,
    },
    Publication {
        id: PublicationId,
        previous: Option<Box<PublicationRecord>>,
    },
    Completion {
        id: PublicationId,
    },
    Artifact {
        publication: PublicationId,
        relative_path: String,
    },
    Metadata {
        publication: PublicationId,
        relative_path: String,
    },
    CreatedResource {
        id: CreatedResourceId,
        previous: Option<CreatedResource>,
    },
    Distribution {
        id: DistributionId,
        previous: Option<DistributionRecord>,
    },
}

/// Materialized state built from WAL operations
#[derive(Debug, Default)]
pub struct MaterializedState {
    tasks: BTreeMap<TaskId, Task>,
    repository_versions: BTreeMap<RepositoryVersionId, RepositoryVersion>,
    publications: BTreeMap<PublicationId, PublicationRecord>,
    created_resources: BTreeMap<CreatedResourceId, CreatedResource>,
    distributions: BTreeMap<DistributionId, DistributionRecord>,
}

impl MaterializedState {
    /// Apply an operation, returning the steps that reverse it
    ///
    /// Undo steps must be reverted last-first.
    pub fn apply(&mut self, op: &Operation) -> Result<Vec<Undo>, ApplyError> {
        match op {
            Operation::TaskPut { task } => {
                let previous = self.tasks.insert(task.id.clone(), task.clone());
                Ok(vec![Undo::Task {
                    id: task.id.clone(),
                    previous,
                }])
            }

            Operation::TaskDelete { id } => {
                let task = self
                    .tasks
                    .get(id)
                    .ok_or_else(|| not_found("task", id.as_str()))?;
                if task.is_active() {
                    return Err(ApplyError::Conflict(format!(
                        "task {} is {}; cancel it first",
                        id, task.state
                    )));
                }

                let mut undo = self.cascade_created_resources(|r| r.task_id.as_ref() == Some(id));
                let previous = self.tasks.remove(id);
                undo.push(Undo::Task {
                    id: id.clone(),
                    previous,
                });
                Ok(undo)
            }

            Operation::RepositoryVersionCreate { version } => {
                if self.repository_versions.contains_key(&version.id) {
                    return Err(already_exists("repository version", version.id.as_str()));
                }
                self.repository_versions
                    .insert(version.id.clone(), version.clone());
                Ok(vec![Undo::RepositoryVersion {
                    id: version.id.clone(),
                    previous: None,
                }])
            }

            Operation::RepositoryVersionDelete { id } => {
                if !self.repository_versions.contains_key(id) {
                    return Err(not_found("repository version", id.as_str()));
                }

                let doomed: Vec<PublicationId> = self
                    .publications
                    .values()
                    .filter(|r| &r.publication.repository_version == id)
                    .map(|r| r.publication.id.clone())
                    .collect();

                let mut undo = Vec::new();
                for publication in &doomed {
                    undo.extend(self.remove_publication(publication));
                }
                let object = ObjectRef {
                    kind: ObjectKind::RepositoryVersion,
                    id: id.0.clone(),
                };
                undo.extend(self.cascade_created_resources(|r| r.object == object));
                let previous = self.repository_versions.remove(id);
                undo.push(Undo::RepositoryVersion {
                    id: id.clone(),
                    previous,
                });
                Ok(undo)
            }

            Operation::PublicationCreate { publication } => {
                if self.publications.contains_key(&publication.id) {
                    return Err(already_exists("publication", publication.id.as_str()));
                }
                if !self
                    .repository_versions
                    .contains_key(&publication.repository_version)
                {
                    return Err(not_found(
                        "repository version",
                        publication.repository_version.as_str(),
                    ));
                }
                self.publications.insert(
                    publication.id.clone(),
                    PublicationRecord::new(publication.clone()),
                );
                Ok(vec![Undo::Publication {
                    id: publication.id.clone(),
                    previous: None,
                }])
            }

            Operation::PublicationComplete { id } => {
                let record = self
                    .publications
                    .get_mut(id)
                    .ok_or_else(|| not_found("publication", id.as_str()))?;
                if record.publication.complete {
                    return Err(ApplyError::Conflict(format!(
                        "publication {} is already complete",
                        id
                    )));
                }
                record.publication.complete = true;
                Ok(vec![Undo::Completion { id: id.clone() }])
            }

            Operation::PublicationDelete { id } => {
                if !self.publications.contains_key(id) {
                    return Err(not_found("publication", id.as_str()));
                }
                Ok(self.remove_publication(id))
            }

            Operation::PublishedArtifactCreate { artifact } => {
                let record = self.open_publication(&artifact.publication)?;
                if record.artifacts.contains_key(&artifact.relative_path) {
                    return Err(unique_violation(
                        &artifact.publication,
                        "relative_path",
                        &artifact.relative_path,
                    ));
                }
                if record.has_content_artifact(&artifact.content_artifact) {
                    return Err(unique_violation(
                        &artifact.publication,
                        "content_artifact",
                        artifact.content_artifact.as_str(),
                    ));
                }
                record
                    .artifacts
                    .insert(artifact.relative_path.clone(), artifact.clone());
                Ok(vec![Undo::Artifact {
                    publication: artifact.publication.clone(),
                    relative_path: artifact.relative_path.clone(),
                }])
            }

            Operation::PublishedMetadataCreate { metadata } => {
                let record = self.open_publication(&metadata.publication)?;
                if record.metadata.contains_key(&metadata.relative_path) {
                    return Err(unique_violation(
                        &metadata.publication,
                        "relative_path",
                        &metadata.relative_path,
                    ));
                }
                if record.has_file(&metadata.file) {
                    return Err(unique_violation(
                        &metadata.publication,
                        "file",
                        &metadata.file,
                    ));
                }
                record
                    .metadata
                    .insert(metadata.relative_path.clone(), metadata.clone());
                Ok(vec![Undo::Metadata {
                    publication: metadata.publication.clone(),
                    relative_path: metadata.relative_path.clone(),
                }])
            }

            Operation::CreatedResourceCreate { resource } => {
                if self.created_resources.contains_key(&resource.id) {
                    return Err(already_exists("created resource", resource.id.as_str()));
                }
                self.created_resources
                    .insert(resource.id.clone(), resource.clone());
                Ok(vec![Undo::CreatedResource {
                    id: resource.id.clone(),
                    previous: None,
                }])
            }

            Operation::DistributionCreate { distribution } => {
                self.check_distribution(distribution)?;
                self.distributions
                    .insert(distribution.id.clone(), distribution.clone());
                Ok(vec![Undo::Distribution {
                    id: distribution.id.clone(),
                    previous: None,
                }])
            }

            Operation::DistributionDelete { id } => {
                let previous = self
                    .distributions
                    .remove(id)
                    .ok_or_else(|| not_found("distribution", id.as_str()))?;
                Ok(vec![Undo::Distribution {
                    id: id.clone(),
                    previous: Some(previous),
                }])
            }
        }
    }

    /// Reverse one undo step
    pub fn revert(&mut self, undo: Undo) {
        match undo {
            Undo::Task { id, previous } => restore(&mut self.tasks, id, previous),
            Undo::RepositoryVersion { id, previous } => {
                restore(&mut self.repository_versions, id, previous)
            }
            Undo::Publication { id, previous } => {
                restore(&mut self.publications, id, previous.map(|r| *r))
            }
            Undo::Completion { id } => {
                if let Some(record) = self.publications.get_mut(&id) {
                    record.publication.complete = false;
                }
            }
            Undo::Artifact {
                publication,
                relative_path,
            } => {
                if let Some(record) = self.publications.get_mut(&publication) {
                    record.artifacts.remove(&relative_path);
                }
            }
            Undo::Metadata {
                publication,
                relative_path,
            } => {
                if let Some(record) = self.publications.get_mut(&publication) {
                    record.metadata.remove(&relative_path);
                }
            }
            Undo::CreatedResource { id, previous } => {
                restore(&mut self.created_resources, id, previous)
            }
            Undo::Distribution { id, previous } => {
                restore(&mut self.distributions, id, previous)
            }
        }
    }

    /// Incomplete publication that still accepts artifact and metadata rows
    fn open_publication(
        &mut self,
        id: &PublicationId,
    ) -> Result<&mut PublicationRecord, ApplyError> {
        let record = self
            .publications
            .get_mut(id)
            .ok_or_else(|| not_found("publication", id.as_str()))?;
        if record.publication.complete {
            return Err(ApplyError::Conflict(format!(
                "publication {} is complete and immutable",
                id
            )));
        }
        Ok(record)
    }

    fn check_distribution(&self, distribution: &DistributionRecord) -> Result<(), ApplyError> {
        if self.distributions.contains_key(&distribution.id) {
            return Err(already_exists("distribution", distribution.id.as_str()));
        }
        if distribution.base_path.trim_matches('/').is_empty() {
            return Err(ApplyError::Conflict(format!(
                "distribution {} needs a base path",
                distribution.id
            )));
        }
        for other in self.distributions.values() {
            if other.name == distribution.name {
                return Err(ApplyError::Conflict(format!(
                    "distribution name {} is taken by {}",
                    distribution.name, other.id
                )));
            }
            if other.overlaps(&distribution.base_path) {
                return Err(ApplyError::Conflict(format!(
                    "base path {} overlaps {} of distribution {}",
                    distribution.base_path, other.base_path, other.id
                )));
            }
        }
        if let DistributionTarget::Publication {
            publication: Some(publication),
        } = &distribution.target
        {
            if !self.publications.contains_key(publication) {
                return Err(not_found("publication", publication.as_str()));
            }
        }
        Ok(())
    }

    fn remove_publication(&mut self, id: &PublicationId) -> Vec<Undo> {
        let object = ObjectRef::publication(id);
        let mut undo = self.cascade_created_resources(|r| r.object == object);
        undo.extend(self.clear_distributions_of(id));
        if let Some(record) = self.publications.remove(id) {
            undo.push(Undo::Publication {
                id: id.clone(),
                previous: Some(Box::new(record)),
            });
        }
        undo
    }

    fn clear_distributions_of(&mut self, publication: &PublicationId) -> Vec<Undo> {
        let mut undo = Vec::new();
        for distribution in self.distributions.values_mut() {
            let serves = matches!(
                &distribution.target,
                DistributionTarget::Publication { publication: Some(p) } if p == publication
            );
            if !serves {
                continue;
            }
            let previous = distribution.clone();
            distribution.target = DistributionTarget::Publication { publication: None };
            undo.push(Undo::Distribution {
                id: previous.id.clone(),
                previous: Some(previous),
            });
        }
        undo
    }

    fn cascade_created_resources(
        &mut self,
        matches: impl Fn(&CreatedResource) -> bool,
    ) -> Vec<Undo> {
        let doomed: Vec<CreatedResourceId> = self
            .created_resources
            .values()
            .filter(|r| matches(r))
            .map(|r| r.id.clone())
            .collect();

        doomed
            .into_iter()
            .map(|id| {
                let previous = self.created_resources.remove(&id);
                Undo::CreatedResource { id, previous }
            })
            .collect()
    }

    // Queries

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// All tasks, oldest submission first
    pub fn tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<_> = self.tasks.values().collect();
        tasks.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        tasks
    }

    pub fn repository_version(&self, id: &RepositoryVersionId) -> Option<&RepositoryVersion> {
        self.repository_versions.get(id)
    }

    /// Any publication, complete or not
    pub fn publication(&self, id: &PublicationId) -> Option<&PublicationRecord> {
        self.publications.get(id)
    }

    /// Complete publications of a repository version, oldest first
    pub fn complete_publications(&self, version: &RepositoryVersionId) -> Vec<&Publication> {
        self.complete_where(|p| &p.repository_version == version)
    }

    /// Complete publications across every version of a repository, oldest first
    pub fn complete_publications_for_repository(
        &self,
        repository: &RepositoryId,
    ) -> Vec<&Publication> {
        self.complete_where(|p| {
            self.repository_versions
                .get(&p.repository_version)
                .is_some_and(|v| &v.repository == repository)
        })
    }

    fn complete_where(&self, keep: impl Fn(&Publication) -> bool) -> Vec<&Publication> {
        let mut found: Vec<_> = self
            .publications
            .values()
            .map(|r| &r.publication)
            .filter(|p| p.complete && keep(p))
            .collect();
        found.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        found
    }

    /// Incomplete publications created before `cutoff`
    pub fn incomplete_publications_before(&self, cutoff: DateTime<Utc>) -> Vec<PublicationId> {
        self.publications
            .values()
            .map(|r| &r.publication)
            .filter(|p| !p.complete && p.created_at < cutoff)
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn distribution(&self, id: &DistributionId) -> Option<&DistributionRecord> {
        self.distributions.get(id)
    }

    pub fn distributions(&self) -> impl Iterator<Item = &DistributionRecord> {
        self.distributions.values()
    }

    /// Distribution whose base path is exactly `base_path`
    pub fn distribution_at(&self, base_path: &str) -> Option<&DistributionRecord> {
        self.distributions
            .values()
            .find(|d| d.base_path == base_path)
    }

    pub fn created_resources(&self) -> impl Iterator<Item = &CreatedResource> {
        self.created_resources.values()
    }

    pub fn created_resources_for_task(&self, task_id: &TaskId) -> Vec<&CreatedResource> {
        self.created_resources
            .values()
            .filter(|r| r.task_id.as_ref() == Some(task_id))
            .collect()
    }

    pub fn created_resources_for_object(&self, object: &ObjectRef) -> Vec<&CreatedResource> {
        self.created_resources
            .values()
            .filter(|r| &r.object == object)
            .collect()
    }
}

fn restore<K: Ord, V>(map: &mut BTreeMap<K, V>, key: K, previous: Option<V>) {
    match previous {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}

fn not_found(kind: &'static str, id: &str) -> ApplyError {
    ApplyError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn already_exists(kind: &'static str, id: &str) -> ApplyError {
    ApplyError::AlreadyExists {
        kind,
        id: id.to_string(),
    }
}

fn unique_violation(publication: &PublicationId, constraint: &'static str, value: &str) -> ApplyError {
    ApplyError::UniqueViolation {
        publication: publication.clone(),
        constraint,
        value: value.to_string(),
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
