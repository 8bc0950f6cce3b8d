// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Publication scopes
//!
//! A [`PublicationBuilder`] is a guard over one publication attempt. The
//! incomplete row and its provenance record are committed when the guard is
//! created; artifacts and metadata are staged in the guard's transaction.
//!
//! - [`PublicationBuilder::finish`] flips `complete` and commits the staged rows
//!   in the same WAL entry
//! - Dropping the guard, or [`PublicationBuilder::abort`], rolls the staged rows
//!   back and deletes the publication with everything it owns
//!
//! A crash between the two leaves an incomplete row behind; the
//! reconciliation sweep removes it after a grace period.

use crate::database::Database;
use crate::operation::Operation;
use crate::transaction::Transaction;
use depot_core::{
    trace_event, Clock, ContentArtifactId, CreatedResource, CreatedResourceId, DepotError, Event,
    IdGen, ObjectRef, Publication, PublicationId, PublicationRequest, PublishedArtifact,
    PublishedMetadata,
};
use tracing::warn;

/// Error type accepted from [`publish`] closures
pub type ScopeError = Box<dyn std::error::Error + Send + Sync>;

/// Guard over a publication under construction
pub struct PublicationBuilder<'db> {
    db: &'db Database,
    publication: Publication,
    /// `None` once the scope has committed or aborted
    staged: Option<Transaction<'db>>,
    artifacts: usize,
    metadata: usize,
}

impl<'db> PublicationBuilder<'db> {
    /// Open a publication scope for a repository version
    ///
    /// Fails with `NotFound` if the repository version does not exist.
    pub fn begin(
        db: &'db Database,
        request: PublicationRequest,
        ids: &impl IdGen,
        clock: &impl Clock,
    ) -> Result<Self, DepotError> {
        let task_id = request.created_by.clone();
        let publication = request.into_publication(PublicationId::new(ids.next()), clock);
        let provenance = CreatedResource {
            id: CreatedResourceId::new(ids.next()),
            task_id,
            object: ObjectRef::publication(&publication.id),
        };

        {
            let mut inner = db.lock();
            inner.commit(vec![
                Operation::PublicationCreate {
                    publication: publication.clone(),
                },
                Operation::CreatedResourceCreate {
                    resource: provenance,
                },
            ])?;
            inner.live_publications.insert(publication.id.clone());
        }

        trace_event(&Event::PublicationStarted {
            id: publication.id.clone(),
            repository_version: publication.repository_version.clone(),
        });

        Ok(Self {
            db,
            publication,
            staged: Some(db.transaction()),
            artifacts: 0,
            metadata: 0,
        })
    }

    pub fn id(&self) -> &PublicationId {
        &self.publication.id
    }

    pub fn publication(&self) -> &Publication {
        &self.publication
    }

    /// Expose a content artifact at a relative path
    ///
    /// Fails with `DuplicatePath` if the path or the artifact is already
    /// published in this publication; nothing is staged in that case.
    pub fn add_artifact(
        &mut self,
        content_artifact: impl Into<ContentArtifactId>,
        relative_path: impl Into<String>,
    ) -> Result<(), DepotError> {
        let op = Operation::PublishedArtifactCreate {
            artifact: PublishedArtifact {
                publication: self.publication.id.clone(),
                content_artifact: content_artifact.into(),
                relative_path: relative_path.into(),
            },
        };
        self.stage(op)?;
        self.artifacts += 1;
        Ok(())
    }

    /// Expose a generated metadata file at a relative path
    pub fn add_metadata_file(
        &mut self,
        file: impl Into<String>,
        relative_path: impl Into<String>,
    ) -> Result<(), DepotError> {
        let op = Operation::PublishedMetadataCreate {
            metadata: PublishedMetadata {
                publication: self.publication.id.clone(),
                file: file.into(),
                relative_path: relative_path.into(),
            },
        };
        self.stage(op)?;
        self.metadata += 1;
        Ok(())
    }

    fn stage(&mut self, op: Operation) -> Result<(), DepotError> {
        let txn = self.staged.as_mut().ok_or_else(|| {
            DepotError::Conflict(format!("publication {} is closed", self.publication.id))
        })?;
        txn.execute(op).map_err(DepotError::from)
    }

    /// Commit: mark the publication complete together with its staged rows
    ///
    /// If the commit fails the publication is aborted and the error returned.
    pub fn finish(mut self) -> Result<Publication, DepotError> {
        let Some(txn) = self.staged.take() else {
            return Err(DepotError::Conflict(format!(
                "publication {} is closed",
                self.publication.id
            )));
        };

        let committed = txn.commit_with(Operation::PublicationComplete {
            id: self.publication.id.clone(),
        });

        if let Err(e) = committed {
            let err = DepotError::from(e);
            self.discard(&err.to_string());
            return Err(err);
        }

        self.db
            .lock()
            .live_publications
            .remove(&self.publication.id);
        trace_event(&Event::PublicationCompleted {
            id: self.publication.id.clone(),
            artifacts: self.artifacts,
            metadata: self.metadata,
        });

        self.publication.complete = true;
        Ok(self.publication.clone())
    }

    /// Abort: roll back staged rows and delete the publication
    pub fn abort(mut self, reason: &str) {
        if let Some(txn) = self.staged.take() {
            txn.rollback();
            self.discard(reason);
        }
    }

    /// Delete the committed incomplete row (cascading to its provenance)
    fn discard(&mut self, reason: &str) {
        let id = self.publication.id.clone();
        let deleted = {
            let mut inner = self.db.lock();
            inner.live_publications.remove(&id);
            inner.commit(vec![Operation::PublicationDelete { id: id.clone() }])
        };

        if let Err(e) = deleted {
            warn!(publication_id = %id, error = %e, "failed to delete aborted publication");
        }
        trace_event(&Event::PublicationAborted {
            id,
            reason: reason.to_string(),
        });
    }
}

impl Drop for PublicationBuilder<'_> {
    fn drop(&mut self) {
        if let Some(txn) = self.staged.take() {
            txn.rollback();
            let reason = if std::thread::panicking() {
                "panicked"
            } else {
                "dropped without finish"
            };
            self.discard(reason);
        }
    }
}

/// Run `build` inside a publication scope
///
/// Commits when `build` returns `Ok`, aborts on `Err`. Depot errors are
/// returned as they are; anything else becomes `TransactionAbort`.
pub fn publish<T, F>(
    db: &Database,
    request: PublicationRequest,
    ids: &impl IdGen,
    clock: &impl Clock,
    build: F,
) -> Result<(Publication, T), DepotError>
where
    F: FnOnce(&mut PublicationBuilder<'_>) -> Result<T, ScopeError>,
{
    let mut builder = PublicationBuilder::begin(db, request, ids, clock)?;
    match build(&mut builder) {
        Ok(value) => {
            let publication = builder.finish()?;
            Ok((publication, value))
        }
        Err(err) => {
            let err = match err.downcast::<DepotError>() {
                Ok(depot) => *depot,
                Err(other) => DepotError::TransactionAbort(other.to_string()),
            };
            builder.abort(&err.to_string());
            Err(err)
        }
    }
}

/// Delete a publication with its artifacts, metadata and provenance
///
/// Publications still being built in this process are rejected with
/// `Conflict`; abort their scope instead.
pub fn delete_publication(db: &Database, id: &PublicationId) -> Result<(), DepotError> {
    let mut inner = db.lock();
    if inner.live_publications.contains(id) {
        return Err(DepotError::Conflict(format!(
            "publication {} is still being built",
            id
        )));
    }
    inner.commit(vec![Operation::PublicationDelete { id: id.clone() }])?;
    Ok(())
}

#[cfg(test)]
#[path = "publish_tests.rs"]
mod tests;
