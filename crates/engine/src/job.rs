// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker logic and the context it runs with

use crate::error::JobError;
use async_trait::async_trait;
use depot_core::{Clock, DepotError, IdGen, Publication, PublicationRequest, TaskId};
use depot_storage::{publish, Database, PublicationBuilder, ScopeError};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Domain logic executed by a worker once the task's reservations are held
#[async_trait]
pub trait Job<C: Clock, I: IdGen>: Send + Sync + 'static {
    async fn run(&self, ctx: TaskContext<C, I>) -> Result<(), JobError>;
}

/// Adapter turning an async closure into a [`Job`]
pub struct FnJob<F>(F);

pub fn job_fn<C, I, F, Fut>(f: F) -> FnJob<F>
where
    C: Clock,
    I: IdGen,
    F: Fn(TaskContext<C, I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    FnJob(f)
}

#[async_trait]
impl<C, I, F, Fut> Job<C, I> for FnJob<F>
where
    C: Clock,
    I: IdGen,
    F: Fn(TaskContext<C, I>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext<C, I>) -> Result<(), JobError> {
        (self.0)(ctx).await
    }
}

/// Handle given to a running job
///
/// Cancellation is cooperative: long-running jobs call [`checkpoint`] at
/// points where stopping is safe.
///
/// [`checkpoint`]: TaskContext::checkpoint
pub struct TaskContext<C: Clock, I: IdGen> {
    task_id: TaskId,
    db: Arc<Database>,
    cancel: Arc<AtomicBool>,
    clock: C,
    ids: I,
}

impl<C: Clock, I: IdGen> TaskContext<C, I> {
    pub(crate) fn new(
        task_id: TaskId,
        db: Arc<Database>,
        cancel: Arc<AtomicBool>,
        clock: C,
        ids: I,
    ) -> Self {
        Self {
            task_id,
            db,
            cancel,
            clock,
            ids,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Whether cancellation was requested
    pub fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Return `Err(JobError::Canceled)` once cancellation was requested
    pub fn checkpoint(&self) -> Result<(), JobError> {
        if self.is_canceled() {
            tracing::debug!(task_id = %self.task_id, "cancellation observed");
            return Err(JobError::Canceled);
        }
        Ok(())
    }

    /// Open a publication scope recorded as created by this task
    pub fn begin_publication(
        &self,
        request: PublicationRequest,
    ) -> Result<PublicationBuilder<'_>, DepotError> {
        let request = request.created_by(self.task_id.clone());
        PublicationBuilder::begin(&self.db, request, &self.ids, &self.clock)
    }

    /// Build a publication in a closure scope, recorded as created by this task
    pub fn publish<T, F>(
        &self,
        request: PublicationRequest,
        build: F,
    ) -> Result<(Publication, T), DepotError>
    where
        F: FnOnce(&mut PublicationBuilder<'_>) -> Result<T, ScopeError>,
    {
        let request = request.created_by(self.task_id.clone());
        publish(&self.db, request, &self.ids, &self.clock, build)
    }
}
