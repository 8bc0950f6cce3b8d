// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle manager
//!
//! The [`Engine`] owns the reservation scheduler (the arbiter, behind one
//! `std::sync::Mutex` that is never held across an await), persists every
//! task transition, and runs dispatched tasks on tokio workers.

use crate::distribution::Distribution;
use crate::error::JobError;
use crate::executor::{Arbiter, Launch};
use crate::job::{Job, TaskContext};
use depot_core::{
    trace_event, Clock, CreatedResource, DepotConfig, DepotError, Event, IdGen, PublicationId,
    ReservationScheduler, ResourceRequest, Task, TaskError, TaskEvent, TaskId, TaskState,
};
use depot_storage::{Database, Operation};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Error kind given to tasks whose worker vanished with a previous process
pub const WORKER_LOST: &str = "worker-lost";

pub(crate) struct Shared<C: Clock, I: IdGen> {
    pub(crate) db: Arc<Database>,
    pub(crate) clock: C,
    pub(crate) ids: I,
    publication_grace: Duration,
    arbiter: Mutex<Arbiter<C, I>>,
}

/// Async task lifecycle manager
///
/// Cloning is cheap; clones share the same arbiter. Methods that may start
/// tasks must be called from within a tokio runtime.
pub struct Engine<C: Clock, I: IdGen> {
    shared: Arc<Shared<C, I>>,
}

impl<C: Clock, I: IdGen> Clone for Engine<C, I> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Clock, I: IdGen> Engine<C, I> {
    pub fn new(db: Arc<Database>, config: &DepotConfig, clock: C, ids: I) -> Self {
        let scheduler = ReservationScheduler::new(config.scheduler.acquire_timeout)
            .with_capacity(config.engine.workers);

        Self {
            shared: Arc::new(Shared {
                db,
                clock,
                ids,
                publication_grace: config.engine.publication_grace,
                arbiter: Mutex::new(Arbiter::new(scheduler)),
            }),
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.shared.db
    }

    /// Read-only view over complete publications
    pub fn distribution(&self) -> Distribution {
        Distribution::new(Arc::clone(&self.shared.db))
    }

    /// Persist a new task, reserve its resources and run a dispatch pass
    ///
    /// Fails with `InvalidRequest` for a malformed resource set; nothing is
    /// persisted in that case.
    pub fn submit(
        &self,
        name: impl Into<String>,
        resources: Vec<ResourceRequest>,
        job: impl Job<C, I>,
    ) -> Result<TaskId, DepotError> {
        let shared = &self.shared;
        let resources = ReservationScheduler::normalize(resources)?;
        let task = Task::new(shared.ids.next(), name, resources.clone(), &shared.clock);
        let task_id = task.id.clone();
        let name = task.name.clone();

        let launches = {
            let mut arbiter = shared.lock();
            let queued = arbiter
                .scheduler
                .reserve(task_id.clone(), resources, &shared.clock)?;

            if let Err(e) = shared.db.execute(Operation::TaskPut { task }) {
                arbiter.scheduler.cancel_waiting(&task_id, &shared.clock);
                return Err(e.into());
            }

            trace_event(&Event::TaskWaiting {
                id: task_id.clone(),
                name,
            });
            arbiter.pending.insert(task_id.clone(), Arc::new(job));
            let (watcher, _) = watch::channel(TaskState::Waiting);
            arbiter.watchers.insert(task_id.clone(), watcher);

            let mut launches = Vec::new();
            shared.execute_effects(&mut arbiter, queued, &mut launches);
            let dispatched = arbiter.scheduler.dispatch(&shared.clock);
            shared.start(&mut arbiter, dispatched, &mut launches);
            launches
        };

        shared.spawn_all(launches);
        Ok(task_id)
    }

    /// Ask a task to stop
    ///
    /// Waiting tasks are canceled at once and never run. Running tasks get
    /// their cancellation flag raised and move to `canceling`; the worker
    /// finishes the transition. Terminal tasks are left as they are.
    pub fn request_cancel(&self, id: &TaskId) -> Result<TaskState, DepotError> {
        let shared = &self.shared;
        let (state, launches) = {
            let mut arbiter = shared.lock();
            let task = shared
                .db
                .read(|s| s.task(id).cloned())
                .ok_or_else(|| DepotError::not_found("task", id))?;
            if task.is_terminal() || task.state == TaskState::Canceling {
                return Ok(task.state);
            }

            let mut launches = Vec::new();
            let task = shared.apply_event(&mut arbiter, id, TaskEvent::RequestCancel, &mut launches)?;
            (task.state, launches)
        };

        shared.spawn_all(launches);
        Ok(state)
    }

    /// Delete a task record and its created-resource entries
    ///
    /// Fails with `Conflict` while the task is running or canceling.
    pub fn delete(&self, id: &TaskId) -> Result<(), DepotError> {
        let shared = &self.shared;
        let launches = {
            let mut arbiter = shared.lock();
            let task = shared
                .db
                .read(|s| s.task(id).cloned())
                .ok_or_else(|| DepotError::not_found("task", id))?;
            task.ensure_deletable()?;

            shared
                .db
                .execute(Operation::TaskDelete { id: id.clone() })?;
            arbiter.watchers.remove(id);
            trace_event(&Event::TaskDeleted { id: id.clone() });

            let mut launches = Vec::new();
            if task.is_waiting() {
                arbiter.pending.remove(id);
                if let Some(dispatched) = arbiter.scheduler.cancel_waiting(id, &shared.clock) {
                    shared.start(&mut arbiter, dispatched, &mut launches);
                }
            }
            launches
        };

        shared.spawn_all(launches);
        Ok(())
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.shared.db.read(|s| s.task(id).cloned())
    }

    /// All tasks, oldest submission first
    pub fn list(&self) -> Vec<Task> {
        self.shared
            .db
            .read(|s| s.tasks().into_iter().cloned().collect())
    }

    /// Provenance records owned by a task
    pub fn created_resources(&self, id: &TaskId) -> Vec<CreatedResource> {
        self.shared.db.read(|s| {
            s.created_resources_for_task(id)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    /// Resolve once the task reaches a terminal state
    ///
    /// Fails with `NotFound` for unknown tasks, including tasks deleted while
    /// being waited on.
    pub async fn wait(&self, id: &TaskId) -> Result<Task, DepotError> {
        let receiver = {
            let arbiter = self.shared.lock();
            arbiter.watchers.get(id).map(|w| w.subscribe())
        };

        if let Some(mut receiver) = receiver {
            // An error means the sender is gone: terminal or deleted
            let _ = receiver.wait_for(|state| state.is_terminal()).await;
        }

        self.get(id).ok_or_else(|| DepotError::not_found("task", id))
    }

    /// Number of tasks waiting for reservations
    pub fn queue_len(&self) -> usize {
        self.shared.lock().scheduler.queue_len()
    }

    /// Number of tasks a worker is executing
    pub fn running_len(&self) -> usize {
        self.shared.lock().running.len()
    }

    /// Fail every queued task that waited longer than the acquisition timeout
    pub fn expire_waiting(&self) -> Vec<TaskId> {
        self.shared.expire_waiting()
    }

    /// Settle tasks left active by a previous process
    ///
    /// Their workers and in-memory reservations are gone. Waiting and running
    /// tasks fail with kind `worker-lost`; canceling tasks end canceled.
    pub fn recover(&self) -> Result<Vec<TaskId>, DepotError> {
        let shared = &self.shared;
        let (stale, launches) = {
            let mut arbiter = shared.lock();
            let stale: Vec<TaskId> = shared.db.read(|s| {
                s.tasks()
                    .into_iter()
                    .filter(|t| !t.is_terminal())
                    .map(|t| t.id.clone())
                    .filter(|id| !arbiter.watchers.contains_key(id))
                    .collect()
            });

            let mut launches = Vec::new();
            let mut failed = None;
            for id in &stale {
                let error = TaskError::new(WORKER_LOST, "worker exited with a previous process");
                let event = TaskEvent::Fail { error };
                if let Err(e) = shared.apply_event(&mut arbiter, id, event, &mut launches) {
                    failed = Some(e);
                    break;
                }
            }
            // Launches already granted must still run even if a later record failed
            if let Some(e) = failed {
                drop(arbiter);
                shared.spawn_all(launches);
                return Err(e);
            }
            (stale, launches)
        };

        shared.spawn_all(launches);
        if !stale.is_empty() {
            tracing::info!(count = stale.len(), "recovered stale tasks");
        }
        Ok(stale)
    }

    /// Delete incomplete publications older than the grace period
    ///
    /// Publications whose builder is still open in this process are kept.
    pub fn sweep_incomplete_publications(&self) -> Result<Vec<PublicationId>, DepotError> {
        let shared = &self.shared;
        let grace = chrono::Duration::from_std(shared.publication_grace)
            .unwrap_or(chrono::Duration::MAX);
        let cutoff = shared
            .clock
            .utc_now()
            .checked_sub_signed(grace)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);

        let swept = shared.db.sweep_incomplete_publications(cutoff)?;
        for id in &swept {
            trace_event(&Event::PublicationSwept { id: id.clone() });
        }
        Ok(swept)
    }
}

impl<C: Clock, I: IdGen> Shared<C, I> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Arbiter<C, I>> {
        self.arbiter.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn expire_waiting(self: &Arc<Self>) -> Vec<TaskId> {
        let (expired_ids, launches) = {
            let mut arbiter = self.lock();
            let (expired, dispatched) = arbiter.scheduler.expire(&self.clock);

            let mut launches = Vec::new();
            for (task_id, waited) in &expired {
                let err = DepotError::ResourceTimeout {
                    task_id: task_id.clone(),
                    waited: *waited,
                };
                let event = TaskEvent::Fail {
                    error: TaskError::from(&err),
                };
                if let Err(e) = self.apply_event(&mut arbiter, task_id, event, &mut launches) {
                    tracing::error!(task_id = %task_id, error = %e, "failed to time out task");
                }
            }
            self.start(&mut arbiter, dispatched, &mut launches);

            let ids: Vec<TaskId> = expired.into_iter().map(|(id, _)| id).collect();
            (ids, launches)
        };

        self.spawn_all(launches);
        expired_ids
    }

    /// Hand launches to workers, then cover the earliest acquire deadline
    pub(crate) fn spawn_all(self: &Arc<Self>, launches: Vec<Launch<C, I>>) {
        for launch in launches {
            tokio::spawn(run_worker(Arc::clone(self), launch));
        }
        self.arm_acquire_timer();
    }

    /// Expire blocked tasks once the earliest acquire deadline has passed
    ///
    /// Spawns nothing while no queued task is blocked.
    fn arm_acquire_timer(self: &Arc<Self>) {
        let deadline = {
            let mut arbiter = self.lock();
            let Some(deadline) = arbiter.scheduler.next_deadline() else {
                return;
            };
            if !arbiter.timer.wants(deadline) {
                return;
            }
            arbiter.timer.armed = Some(deadline);
            deadline
        };

        let delay = deadline.saturating_duration_since(self.clock.now());
        let shared: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            // Expiry requires the wait to strictly exceed the timeout
            tokio::time::sleep(delay + Duration::from_millis(1)).await;
            if let Some(shared) = shared.upgrade() {
                shared.lock().timer.went_off(deadline);
                shared.expire_waiting();
            }
        });
    }

    /// Record a worker's outcome
    fn finish(self: &Arc<Self>, task_id: &TaskId, outcome: Result<(), JobError>) {
        let launches = {
            let mut arbiter = self.lock();
            let state = self.db.read(|s| s.task(task_id).map(|t| t.state));
            let event = match (outcome, state) {
                (Ok(()), _) => TaskEvent::Complete,
                (Err(JobError::Canceled), Some(TaskState::Canceling)) => {
                    TaskEvent::AcknowledgeCancel
                }
                (Err(err), _) => TaskEvent::Fail { error: err.into() },
            };

            let mut launches = Vec::new();
            if let Err(e) = self.apply_event(&mut arbiter, task_id, event, &mut launches) {
                // Never leak the reservation, even if the record is stuck
                tracing::error!(task_id = %task_id, error = %e, "failed to record task outcome");
                arbiter.running.remove(task_id);
                let dispatched = arbiter.scheduler.release(task_id, &self.clock);
                self.start(&mut arbiter, dispatched, &mut launches);
            }
            launches
        };

        self.spawn_all(launches);
    }
}

async fn run_worker<C: Clock, I: IdGen>(shared: Arc<Shared<C, I>>, launch: Launch<C, I>) {
    let Launch {
        task_id,
        job,
        cancel,
    } = launch;
    let ctx = TaskContext::new(
        task_id.clone(),
        Arc::clone(&shared.db),
        cancel,
        shared.clock.clone(),
        shared.ids.clone(),
    );

    let start = Instant::now();
    // A panicking job surfaces as a join error instead of taking the worker down
    let outcome = match tokio::spawn(async move { job.run(ctx).await }).await {
        Ok(result) => result,
        Err(e) => Err(JobError::failed("worker-panicked", e.to_string())),
    };

    let elapsed = start.elapsed();
    match &outcome {
        Ok(()) => tracing::info!(
            task_id = %task_id,
            elapsed_ms = elapsed.as_millis() as u64,
            "job finished"
        ),
        Err(e) => tracing::info!(
            task_id = %task_id,
            elapsed_ms = elapsed.as_millis() as u64,
            error = %e,
            "job stopped"
        ),
    }

    shared.finish(&task_id, outcome);
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
