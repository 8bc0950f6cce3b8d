// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effect executor
//!
//! Runs under the arbiter lock. Task transitions are persisted before their
//! effects execute; starting a task is deferred to the caller as a
//! [`Launch`] so that spawning happens after the lock is released.

use crate::engine::Shared;
use crate::job::Job;
use depot_core::{
    trace_event, Clock, DepotError, Dispatched, Effect, IdGen, ReservationScheduler, Task,
    TaskEvent, TaskId, TaskState, TracedEffect,
};
use depot_storage::Operation;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;

/// Scheduler plus the in-memory bookkeeping that goes with it
pub(crate) struct Arbiter<C: Clock, I: IdGen> {
    pub(crate) scheduler: ReservationScheduler,
    /// Jobs of queued tasks
    pub(crate) pending: HashMap<TaskId, Arc<dyn Job<C, I>>>,
    /// Cancellation flags of running tasks
    pub(crate) running: HashMap<TaskId, Arc<AtomicBool>>,
    /// State broadcasts for `wait`; dropped once the task is terminal
    pub(crate) watchers: HashMap<TaskId, watch::Sender<TaskState>>,
    pub(crate) timer: AcquireTimer,
}

/// Acquire deadlines a timer has been spawned for
#[derive(Debug, Default)]
pub(crate) struct AcquireTimer {
    /// Deadline of the earliest pending timer
    pub(crate) armed: Option<Instant>,
    /// Latest deadline whose timer already went off
    pub(crate) fired: Option<Instant>,
}

impl AcquireTimer {
    /// Whether `deadline` needs a timer of its own
    pub(crate) fn wants(&self, deadline: Instant) -> bool {
        self.armed.is_none_or(|armed| deadline < armed)
            && self.fired.is_none_or(|fired| deadline > fired)
    }

    pub(crate) fn went_off(&mut self, deadline: Instant) {
        if self.armed == Some(deadline) {
            self.armed = None;
        }
        self.fired = Some(self.fired.map_or(deadline, |fired| fired.max(deadline)));
    }
}

impl<C: Clock, I: IdGen> Arbiter<C, I> {
    pub(crate) fn new(scheduler: ReservationScheduler) -> Self {
        Self {
            scheduler,
            pending: HashMap::new(),
            running: HashMap::new(),
            watchers: HashMap::new(),
            timer: AcquireTimer::default(),
        }
    }
}

/// A dispatched task ready to be handed to a worker
pub(crate) struct Launch<C: Clock, I: IdGen> {
    pub(crate) task_id: TaskId,
    pub(crate) job: Arc<dyn Job<C, I>>,
    pub(crate) cancel: Arc<AtomicBool>,
}

impl<C: Clock, I: IdGen> Shared<C, I> {
    /// Transition a stored task, persist the result, then execute its effects
    ///
    /// Returns the task as it is after the event. Invalid transitions leave
    /// the task unchanged and produce no effects.
    pub(crate) fn apply_event(
        &self,
        arbiter: &mut Arbiter<C, I>,
        id: &TaskId,
        event: TaskEvent,
        launches: &mut Vec<Launch<C, I>>,
    ) -> Result<Task, DepotError> {
        let task = self
            .db
            .read(|s| s.task(id).cloned())
            .ok_or_else(|| DepotError::not_found("task", id))?;

        let (next, effects) = task.transition(event, &self.clock);
        if next != task {
            self.db.execute(Operation::TaskPut { task: next.clone() })?;
            if let Some(watcher) = arbiter.watchers.get(id) {
                watcher.send_replace(next.state);
            }
            if next.is_terminal() {
                arbiter.watchers.remove(id);
            }
        }

        self.execute_effects(arbiter, effects, launches);
        Ok(next)
    }

    pub(crate) fn execute_effects(
        &self,
        arbiter: &mut Arbiter<C, I>,
        effects: Vec<Effect>,
        launches: &mut Vec<Launch<C, I>>,
    ) {
        let mut queue = VecDeque::from(effects);
        while let Some(effect) = queue.pop_front() {
            if !matches!(effect, Effect::Emit(_)) {
                tracing::debug!(fields = ?effect.fields(), "{}", effect.name());
            }

            match effect {
                Effect::Emit(event) => trace_event(&event),

                Effect::ReleaseReservation { task_id } => {
                    arbiter.running.remove(&task_id);
                    let dispatched = arbiter.scheduler.release(&task_id, &self.clock);
                    self.start(arbiter, dispatched, launches);
                }

                Effect::WithdrawReservation { task_id } => {
                    arbiter.pending.remove(&task_id);
                    let withdrawn = arbiter.scheduler.cancel_waiting(&task_id, &self.clock);
                    if let Some(dispatched) = withdrawn {
                        self.start(arbiter, dispatched, launches);
                    }
                }

                Effect::SignalCancel { task_id } => {
                    if let Some(flag) = arbiter.running.get(&task_id) {
                        flag.store(true, Ordering::SeqCst);
                    }
                }
            }
        }
    }

    /// Move granted tasks to running and queue their launches
    pub(crate) fn start(
        &self,
        arbiter: &mut Arbiter<C, I>,
        dispatched: Dispatched,
        launches: &mut Vec<Launch<C, I>>,
    ) {
        self.execute_effects(arbiter, dispatched.effects, launches);

        for task_id in dispatched.started {
            let Some(job) = arbiter.pending.remove(&task_id) else {
                tracing::warn!(task_id = %task_id, "granted task has no job, releasing");
                let dispatched = arbiter.scheduler.release(&task_id, &self.clock);
                self.start(arbiter, dispatched, launches);
                continue;
            };

            match self.apply_event(arbiter, &task_id, TaskEvent::Dispatch, launches) {
                Ok(task) if task.state == TaskState::Running => {
                    let cancel = Arc::new(AtomicBool::new(false));
                    arbiter.running.insert(task_id.clone(), Arc::clone(&cancel));
                    launches.push(Launch {
                        task_id,
                        job,
                        cancel,
                    });
                }
                Ok(task) => {
                    tracing::warn!(
                        task_id = %task_id,
                        state = %task.state,
                        "granted task is not waiting, releasing"
                    );
                    let dispatched = arbiter.scheduler.release(&task_id, &self.clock);
                    self.start(arbiter, dispatched, launches);
                }
                Err(e) => {
                    tracing::error!(task_id = %task_id, error = %e, "failed to start task");
                    let dispatched = arbiter.scheduler.release(&task_id, &self.clock);
                    self.start(arbiter, dispatched, launches);
                }
            }
        }
    }
}
