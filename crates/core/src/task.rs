// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task state machine
//!
//! ```text
//! waiting ──dispatch──► running ──complete──► completed
//!    │                    │  └──────fail────► failed
//!    │                    └─cancel─► canceling ──ack──► canceled
//!    └──────────────cancel────────────────────────────► canceled
//! ```
//!
//! Terminal states never change again. Cancellation of a running task is
//! cooperative: the machine only raises the flag, the worker acknowledges.

use crate::clock::Clock;
use crate::effect::{Effect, Event};
use crate::error::DepotError;
use crate::id::TaskId;
use crate::resource::ResourceRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Queued for its reservations
    Waiting,
    /// Holding its reservations, worker executing
    Running,
    /// Running, cancellation requested but not yet observed by the worker
    Canceling,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }

    /// Running or canceling: a worker owns the task
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Running | TaskState::Canceling)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Waiting => "waiting",
            TaskState::Running => "running",
            TaskState::Canceling => "canceling",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error detail of a failed task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: String,
    pub description: String,
}

impl TaskError {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
        }
    }
}

impl From<&DepotError> for TaskError {
    fn from(err: &DepotError) -> Self {
        TaskError::new(err.kind(), err.to_string())
    }
}

/// Events that can change task state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Reservations granted
    Dispatch,
    /// Worker finished successfully
    Complete,
    /// Worker failed, or the task could not be run at all
    Fail { error: TaskError },
    /// Caller asked for cancellation
    RequestCancel,
    /// Worker observed the cancellation flag and stopped
    AcknowledgeCancel,
}

/// A unit of asynchronous work guarded by resource reservations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub state: TaskState,
    /// Reservations the task needs, in request order
    pub resources: Vec<ResourceRequest>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// Set only when the task completed
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<TaskError>,
}

impl Task {
    /// Create a new task in the Waiting state
    pub fn new(
        id: impl Into<TaskId>,
        name: impl Into<String>,
        resources: Vec<ResourceRequest>,
        clock: &impl Clock,
    ) -> Self {
        Task {
            id: id.into(),
            name: name.into(),
            state: TaskState::Waiting,
            resources,
            created_at: clock.utc_now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Pure transition function - returns new state and effects
    ///
    /// Invalid transitions return the task unchanged and no effects.
    pub fn transition(&self, event: TaskEvent, clock: &impl Clock) -> (Task, Vec<Effect>) {
        let id = self.id.clone();

        match (self.state, event) {
            (TaskState::Waiting, TaskEvent::Dispatch) => {
                let task = Task {
                    state: TaskState::Running,
                    started_at: Some(clock.utc_now()),
                    ..self.clone()
                };
                (task, vec![Effect::Emit(Event::TaskStarted { id })])
            }

            // Best-effort cancellation: a worker that finishes anyway completes
            (TaskState::Running | TaskState::Canceling, TaskEvent::Complete) => {
                let task = Task {
                    state: TaskState::Completed,
                    finished_at: Some(clock.utc_now()),
                    ..self.clone()
                };
                let effects = vec![
                    Effect::Emit(Event::TaskCompleted { id: id.clone() }),
                    Effect::ReleaseReservation { task_id: id },
                ];
                (task, effects)
            }

            (TaskState::Running, TaskEvent::Fail { error }) => {
                let effects = vec![
                    Effect::Emit(Event::TaskFailed {
                        id: id.clone(),
                        kind: error.kind.clone(),
                        description: error.description.clone(),
                    }),
                    Effect::ReleaseReservation { task_id: id },
                ];
                let task = Task {
                    state: TaskState::Failed,
                    error: Some(error),
                    ..self.clone()
                };
                (task, effects)
            }

            // Never ran: timed out waiting, or lost on restart
            (TaskState::Waiting, TaskEvent::Fail { error }) => {
                let effects = vec![
                    Effect::Emit(Event::TaskFailed {
                        id: id.clone(),
                        kind: error.kind.clone(),
                        description: error.description.clone(),
                    }),
                    Effect::WithdrawReservation { task_id: id },
                ];
                let task = Task {
                    state: TaskState::Failed,
                    error: Some(error),
                    ..self.clone()
                };
                (task, effects)
            }

            // Cancellation wins over a failure raised while canceling
            (TaskState::Canceling, TaskEvent::AcknowledgeCancel | TaskEvent::Fail { .. }) => {
                let task = Task {
                    state: TaskState::Canceled,
                    ..self.clone()
                };
                let effects = vec![
                    Effect::Emit(Event::TaskCanceled { id: id.clone() }),
                    Effect::ReleaseReservation { task_id: id },
                ];
                (task, effects)
            }

            (TaskState::Waiting, TaskEvent::RequestCancel) => {
                let task = Task {
                    state: TaskState::Canceled,
                    ..self.clone()
                };
                let effects = vec![
                    Effect::Emit(Event::TaskCanceled { id: id.clone() }),
                    Effect::WithdrawReservation { task_id: id },
                ];
                (task, effects)
            }

            (TaskState::Running, TaskEvent::RequestCancel) => {
                let task = Task {
                    state: TaskState::Canceling,
                    ..self.clone()
                };
                let effects = vec![
                    Effect::Emit(Event::TaskCancelRequested { id: id.clone() }),
                    Effect::SignalCancel { task_id: id },
                ];
                (task, effects)
            }

            // Invalid transitions - no change
            _ => (self.clone(), vec![]),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_waiting(&self) -> bool {
        self.state == TaskState::Waiting
    }

    /// A worker owns the task and its reservations
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Tasks may be deleted unless a worker is executing them
    pub fn ensure_deletable(&self) -> Result<(), DepotError> {
        if self.is_active() {
            return Err(DepotError::Conflict(format!(
                "task {} is {}; cancel it before deleting",
                self.id, self.state
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
