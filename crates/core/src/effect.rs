// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects and events for state machine orchestration
//!
//! State machines in this crate never perform IO. They return the new state
//! plus a list of [`Effect`]s that the engine executes.

use crate::id::{PublicationId, RepositoryVersionId, TaskId};
use serde::{Deserialize, Serialize};

/// Effects are side effects that state machines request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Emit an event for other components to observe
    Emit(Event),
    /// Release every reservation the task holds and re-run dispatch
    ReleaseReservation { task_id: TaskId },
    /// Remove a task that never ran from the reservation queue
    WithdrawReservation { task_id: TaskId },
    /// Raise the cooperative cancellation flag seen by the running worker
    SignalCancel { task_id: TaskId },
}

/// Events emitted by state machines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // Task events
    TaskWaiting {
        id: TaskId,
        name: String,
    },
    TaskStarted {
        id: TaskId,
    },
    TaskCompleted {
        id: TaskId,
    },
    TaskFailed {
        id: TaskId,
        kind: String,
        description: String,
    },
    TaskCancelRequested {
        id: TaskId,
    },
    TaskCanceled {
        id: TaskId,
    },
    TaskDeleted {
        id: TaskId,
    },

    // Reservation events
    ReservationQueued {
        task_id: TaskId,
        position: usize,
    },
    ReservationGranted {
        task_id: TaskId,
        keys: Vec<String>,
    },
    ReservationReleased {
        task_id: TaskId,
        keys: Vec<String>,
    },
    ReservationWithdrawn {
        task_id: TaskId,
    },
    ReservationTimedOut {
        task_id: TaskId,
    },

    // Publication events
    PublicationStarted {
        id: PublicationId,
        repository_version: RepositoryVersionId,
    },
    PublicationCompleted {
        id: PublicationId,
        artifacts: usize,
        metadata: usize,
    },
    PublicationAborted {
        id: PublicationId,
        reason: String,
    },
    PublicationSwept {
        id: PublicationId,
    },
}

impl Event {
    /// Event name in `noun:verb` form, used as the log message
    pub fn name(&self) -> &'static str {
        match self {
            Event::TaskWaiting { .. } => "task:waiting",
            Event::TaskStarted { .. } => "task:started",
            Event::TaskCompleted { .. } => "task:completed",
            Event::TaskFailed { .. } => "task:failed",
            Event::TaskCancelRequested { .. } => "task:cancel-requested",
            Event::TaskCanceled { .. } => "task:canceled",
            Event::TaskDeleted { .. } => "task:deleted",

            Event::ReservationQueued { .. } => "reservation:queued",
            Event::ReservationGranted { .. } => "reservation:granted",
            Event::ReservationReleased { .. } => "reservation:released",
            Event::ReservationWithdrawn { .. } => "reservation:withdrawn",
            Event::ReservationTimedOut { .. } => "reservation:timed-out",

            Event::PublicationStarted { .. } => "publication:started",
            Event::PublicationCompleted { .. } => "publication:completed",
            Event::PublicationAborted { .. } => "publication:aborted",
            Event::PublicationSwept { .. } => "publication:swept",
        }
    }

    /// Reservation churn is logged at debug, everything else at info
    pub fn is_verbose(&self) -> bool {
        matches!(
            self,
            Event::ReservationQueued { .. }
                | Event::ReservationGranted { .. }
                | Event::ReservationReleased { .. }
        )
    }
}
