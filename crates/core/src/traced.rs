// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing support for effects and events

use crate::effect::{Effect, Event};

/// Something with a stable name and structured fields for logging
pub trait TracedEffect {
    /// Name used as the log message or span name (e.g. "task:started")
    fn name(&self) -> &'static str;

    /// Key-value pairs for structured logging
    fn fields(&self) -> Vec<(&'static str, String)>;
}

impl TracedEffect for Effect {
    fn name(&self) -> &'static str {
        match self {
            Effect::Emit(event) => event.name(),
            Effect::ReleaseReservation { .. } => "release_reservation",
            Effect::WithdrawReservation { .. } => "withdraw_reservation",
            Effect::SignalCancel { .. } => "signal_cancel",
        }
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::Emit(event) => event.fields(),
            Effect::ReleaseReservation { task_id }
            | Effect::WithdrawReservation { task_id }
            | Effect::SignalCancel { task_id } => vec![("task_id", task_id.to_string())],
        }
    }
}

impl TracedEffect for Event {
    fn name(&self) -> &'static str {
        Event::name(self)
    }

    fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Event::TaskWaiting { id, name } => {
                vec![("task_id", id.to_string()), ("name", name.clone())]
            }
            Event::TaskStarted { id }
            | Event::TaskCompleted { id }
            | Event::TaskCancelRequested { id }
            | Event::TaskCanceled { id }
            | Event::TaskDeleted { id } => vec![("task_id", id.to_string())],
            Event::TaskFailed {
                id,
                kind,
                description,
            } => vec![
                ("task_id", id.to_string()),
                ("kind", kind.clone()),
                ("description", description.clone()),
            ],
            Event::ReservationQueued { task_id, position } => vec![
                ("task_id", task_id.to_string()),
                ("position", position.to_string()),
            ],
            Event::ReservationGranted { task_id, keys }
            | Event::ReservationReleased { task_id, keys } => vec![
                ("task_id", task_id.to_string()),
                ("keys", keys.join(",")),
            ],
            Event::ReservationWithdrawn { task_id } | Event::ReservationTimedOut { task_id } => {
                vec![("task_id", task_id.to_string())]
            }
            Event::PublicationStarted {
                id,
                repository_version,
            } => vec![
                ("publication_id", id.to_string()),
                ("repository_version", repository_version.to_string()),
            ],
            Event::PublicationCompleted {
                id,
                artifacts,
                metadata,
            } => vec![
                ("publication_id", id.to_string()),
                ("artifacts", artifacts.to_string()),
                ("metadata", metadata.to_string()),
            ],
            Event::PublicationAborted { id, reason } => vec![
                ("publication_id", id.to_string()),
                ("reason", reason.clone()),
            ],
            Event::PublicationSwept { id } => vec![("publication_id", id.to_string())],
        }
    }
}

/// Log an event at info, or debug for reservation churn
pub fn trace_event(event: &Event) {
    let fields = event.fields();
    if event.is_verbose() {
        tracing::debug!(fields = ?fields, "{}", Event::name(event));
    } else {
        tracing::info!(fields = ?fields, "{}", Event::name(event));
    }
}
