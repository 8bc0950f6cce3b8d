// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reservation scheduler
//!
//! Queues tasks that request resource sets and decides, in submission order,
//! which of them may start. Pure state machine: the caller owns the lock
//! around it and executes the returned effects.
//!
//! Fairness: a task that cannot start claims the keys it asked for, and any
//! later task whose request conflicts with a claim waits behind it even if
//! the current holders would admit it. An update followed by a sync on the
//! same repository therefore always runs update-first.

use crate::clock::Clock;
use crate::effect::{Effect, Event};
use crate::error::DepotError;
use crate::id::TaskId;
use crate::resource::{ReservationMode, Resource, ResourceKey, ResourceRegistry, ResourceRequest};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// A task waiting in the queue
#[derive(Debug, Clone)]
pub struct PendingReservation {
    pub task_id: TaskId,
    pub requests: Vec<ResourceRequest>,
    pub enqueued_at: Instant,
    /// Since when the last dispatch pass found the task blocked by holders
    /// or by an earlier claim. `None` while it only waits for a free slot.
    pub blocked_since: Option<Instant>,
}

/// Result of a dispatch pass
#[derive(Debug, Default)]
pub struct Dispatched {
    /// Tasks granted their reservations, in submission order
    pub started: Vec<TaskId>,
    pub effects: Vec<Effect>,
}

/// FIFO reservation scheduler over a [`ResourceRegistry`]
#[derive(Debug, Clone)]
pub struct ReservationScheduler {
    queue: VecDeque<PendingReservation>,
    registry: ResourceRegistry,
    acquire_timeout: Option<Duration>,
    /// Upper bound on tasks holding reservations at once
    capacity: Option<usize>,
}

impl Default for ReservationScheduler {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ReservationScheduler {
    pub fn new(acquire_timeout: Option<Duration>) -> Self {
        Self {
            queue: VecDeque::new(),
            registry: ResourceRegistry::new(),
            acquire_timeout,
            capacity: None,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Validate a resource set: non-empty, no blank keys, no key asked for
    /// in two different modes. Same-mode duplicates collapse; first
    /// occurrence order is kept.
    pub fn normalize(requests: Vec<ResourceRequest>) -> Result<Vec<ResourceRequest>, DepotError> {
        if requests.is_empty() {
            return Err(DepotError::InvalidRequest(
                "resource set is empty".to_string(),
            ));
        }

        let mut seen: HashMap<ResourceKey, ReservationMode> = HashMap::new();
        let mut normalized = Vec::with_capacity(requests.len());
        for req in requests {
            if req.key.as_str().trim().is_empty() {
                return Err(DepotError::InvalidRequest(
                    "resource key must not be empty".to_string(),
                ));
            }
            match seen.get(&req.key) {
                Some(mode) if *mode == req.mode => continue,
                Some(mode) => {
                    return Err(DepotError::InvalidRequest(format!(
                        "resource {} requested as both {} and {}",
                        req.key, mode, req.mode
                    )));
                }
                None => {
                    seen.insert(req.key.clone(), req.mode);
                    normalized.push(req);
                }
            }
        }
        Ok(normalized)
    }

    /// Enqueue a task's reservation request
    pub fn reserve(
        &mut self,
        task_id: TaskId,
        requests: Vec<ResourceRequest>,
        clock: &impl Clock,
    ) -> Result<Vec<Effect>, DepotError> {
        let requests = Self::normalize(requests)?;
        if self.is_waiting(&task_id) || self.registry.is_holding(&task_id) {
            return Err(DepotError::InvalidRequest(format!(
                "task {} already has a reservation",
                task_id
            )));
        }

        self.queue.push_back(PendingReservation {
            task_id: task_id.clone(),
            requests,
            enqueued_at: clock.now(),
            blocked_since: None,
        });

        Ok(vec![Effect::Emit(Event::ReservationQueued {
            task_id,
            position: self.queue.len() - 1,
        })])
    }

    /// Grant reservations to every queued task that may start now
    ///
    /// Only tasks blocked on resources accrue acquire-timeout time; a task
    /// held back solely by the worker capacity does not.
    pub fn dispatch(&mut self, clock: &impl Clock) -> Dispatched {
        let now = clock.now();
        let mut dispatched = Dispatched::default();
        let mut free_slots = self
            .capacity
            .map(|cap| cap.saturating_sub(self.running_count()))
            .unwrap_or(usize::MAX);

        let mut claims: HashMap<ResourceKey, ReservationMode> = HashMap::new();
        let mut still_waiting = VecDeque::with_capacity(self.queue.len());

        while let Some(mut pending) = self.queue.pop_front() {
            let behind_earlier = pending.requests.iter().any(|req| {
                claims
                    .get(&req.key)
                    .is_some_and(|claimed| claimed.conflicts_with(req.mode))
            });
            let blocked = behind_earlier || !self.registry.admits(&pending.requests);

            if !blocked {
                if free_slots > 0 && self.registry.grant(&pending.task_id, &pending.requests).is_ok()
                {
                    free_slots -= 1;
                    dispatched
                        .effects
                        .push(Effect::Emit(Event::ReservationGranted {
                            task_id: pending.task_id.clone(),
                            keys: keys_of(&pending.requests),
                        }));
                    dispatched.started.push(pending.task_id);
                    continue;
                }
                // Waiting for a worker slot, not for its resources
                pending.blocked_since = None;
                still_waiting.push_back(pending);
                continue;
            }

            pending.blocked_since.get_or_insert(now);
            for req in &pending.requests {
                claims
                    .entry(req.key.clone())
                    .and_modify(|claimed| {
                        if req.mode == ReservationMode::Exclusive {
                            *claimed = ReservationMode::Exclusive;
                        }
                    })
                    .or_insert(req.mode);
            }
            still_waiting.push_back(pending);
        }

        self.queue = still_waiting;
        dispatched
    }

    /// Release everything a finished task holds, then run a dispatch pass
    pub fn release(&mut self, task_id: &TaskId, clock: &impl Clock) -> Dispatched {
        let keys = self.registry.release(task_id);
        let released = (!keys.is_empty()).then(|| {
            Effect::Emit(Event::ReservationReleased {
                task_id: task_id.clone(),
                keys: keys.iter().map(|k| k.0.clone()).collect(),
            })
        });

        let mut dispatched = self.dispatch(clock);
        if let Some(effect) = released {
            dispatched.effects.insert(0, effect);
        }
        dispatched
    }

    /// Remove a queued task without starting it
    ///
    /// Returns `None` when the task is not waiting.
    pub fn cancel_waiting(&mut self, task_id: &TaskId, clock: &impl Clock) -> Option<Dispatched> {
        let index = self.queue.iter().position(|p| &p.task_id == task_id)?;
        self.queue.remove(index);

        // Tasks queued behind the withdrawn claim may now be runnable
        let mut dispatched = self.dispatch(clock);
        dispatched.effects.insert(
            0,
            Effect::Emit(Event::ReservationWithdrawn {
                task_id: task_id.clone(),
            }),
        );
        Some(dispatched)
    }

    /// Drop every queued task that has been blocked on its resources for
    /// longer than the acquisition timeout. Returns the expired tasks with
    /// how long each was blocked.
    pub fn expire(&mut self, clock: &impl Clock) -> (Vec<(TaskId, Duration)>, Dispatched) {
        let Some(timeout) = self.acquire_timeout else {
            return (Vec::new(), Dispatched::default());
        };
        let now = clock.now();

        let mut expired = Vec::new();
        self.queue.retain(|pending| {
            let Some(since) = pending.blocked_since else {
                return true;
            };
            let waited = now.saturating_duration_since(since);
            if waited > timeout {
                expired.push((pending.task_id.clone(), waited));
                false
            } else {
                true
            }
        });

        if expired.is_empty() {
            return (expired, Dispatched::default());
        }

        let mut dispatched = self.dispatch(clock);
        let mut effects: Vec<Effect> = expired
            .iter()
            .map(|(task_id, _)| {
                Effect::Emit(Event::ReservationTimedOut {
                    task_id: task_id.clone(),
                })
            })
            .collect();
        effects.append(&mut dispatched.effects);
        dispatched.effects = effects;
        (expired, dispatched)
    }

    /// Earliest instant at which a queued task will exceed its timeout
    pub fn next_deadline(&self) -> Option<Instant> {
        let timeout = self.acquire_timeout?;
        self.queue
            .iter()
            .filter_map(|pending| pending.blocked_since)
            .map(|since| since + timeout)
            .min()
    }

    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout
    }

    pub fn is_waiting(&self, task_id: &TaskId) -> bool {
        self.queue.iter().any(|p| &p.task_id == task_id)
    }

    pub fn is_holding(&self, task_id: &TaskId) -> bool {
        self.registry.is_holding(task_id)
    }

    /// Zero-based position of a task in the queue
    pub fn position(&self, task_id: &TaskId) -> Option<usize> {
        self.queue.iter().position(|p| &p.task_id == task_id)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn resource(&self, key: &ResourceKey) -> Option<&Resource> {
        self.registry.get(key)
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Tasks currently holding reservations
    fn running_count(&self) -> usize {
        self.registry.holder_count()
    }
}

fn keys_of(requests: &[ResourceRequest]) -> Vec<String> {
    requests.iter().map(|req| req.key.0.clone()).collect()
}

#[cfg(test)]
#[path = "reservation_tests.rs"]
mod tests;
