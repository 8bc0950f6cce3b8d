// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resource registry
//!
//! Tracks which tasks hold which resources, and in which mode. A resource
//! has either exactly one exclusive holder or any number of shared holders,
//! never both.

use crate::error::DepotError;
use crate::id::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Key naming a lockable domain object, e.g. `repositories/4f1c`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(pub String);

impl ResourceKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ResourceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// How a task holds a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationMode {
    Exclusive,
    Shared,
}

impl ReservationMode {
    /// Two holds on the same key conflict unless both are shared
    pub fn conflicts_with(self, other: ReservationMode) -> bool {
        self == ReservationMode::Exclusive || other == ReservationMode::Exclusive
    }
}

impl std::fmt::Display for ReservationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationMode::Exclusive => f.write_str("exclusive"),
            ReservationMode::Shared => f.write_str("shared"),
        }
    }
}

/// One (key, mode) pair of a reservation request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub key: ResourceKey,
    pub mode: ReservationMode,
}

impl ResourceRequest {
    pub fn exclusive(key: impl Into<ResourceKey>) -> Self {
        Self {
            key: key.into(),
            mode: ReservationMode::Exclusive,
        }
    }

    pub fn shared(key: impl Into<ResourceKey>) -> Self {
        Self {
            key: key.into(),
            mode: ReservationMode::Shared,
        }
    }
}

/// A resource and its current holders
#[derive(Debug, Clone)]
pub struct Resource {
    pub key: ResourceKey,
    holders: BTreeMap<TaskId, ReservationMode>,
}

impl Resource {
    fn new(key: ResourceKey) -> Self {
        Self {
            key,
            holders: BTreeMap::new(),
        }
    }

    pub fn is_free(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn exclusive_holder(&self) -> Option<&TaskId> {
        self.holders
            .iter()
            .find(|(_, mode)| **mode == ReservationMode::Exclusive)
            .map(|(id, _)| id)
    }

    pub fn holders(&self) -> impl Iterator<Item = (&TaskId, ReservationMode)> {
        self.holders.iter().map(|(id, mode)| (id, *mode))
    }

    /// Exclusive needs zero holders; shared needs no exclusive holder
    pub fn admits(&self, mode: ReservationMode) -> bool {
        match mode {
            ReservationMode::Exclusive => self.holders.is_empty(),
            ReservationMode::Shared => self.exclusive_holder().is_none(),
        }
    }
}

/// Registry of held resources
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: HashMap<ResourceKey, Resource>,
    by_task: HashMap<TaskId, Vec<ResourceKey>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&Resource> {
        self.resources.get(key)
    }

    /// Whether every request is compatible with the current holders
    pub fn admits(&self, requests: &[ResourceRequest]) -> bool {
        requests.iter().all(|req| {
            self.resources
                .get(&req.key)
                .map_or(true, |resource| resource.admits(req.mode))
        })
    }

    /// Whether the task currently holds anything
    pub fn is_holding(&self, task_id: &TaskId) -> bool {
        self.by_task.contains_key(task_id)
    }

    /// Keys held by a task, in request order
    pub fn held_by(&self, task_id: &TaskId) -> &[ResourceKey] {
        self.by_task.get(task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Record the task as holder of every requested resource
    ///
    /// All-or-nothing: if any request is incompatible nothing is granted.
    pub fn grant(
        &mut self,
        task_id: &TaskId,
        requests: &[ResourceRequest],
    ) -> Result<(), DepotError> {
        if self.is_holding(task_id) {
            return Err(DepotError::Conflict(format!(
                "task {} already holds reservations",
                task_id
            )));
        }
        if let Some(blocked) = requests.iter().find(|req| {
            self.resources
                .get(&req.key)
                .is_some_and(|resource| !resource.admits(req.mode))
        }) {
            return Err(DepotError::Conflict(format!(
                "{} reservation on {} is not available",
                blocked.mode, blocked.key
            )));
        }

        for req in requests {
            self.resources
                .entry(req.key.clone())
                .or_insert_with(|| Resource::new(req.key.clone()))
                .holders
                .insert(task_id.clone(), req.mode);
        }
        self.by_task.insert(
            task_id.clone(),
            requests.iter().map(|req| req.key.clone()).collect(),
        );
        Ok(())
    }

    /// Remove every holder entry of the task; returns the released keys
    ///
    /// Resources left without holders are forgotten.
    pub fn release(&mut self, task_id: &TaskId) -> Vec<ResourceKey> {
        let keys = self.by_task.remove(task_id).unwrap_or_default();
        for key in &keys {
            if let Some(resource) = self.resources.get_mut(key) {
                resource.holders.remove(task_id);
                if resource.is_free() {
                    self.resources.remove(key);
                }
            }
        }
        keys
    }

    /// Number of tasks holding at least one resource
    pub fn holder_count(&self) -> usize {
        self.by_task.len()
    }

    /// Number of resources with at least one holder
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
#[path = "resource_tests.rs"]
mod tests;
