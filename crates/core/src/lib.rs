// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! depot-core: concurrency and publication core
//!
//! This crate provides:
//! - The resource registry and FIFO reservation scheduler
//! - The task lifecycle state machine
//! - The publication and provenance model
//! - Effects/events, errors, configuration, clock and id abstractions
//!
//! Everything here is pure; IO lives in `depot-storage` and `depot-engine`.

pub mod clock;
pub mod config;
pub mod effect;
pub mod error;
pub mod id;
pub mod publication;
pub mod reservation;
pub mod resource;
pub mod task;
pub mod traced;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    ConfigError, DepotConfig, EngineConfig, LoggingConfig, SchedulerConfig, StorageConfig,
};
pub use effect::{Effect, Event};
pub use error::DepotError;
pub use id::{
    ContentArtifactId, CreatedResourceId, DistributionId, IdGen, PublicationId, PublisherId,
    RepositoryId, RepositoryVersionId, SequentialIdGen, TaskId, UuidIdGen,
};
pub use publication::{
    ContentEntry, CreatedResource, DistributionRecord, DistributionTarget, ObjectKind, ObjectRef,
    Publication, PublicationRequest, PublishedArtifact, PublishedMetadata, RepositoryVersion,
};
pub use reservation::{Dispatched, PendingReservation, ReservationScheduler};
pub use resource::{ReservationMode, Resource, ResourceKey, ResourceRegistry, ResourceRequest};
pub use task::{Task, TaskError, TaskEvent, TaskState};
pub use traced::{trace_event, TracedEffect};
