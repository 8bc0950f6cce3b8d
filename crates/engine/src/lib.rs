// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! depot-engine: task execution and distribution
//!
//! Runs dispatched tasks on tokio workers with cooperative cancellation,
//! fails tasks that wait too long for their reservations, serves complete
//! publications, and sweeps publications orphaned by a crash.

mod distribution;
mod engine;
mod error;
mod executor;
mod job;

pub use distribution::{Distribution, ServedEntry};
pub use engine::{Engine, WORKER_LOST};
pub use error::JobError;
pub use job::{job_fn, FnJob, Job, TaskContext};
