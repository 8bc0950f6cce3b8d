//! Reservation exclusion specs
//!
//! Exclusive holders of one key never run at the same time, and a task
//! submitted later observes the effects of an earlier one on the same key.

use crate::prelude::*;
use similar_asserts::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Job that tracks how many holders of its key are inside it at once
fn occupying(
    active: &Arc<AtomicUsize>,
    overlaps: &Arc<AtomicUsize>,
) -> impl Job<FakeClock, SequentialIdGen> {
    let active = Arc::clone(active);
    let overlaps = Arc::clone(overlaps);
    job_fn(move |_ctx: Ctx| {
        let active = Arc::clone(&active);
        let overlaps = Arc::clone(&overlaps);
        async move {
            if active.fetch_add(1, Ordering::SeqCst) > 0 {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            Ok::<(), JobError>(())
        }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exclusive_holders_of_one_key_never_overlap() {
    let depot = Depot::start();
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let mut ids = Vec::new();
    for i in 0..12 {
        // Interleave unrelated work so the dispatcher has other choices
        if i % 3 == 0 {
            ids.push(
                depot
                    .engine
                    .submit("other", exclusive("repo-other"), instant_job())
                    .unwrap(),
            );
        }
        ids.push(
            depot
                .engine
                .submit("sync", exclusive("repo-1"), occupying(&active, &overlaps))
                .unwrap(),
        );
    }

    for id in &ids {
        assert_eq!(depot.wait(id).await.state, TaskState::Completed);
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_holders_run_together_but_never_with_an_exclusive_one() {
    let depot = Depot::start();
    let active = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let readers = Arc::new(AtomicUsize::new(0));

    let reader = {
        let readers = Arc::clone(&readers);
        let active = Arc::clone(&active);
        let overlaps = Arc::clone(&overlaps);
        job_fn(move |_ctx: Ctx| {
            let readers = Arc::clone(&readers);
            let active = Arc::clone(&active);
            let overlaps = Arc::clone(&overlaps);
            async move {
                if active.load(Ordering::SeqCst) > 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                readers.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                readers.fetch_sub(1, Ordering::SeqCst);
                Ok::<(), JobError>(())
            }
        })
    };
    let reader = Arc::new(reader);

    let writer = {
        let readers = Arc::clone(&readers);
        let active = Arc::clone(&active);
        let overlaps = Arc::clone(&overlaps);
        job_fn(move |_ctx: Ctx| {
            let readers = Arc::clone(&readers);
            let active = Arc::clone(&active);
            let overlaps = Arc::clone(&overlaps);
            async move {
                let busy = active.fetch_add(1, Ordering::SeqCst) > 0;
                if busy || readers.load(Ordering::SeqCst) > 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok::<(), JobError>(())
            }
        })
    };
    let writer = Arc::new(writer);

    let mut ids = Vec::new();
    for i in 0..9 {
        let id = if i % 4 == 3 {
            depot
                .engine
                .submit("write", exclusive("remote-1"), SharedJob(Arc::clone(&writer)))
                .unwrap()
        } else {
            depot
                .engine
                .submit("read", shared("remote-1"), SharedJob(Arc::clone(&reader)))
                .unwrap()
        };
        ids.push(id);
    }

    for id in &ids {
        assert_eq!(depot.wait(id).await.state, TaskState::Completed);
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

/// One job body submitted many times
struct SharedJob<J>(Arc<J>);

#[async_trait::async_trait]
impl<J: Job<FakeClock, SequentialIdGen>> Job<FakeClock, SequentialIdGen> for SharedJob<J> {
    async fn run(&self, ctx: Ctx) -> Result<(), JobError> {
        self.0.run(ctx).await
    }
}

#[tokio::test]
async fn later_task_observes_earlier_update_on_same_resource() {
    let depot = Depot::start();
    let field = Arc::new(Mutex::new("v1".to_string()));
    let observed = Arc::new(Mutex::new(None::<String>));

    let update = {
        let field = Arc::clone(&field);
        job_fn(move |_ctx: Ctx| {
            let field = Arc::clone(&field);
            async move {
                // Yield first so a racing reader would see the old value
                tokio::time::sleep(Duration::from_millis(20)).await;
                *field.lock().unwrap() = "v2".to_string();
                Ok::<(), JobError>(())
            }
        })
    };
    let sync = {
        let field = Arc::clone(&field);
        let observed = Arc::clone(&observed);
        job_fn(move |_ctx: Ctx| {
            let field = Arc::clone(&field);
            let observed = Arc::clone(&observed);
            async move {
                *observed.lock().unwrap() = Some(field.lock().unwrap().clone());
                Ok::<(), JobError>(())
            }
        })
    };

    let a = depot
        .engine
        .submit("update-remote", exclusive("remote-1"), update)
        .unwrap();
    let b = depot
        .engine
        .submit("sync", exclusive("remote-1"), sync)
        .unwrap();

    depot.wait(&a).await;
    depot.wait(&b).await;
    assert_eq!(observed.lock().unwrap().clone(), Some("v2".to_string()));
}
