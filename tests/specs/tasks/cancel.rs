//! Task cancellation specs

use crate::prelude::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// Job that checks for cancellation until it is told to stop
struct Polling {
    started: Arc<Notify>,
}

#[async_trait]
impl Job<FakeClock, SequentialIdGen> for Polling {
    async fn run(&self, ctx: Ctx) -> Result<(), JobError> {
        self.started.notify_one();
        loop {
            ctx.checkpoint()?;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

#[tokio::test]
async fn canceled_waiting_task_never_runs() {
    let depot = Depot::start();
    let started = Arc::new(Notify::new());
    let ran = Arc::new(AtomicBool::new(false));

    let blocker = depot
        .engine
        .submit(
            "blocker",
            exclusive("repo-1"),
            Polling {
                started: Arc::clone(&started),
            },
        )
        .unwrap();
    started.notified().await;

    let queued = {
        let ran = Arc::clone(&ran);
        depot
            .engine
            .submit(
                "queued",
                exclusive("repo-1"),
                job_fn(move |_ctx: Ctx| {
                    let ran = Arc::clone(&ran);
                    async move {
                        ran.store(true, Ordering::SeqCst);
                        Ok::<(), JobError>(())
                    }
                }),
            )
            .unwrap()
    };
    assert_eq!(depot.state(&queued), TaskState::Waiting);

    assert_eq!(
        depot.engine.request_cancel(&queued).unwrap(),
        TaskState::Canceled
    );
    depot.engine.request_cancel(&blocker).unwrap();
    depot.wait(&blocker).await;

    let queued = depot.wait(&queued).await;
    assert_eq!(queued.state, TaskState::Canceled);
    assert!(queued.started_at.is_none());
    assert!(!ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn canceled_running_task_ends_canceled_without_finish_time() {
    let depot = Depot::start();
    let started = Arc::new(Notify::new());

    let id = depot
        .engine
        .submit(
            "sync",
            exclusive("repo-1"),
            Polling {
                started: Arc::clone(&started),
            },
        )
        .unwrap();
    started.notified().await;

    assert_eq!(
        depot.engine.request_cancel(&id).unwrap(),
        TaskState::Canceling
    );

    let task = depot.wait(&id).await;
    assert_eq!(task.state, TaskState::Canceled);
    assert!(task.finished_at.is_none());
}

#[tokio::test]
async fn cancel_on_terminal_task_returns_its_state() {
    let depot = Depot::start();
    let id = depot
        .engine
        .submit("sync", exclusive("repo-1"), instant_job())
        .unwrap();
    let before = depot.wait(&id).await;

    assert_eq!(
        depot.engine.request_cancel(&id).unwrap(),
        TaskState::Completed
    );
    assert_eq!(depot.engine.get(&id).unwrap(), before);
}
