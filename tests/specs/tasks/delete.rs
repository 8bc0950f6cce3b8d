//! Task deletion specs

use crate::prelude::*;
use async_trait::async_trait;
use tokio::sync::Notify;

/// Job that publishes, then holds its reservation until released
struct PublishThenHold {
    published: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl Job<FakeClock, SequentialIdGen> for PublishThenHold {
    async fn run(&self, ctx: Ctx) -> Result<(), JobError> {
        ctx.publish(PublicationRequest::new("rv-1"), |builder| {
            builder.add_artifact("ca-0", "pkg/a.rpm")?;
            Ok(())
        })?;
        self.published.notify_one();
        self.release.notified().await;
        ctx.checkpoint()
    }
}

#[tokio::test]
async fn running_and_canceling_tasks_cannot_be_deleted() {
    let depot = Depot::start();
    depot.repository_version("rv-1", &[]);
    let published = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let id = depot
        .engine
        .submit(
            "publish",
            exclusive("repo-1"),
            PublishThenHold {
                published: Arc::clone(&published),
                release: Arc::clone(&release),
            },
        )
        .unwrap();
    published.notified().await;

    assert_eq!(depot.engine.delete(&id).unwrap_err().kind(), "conflict");

    depot.engine.request_cancel(&id).unwrap();
    assert_eq!(depot.state(&id), TaskState::Canceling);
    assert_eq!(depot.engine.delete(&id).unwrap_err().kind(), "conflict");

    // Provenance is intact after the rejected deletes
    assert_eq!(depot.engine.created_resources(&id).len(), 1);

    release.notify_one();
    assert_eq!(depot.wait(&id).await.state, TaskState::Canceled);
    depot.engine.delete(&id).unwrap();
    assert!(depot.engine.created_resources(&id).is_empty());
}

#[tokio::test]
async fn terminal_task_deletion_removes_created_resources() {
    let depot = Depot::start();
    depot.repository_version("rv-1", &[]);
    let published = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let id = depot
        .engine
        .submit(
            "publish",
            exclusive("repo-1"),
            PublishThenHold {
                published: Arc::clone(&published),
                release: Arc::clone(&release),
            },
        )
        .unwrap();
    published.notified().await;
    release.notify_one();
    assert_eq!(depot.wait(&id).await.state, TaskState::Completed);
    assert_eq!(depot.engine.created_resources(&id).len(), 1);

    depot.engine.delete(&id).unwrap();

    assert!(depot.engine.get(&id).is_none());
    assert!(depot.engine.created_resources(&id).is_empty());
}

#[tokio::test]
async fn waiting_task_can_be_deleted() {
    let depot = Depot::start();
    depot.repository_version("rv-1", &[]);
    let published = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let holder = depot
        .engine
        .submit(
            "publish",
            exclusive("repo-1"),
            PublishThenHold {
                published: Arc::clone(&published),
                release: Arc::clone(&release),
            },
        )
        .unwrap();
    published.notified().await;
    let queued = depot
        .engine
        .submit("queued", exclusive("repo-1"), instant_job())
        .unwrap();

    depot.engine.delete(&queued).unwrap();
    assert!(depot.engine.get(&queued).is_none());
    assert_eq!(depot.engine.queue_len(), 0);

    release.notify_one();
    depot.wait(&holder).await;
}
