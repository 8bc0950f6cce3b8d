//! Acquire timeout specs

use crate::prelude::*;
use tokio::sync::Notify;

#[tokio::test]
async fn task_waiting_past_acquire_timeout_fails() {
    let mut config = DepotConfig::default();
    config.scheduler =
        SchedulerConfig::default().with_acquire_timeout(Some(Duration::from_secs(60)));
    let depot = Depot::with_config(config);
    let gate = Arc::new(Notify::new());

    let holder = {
        let gate = Arc::clone(&gate);
        depot
            .engine
            .submit(
                "holder",
                exclusive("repo-1"),
                job_fn(move |_ctx: Ctx| {
                    let gate = Arc::clone(&gate);
                    async move {
                        gate.notified().await;
                        Ok::<(), JobError>(())
                    }
                }),
            )
            .unwrap()
    };
    let starved = depot
        .engine
        .submit("starved", exclusive("repo-1"), instant_job())
        .unwrap();

    depot.clock.advance(Duration::from_secs(61));
    assert_eq!(depot.engine.expire_waiting(), vec![starved.clone()]);

    let task = depot.engine.get(&starved).unwrap();
    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.error.unwrap().kind, "resource-timeout");

    gate.notify_one();
    assert_eq!(depot.wait(&holder).await.state, TaskState::Completed);
}
