//! Restart and recovery specs
//!
//! Everything committed survives a restart; work in flight when the
//! process went away is settled on the next start.

use crate::prelude::*;
use tokio::sync::Notify;

#[tokio::test]
async fn restart_replays_committed_tasks_and_publications() {
    let depot = Depot::start();
    depot.repository_version("rv-1", &["pkg/a.rpm"]);

    let id = depot
        .engine
        .submit(
            "publish",
            exclusive("repo-1"),
            job_fn(|ctx: Ctx| async move {
                ctx.publish(PublicationRequest::new("rv-1"), |builder| {
                    builder.add_artifact("ca-0", "pkg/a.rpm")?;
                    Ok(())
                })?;
                Ok::<(), JobError>(())
            }),
        )
        .unwrap();
    let before = depot.wait(&id).await;

    let depot = depot.restart();

    assert_eq!(depot.engine.get(&id).unwrap(), before);
    assert_eq!(depot.engine.created_resources(&id).len(), 1);
    let published = depot
        .engine
        .distribution()
        .publications(&RepositoryVersionId::new("rv-1"));
    assert_eq!(published.len(), 1);
    assert!(depot
        .engine
        .distribution()
        .resolve(&published[0].id, "pkg/a.rpm")
        .is_ok());
}

#[tokio::test]
async fn restart_fails_tasks_whose_worker_was_lost() {
    let depot = Depot::start();
    let gate = Arc::new(Notify::new());
    let started = Arc::new(Notify::new());

    let running = {
        let gate = Arc::clone(&gate);
        let started = Arc::clone(&started);
        depot
            .engine
            .submit(
                "sync",
                exclusive("repo-1"),
                job_fn(move |_ctx: Ctx| {
                    let gate = Arc::clone(&gate);
                    let started = Arc::clone(&started);
                    async move {
                        started.notify_one();
                        gate.notified().await;
                        Ok::<(), JobError>(())
                    }
                }),
            )
            .unwrap()
    };
    started.notified().await;
    let waiting = depot
        .engine
        .submit("queued", exclusive("repo-1"), instant_job())
        .unwrap();

    let depot = depot.restart();

    for id in [&running, &waiting] {
        let task = depot.engine.get(id).unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.error.unwrap().kind, depot_engine::WORKER_LOST);
    }

    // The key is free again in the new process
    let next = depot
        .engine
        .submit("next", exclusive("repo-1"), instant_job())
        .unwrap();
    assert_eq!(depot.wait(&next).await.state, TaskState::Completed);
}

#[test]
fn uncommitted_publication_content_is_lost_and_orphan_swept_after_grace() {
    let mut config = DepotConfig::default();
    config.engine = EngineConfig::default().with_publication_grace(Duration::from_secs(3600));
    let depot = Depot::with_config(config);
    depot.repository_version("rv-1", &["pkg/a.rpm"]);

    let orphan = {
        let ids = SequentialIdGen::new("crash");
        let mut builder = PublicationBuilder::begin(
            depot.db(),
            PublicationRequest::new("rv-1"),
            &ids,
            &depot.clock,
        )
        .unwrap();
        builder.add_artifact("ca-0", "pkg/a.rpm").unwrap();
        let id = builder.id().clone();
        // Simulate the process dying inside the scope
        std::mem::forget(builder);
        id
    };

    // Still owned by a live builder in this process
    depot.clock.advance(Duration::from_secs(7200));
    assert!(depot
        .engine
        .sweep_incomplete_publications()
        .unwrap()
        .is_empty());

    let depot = depot.restart();
    let record = depot.db().read(|s| s.publication(&orphan).cloned()).unwrap();
    assert!(!record.publication.complete);
    assert_eq!(record.artifacts().count(), 0);

    assert_eq!(
        depot.engine.sweep_incomplete_publications().unwrap(),
        vec![orphan.clone()]
    );
    assert!(depot.db().read(|s| s.publication(&orphan).is_none()));
}

#[test]
fn orphan_younger_than_grace_survives_the_sweep() {
    let mut config = DepotConfig::default();
    config.engine = EngineConfig::default().with_publication_grace(Duration::from_secs(3600));
    let depot = Depot::with_config(config);
    depot.repository_version("rv-1", &[]);

    let orphan = {
        let ids = SequentialIdGen::new("crash");
        let builder = PublicationBuilder::begin(
            depot.db(),
            PublicationRequest::new("rv-1"),
            &ids,
            &depot.clock,
        )
        .unwrap();
        let id = builder.id().clone();
        std::mem::forget(builder);
        id
    };

    let depot = depot.restart();
    depot.clock.advance(Duration::from_secs(3599));
    assert!(depot
        .engine
        .sweep_incomplete_publications()
        .unwrap()
        .is_empty());

    depot.clock.advance(Duration::from_secs(2));
    assert_eq!(
        depot.engine.sweep_incomplete_publications().unwrap(),
        vec![orphan]
    );
}
