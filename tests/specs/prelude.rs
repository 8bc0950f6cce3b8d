//! Shared harness for behavioral specs

#![allow(dead_code)]

pub use depot_core::{
    ContentEntry, DepotConfig, EngineConfig, FakeClock, PublicationId, PublicationRequest,
    RepositoryId, RepositoryVersion, RepositoryVersionId, ResourceRequest, SchedulerConfig,
    SequentialIdGen, Task, TaskId, TaskState,
};
pub use depot_engine::{job_fn, Engine, Job, JobError, TaskContext};
pub use depot_storage::{publish, Database, Operation, PublicationBuilder};
pub use std::sync::Arc;
pub use std::time::Duration;

use tempfile::TempDir;

pub type Ctx = TaskContext<FakeClock, SequentialIdGen>;
pub type SpecEngine = Engine<FakeClock, SequentialIdGen>;

/// A depot rooted in a temp dir, with a fake clock
pub struct Depot {
    dir: TempDir,
    config: DepotConfig,
    pub engine: SpecEngine,
    pub clock: FakeClock,
}

impl Depot {
    pub fn start() -> Self {
        Self::with_config(DepotConfig::default())
    }

    pub fn with_config(config: DepotConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let clock = FakeClock::new();
        let engine = open_engine(&dir, &config, &clock, "id");
        Self {
            dir,
            config,
            engine,
            clock,
        }
    }

    /// Drop the engine and open the same data dir as a fresh process would
    pub fn restart(self) -> Self {
        let Depot {
            dir,
            config,
            engine,
            clock,
        } = self;
        drop(engine);
        // Fresh id prefix so new records never collide with replayed ones
        let engine = open_engine(&dir, &config, &clock, "restarted");
        engine.recover().unwrap();
        Self {
            dir,
            config,
            engine,
            clock,
        }
    }

    pub fn db(&self) -> &Database {
        self.engine.db()
    }

    /// Seed a repository version with the given content paths
    pub fn repository_version(&self, id: &str, paths: &[&str]) {
        let content = paths
            .iter()
            .enumerate()
            .map(|(i, path)| ContentEntry {
                content_artifact: format!("ca-{}", i).into(),
                relative_path: path.to_string(),
            })
            .collect();
        self.db()
            .execute(Operation::RepositoryVersionCreate {
                version: RepositoryVersion {
                    id: RepositoryVersionId::new(id),
                    repository: RepositoryId::new("repo-1"),
                    number: 1,
                    content,
                },
            })
            .unwrap();
    }

    pub fn state(&self, id: &TaskId) -> TaskState {
        self.engine.get(id).unwrap().state
    }

    pub async fn wait(&self, id: &TaskId) -> Task {
        tokio::time::timeout(Duration::from_secs(5), self.engine.wait(id))
            .await
            .expect("task did not finish in time")
            .unwrap()
    }
}

fn open_engine(
    dir: &TempDir,
    config: &DepotConfig,
    clock: &FakeClock,
    id_prefix: &str,
) -> SpecEngine {
    let db = Arc::new(Database::open(dir.path(), "specs").unwrap());
    Engine::new(db, config, clock.clone(), SequentialIdGen::new(id_prefix))
}

pub fn exclusive(key: &str) -> Vec<ResourceRequest> {
    vec![ResourceRequest::exclusive(key)]
}

pub fn shared(key: &str) -> Vec<ResourceRequest> {
    vec![ResourceRequest::shared(key)]
}

pub fn instant_job() -> impl Job<FakeClock, SequentialIdGen> {
    job_fn(|_ctx: Ctx| async { Ok::<(), JobError>(()) })
}
