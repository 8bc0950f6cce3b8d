//! Publication scope specs
//!
//! A scope either commits one complete publication with everything added
//! to it, or leaves nothing behind.

use crate::prelude::*;
use depot_core::ObjectRef;
use depot_engine::ServedEntry;
use depot_storage::ScopeError;
use similar_asserts::assert_eq;

fn ids() -> SequentialIdGen {
    SequentialIdGen::new("pub")
}

#[test]
fn scope_that_exits_normally_leaves_one_complete_publication() {
    let depot = Depot::start();
    depot.repository_version("rv-1", &["pkg/a.rpm"]);

    let (publication, ()) = publish(
        depot.db(),
        PublicationRequest::new("rv-1"),
        &ids(),
        &depot.clock,
        |builder| {
            builder.add_artifact("ca-0", "pkg/a.rpm")?;
            builder.add_metadata_file("files/repomd", "repodata/repomd.xml")?;
            Ok(())
        },
    )
    .unwrap();

    assert!(publication.complete);
    let published = depot
        .engine
        .distribution()
        .publications(&RepositoryVersionId::new("rv-1"));
    assert_eq!(published.len(), 1);

    let paths: Vec<String> = depot
        .engine
        .distribution()
        .listing(&publication.id)
        .unwrap()
        .iter()
        .map(|e| e.relative_path().to_string())
        .collect();
    assert_eq!(paths, vec!["pkg/a.rpm", "repodata/repomd.xml"]);
}

#[test]
fn scope_that_fails_leaves_no_publication_row() {
    let depot = Depot::start();
    depot.repository_version("rv-1", &["pkg/a.rpm"]);
    let mut attempted = None;

    let err = publish(
        depot.db(),
        PublicationRequest::new("rv-1"),
        &ids(),
        &depot.clock,
        |builder| -> Result<(), ScopeError> {
            attempted = Some(builder.id().clone());
            builder.add_artifact("ca-0", "pkg/a.rpm")?;
            builder.add_metadata_file("files/repomd", "repodata/repomd.xml")?;
            Err("metadata generation failed".into())
        },
    )
    .unwrap_err();

    assert_eq!(err.kind(), "transaction-abort");
    let attempted = attempted.unwrap();
    assert!(depot.db().read(|s| s.publication(&attempted).is_none()));
    let provenance = ObjectRef::publication(&attempted);
    assert!(depot
        .db()
        .read(|s| s.created_resources_for_object(&provenance).is_empty()));
    assert!(depot
        .engine
        .distribution()
        .publications(&RepositoryVersionId::new("rv-1"))
        .is_empty());
}

#[test]
fn duplicate_path_is_rejected_and_never_persisted() {
    let depot = Depot::start();
    depot.repository_version("rv-1", &["pkg/a.rpm", "pkg/b.rpm"]);

    let mut builder = PublicationBuilder::begin(
        depot.db(),
        PublicationRequest::new("rv-1"),
        &ids(),
        &depot.clock,
    )
    .unwrap();
    builder.add_artifact("ca-0", "pkg/a.rpm").unwrap();

    let err = builder.add_artifact("ca-1", "pkg/a.rpm").unwrap_err();
    assert_eq!(err.kind(), "duplicate-path");

    let publication = builder.finish().unwrap();
    let served = depot
        .engine
        .distribution()
        .resolve(&publication.id, "pkg/a.rpm")
        .unwrap();
    assert_eq!(
        served,
        ServedEntry::Artifact {
            relative_path: "pkg/a.rpm".to_string(),
            content_artifact: "ca-0".into(),
        }
    );
    let listing = depot.engine.distribution().listing(&publication.id).unwrap();
    assert_eq!(listing.len(), 1);
}

#[test]
fn incomplete_publication_is_not_served() {
    let depot = Depot::start();
    depot.repository_version("rv-1", &["pkg/a.rpm"]);

    let mut builder = PublicationBuilder::begin(
        depot.db(),
        PublicationRequest::new("rv-1"),
        &ids(),
        &depot.clock,
    )
    .unwrap();
    builder.add_artifact("ca-0", "pkg/a.rpm").unwrap();

    let err = depot
        .engine
        .distribution()
        .resolve(builder.id(), "pkg/a.rpm")
        .unwrap_err();
    assert_eq!(err.kind(), "not-found");

    builder.abort("test");
}
