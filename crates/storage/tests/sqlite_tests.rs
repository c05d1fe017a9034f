//! SQLite backend integration tests.
//!
//! These tests drive the SQLite backend through the public [`Store`] contract.

#![cfg(feature = "sqlite")]

mod common;

use std::sync::Arc;
use std::time::Duration;

use apimaster_storage::backends::sqlite::SqliteBackend;
use apimaster_storage::context::RequestContext;
use apimaster_storage::core::{Backend, BackendCapability, Preconditions, Store, UpdateOutcome};
use apimaster_storage::error::{StorageError, StorageResult};
use apimaster_storage::types::{PageRequest, ResourceList, SelectionPredicate};

use common::{Service, ServiceFixture, init_tracing, key, registry, service};

async fn create_backend() -> SqliteBackend {
    init_tracing();
    let backend = SqliteBackend::in_memory(registry()).expect("Failed to create SQLite backend");
    backend.initialize().await.expect("Failed to initialize schema");
    backend
}

async fn seed(backend: &SqliteBackend, services: impl IntoIterator<Item = Service>) {
    let ctx = RequestContext::background();
    for svc in services {
        let mut out = Service::default();
        backend
            .create(&ctx, &key(&svc.metadata.name), &svc, &mut out, 0)
            .await
            .unwrap();
    }
}

async fn list(backend: &SqliteBackend, predicate: &SelectionPredicate) -> ResourceList<Service> {
    let mut list = ResourceList::new();
    backend
        .get_to_list(&RequestContext::background(), "ns/", predicate, &mut list)
        .await
        .unwrap();
    list
}

fn add_replica(mut current: Service) -> StorageResult<UpdateOutcome<Service>> {
    current.spec.replicas += 1;
    Ok(UpdateOutcome::new(current).changed("spec.replicas"))
}

// ============================================================================
// Create / Get
// ============================================================================

#[tokio::test]
async fn test_create_then_get() {
    let backend = create_backend().await;
    let ctx = RequestContext::background();

    let svc = ServiceFixture::new("foo").with_port(8080).build();
    let mut created = Service::default();
    backend.create(&ctx, "ns/foo", &svc, &mut created, 0).await.unwrap();

    let mut fetched = Service::default();
    backend.get(&ctx, "ns/foo", &mut fetched, false).await.unwrap();
    assert_eq!(fetched.metadata.name, "foo");
    assert_eq!(fetched.metadata.resource_version, "1");
    assert_eq!(fetched.spec.port, 8080);
    assert_eq!(fetched.spec.replicas, 0);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn test_round_trip_preserves_everything_but_versions() {
    let backend = create_backend().await;
    let ctx = RequestContext::background();

    let svc = ServiceFixture::new("foo")
        .with_label("tier", "prod")
        .with_label("team", "edge")
        .with_host("api.example.com")
        .with_uid("uid-foo")
        .build();
    let mut out = Service::default();
    backend.create(&ctx, "ns/foo", &svc, &mut out, 0).await.unwrap();

    assert_eq!(out.metadata.labels, svc.metadata.labels);
    assert_eq!(out.metadata.uid, "uid-foo");
    assert_eq!(out.metadata.namespace, "ns");
    assert_eq!(out.spec, svc.spec);
    assert_eq!(out.type_meta.kind, "Service");
}

#[tokio::test]
async fn test_create_twice_keeps_first_value() {
    let backend = create_backend().await;
    let ctx = RequestContext::background();
    seed(&backend, [ServiceFixture::new("foo").with_port(1).build()]).await;

    let mut out = Service::default();
    let err = backend
        .create(&ctx, "ns/foo", &ServiceFixture::new("foo").with_port(2).build(), &mut out, 0)
        .await
        .unwrap_err();
    assert!(err.is_already_exists());

    let mut fetched = Service::default();
    backend.get(&ctx, "ns/foo", &mut fetched, false).await.unwrap();
    assert_eq!(fetched.spec.port, 1);
}

#[tokio::test]
async fn test_create_with_ttl_is_accepted() {
    let backend = create_backend().await;
    let ctx = RequestContext::background();
    assert!(!backend.supports(BackendCapability::Expiry));

    let mut out = Service::default();
    backend
        .create(&ctx, "ns/foo", &service("foo", "prod"), &mut out, 30)
        .await
        .unwrap();
    assert_eq!(out.metadata.name, "foo");
}

#[tokio::test]
async fn test_get_not_found_semantics() {
    let backend = create_backend().await;
    let ctx = RequestContext::background();

    let mut out = service("stale", "prod");
    let err = backend.get(&ctx, "ns/missing", &mut out, false).await.unwrap_err();
    assert!(err.is_not_found());

    backend.get(&ctx, "ns/missing", &mut out, true).await.unwrap();
    assert_eq!(out, Service::default());
}

// ============================================================================
// List
// ============================================================================

#[tokio::test]
async fn test_pagination_is_stable() {
    let backend = create_backend().await;
    seed(&backend, (0..25).map(|i| service(&format!("svc-{i:02}"), "prod"))).await;

    let predicate = SelectionPredicate::everything().with_page(2, 10);
    let first = list(&backend, &predicate).await;
    let second = list(&backend, &predicate).await;

    let expected: Vec<String> = (10..20).map(|i| format!("svc-{i:02}")).collect();
    assert_eq!(first.names(), expected);
    assert_eq!(first.names(), second.names());
    assert_eq!(first.metadata.total_items, Some(25));
}

#[tokio::test]
async fn test_page_past_the_end_is_empty() {
    let backend = create_backend().await;
    seed(&backend, (0..5).map(|i| service(&format!("svc-{i}"), "prod"))).await;

    let page = list(&backend, &SelectionPredicate::everything().with_page(3, 10)).await;
    assert!(page.is_empty());
    assert_eq!(page.metadata.total_items, Some(5));
}

#[tokio::test]
async fn test_label_selector() {
    let backend = create_backend().await;
    seed(&backend, (0..5).map(|i| service(&format!("prod-{i}"), "prod"))).await;
    seed(&backend, (0..5).map(|i| service(&format!("dev-{i}"), "dev"))).await;

    let predicate = SelectionPredicate::parse("tier=prod", "", None).unwrap();
    let prod = list(&backend, &predicate).await;
    assert_eq!(prod.len(), 5);
    assert!(prod.items.iter().all(|s| s.metadata.labels["tier"] == "prod"));

    let predicate = SelectionPredicate::parse("tier!=prod", "", None).unwrap();
    assert_eq!(list(&backend, &predicate).await.len(), 5);
}

#[tokio::test]
async fn test_field_selectors() {
    let backend = create_backend().await;
    seed(
        &backend,
        [
            ServiceFixture::new("foo").with_port(8080).with_host("api.example.com").build(),
            ServiceFixture::new("bar").with_port(9090).build(),
        ],
    )
    .await;

    let predicate = SelectionPredicate::parse("", "metadata.name=foo", None).unwrap();
    assert_eq!(list(&backend, &predicate).await.names(), vec!["foo"]);

    // Mirrored integer column.
    let predicate = SelectionPredicate::parse("", "spec.port=9090", None).unwrap();
    assert_eq!(list(&backend, &predicate).await.names(), vec!["bar"]);

    // Evaluated against the raw object.
    let predicate = SelectionPredicate::parse("", "spec.host!=api.example.com", None).unwrap();
    assert_eq!(list(&backend, &predicate).await.names(), vec!["bar"]);
}

#[tokio::test]
async fn test_selector_and_page_together() {
    let backend = create_backend().await;
    seed(
        &backend,
        (0..12).map(|i| service(&format!("svc-{i:02}"), if i % 3 == 0 { "dev" } else { "prod" })),
    )
    .await;

    let predicate =
        SelectionPredicate::parse("tier=prod", "", Some(PageRequest::new(2, 5))).unwrap();
    let page = list(&backend, &predicate).await;
    assert_eq!(page.metadata.total_items, Some(8));
    assert_eq!(page.names(), vec!["svc-08", "svc-10", "svc-11"]);
}

// ============================================================================
// GuaranteedUpdate
// ============================================================================

#[tokio::test]
async fn test_update_accumulates() {
    let backend = create_backend().await;
    let ctx = RequestContext::background();
    seed(&backend, [service("foo", "prod")]).await;

    let mut out = Service::default();
    for _ in 0..2 {
        backend
            .guaranteed_update(&ctx, "ns/foo", &mut out, false, None, Box::new(add_replica))
            .await
            .unwrap();
    }
    assert_eq!(out.spec.replicas, 2);

    let mut fetched = Service::default();
    backend.get(&ctx, "ns/foo", &mut fetched, false).await.unwrap();
    assert_eq!(fetched.spec.replicas, 2);

    // The mirrored column follows the update.
    let predicate = SelectionPredicate::parse("", "spec.replicas=2", None).unwrap();
    assert_eq!(list(&backend, &predicate).await.names(), vec!["foo"]);
}

#[tokio::test]
async fn test_update_missing_key() {
    let backend = create_backend().await;
    let ctx = RequestContext::background();

    let mut out = Service::default();
    let err = backend
        .guaranteed_update(&ctx, "ns/new", &mut out, false, None, Box::new(add_replica))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    backend
        .guaranteed_update(&ctx, "ns/new", &mut out, true, None, Box::new(add_replica))
        .await
        .unwrap();
    assert_eq!(out.metadata.name, "new");
    assert_eq!(out.spec.replicas, 1);
}

#[tokio::test]
async fn test_update_error_leaves_object_unchanged() {
    let backend = create_backend().await;
    let ctx = RequestContext::background();
    seed(&backend, [ServiceFixture::new("foo").with_port(1).build()]).await;

    let mut out = Service::default();
    let err = backend
        .guaranteed_update(
            &ctx,
            "ns/foo",
            &mut out,
            false,
            None,
            Box::new(|_current: Service| -> StorageResult<UpdateOutcome<Service>> {
                Err(StorageError::invalid_object("ns/foo", "rejected"))
            }),
        )
        .await
        .unwrap_err();
    assert!(err.is_invalid_object());

    let mut fetched = Service::default();
    backend.get(&ctx, "ns/foo", &mut fetched, false).await.unwrap();
    assert_eq!(fetched.spec.port, 1);
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_then_get() {
    let backend = create_backend().await;
    let ctx = RequestContext::background();
    seed(&backend, [service("foo", "prod")]).await;

    let mut deleted = Service::default();
    backend.delete(&ctx, "ns/foo", &mut deleted, None).await.unwrap();
    assert_eq!(deleted.metadata.name, "foo");

    let mut out = Service::default();
    let err = backend.get(&ctx, "ns/foo", &mut out, false).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_delete_missing_key_changes_nothing() {
    let backend = create_backend().await;
    let ctx = RequestContext::background();
    seed(&backend, [service("foo", "prod")]).await;

    let mut out = Service::default();
    let err = backend.delete(&ctx, "ns/bar", &mut out, None).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(list(&backend, &SelectionPredicate::everything()).await.len(), 1);
}

#[tokio::test]
async fn test_delete_precondition_mismatch() {
    let backend = create_backend().await;
    let ctx = RequestContext::background();
    seed(&backend, [ServiceFixture::new("foo").with_uid("uid-1").build()]).await;

    let mut out = Service::default();
    let err = backend
        .delete(&ctx, "ns/foo", &mut out, Some(&Preconditions::uid("uid-2")))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(list(&backend, &SelectionPredicate::everything()).await.len(), 1);
}

// ============================================================================
// Context and lifecycle
// ============================================================================

#[tokio::test]
async fn test_cancelled_context_is_rejected() {
    let backend = create_backend().await;
    let ctx = RequestContext::background();
    ctx.cancel();

    let mut out = Service::default();
    let err = backend
        .create(&ctx, "ns/foo", &service("foo", "prod"), &mut out, 0)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(list(&backend, &SelectionPredicate::everything()).await.is_empty());
}

#[tokio::test]
async fn test_expired_deadline_is_rejected() {
    let backend = create_backend().await;
    let ctx = RequestContext::with_timeout(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(5)).await;

    let mut out = Service::default();
    let err = backend.get(&ctx, "ns/foo", &mut out, true).await.unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_file_database_survives_reopen() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("apimaster.db");
    let ctx = RequestContext::background();

    {
        let backend = SqliteBackend::open(&path, registry()).unwrap();
        backend.initialize().await.unwrap();
        let mut out = Service::default();
        backend
            .create(&ctx, "ns/foo", &service("foo", "prod"), &mut out, 0)
            .await
            .unwrap();
    }

    let backend = SqliteBackend::open(&path, registry()).unwrap();
    backend.initialize().await.unwrap();
    assert!(backend.health_check().await.is_ok());
    let mut out = Service::default();
    backend.get(&ctx, "ns/foo", &mut out, false).await.unwrap();
    assert_eq!(out.metadata.labels["tier"], "prod");
}

#[tokio::test]
async fn test_concurrent_creates_on_file_database() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(SqliteBackend::open(dir.path().join("db.sqlite"), registry()).unwrap());
    backend.initialize().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let backend = Arc::clone(&backend);
        handles.push(tokio::spawn(async move {
            let ctx = RequestContext::background();
            let name = format!("svc-{i}");
            let mut out = Service::default();
            backend
                .create(&ctx, &key(&name), &service(&name, "prod"), &mut out, 0)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let all = list(&backend, &SelectionPredicate::everything()).await;
    assert_eq!(all.len(), 8);
}
