//! Singleton edge enforcement and reference-counted deletion.

use std::sync::Arc;

use metagraph_core::{ErrorKind, Guid, PropertyMap, SyncConfig, TypeRef};
use metagraph_graph::{InMemoryStore, RepositoryFacade};
use metagraph_sync::{LastUseDeleter, RelationshipEnforcer};

const HOST: TypeRef = TypeRef::of("host-type", "Host");
const LINK: TypeRef = TypeRef::of("link-type", "Link");

fn setup() -> (Arc<InMemoryStore>, RepositoryFacade) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let store = Arc::new(InMemoryStore::default());
    let facade = RepositoryFacade::new(store.clone(), SyncConfig::default());
    (store, facade)
}

async fn node(facade: &RepositoryFacade, name: &str) -> Guid {
    let mut props = PropertyMap::new();
    props.insert("qualifiedName".to_string(), name.into());
    facade.create_node("u", &HOST, &props).await.unwrap().guid
}

async fn link(facade: &RepositoryFacade, end1: &Guid, end2: &Guid) -> Guid {
    facade
        .create_edge("u", &LINK, end1, end2, &PropertyMap::new())
        .await
        .unwrap()
        .guid
}

#[tokio::test]
async fn second_call_is_a_no_op() {
    let (store, facade) = setup();
    let enforcer = RelationshipEnforcer::new(facade.clone());
    let a = node(&facade, "a").await;
    let b = node(&facade, "b").await;

    let first = enforcer.ensure_unique_edge("u", &a, &b, &LINK).await.unwrap();
    assert!(first.created);
    assert!(first.edge.connects(&a, &b));

    let before = store.stats().await;
    let second = enforcer.ensure_unique_edge("u", &a, &b, &LINK).await.unwrap();
    assert!(!second.created);
    assert_eq!(second.edge.guid, first.edge.guid);
    assert_eq!(second.released().count(), 0);
    assert_eq!(store.stats().await.since(&before).mutations(), 0);
    assert_eq!(store.edges_of_type("Link").await.len(), 1);
}

#[tokio::test]
async fn new_partner_evicts_the_old_one() {
    let (store, facade) = setup();
    let enforcer = RelationshipEnforcer::new(facade.clone());
    let a = node(&facade, "a").await;
    let b = node(&facade, "b").await;
    let c = node(&facade, "c").await;
    enforcer.ensure_unique_edge("u", &a, &b, &LINK).await.unwrap();

    let moved = enforcer.ensure_unique_edge("u", &a, &c, &LINK).await.unwrap();
    assert!(moved.created);
    assert_eq!(moved.released_by_a.map(|p| p.guid), Some(b.clone()));
    assert!(moved.released_by_b.is_none());

    let links = store.edges_of_type("Link").await;
    assert_eq!(links.len(), 1);
    assert!(links[0].connects(&a, &c));
    assert!(!links.iter().any(|e| e.touches(&b)));
    // The old partner itself is untouched.
    assert!(store.contains_node(&b).await);
}

#[tokio::test]
async fn two_conflicting_edges_collapse_into_one() {
    let (store, facade) = setup();
    let enforcer = RelationshipEnforcer::new(facade.clone());
    let a = node(&facade, "a").await;
    let b = node(&facade, "b").await;
    let x = node(&facade, "x").await;
    let y = node(&facade, "y").await;
    link(&facade, &a, &x).await;
    link(&facade, &y, &b).await;

    let before = store.stats().await;
    let result = enforcer.ensure_unique_edge("u", &a, &b, &LINK).await.unwrap();

    let delta = store.stats().await.since(&before);
    assert_eq!(delta.edges_deleted, 2);
    assert_eq!(delta.edges_created, 1);
    assert_eq!(result.released_by_a.map(|p| p.guid), Some(x));
    assert_eq!(result.released_by_b.map(|p| p.guid), Some(y));

    let links = store.edges_of_type("Link").await;
    assert_eq!(links.len(), 1);
    assert!(links[0].connects(&a, &b));
}

#[tokio::test]
async fn reversed_edge_is_recreated_in_order() {
    let (store, facade) = setup();
    let enforcer = RelationshipEnforcer::new(facade.clone());
    let a = node(&facade, "a").await;
    let b = node(&facade, "b").await;
    let reversed = link(&facade, &b, &a).await;

    let result = enforcer.ensure_unique_edge("u", &a, &b, &LINK).await.unwrap();
    assert!(result.created);
    assert_ne!(result.edge.guid, reversed);
    assert_eq!(result.released().count(), 0);

    let links = store.edges_of_type("Link").await;
    assert_eq!(links.len(), 1);
    assert!(links[0].connects(&a, &b));
}

#[tokio::test]
async fn existing_duplicates_are_reported_not_resolved() {
    let (store, facade) = setup();
    let enforcer = RelationshipEnforcer::new(facade.clone());
    let a = node(&facade, "a").await;
    let b = node(&facade, "b").await;
    let c = node(&facade, "c").await;
    link(&facade, &a, &b).await;
    link(&facade, &a, &c).await;

    let before = store.stats().await;
    let err = enforcer
        .ensure_unique_edge("u", &a, &b, &LINK)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousRelationship);
    assert_eq!(store.stats().await.since(&before).mutations(), 0);
}

#[tokio::test]
async fn remove_unique_edge_keeps_both_ends() {
    let (store, facade) = setup();
    let enforcer = RelationshipEnforcer::new(facade.clone());
    let a = node(&facade, "a").await;
    let b = node(&facade, "b").await;
    let edge = link(&facade, &a, &b).await;

    let removed = enforcer.remove_unique_edge("u", &b, &LINK).await.unwrap();
    assert_eq!(removed.map(|e| e.guid), Some(edge));
    assert!(enforcer.remove_unique_edge("u", &b, &LINK).await.unwrap().is_none());

    assert_eq!(store.edge_count().await, 0);
    assert!(store.contains_node(&a).await);
    assert!(store.contains_node(&b).await);
}

#[tokio::test]
async fn last_use_delete_only_removes_unreferenced_nodes() {
    let (store, facade) = setup();
    let deleter = LastUseDeleter::new(facade.clone());
    let a = node(&facade, "a").await;
    let b = node(&facade, "b").await;
    let edge = link(&facade, &a, &b).await;

    assert!(!deleter.delete_if_last_use("u", &a, &HOST).await.unwrap());
    assert!(store.contains_node(&a).await);
    assert_eq!(store.stats().await.nodes_deleted, 0);

    facade.delete_edge("u", &LINK, &edge).await.unwrap();
    assert!(deleter.delete_if_last_use("u", &a, &HOST).await.unwrap());
    assert!(!store.contains_node(&a).await);
}
