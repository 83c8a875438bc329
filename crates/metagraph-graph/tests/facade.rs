//! Repository facade behaviour over the in-memory backend.

use std::sync::Arc;

use metagraph_core::{
    ErrorKind, Guid, MetadataError, Paging, PropertyMap, PropertyValue, SyncConfig, TypeRef,
};
use metagraph_graph::{InMemoryStore, Lookup, MetadataStore, RepositoryFacade};

const ENDPOINT: TypeRef = TypeRef::of("endpoint-type", "Endpoint");
const CONNECTION: TypeRef = TypeRef::of("connection-type", "Connection");
const LINK: TypeRef = TypeRef::of("link-type", "Link");

const NAME_PROPERTIES: &[&str] = &["qualifiedName", "displayName"];

fn setup() -> (Arc<InMemoryStore>, RepositoryFacade) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let store = Arc::new(InMemoryStore::default());
    let facade = RepositoryFacade::new(store.clone(), SyncConfig::default());
    (store, facade)
}

fn named(name: &str) -> PropertyMap {
    let mut map = PropertyMap::new();
    map.insert("qualifiedName".to_string(), name.into());
    map
}

#[tokio::test]
async fn unique_name_lookup_is_tri_state() {
    let (_, facade) = setup();

    let none = facade
        .find_unique_node_by_name("u", "conn-1", NAME_PROPERTIES, &CONNECTION)
        .await
        .unwrap();
    assert!(matches!(none, Lookup::NotFound));

    let created = facade.create_node("u", &CONNECTION, &named("conn-1")).await.unwrap();
    let one = facade
        .find_unique_node_by_name("u", "conn-1", NAME_PROPERTIES, &CONNECTION)
        .await
        .unwrap();
    match one {
        Lookup::Unique(node) => assert_eq!(node.guid, created.guid),
        other => panic!("expected a unique match, got {other:?}"),
    }

    // A node of another type with the same name does not count.
    facade.create_node("u", &ENDPOINT, &named("conn-1")).await.unwrap();
    let still_one = facade
        .get_unique_node_by_name("u", "conn-1", NAME_PROPERTIES, &CONNECTION)
        .await
        .unwrap();
    assert_eq!(still_one.map(|n| n.guid), Some(created.guid));
}

#[tokio::test]
async fn ambiguous_name_lists_every_match() {
    let (_, facade) = setup();
    let first = facade.create_node("u", &CONNECTION, &named("dup")).await.unwrap();
    let mut by_display = PropertyMap::new();
    by_display.insert("displayName".to_string(), "dup".into());
    let second = facade.create_node("u", &CONNECTION, &by_display).await.unwrap();

    let err = facade
        .get_unique_node_by_name("u", "dup", NAME_PROPERTIES, &CONNECTION)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousName);
    match &err {
        MetadataError::AmbiguousName { matches, .. } => {
            assert_eq!(matches, &vec![first.guid.clone(), second.guid.clone()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains(first.guid.as_str()));
    assert!(message.contains(second.guid.as_str()));
}

#[tokio::test]
async fn blank_arguments_are_rejected_before_the_store() {
    let (store, facade) = setup();

    let err = facade
        .get_node("u", &Guid::from("  "), &CONNECTION)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = facade
        .find_nodes_by_name("u", "", NAME_PROPERTIES, &CONNECTION, Paging::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(store.stats().await.mutations(), 0);
}

#[tokio::test]
async fn summary_hides_unknown_and_retired_nodes() {
    let (store, facade) = setup();
    let node = facade.create_node("u", &ENDPOINT, &named("ep-1")).await.unwrap();

    assert!(facade
        .get_node_summary("u", &node.guid, &ENDPOINT)
        .await
        .unwrap()
        .is_some());
    assert!(facade
        .get_node_summary("u", &Guid::from("missing"), &ENDPOINT)
        .await
        .unwrap()
        .is_none());

    assert!(store.retire(&node.guid).await);
    assert!(facade
        .get_node_summary("u", &node.guid, &ENDPOINT)
        .await
        .unwrap()
        .is_none());
    let err = facade.get_node("u", &node.guid, &ENDPOINT).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownEntity);
}

#[tokio::test]
async fn wrong_type_is_an_invalid_argument() {
    let (_, facade) = setup();
    let node = facade.create_node("u", &ENDPOINT, &named("ep-1")).await.unwrap();

    let err = facade
        .get_node_summary("u", &node.guid, &CONNECTION)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn store_failures_are_translated() {
    let (store, facade) = setup();

    let proxy = store.insert_proxy(&ENDPOINT, named("remote-ep")).await;
    let err = facade.get_node("u", &proxy, &ENDPOINT).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProxyOnly);

    store.deny_user("mallory").await;
    let err = facade
        .create_node("mallory", &ENDPOINT, &named("ep"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotAuthorized);
    assert!(err.to_string().contains("mallory"));

    store.set_active(false).await;
    let err = facade.verify_store_active("save").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    assert!(err.to_string().contains("in-memory"));
}

#[tokio::test]
async fn missing_write_result_is_an_invariant_violation() {
    let (store, facade) = setup();
    store.set_drop_write_results(true).await;

    let err = facade
        .create_node("u", &ENDPOINT, &named("ep-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ServerInvariantViolation);
    assert!(!err.kind().is_caller_error());
}

#[tokio::test]
async fn unique_edge_lookups() {
    let (_, facade) = setup();
    let conn = facade.create_node("u", &CONNECTION, &named("c")).await.unwrap();
    let ep1 = facade.create_node("u", &ENDPOINT, &named("e1")).await.unwrap();
    let ep2 = facade.create_node("u", &ENDPOINT, &named("e2")).await.unwrap();

    let err = facade
        .get_required_edge_of_type("u", &conn.guid, &LINK)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoRelationshipFound);

    let edge = facade
        .create_edge("u", &LINK, &ep1.guid, &conn.guid, &PropertyMap::new())
        .await
        .unwrap();
    let found = facade
        .get_required_edge_of_type("u", &conn.guid, &LINK)
        .await
        .unwrap();
    assert_eq!(found.guid, edge.guid);

    let between = facade
        .get_edge_between("u", &conn.guid, &ep1.guid, &LINK)
        .await
        .unwrap();
    assert_eq!(between.map(|e| e.guid), Some(edge.guid));
    assert!(facade
        .get_edge_between("u", &conn.guid, &ep2.guid, &LINK)
        .await
        .unwrap()
        .is_none());

    facade
        .create_edge("u", &LINK, &ep2.guid, &conn.guid, &PropertyMap::new())
        .await
        .unwrap();
    let err = facade
        .get_unique_edge_of_type("u", &conn.guid, &LINK)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AmbiguousRelationship);
}

#[tokio::test]
async fn delete_if_unreferenced_leaves_referenced_nodes() {
    let (store, facade) = setup();
    let a = facade.create_node("u", &ENDPOINT, &named("a")).await.unwrap();
    let b = facade.create_node("u", &ENDPOINT, &named("b")).await.unwrap();
    let edge = facade
        .create_edge("u", &LINK, &a.guid, &b.guid, &PropertyMap::new())
        .await
        .unwrap();

    assert!(!facade
        .delete_node_if_unreferenced("u", &a.guid, &ENDPOINT)
        .await
        .unwrap());
    assert!(store.contains_node(&a.guid).await);

    facade.delete_edge("u", &LINK, &edge.guid).await.unwrap();
    assert!(facade
        .delete_node_if_unreferenced("u", &a.guid, &ENDPOINT)
        .await
        .unwrap());
    assert!(!store.contains_node(&a.guid).await);
}

#[tokio::test]
async fn update_replaces_the_property_bag() {
    let (store, facade) = setup();
    let mut props = named("ep-1");
    props.insert("position".to_string(), PropertyValue::Int(1));
    let node = facade.create_node("u", &ENDPOINT, &props).await.unwrap();

    let updated = facade
        .update_node_properties("v", &node.guid, &ENDPOINT, &named("ep-1"))
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.updated_by.as_deref(), Some("v"));
    assert!(updated.property("position").is_none());

    let raw = store.get_node_detail("u", &node.guid).await.unwrap();
    assert_eq!(raw.properties, named("ep-1"));
}
