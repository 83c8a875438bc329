//! In-process store backend.
//!
//! Keeps nodes and edges in hash maps guarded by an async mutex and returns
//! results in insertion order. Counts every mutation and can be told to
//! misbehave (go inactive, deny a user, drop write results), which makes it
//! the backend of choice for tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use metagraph_core::{
    Edge, Guid, InstanceStatus, MatchCriteria, Node, Paging, PropertyMap, StoreError, TypeRef,
};

use crate::store::MetadataStore;

/// Mutation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub nodes_deleted: usize,
    pub edges_created: usize,
    pub edges_deleted: usize,
}

impl StoreStats {
    pub fn mutations(&self) -> usize {
        self.nodes_created
            + self.nodes_updated
            + self.nodes_deleted
            + self.edges_created
            + self.edges_deleted
    }

    /// Counters accumulated since `earlier` was taken.
    pub fn since(&self, earlier: &StoreStats) -> StoreStats {
        StoreStats {
            nodes_created: self.nodes_created - earlier.nodes_created,
            nodes_updated: self.nodes_updated - earlier.nodes_updated,
            nodes_deleted: self.nodes_deleted - earlier.nodes_deleted,
            edges_created: self.edges_created - earlier.edges_created,
            edges_deleted: self.edges_deleted - earlier.edges_deleted,
        }
    }
}

struct StoredNode {
    node: Node,
    seq: u64,
    proxy: bool,
}

struct StoredEdge {
    edge: Edge,
    seq: u64,
}

struct State {
    nodes: HashMap<Guid, StoredNode>,
    edges: HashMap<Guid, StoredEdge>,
    next_seq: u64,
    stats: StoreStats,
    active: bool,
    denied_users: HashSet<String>,
    drop_write_results: bool,
}

impl State {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn check_user(&self, user_id: &str) -> Result<(), StoreError> {
        if self.denied_users.contains(user_id) {
            return Err(StoreError::UserNotAuthorized {
                user_id: user_id.to_string(),
                detail: "access to the repository is denied".to_string(),
            });
        }
        Ok(())
    }

    fn stored_node(&self, guid: &Guid) -> Result<&StoredNode, StoreError> {
        self.nodes.get(guid).ok_or_else(|| StoreError::EntityNotKnown {
            guid: guid.to_string(),
        })
    }
}

/// A complete store held in memory.
pub struct InMemoryStore {
    name: String,
    state: Mutex<State>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("in-memory")
    }
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State {
                nodes: HashMap::new(),
                edges: HashMap::new(),
                next_seq: 0,
                stats: StoreStats::default(),
                active: true,
                denied_users: HashSet::new(),
                drop_write_results: false,
            }),
        }
    }

    // ── Fault injection ──────────────────────────────────────────

    pub async fn set_active(&self, active: bool) {
        self.state.lock().await.active = active;
    }

    /// Reject every call made on behalf of `user_id`.
    pub async fn deny_user(&self, user_id: &str) {
        self.state
            .lock()
            .await
            .denied_users
            .insert(user_id.to_string());
    }

    /// Perform creates and updates but report nothing back.
    pub async fn set_drop_write_results(&self, drop: bool) {
        self.state.lock().await.drop_write_results = drop;
    }

    /// Register a reference-only copy of a node owned by another repository.
    pub async fn insert_proxy(&self, node_type: &TypeRef, properties: PropertyMap) -> Guid {
        let mut state = self.state.lock().await;
        let node = new_node(node_type, properties, "remote");
        let guid = node.guid.clone();
        let seq = state.seq();
        state.nodes.insert(
            guid.clone(),
            StoredNode {
                node,
                seq,
                proxy: true,
            },
        );
        guid
    }

    /// Soft-delete a node in place.
    pub async fn retire(&self, guid: &Guid) -> bool {
        let mut state = self.state.lock().await;
        match state.nodes.get_mut(guid) {
            Some(stored) => {
                stored.node.status = InstanceStatus::Deleted;
                true
            }
            None => false,
        }
    }

    // ── Inspection ───────────────────────────────────────────────

    pub async fn stats(&self) -> StoreStats {
        self.state.lock().await.stats
    }

    pub async fn node_count(&self) -> usize {
        self.state.lock().await.nodes.len()
    }

    pub async fn edge_count(&self) -> usize {
        self.state.lock().await.edges.len()
    }

    pub async fn contains_node(&self, guid: &Guid) -> bool {
        self.state.lock().await.nodes.contains_key(guid)
    }

    /// Every edge of the named type, in creation order.
    pub async fn edges_of_type(&self, type_name: &str) -> Vec<Edge> {
        let state = self.state.lock().await;
        let mut edges: Vec<&StoredEdge> = state
            .edges
            .values()
            .filter(|e| e.edge.edge_type.name == type_name)
            .collect();
        edges.sort_by_key(|e| e.seq);
        edges.into_iter().map(|e| e.edge.clone()).collect()
    }
}

fn new_node(node_type: &TypeRef, properties: PropertyMap, user_id: &str) -> Node {
    Node {
        guid: Guid::new(),
        node_type: node_type.clone(),
        status: InstanceStatus::Active,
        properties,
        created_by: user_id.to_string(),
        updated_by: None,
        create_time: Utc::now(),
        update_time: None,
        version: 1,
    }
}

fn properties_match(node: &Node, filter: &PropertyMap, criteria: MatchCriteria) -> bool {
    let mut terms = filter
        .iter()
        .map(|(key, value)| node.properties.get(key) == Some(value));
    match criteria {
        MatchCriteria::All => terms.all(|hit| hit),
        MatchCriteria::Any => terms.any(|hit| hit),
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_active(&self) -> bool {
        self.state.lock().await.active
    }

    async fn get_node_summary(&self, user_id: &str, guid: &Guid) -> Result<Node, StoreError> {
        let state = self.state.lock().await;
        state.check_user(user_id)?;
        Ok(state.stored_node(guid)?.node.clone())
    }

    async fn get_node_detail(&self, user_id: &str, guid: &Guid) -> Result<Node, StoreError> {
        let state = self.state.lock().await;
        state.check_user(user_id)?;
        let stored = state.stored_node(guid)?;
        if stored.proxy {
            return Err(StoreError::EntityProxyOnly {
                guid: guid.to_string(),
            });
        }
        Ok(stored.node.clone())
    }

    async fn create_node(
        &self,
        user_id: &str,
        node_type: &TypeRef,
        properties: &PropertyMap,
    ) -> Result<Option<Node>, StoreError> {
        let mut state = self.state.lock().await;
        state.check_user(user_id)?;

        let node = new_node(node_type, properties.clone(), user_id);
        let seq = state.seq();
        state.nodes.insert(
            node.guid.clone(),
            StoredNode {
                node: node.clone(),
                seq,
                proxy: false,
            },
        );
        state.stats.nodes_created += 1;

        Ok((!state.drop_write_results).then_some(node))
    }

    async fn update_node_properties(
        &self,
        user_id: &str,
        guid: &Guid,
        properties: &PropertyMap,
    ) -> Result<Option<Node>, StoreError> {
        let mut state = self.state.lock().await;
        state.check_user(user_id)?;
        let drop_results = state.drop_write_results;

        let stored = state
            .nodes
            .get_mut(guid)
            .ok_or_else(|| StoreError::EntityNotKnown {
                guid: guid.to_string(),
            })?;
        stored.node.properties = properties.clone();
        stored.node.updated_by = Some(user_id.to_string());
        stored.node.update_time = Some(Utc::now());
        stored.node.version += 1;
        let node = stored.node.clone();
        state.stats.nodes_updated += 1;

        Ok((!drop_results).then_some(node))
    }

    async fn delete_node(
        &self,
        user_id: &str,
        node_type: &TypeRef,
        guid: &Guid,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_user(user_id)?;

        let stored = state.stored_node(guid)?;
        if !stored.node.node_type.is_a(&node_type.name) {
            return Err(StoreError::InvalidParameter {
                parameter: "node_type".to_string(),
                detail: format!("{guid} is a {}, not a {node_type}", stored.node.node_type),
            });
        }
        if state.edges.values().any(|e| e.edge.touches(guid)) {
            return Err(StoreError::backend(anyhow::anyhow!(
                "cannot delete {guid}: node still has relationships"
            )));
        }

        state.nodes.remove(guid);
        state.stats.nodes_deleted += 1;
        Ok(())
    }

    async fn find_nodes_by_properties(
        &self,
        user_id: &str,
        node_type: &TypeRef,
        properties: &PropertyMap,
        criteria: MatchCriteria,
        paging: Paging,
    ) -> Result<Vec<Node>, StoreError> {
        let state = self.state.lock().await;
        state.check_user(user_id)?;

        let mut hits: Vec<&StoredNode> = state
            .nodes
            .values()
            .filter(|s| s.node.status == InstanceStatus::Active)
            .filter(|s| s.node.node_type.is_a(&node_type.name))
            .filter(|s| properties_match(&s.node, properties, criteria))
            .collect();
        hits.sort_by_key(|s| s.seq);
        Ok(paging.apply(hits.into_iter().map(|s| s.node.clone())))
    }

    async fn get_edges_for_node(
        &self,
        user_id: &str,
        guid: &Guid,
        edge_type: Option<&TypeRef>,
        paging: Paging,
    ) -> Result<Vec<Edge>, StoreError> {
        let state = self.state.lock().await;
        state.check_user(user_id)?;
        state.stored_node(guid)?;

        let mut hits: Vec<&StoredEdge> = state
            .edges
            .values()
            .filter(|e| e.edge.touches(guid))
            .filter(|e| edge_type.map_or(true, |t| e.edge.edge_type.is_a(&t.name)))
            .collect();
        hits.sort_by_key(|e| e.seq);
        Ok(paging.apply(hits.into_iter().map(|e| e.edge.clone())))
    }

    async fn create_edge(
        &self,
        user_id: &str,
        edge_type: &TypeRef,
        end1: &Guid,
        end2: &Guid,
        properties: &PropertyMap,
    ) -> Result<Option<Edge>, StoreError> {
        let mut state = self.state.lock().await;
        state.check_user(user_id)?;

        let end1 = state.stored_node(end1)?.node.proxy();
        let end2 = state.stored_node(end2)?.node.proxy();
        let edge = Edge {
            guid: Guid::new(),
            edge_type: edge_type.clone(),
            end1,
            end2,
            properties: properties.clone(),
            create_time: Utc::now(),
        };
        let seq = state.seq();
        state.edges.insert(
            edge.guid.clone(),
            StoredEdge {
                edge: edge.clone(),
                seq,
            },
        );
        state.stats.edges_created += 1;

        Ok((!state.drop_write_results).then_some(edge))
    }

    async fn delete_edge(
        &self,
        user_id: &str,
        edge_type: &TypeRef,
        guid: &Guid,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.check_user(user_id)?;

        match state.edges.get(guid) {
            Some(stored) if stored.edge.edge_type.is_a(&edge_type.name) => {}
            Some(stored) => {
                return Err(StoreError::InvalidParameter {
                    parameter: "edge_type".to_string(),
                    detail: format!("{guid} is a {}, not a {edge_type}", stored.edge.edge_type),
                })
            }
            None => {
                return Err(StoreError::RelationshipNotKnown {
                    guid: guid.to_string(),
                })
            }
        }

        state.edges.remove(guid);
        state.stats.edges_deleted += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: TypeRef = TypeRef::of("host-type", "Host");
    const LINK: TypeRef = TypeRef::of("link-type", "Link");

    fn props(name: &str) -> PropertyMap {
        let mut map = PropertyMap::new();
        map.insert("qualifiedName".to_string(), name.into());
        map
    }

    #[tokio::test]
    async fn find_keeps_insertion_order() {
        let store = InMemoryStore::default();
        for name in ["a", "b", "c"] {
            store.create_node("u", &HOST, &props(name)).await.unwrap();
        }

        let all = store
            .find_nodes_by_properties(
                "u",
                &HOST,
                &PropertyMap::new(),
                MatchCriteria::All,
                Paging::first(10),
            )
            .await
            .unwrap();
        let names: Vec<_> = all
            .iter()
            .map(|n| n.property("qualifiedName").and_then(|v| v.as_str()).unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn delete_refuses_connected_node() {
        let store = InMemoryStore::default();
        let a = store.create_node("u", &HOST, &props("a")).await.unwrap().unwrap();
        let b = store.create_node("u", &HOST, &props("b")).await.unwrap().unwrap();
        let edge = store
            .create_edge("u", &LINK, &a.guid, &b.guid, &PropertyMap::new())
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            store.delete_node("u", &HOST, &a.guid).await,
            Err(StoreError::Backend(_))
        ));

        store.delete_edge("u", &LINK, &edge.guid).await.unwrap();
        store.delete_node("u", &HOST, &a.guid).await.unwrap();
        assert!(!store.contains_node(&a.guid).await);
        assert_eq!(store.stats().await.nodes_deleted, 1);
    }

    #[tokio::test]
    async fn denied_user_is_rejected() {
        let store = InMemoryStore::default();
        store.deny_user("mallory").await;
        let err = store
            .create_node("mallory", &HOST, &props("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UserNotAuthorized { .. }));
        assert_eq!(store.node_count().await, 0);
    }

    #[tokio::test]
    async fn proxy_has_summary_but_no_detail() {
        let store = InMemoryStore::default();
        let guid = store.insert_proxy(&HOST, props("remote")).await;

        assert!(store.get_node_summary("u", &guid).await.is_ok());
        assert!(matches!(
            store.get_node_detail("u", &guid).await,
            Err(StoreError::EntityProxyOnly { .. })
        ));
    }
}
