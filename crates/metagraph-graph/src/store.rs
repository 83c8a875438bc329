//! The store capability consumed by the synchronization layer.
//!
//! A store offers point operations only: one node or one edge per call, no
//! transactions, no cascading delete, no uniqueness constraints. Every call
//! carries the caller's user id for the backend's own authorization.

use async_trait::async_trait;

use metagraph_core::{
    Edge, Guid, MatchCriteria, Node, Paging, PropertyMap, StoreError, TypeRef,
};

/// Point CRUD over typed nodes and edges.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Name of the backend, used in error messages.
    fn name(&self) -> &str;

    /// Whether the backend is initialized and accepting calls.
    async fn is_active(&self) -> bool;

    /// Header-level read of a node. Succeeds for proxy records too.
    async fn get_node_summary(&self, user_id: &str, guid: &Guid) -> Result<Node, StoreError>;

    /// Full read of a node. Fails with [`StoreError::EntityProxyOnly`] for
    /// reference-only records.
    async fn get_node_detail(&self, user_id: &str, guid: &Guid) -> Result<Node, StoreError>;

    /// Create a node. `Ok(None)` means the backend accepted the call but
    /// returned nothing.
    async fn create_node(
        &self,
        user_id: &str,
        node_type: &TypeRef,
        properties: &PropertyMap,
    ) -> Result<Option<Node>, StoreError>;

    /// Replace the whole property set of a node.
    async fn update_node_properties(
        &self,
        user_id: &str,
        guid: &Guid,
        properties: &PropertyMap,
    ) -> Result<Option<Node>, StoreError>;

    /// Delete a node. Backends refuse to delete a node that still has edges.
    async fn delete_node(
        &self,
        user_id: &str,
        node_type: &TypeRef,
        guid: &Guid,
    ) -> Result<(), StoreError>;

    /// Nodes of `node_type` (or a subtype) whose properties match exactly.
    /// Results keep the backend's order.
    async fn find_nodes_by_properties(
        &self,
        user_id: &str,
        node_type: &TypeRef,
        properties: &PropertyMap,
        criteria: MatchCriteria,
        paging: Paging,
    ) -> Result<Vec<Node>, StoreError>;

    /// Edges touching `guid` at either end, optionally of one type.
    async fn get_edges_for_node(
        &self,
        user_id: &str,
        guid: &Guid,
        edge_type: Option<&TypeRef>,
        paging: Paging,
    ) -> Result<Vec<Edge>, StoreError>;

    /// Create an edge from `end1` to `end2`.
    async fn create_edge(
        &self,
        user_id: &str,
        edge_type: &TypeRef,
        end1: &Guid,
        end2: &Guid,
        properties: &PropertyMap,
    ) -> Result<Option<Edge>, StoreError>;

    async fn delete_edge(
        &self,
        user_id: &str,
        edge_type: &TypeRef,
        guid: &Guid,
    ) -> Result<(), StoreError>;
}
