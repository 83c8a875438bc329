//! Synchronizer for connection trees.
//!
//! A connection owns an optional endpoint and connector type, each kept
//! singleton by the [`RelationshipEnforcer`]. A virtual connection also owns
//! an ordered list of embedded connections, saved and removed depth-first
//! with the same logic. Every store call is awaited in turn; sibling order is
//! list order.

use std::future::Future;
use std::pin::Pin;

use metagraph_core::error::Result;
use metagraph_core::{
    Edge, Guid, MetadataError, OrphanPolicy, Paging, PropertyMap, PropertyValue, TypeRef,
};
use metagraph_graph::RepositoryFacade;

use crate::cleanup::LastUseDeleter;
use crate::converter::{ConnectionConverter, ConnectorTypeConverter, Converter, EndpointConverter};
use crate::entity::EntitySynchronizer;
use crate::identity;
use crate::model::{Connection, ConnectionKind, ConnectorType, EmbeddedConnection, Endpoint};
use crate::relationships::RelationshipEnforcer;
use crate::schema;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A child that lost its edge to a node of the tree being saved.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Displaced {
    Endpoint(Guid),
    ConnectorType(Guid),
    Connection(Guid),
}

impl Displaced {
    fn guid(&self) -> &Guid {
        match self {
            Self::Endpoint(guid) | Self::ConnectorType(guid) | Self::Connection(guid) => guid,
        }
    }
}

/// Bookkeeping for one top-level save.
#[derive(Default)]
struct SaveState {
    ancestors: Vec<Guid>,
    displaced: Vec<Displaced>,
}

/// What [`ConnectionSynchronizer::remove`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalSummary {
    /// Nodes deleted, children before parents.
    pub deleted: Vec<Guid>,
    /// Nodes left in place because something else still refers to them.
    pub retained: Vec<Guid>,
    pub edges_removed: usize,
}

impl RemovalSummary {
    fn record(&mut self, guid: Guid, deleted: bool) {
        if deleted {
            self.deleted.push(guid);
        } else {
            self.retained.push(guid);
        }
    }
}

/// Saves, reads and removes [`Connection`] trees.
#[derive(Clone)]
pub struct ConnectionSynchronizer {
    facade: RepositoryFacade,
    converter: ConnectionConverter,
    endpoints: EntitySynchronizer<EndpointConverter>,
    connector_types: EntitySynchronizer<ConnectorTypeConverter>,
    enforcer: RelationshipEnforcer,
    deleter: LastUseDeleter,
}

impl ConnectionSynchronizer {
    pub fn new(facade: RepositoryFacade) -> Self {
        Self {
            converter: ConnectionConverter,
            endpoints: EntitySynchronizer::new(facade.clone(), EndpointConverter),
            connector_types: EntitySynchronizer::new(facade.clone(), ConnectorTypeConverter),
            enforcer: RelationshipEnforcer::new(facade.clone()),
            deleter: LastUseDeleter::new(facade.clone()),
            facade,
        }
    }

    pub fn endpoints(&self) -> &EntitySynchronizer<EndpointConverter> {
        &self.endpoints
    }

    pub fn connector_types(&self) -> &EntitySynchronizer<ConnectorTypeConverter> {
        &self.connector_types
    }

    // ── Save ─────────────────────────────────────────────────────

    /// Create or update the whole tree rooted at `connection` and return the
    /// root's guid.
    ///
    /// What happens to a child that the new tree no longer mentions depends
    /// on the configured [`OrphanPolicy`]; its edge is always detached. The
    /// policy runs once every edge of the new tree is in place, so a child
    /// that only moved within the tree is never removed.
    pub async fn save(&self, user_id: &str, connection: &Connection) -> Result<Guid> {
        const METHOD: &str = "save";
        self.facade.verify_store_active(METHOD).await?;
        self.validate_tree(connection, METHOD)?;

        let mut state = SaveState::default();
        let guid = self.save_tree(user_id, connection, &mut state).await?;
        self.release_displaced(user_id, &guid, state.displaced)
            .await?;

        tracing::info!(
            guid = %guid,
            qualified_name = %connection.qualified_name,
            depth = connection.nesting_depth(),
            "Connection saved"
        );
        Ok(guid)
    }

    fn save_tree<'a>(
        &'a self,
        user_id: &'a str,
        connection: &'a Connection,
        state: &'a mut SaveState,
    ) -> BoxFuture<'a, Result<Guid>> {
        Box::pin(async move {
            let existing =
                identity::resolve(&self.facade, user_id, &self.converter, connection).await?;
            if let Some(node) = existing.as_ref() {
                if state.ancestors.contains(&node.guid) {
                    return Err(MetadataError::invalid_argument(
                        "embedded",
                        format!(
                            "{} ({}) is embedded in its own subtree",
                            connection.qualified_name, node.guid
                        ),
                        "save",
                    ));
                }
            }

            let upserted =
                identity::upsert(&self.facade, user_id, &self.converter, connection, existing)
                    .await?;
            let guid = upserted.node.guid;
            tracing::debug!(
                guid = %guid,
                node_type = %upserted.node.node_type,
                created = upserted.created,
                "Connection node saved"
            );

            let displaced = self
                .save_endpoint(user_id, &guid, connection.endpoint.as_ref())
                .await?;
            state.displaced.extend(displaced);
            let displaced = self
                .save_connector_type(user_id, &guid, connection.connector_type.as_ref())
                .await?;
            state.displaced.extend(displaced);

            if let ConnectionKind::Virtual { embedded } = &connection.kind {
                state.ancestors.push(guid.clone());
                let saved = self.save_embedded(user_id, &guid, embedded, state).await;
                state.ancestors.pop();
                saved?;
            }

            Ok(guid)
        })
    }

    async fn save_endpoint(
        &self,
        user_id: &str,
        connection: &Guid,
        endpoint: Option<&Endpoint>,
    ) -> Result<Option<Displaced>> {
        let edge_type = &schema::CONNECTION_ENDPOINT;
        let released = match endpoint {
            Some(endpoint) => {
                let endpoint = self.endpoints.upsert(user_id, endpoint).await?;
                self.enforcer
                    .ensure_unique_edge(user_id, &endpoint, connection, edge_type)
                    .await?
                    .released_by_b
                    .map(|old| old.guid)
            }
            None => self
                .enforcer
                .remove_unique_edge(user_id, connection, edge_type)
                .await?
                .map(|edge| edge.end1.guid),
        };
        Ok(released.map(Displaced::Endpoint))
    }

    async fn save_connector_type(
        &self,
        user_id: &str,
        connection: &Guid,
        connector_type: Option<&ConnectorType>,
    ) -> Result<Option<Displaced>> {
        let edge_type = &schema::CONNECTION_CONNECTOR_TYPE;
        let released = match connector_type {
            Some(connector_type) => {
                let connector_type = self.connector_types.upsert(user_id, connector_type).await?;
                self.enforcer
                    .ensure_unique_edge(user_id, connection, &connector_type, edge_type)
                    .await?
                    .released_by_a
                    .map(|old| old.guid)
            }
            None => self
                .enforcer
                .remove_unique_edge(user_id, connection, edge_type)
                .await?
                .map(|edge| edge.end2.guid),
        };
        Ok(released.map(Displaced::ConnectorType))
    }

    /// Save each entry's connection, then bring the parent's embedding edges
    /// in line with the list. Edges are matched by target node.
    async fn save_embedded(
        &self,
        user_id: &str,
        parent: &Guid,
        entries: &[EmbeddedConnection],
        state: &mut SaveState,
    ) -> Result<()> {
        let edge_type = &schema::EMBEDDED_CONNECTION;

        let mut wanted = Vec::with_capacity(entries.len());
        for entry in entries {
            let child = self.save_tree(user_id, &entry.connection, state).await?;
            wanted.push((child, embedding_properties(entry)));
        }

        let mut current = self.child_edges(user_id, parent).await?;
        for (child, properties) in wanted {
            if let Some(i) = current.iter().position(|e| e.end2.guid == child) {
                let edge = current.remove(i);
                if edge.properties == properties {
                    continue;
                }
                self.facade
                    .delete_edge(user_id, edge_type, &edge.guid)
                    .await?;
            }
            self.facade
                .create_edge(user_id, edge_type, parent, &child, &properties)
                .await?;
        }

        for stale in current {
            self.facade
                .delete_edge(user_id, edge_type, &stale.guid)
                .await?;
            state.displaced.push(Displaced::Connection(stale.end2.guid));
        }
        Ok(())
    }

    /// Apply the orphan policy to every child the finished save detached.
    ///
    /// Runs after the whole tree is written: a child that is linked again
    /// somewhere, or that is the saved root, is left alone.
    async fn release_displaced(
        &self,
        user_id: &str,
        root: &Guid,
        displaced: Vec<Displaced>,
    ) -> Result<()> {
        if self.facade.config().orphan_policy == OrphanPolicy::Retain {
            for child in &displaced {
                tracing::debug!(guid = %child.guid(), "Displaced child retained");
            }
            return Ok(());
        }

        let mut seen: Vec<Guid> = Vec::with_capacity(displaced.len());
        for child in displaced {
            if child.guid() == root || seen.contains(child.guid()) {
                continue;
            }
            seen.push(child.guid().clone());
            match child {
                Displaced::Endpoint(guid) => {
                    self.release_leaf(user_id, &self.endpoints, &guid).await?
                }
                Displaced::ConnectorType(guid) => {
                    self.release_leaf(user_id, &self.connector_types, &guid)
                        .await?
                }
                Displaced::Connection(guid) => {
                    self.release_connection(user_id, root, &guid).await?
                }
            }
        }
        Ok(())
    }

    async fn release_leaf<C: Converter>(
        &self,
        user_id: &str,
        owner: &EntitySynchronizer<C>,
        guid: &Guid,
    ) -> Result<()> {
        let node_type = owner.converter().base_type();
        if self
            .facade
            .get_node_summary(user_id, guid, node_type)
            .await?
            .is_none()
        {
            return Ok(());
        }
        let deleted = owner.release(user_id, guid).await?;
        tracing::debug!(guid = %guid, node_type = %node_type, deleted, "Displaced child released");
        Ok(())
    }

    async fn release_connection(&self, user_id: &str, root: &Guid, guid: &Guid) -> Result<()> {
        if self
            .facade
            .get_node_summary(user_id, guid, self.converter.base_type())
            .await?
            .is_none()
        {
            return Ok(());
        }
        if self.has_parent(user_id, guid).await? {
            tracing::debug!(guid = %guid, "Displaced connection retained");
            return Ok(());
        }

        // The saved root is never taken down with a displaced subtree.
        let mut ancestors = vec![root.clone()];
        let mut summary = RemovalSummary::default();
        self.remove_tree(user_id, guid, &mut ancestors, &mut summary)
            .await?;
        tracing::debug!(
            guid = %guid,
            deleted = summary.deleted.len(),
            retained = summary.retained.len(),
            "Displaced connection released"
        );
        Ok(())
    }

    /// Reject a tree that could never be saved before anything is written.
    fn validate_tree(&self, connection: &Connection, method: &'static str) -> Result<()> {
        let max = self.facade.config().max_nesting_depth;
        let depth = connection.nesting_depth();
        if depth > max {
            return Err(MetadataError::invalid_argument(
                "embedded",
                format!("nesting depth {depth} exceeds the maximum of {max}"),
                method,
            ));
        }

        let mut path = Vec::new();
        self.validate_node(connection, &mut path, method)
    }

    fn validate_node<'c>(
        &self,
        connection: &'c Connection,
        path: &mut Vec<&'c str>,
        method: &'static str,
    ) -> Result<()> {
        identity::require_name(&self.converter, connection, method)?;
        if let Some(endpoint) = connection.endpoint.as_ref() {
            identity::require_name(self.endpoints.converter(), endpoint, method)?;
        }
        if let Some(connector_type) = connection.connector_type.as_ref() {
            identity::require_name(self.connector_types.converter(), connector_type, method)?;
        }

        let name = connection.qualified_name.as_str();
        if path.contains(&name) {
            return Err(MetadataError::invalid_argument(
                "embedded",
                format!("{name} is embedded in its own subtree"),
                method,
            ));
        }

        path.push(name);
        for entry in connection.embedded() {
            self.validate_node(&entry.connection, path, method)?;
        }
        path.pop();
        Ok(())
    }

    // ── Get ──────────────────────────────────────────────────────

    /// Read the whole tree rooted at `guid`.
    pub async fn get(&self, user_id: &str, guid: &Guid) -> Result<Connection> {
        self.facade.verify_store_active("get").await?;
        let mut ancestors = Vec::new();
        self.read_tree(user_id, guid, &mut ancestors).await
    }

    /// Every connection whose unique name is `name`, each with its tree.
    pub async fn find_by_name(
        &self,
        user_id: &str,
        name: &str,
        paging: Paging,
    ) -> Result<Vec<Connection>> {
        self.facade.verify_store_active("find_by_name").await?;
        let nodes = self
            .facade
            .find_nodes_by_name(
                user_id,
                name,
                self.converter.name_properties(),
                self.converter.base_type(),
                paging,
            )
            .await?;

        let mut connections = Vec::with_capacity(nodes.len());
        for node in nodes {
            let mut ancestors = Vec::new();
            connections.push(self.read_tree(user_id, &node.guid, &mut ancestors).await?);
        }
        Ok(connections)
    }

    /// The connection called `name`, if exactly one exists.
    pub async fn get_by_name(&self, user_id: &str, name: &str) -> Result<Option<Connection>> {
        self.facade.verify_store_active("get_by_name").await?;
        let node = self
            .facade
            .get_unique_node_by_name(
                user_id,
                name,
                self.converter.name_properties(),
                self.converter.base_type(),
            )
            .await?;

        match node {
            Some(node) => {
                let mut ancestors = Vec::new();
                Ok(Some(self.read_tree(user_id, &node.guid, &mut ancestors).await?))
            }
            None => Ok(None),
        }
    }

    fn read_tree<'a>(
        &'a self,
        user_id: &'a str,
        guid: &'a Guid,
        ancestors: &'a mut Vec<Guid>,
    ) -> BoxFuture<'a, Result<Connection>> {
        Box::pin(async move {
            let node = self
                .facade
                .get_node(user_id, guid, self.converter.base_type())
                .await?;
            let mut connection = self.converter.from_node(&node)?;

            if let Some(edge) = self
                .facade
                .get_unique_edge_of_type(user_id, guid, &schema::CONNECTION_ENDPOINT)
                .await?
            {
                connection.endpoint = Some(self.endpoints.read(user_id, &edge.end1.guid).await?);
            }
            if let Some(edge) = self
                .facade
                .get_unique_edge_of_type(user_id, guid, &schema::CONNECTION_CONNECTOR_TYPE)
                .await?
            {
                connection.connector_type =
                    Some(self.connector_types.read(user_id, &edge.end2.guid).await?);
            }

            if let ConnectionKind::Virtual { embedded } = &mut connection.kind {
                ancestors.push(guid.clone());
                let read = self.read_embedded(user_id, guid, ancestors).await;
                ancestors.pop();
                *embedded = read?;
            }

            Ok(connection)
        })
    }

    async fn read_embedded(
        &self,
        user_id: &str,
        parent: &Guid,
        ancestors: &mut Vec<Guid>,
    ) -> Result<Vec<EmbeddedConnection>> {
        let mut edges = self.child_edges(user_id, parent).await?;
        edges.sort_by_key(|e| position(&e.properties));

        let mut entries = Vec::with_capacity(edges.len());
        for edge in edges {
            let child = &edge.end2.guid;
            if ancestors.contains(child) {
                return Err(MetadataError::invariant(
                    format!("stored connection {parent} embeds its ancestor {child}"),
                    "get",
                ));
            }
            let connection = self.read_tree(user_id, child, ancestors).await?;
            entries.push(EmbeddedConnection {
                position: position(&edge.properties),
                display_name: edge
                    .properties
                    .get(schema::DISPLAY_NAME)
                    .and_then(PropertyValue::as_str)
                    .map(str::to_string),
                arguments: edge
                    .properties
                    .get(schema::ARGUMENTS)
                    .and_then(PropertyValue::as_map)
                    .cloned()
                    .unwrap_or_default(),
                connection,
            });
        }
        Ok(entries)
    }

    // ── Remove ───────────────────────────────────────────────────

    /// Remove the tree rooted at `guid`, leaves first.
    ///
    /// Each edge is detached before its child is considered. An embedded
    /// child that another parent still embeds is left in place together
    /// with everything under it, and no node is deleted while edges still
    /// refer to it.
    pub async fn remove(&self, user_id: &str, guid: &Guid) -> Result<RemovalSummary> {
        const METHOD: &str = "remove";
        self.facade.verify_store_active(METHOD).await?;

        let base_type = self.converter.base_type();
        if self
            .facade
            .get_node_summary(user_id, guid, base_type)
            .await?
            .is_none()
        {
            return Err(MetadataError::UnknownEntity {
                guid: guid.to_string(),
                type_name: base_type.name.to_string(),
                method: METHOD,
            });
        }

        let mut summary = RemovalSummary::default();
        let mut ancestors = Vec::new();
        self.remove_tree(user_id, guid, &mut ancestors, &mut summary)
            .await?;

        tracing::info!(
            guid = %guid,
            deleted = summary.deleted.len(),
            retained = summary.retained.len(),
            edges_removed = summary.edges_removed,
            "Connection removed"
        );
        Ok(summary)
    }

    fn remove_tree<'a>(
        &'a self,
        user_id: &'a str,
        guid: &'a Guid,
        ancestors: &'a mut Vec<Guid>,
        summary: &'a mut RemovalSummary,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if let Some(edge) = self
                .enforcer
                .remove_unique_edge(user_id, guid, &schema::CONNECTION_ENDPOINT)
                .await?
            {
                summary.edges_removed += 1;
                let endpoint = edge.end1.guid;
                let deleted = self.endpoints.release(user_id, &endpoint).await?;
                summary.record(endpoint, deleted);
            }
            if let Some(edge) = self
                .enforcer
                .remove_unique_edge(user_id, guid, &schema::CONNECTION_CONNECTOR_TYPE)
                .await?
            {
                summary.edges_removed += 1;
                let connector_type = edge.end2.guid;
                let deleted = self.connector_types.release(user_id, &connector_type).await?;
                summary.record(connector_type, deleted);
            }

            ancestors.push(guid.clone());
            let removed = self.remove_embedded(user_id, guid, ancestors, summary).await;
            ancestors.pop();
            removed?;

            let deleted = self
                .deleter
                .delete_if_last_use(user_id, guid, self.converter.base_type())
                .await?;
            summary.record(guid.clone(), deleted);
            Ok(())
        })
    }

    async fn remove_embedded(
        &self,
        user_id: &str,
        parent: &Guid,
        ancestors: &mut Vec<Guid>,
        summary: &mut RemovalSummary,
    ) -> Result<()> {
        let edges = self.child_edges(user_id, parent).await?;

        let mut children: Vec<Guid> = Vec::with_capacity(edges.len());
        for edge in edges {
            self.facade
                .delete_edge(user_id, &schema::EMBEDDED_CONNECTION, &edge.guid)
                .await?;
            summary.edges_removed += 1;
            if !children.contains(&edge.end2.guid) {
                children.push(edge.end2.guid);
            }
        }

        for child in children {
            if ancestors.contains(&child) {
                continue;
            }
            if self.has_parent(user_id, &child).await? {
                tracing::debug!(guid = %child, parent = %parent, "Shared connection retained");
                summary.retained.push(child);
                continue;
            }
            self.remove_tree(user_id, &child, ancestors, summary).await?;
        }
        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────

    /// Embedding edges running from `parent` to its children, oldest first.
    async fn child_edges(&self, user_id: &str, parent: &Guid) -> Result<Vec<Edge>> {
        let edges = self
            .all_edges(user_id, parent, &schema::EMBEDDED_CONNECTION)
            .await?;
        Ok(edges
            .into_iter()
            .filter(|e| &e.end1.guid == parent)
            .collect())
    }

    /// Whether any connection still embeds `child`.
    async fn has_parent(&self, user_id: &str, child: &Guid) -> Result<bool> {
        let edges = self
            .all_edges(user_id, child, &schema::EMBEDDED_CONNECTION)
            .await?;
        Ok(edges.iter().any(|e| &e.end2.guid == child))
    }

    async fn all_edges(
        &self,
        user_id: &str,
        guid: &Guid,
        edge_type: &TypeRef,
    ) -> Result<Vec<Edge>> {
        let config = self.facade.config();
        let page_size = config.default_page_size.min(config.max_page_size).max(1);

        let mut edges = Vec::new();
        loop {
            let page = self
                .facade
                .get_edges_of_node(
                    user_id,
                    guid,
                    Some(edge_type),
                    Paging {
                        start_from: edges.len(),
                        page_size,
                    },
                )
                .await?;
            let full = page.len() == page_size;
            edges.extend(page);
            if !full {
                return Ok(edges);
            }
        }
    }
}

fn embedding_properties(entry: &EmbeddedConnection) -> PropertyMap {
    let mut properties = PropertyMap::new();
    properties.insert(schema::POSITION.to_string(), PropertyValue::Int(entry.position));
    if let Some(display_name) = entry.display_name.as_ref() {
        properties.insert(
            schema::DISPLAY_NAME.to_string(),
            PropertyValue::Text(display_name.clone()),
        );
    }
    if !entry.arguments.is_empty() {
        properties.insert(
            schema::ARGUMENTS.to_string(),
            PropertyValue::Map(entry.arguments.clone()),
        );
    }
    properties
}

fn position(properties: &PropertyMap) -> i64 {
    properties
        .get(schema::POSITION)
        .and_then(PropertyValue::as_int)
        .unwrap_or(0)
}
