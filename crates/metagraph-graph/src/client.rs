//! Neo4j connection management and the Bolt-backed store.

use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, Query};
use serde::Deserialize;

use metagraph_core::{
    Edge, Guid, MatchCriteria, Node, Paging, PropertyMap, StoreError, TypeRef,
};

use crate::store::MetadataStore;

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "metagraph-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

/// Load the `[neo4j]` section from `<file_prefix>.toml` and `METAGRAPH__NEO4J__*`.
pub fn load_neo4j_config(file_prefix: &str) -> anyhow::Result<Neo4jConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("METAGRAPH")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<Neo4jConfig>("neo4j") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(Neo4jConfig::default()),
        Err(e) => Err(e.into()),
    }
}

/// Metadata store backed by a Neo4j server.
///
/// Nodes carry their type name (and supertype name) as labels; edges are
/// relationships named after the edge type. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
    name: String,
}

impl Neo4jStore {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &Neo4jConfig) -> Result<Self, StoreError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(backend)?;

        let graph = Graph::connect(neo_config).await.map_err(backend)?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self {
            graph,
            name: format!("neo4j {}", config.uri),
        })
    }

    /// Execute a write-only query.
    pub(crate) async fn run(&self, query: Query) -> Result<(), StoreError> {
        self.graph.run(query).await.map_err(backend)
    }

    /// Execute a read query and collect all rows.
    pub(crate) async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, StoreError> {
        let mut stream = self.graph.execute(query).await.map_err(backend)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(backend)? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub(crate) async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, StoreError> {
        let mut stream = self.graph.execute(query).await.map_err(backend)?;
        stream.next().await.map_err(backend)
    }
}

pub(crate) fn backend(err: neo4rs::Error) -> StoreError {
    StoreError::backend(err)
}

#[async_trait]
impl MetadataStore for Neo4jStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_active(&self) -> bool {
        match self.query_one(neo4rs::query("RETURN 1 AS ok")).await {
            Ok(row) => row.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "Neo4j liveness check failed");
                false
            }
        }
    }

    async fn get_node_summary(&self, _user_id: &str, guid: &Guid) -> Result<Node, StoreError> {
        self.fetch_node(guid)
            .await?
            .map(|(node, _)| node)
            .ok_or_else(|| StoreError::EntityNotKnown {
                guid: guid.to_string(),
            })
    }

    async fn get_node_detail(&self, _user_id: &str, guid: &Guid) -> Result<Node, StoreError> {
        match self.fetch_node(guid).await? {
            Some((_, true)) => Err(StoreError::EntityProxyOnly {
                guid: guid.to_string(),
            }),
            Some((node, false)) => Ok(node),
            None => Err(StoreError::EntityNotKnown {
                guid: guid.to_string(),
            }),
        }
    }

    async fn create_node(
        &self,
        user_id: &str,
        node_type: &TypeRef,
        properties: &PropertyMap,
    ) -> Result<Option<Node>, StoreError> {
        self.insert_node(user_id, node_type, properties).await
    }

    async fn update_node_properties(
        &self,
        user_id: &str,
        guid: &Guid,
        properties: &PropertyMap,
    ) -> Result<Option<Node>, StoreError> {
        self.replace_properties(user_id, guid, properties).await
    }

    async fn delete_node(
        &self,
        _user_id: &str,
        node_type: &TypeRef,
        guid: &Guid,
    ) -> Result<(), StoreError> {
        self.remove_node(node_type, guid).await
    }

    async fn find_nodes_by_properties(
        &self,
        _user_id: &str,
        node_type: &TypeRef,
        properties: &PropertyMap,
        criteria: MatchCriteria,
        paging: Paging,
    ) -> Result<Vec<Node>, StoreError> {
        self.match_nodes(node_type, properties, criteria, paging).await
    }

    async fn get_edges_for_node(
        &self,
        _user_id: &str,
        guid: &Guid,
        edge_type: Option<&TypeRef>,
        paging: Paging,
    ) -> Result<Vec<Edge>, StoreError> {
        self.fetch_edges(guid, edge_type, paging).await
    }

    async fn create_edge(
        &self,
        user_id: &str,
        edge_type: &TypeRef,
        end1: &Guid,
        end2: &Guid,
        properties: &PropertyMap,
    ) -> Result<Option<Edge>, StoreError> {
        self.insert_edge(user_id, edge_type, end1, end2, properties)
            .await
    }

    async fn delete_edge(
        &self,
        _user_id: &str,
        edge_type: &TypeRef,
        guid: &Guid,
    ) -> Result<(), StoreError> {
        self.remove_edge(edge_type, guid).await
    }
}
