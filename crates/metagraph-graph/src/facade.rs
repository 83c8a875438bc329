//! The repository facade: the only component that talks to the store.
//!
//! Validates arguments, applies paging limits, decides zero/one/many
//! questions with [`Lookup`], and translates every [`StoreError`] into the
//! domain taxonomy. It keeps no state besides the store handle and config.

use std::sync::Arc;

use metagraph_core::{
    Edge, Guid, InstanceStatus, MatchCriteria, MetadataError, Node, Paging, PropertyMap,
    StoreError, SyncConfig, TypeRef,
};

use crate::lookup::Lookup;
use crate::store::MetadataStore;

/// Typed access to a [`MetadataStore`]. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct RepositoryFacade {
    store: Arc<dyn MetadataStore>,
    config: SyncConfig,
}

impl RepositoryFacade {
    pub fn new(store: Arc<dyn MetadataStore>, config: SyncConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Fail with `StoreUnavailable` unless the store is accepting calls.
    pub async fn verify_store_active(&self, method: &'static str) -> Result<(), MetadataError> {
        if self.store.is_active().await {
            Ok(())
        } else {
            tracing::warn!(
                service = %self.config.service_name,
                store = %self.store.name(),
                method,
                "Metadata store is not active"
            );
            Err(MetadataError::StoreUnavailable {
                store: self.store.name().to_string(),
                method,
            })
        }
    }

    // ── Nodes ────────────────────────────────────────────────────

    /// Cheap check that `guid` still resolves to a live node of `expected_type`.
    ///
    /// An unknown or soft-deleted node is `Ok(None)`; a node of another type
    /// is an invalid argument.
    pub async fn get_node_summary(
        &self,
        user_id: &str,
        guid: &Guid,
        expected_type: &TypeRef,
    ) -> Result<Option<Node>, MetadataError> {
        const METHOD: &str = "get_node_summary";
        validate_guid(guid, METHOD)?;

        match self.store.get_node_summary(user_id, guid).await {
            Ok(node) if node.status == InstanceStatus::Deleted => Ok(None),
            Ok(node) => {
                check_type(&node, expected_type, METHOD)?;
                Ok(Some(node))
            }
            Err(StoreError::EntityNotKnown { .. }) => Ok(None),
            Err(e) => Err(self.translate(e, &expected_type.name, METHOD)),
        }
    }

    /// Full read of a node. Absent nodes are `UnknownEntity`, reference-only
    /// records are `ProxyOnly`.
    pub async fn get_node(
        &self,
        user_id: &str,
        guid: &Guid,
        expected_type: &TypeRef,
    ) -> Result<Node, MetadataError> {
        const METHOD: &str = "get_node";
        validate_guid(guid, METHOD)?;

        let node = self
            .store
            .get_node_detail(user_id, guid)
            .await
            .map_err(|e| self.translate(e, &expected_type.name, METHOD))?;
        if node.status == InstanceStatus::Deleted {
            return Err(MetadataError::UnknownEntity {
                guid: guid.to_string(),
                type_name: expected_type.name.to_string(),
                method: METHOD,
            });
        }
        check_type(&node, expected_type, METHOD)?;
        Ok(node)
    }

    pub async fn create_node(
        &self,
        user_id: &str,
        node_type: &TypeRef,
        properties: &PropertyMap,
    ) -> Result<Node, MetadataError> {
        const METHOD: &str = "create_node";

        let node = self
            .store
            .create_node(user_id, node_type, properties)
            .await
            .map_err(|e| self.translate(e, &node_type.name, METHOD))?
            .ok_or_else(|| {
                MetadataError::invariant(
                    format!("store accepted a new {node_type} but returned no node"),
                    METHOD,
                )
            })?;

        tracing::debug!(guid = %node.guid, node_type = %node_type, "Node created");
        Ok(node)
    }

    /// Replace every property of a node.
    pub async fn update_node_properties(
        &self,
        user_id: &str,
        guid: &Guid,
        node_type: &TypeRef,
        properties: &PropertyMap,
    ) -> Result<Node, MetadataError> {
        const METHOD: &str = "update_node_properties";
        validate_guid(guid, METHOD)?;

        let node = self
            .store
            .update_node_properties(user_id, guid, properties)
            .await
            .map_err(|e| self.translate(e, &node_type.name, METHOD))?
            .ok_or_else(|| {
                MetadataError::invariant(
                    format!("store accepted an update of {guid} but returned no node"),
                    METHOD,
                )
            })?;

        tracing::debug!(
            guid = %guid,
            node_type = %node_type,
            version = node.version,
            "Node updated"
        );
        Ok(node)
    }

    /// Exact-match search. Store order is preserved.
    pub async fn find_nodes_by_properties(
        &self,
        user_id: &str,
        node_type: &TypeRef,
        properties: &PropertyMap,
        criteria: MatchCriteria,
        paging: Paging,
    ) -> Result<Vec<Node>, MetadataError> {
        const METHOD: &str = "find_nodes_by_properties";
        let paging = self.resolve_paging(paging, METHOD)?;

        self.store
            .find_nodes_by_properties(user_id, node_type, properties, criteria, paging)
            .await
            .map_err(|e| self.translate(e, &node_type.name, METHOD))
    }

    /// Every node whose value for any of `name_properties` equals `name`.
    pub async fn find_nodes_by_name(
        &self,
        user_id: &str,
        name: &str,
        name_properties: &[&str],
        node_type: &TypeRef,
        paging: Paging,
    ) -> Result<Vec<Node>, MetadataError> {
        const METHOD: &str = "find_nodes_by_name";
        validate_name(name, name_properties, METHOD)?;

        let filter: PropertyMap = name_properties
            .iter()
            .map(|p| ((*p).to_string(), name.into()))
            .collect();
        self.find_nodes_by_properties(user_id, node_type, &filter, MatchCriteria::Any, paging)
            .await
    }

    pub async fn find_unique_node_by_name(
        &self,
        user_id: &str,
        name: &str,
        name_properties: &[&str],
        node_type: &TypeRef,
    ) -> Result<Lookup<Node>, MetadataError> {
        let matches = self
            .find_nodes_by_name(user_id, name, name_properties, node_type, Paging::default())
            .await?;
        Ok(Lookup::from_vec(matches))
    }

    /// The single node called `name`, if any. Several matches are an
    /// `AmbiguousName` error listing all of them.
    pub async fn get_unique_node_by_name(
        &self,
        user_id: &str,
        name: &str,
        name_properties: &[&str],
        node_type: &TypeRef,
    ) -> Result<Option<Node>, MetadataError> {
        self.find_unique_node_by_name(user_id, name, name_properties, node_type)
            .await?
            .into_option_or(|nodes| {
                let matches: Vec<Guid> = nodes.into_iter().map(|n| n.guid).collect();
                tracing::warn!(
                    name,
                    node_type = %node_type,
                    count = matches.len(),
                    "Ambiguous name"
                );
                MetadataError::AmbiguousName {
                    name: name.to_string(),
                    type_name: node_type.name.to_string(),
                    matches,
                    method: "get_unique_node_by_name",
                }
            })
    }

    // ── Edges ────────────────────────────────────────────────────

    pub async fn get_edges_of_node(
        &self,
        user_id: &str,
        guid: &Guid,
        edge_type: Option<&TypeRef>,
        paging: Paging,
    ) -> Result<Vec<Edge>, MetadataError> {
        const METHOD: &str = "get_edges_of_node";
        validate_guid(guid, METHOD)?;
        let paging = self.resolve_paging(paging, METHOD)?;

        let type_name = edge_type.map_or("relationship", |t| t.name.as_ref());
        self.store
            .get_edges_for_node(user_id, guid, edge_type, paging)
            .await
            .map_err(|e| self.translate(e, type_name, METHOD))
    }

    pub async fn find_unique_edge_of_type(
        &self,
        user_id: &str,
        guid: &Guid,
        edge_type: &TypeRef,
    ) -> Result<Lookup<Edge>, MetadataError> {
        let edges = self
            .get_edges_of_node(user_id, guid, Some(edge_type), Paging::default())
            .await?;
        Ok(Lookup::from_vec(edges))
    }

    /// The single `edge_type` edge touching `guid`, if any. Several are an
    /// `AmbiguousRelationship` error.
    pub async fn get_unique_edge_of_type(
        &self,
        user_id: &str,
        guid: &Guid,
        edge_type: &TypeRef,
    ) -> Result<Option<Edge>, MetadataError> {
        self.find_unique_edge_of_type(user_id, guid, edge_type)
            .await?
            .into_option_or(|edges| {
                let matches: Vec<Guid> = edges.into_iter().map(|e| e.guid).collect();
                tracing::warn!(
                    guid = %guid,
                    edge_type = %edge_type,
                    count = matches.len(),
                    "Ambiguous relationship"
                );
                MetadataError::AmbiguousRelationship {
                    guid: guid.to_string(),
                    relationship_type: edge_type.name.to_string(),
                    matches,
                    method: "get_unique_edge_of_type",
                }
            })
    }

    /// Like [`Self::get_unique_edge_of_type`] for callers that presume the
    /// edge exists.
    pub async fn get_required_edge_of_type(
        &self,
        user_id: &str,
        guid: &Guid,
        edge_type: &TypeRef,
    ) -> Result<Edge, MetadataError> {
        self.get_unique_edge_of_type(user_id, guid, edge_type)
            .await?
            .ok_or_else(|| MetadataError::NoRelationshipFound {
                guid: guid.to_string(),
                relationship_type: edge_type.name.to_string(),
                method: "get_required_edge_of_type",
            })
    }

    /// The first `edge_type` edge joining `a` and `b`, in either direction.
    ///
    /// Scans one page of `a`'s edges.
    pub async fn get_edge_between(
        &self,
        user_id: &str,
        a: &Guid,
        b: &Guid,
        edge_type: &TypeRef,
    ) -> Result<Option<Edge>, MetadataError> {
        validate_guid(b, "get_edge_between")?;
        let edges = self
            .get_edges_of_node(user_id, a, Some(edge_type), Paging::default())
            .await?;
        Ok(edges
            .into_iter()
            .find(|e| e.other_end(a).is_some_and(|other| &other.guid == b)))
    }

    pub async fn create_edge(
        &self,
        user_id: &str,
        edge_type: &TypeRef,
        end1: &Guid,
        end2: &Guid,
        properties: &PropertyMap,
    ) -> Result<Edge, MetadataError> {
        const METHOD: &str = "create_edge";
        validate_guid(end1, METHOD)?;
        validate_guid(end2, METHOD)?;

        let edge = self
            .store
            .create_edge(user_id, edge_type, end1, end2, properties)
            .await
            .map_err(|e| self.translate(e, &edge_type.name, METHOD))?
            .ok_or_else(|| {
                MetadataError::invariant(
                    format!(
                        "store accepted a new {edge_type} from {end1} to {end2} \
                         but returned no relationship"
                    ),
                    METHOD,
                )
            })?;

        tracing::debug!(
            guid = %edge.guid,
            edge_type = %edge_type,
            end1 = %end1,
            end2 = %end2,
            "Relationship created"
        );
        Ok(edge)
    }

    pub async fn delete_edge(
        &self,
        user_id: &str,
        edge_type: &TypeRef,
        guid: &Guid,
    ) -> Result<(), MetadataError> {
        const METHOD: &str = "delete_edge";
        validate_guid(guid, METHOD)?;

        self.store
            .delete_edge(user_id, edge_type, guid)
            .await
            .map_err(|e| self.translate(e, &edge_type.name, METHOD))?;

        tracing::debug!(guid = %guid, edge_type = %edge_type, "Relationship deleted");
        Ok(())
    }

    /// Delete `guid` when a bounded read finds no edges touching it.
    ///
    /// The check reads at most `last_use_page_size` edges. Returns whether the
    /// node was deleted; a referenced node is left alone without error.
    pub async fn delete_node_if_unreferenced(
        &self,
        user_id: &str,
        guid: &Guid,
        node_type: &TypeRef,
    ) -> Result<bool, MetadataError> {
        const METHOD: &str = "delete_node_if_unreferenced";
        validate_guid(guid, METHOD)?;

        let sample = Paging::first(self.config.last_use_page_size.max(1));
        let edges = self.get_edges_of_node(user_id, guid, None, sample).await?;
        if !edges.is_empty() {
            tracing::debug!(
                guid = %guid,
                node_type = %node_type,
                references = edges.len(),
                "Node still referenced, delete skipped"
            );
            return Ok(false);
        }

        self.store
            .delete_node(user_id, node_type, guid)
            .await
            .map_err(|e| self.translate(e, &node_type.name, METHOD))?;

        tracing::debug!(guid = %guid, node_type = %node_type, "Node deleted");
        Ok(true)
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn resolve_paging(
        &self,
        paging: Paging,
        method: &'static str,
    ) -> Result<Paging, MetadataError> {
        let page_size = match paging.page_size {
            0 => self.config.default_page_size,
            n if n > self.config.max_page_size => {
                return Err(MetadataError::invalid_argument(
                    "page_size",
                    format!("{n} exceeds the maximum of {}", self.config.max_page_size),
                    method,
                ))
            }
            n => n,
        };
        Ok(Paging {
            start_from: paging.start_from,
            page_size,
        })
    }

    fn translate(&self, err: StoreError, type_name: &str, method: &'static str) -> MetadataError {
        match err {
            StoreError::UserNotAuthorized { user_id, detail } => MetadataError::NotAuthorized {
                user_id,
                detail,
                method,
            },
            StoreError::EntityNotKnown { guid } | StoreError::RelationshipNotKnown { guid } => {
                MetadataError::UnknownEntity {
                    guid,
                    type_name: type_name.to_string(),
                    method,
                }
            }
            StoreError::EntityProxyOnly { guid } => MetadataError::ProxyOnly {
                guid,
                type_name: type_name.to_string(),
                method,
            },
            StoreError::InvalidParameter { parameter, detail } => {
                MetadataError::invalid_argument(parameter, detail, method)
            }
            StoreError::Inactive => MetadataError::StoreUnavailable {
                store: self.store.name().to_string(),
                method,
            },
            source @ StoreError::Backend(_) => MetadataError::Store { method, source },
        }
    }
}

fn validate_guid(guid: &Guid, method: &'static str) -> Result<(), MetadataError> {
    if guid.is_blank() {
        return Err(MetadataError::invalid_argument("guid", "must not be blank", method));
    }
    Ok(())
}

fn validate_name(
    name: &str,
    name_properties: &[&str],
    method: &'static str,
) -> Result<(), MetadataError> {
    if name.trim().is_empty() {
        return Err(MetadataError::invalid_argument("name", "must not be blank", method));
    }
    if name_properties.is_empty() {
        return Err(MetadataError::invalid_argument(
            "name_properties",
            "at least one name property is required",
            method,
        ));
    }
    Ok(())
}

fn check_type(node: &Node, expected: &TypeRef, method: &'static str) -> Result<(), MetadataError> {
    if node.node_type.is_a(&expected.name) {
        Ok(())
    } else {
        Err(MetadataError::invalid_argument(
            "guid",
            format!("{} is a {}, not a {expected}", node.guid, node.node_type),
            method,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[test]
    fn paging_zero_uses_default_and_oversize_is_rejected() {
        let facade =
            RepositoryFacade::new(Arc::new(InMemoryStore::default()), SyncConfig::default());

        let page = facade.resolve_paging(Paging::default(), "test").unwrap();
        assert_eq!(page.page_size, 100);

        let err = facade.resolve_paging(Paging::first(5000), "test").unwrap_err();
        assert!(matches!(err, MetadataError::InvalidArgument { .. }));
    }

    #[test]
    fn backend_failures_keep_their_source() {
        let facade =
            RepositoryFacade::new(Arc::new(InMemoryStore::default()), SyncConfig::default());
        let err = facade.translate(
            StoreError::backend(anyhow::anyhow!("bolt handshake failed")),
            "Connection",
            "create_node",
        );
        match err {
            MetadataError::Store { method, source } => {
                assert_eq!(method, "create_node");
                assert!(source.to_string().contains("bolt handshake failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
