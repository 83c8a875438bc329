//! Singleton relationship enforcement.
//!
//! The store has no uniqueness constraints, so "at most one edge of type T
//! touching N" is kept here: conflicting edges are deleted before a new one
//! is created. The steps are not atomic; repeating a call converges.

use metagraph_core::error::Result;
use metagraph_core::{Edge, Guid, NodeProxy, PropertyMap, TypeRef};
use metagraph_graph::RepositoryFacade;

/// Outcome of [`RelationshipEnforcer::ensure_unique_edge`].
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeReconciliation {
    /// The single edge now joining the two ends.
    pub edge: Edge,
    /// Whether `edge` was created by this call.
    pub created: bool,
    /// Former partner of `end_a` whose edge was deleted.
    pub released_by_a: Option<NodeProxy>,
    /// Former partner of `end_b` whose edge was deleted.
    pub released_by_b: Option<NodeProxy>,
}

impl EdgeReconciliation {
    /// Nodes that lost their edge to this call.
    pub fn released(&self) -> impl Iterator<Item = &NodeProxy> {
        self.released_by_a.iter().chain(self.released_by_b.iter())
    }
}

/// Keeps singleton relationships singleton.
#[derive(Clone)]
pub struct RelationshipEnforcer {
    facade: RepositoryFacade,
}

impl RelationshipEnforcer {
    pub fn new(facade: RepositoryFacade) -> Self {
        Self { facade }
    }

    /// Make `(end_a, end_b)` the only `edge_type` edge touching either end.
    ///
    /// An existing edge with exactly these ends, in this order, is kept. Any
    /// other `edge_type` edge touching either end is deleted. A new edge is
    /// created only when no compatible one was found.
    pub async fn ensure_unique_edge(
        &self,
        user_id: &str,
        end_a: &Guid,
        end_b: &Guid,
        edge_type: &TypeRef,
    ) -> Result<EdgeReconciliation> {
        let existing_a = self
            .facade
            .get_unique_edge_of_type(user_id, end_a, edge_type)
            .await?;
        let existing_b = self
            .facade
            .get_unique_edge_of_type(user_id, end_b, edge_type)
            .await?;

        let mut compatible = None;
        let mut released_by_a = None;
        let mut released_by_b = None;

        if let Some(edge) = existing_a.as_ref() {
            if edge.connects(end_a, end_b) {
                compatible = Some(edge.clone());
            } else {
                self.detach(user_id, edge).await?;
                released_by_a = former_partner(edge, end_a, end_b);
            }
        }
        if let Some(edge) = existing_b {
            let seen = existing_a.as_ref().is_some_and(|a| a.guid == edge.guid);
            if !seen {
                if edge.connects(end_a, end_b) {
                    compatible = Some(edge);
                } else {
                    self.detach(user_id, &edge).await?;
                    released_by_b = former_partner(&edge, end_b, end_a);
                }
            }
        }

        let (edge, created) = match compatible {
            Some(edge) => (edge, false),
            None => {
                let edge = self
                    .facade
                    .create_edge(user_id, edge_type, end_a, end_b, &PropertyMap::new())
                    .await?;
                (edge, true)
            }
        };

        Ok(EdgeReconciliation {
            edge,
            created,
            released_by_a,
            released_by_b,
        })
    }

    /// Delete the `edge_type` edge touching `guid`, if there is one. Neither
    /// end node is touched.
    pub async fn remove_unique_edge(
        &self,
        user_id: &str,
        guid: &Guid,
        edge_type: &TypeRef,
    ) -> Result<Option<Edge>> {
        match self
            .facade
            .get_unique_edge_of_type(user_id, guid, edge_type)
            .await?
        {
            Some(edge) => {
                self.detach(user_id, &edge).await?;
                Ok(Some(edge))
            }
            None => Ok(None),
        }
    }

    async fn detach(&self, user_id: &str, edge: &Edge) -> Result<()> {
        tracing::debug!(
            guid = %edge.guid,
            edge_type = %edge.edge_type,
            end1 = %edge.end1.guid,
            end2 = %edge.end2.guid,
            "Detaching conflicting relationship"
        );
        self.facade
            .delete_edge(user_id, &edge.edge_type, &edge.guid)
            .await
    }
}

/// The node on the far side of `edge` from `end`, unless it is one of the
/// ends being joined.
fn former_partner(edge: &Edge, end: &Guid, other: &Guid) -> Option<NodeProxy> {
    edge.other_end(end)
        .filter(|p| &p.guid != end && &p.guid != other)
        .cloned()
}
