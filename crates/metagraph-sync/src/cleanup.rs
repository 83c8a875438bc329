//! Reference-counted deletion.

use metagraph_core::error::Result;
use metagraph_core::{Guid, TypeRef};
use metagraph_graph::RepositoryFacade;

/// Deletes nodes that nothing points at any more.
///
/// Only a bounded page of edges is read (`last_use_page_size`), so this is
/// a guard against deleting a referenced node, not an exact count. Callers
/// detach the edges they own first.
#[derive(Clone)]
pub struct LastUseDeleter {
    facade: RepositoryFacade,
}

impl LastUseDeleter {
    pub fn new(facade: RepositoryFacade) -> Self {
        Self { facade }
    }

    /// Returns whether the node was deleted.
    pub async fn delete_if_last_use(
        &self,
        user_id: &str,
        guid: &Guid,
        node_type: &TypeRef,
    ) -> Result<bool> {
        self.facade
            .delete_node_if_unreferenced(user_id, guid, node_type)
            .await
    }
}
