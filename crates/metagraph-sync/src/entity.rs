//! Synchronizer for objects without related objects of their own.

use metagraph_core::error::Result;
use metagraph_core::{Guid, Paging};
use metagraph_graph::RepositoryFacade;

use crate::cleanup::LastUseDeleter;
use crate::converter::Converter;
use crate::identity;

/// Save, read and remove one kind of leaf object (endpoints, connector types).
#[derive(Clone)]
pub struct EntitySynchronizer<C> {
    facade: RepositoryFacade,
    converter: C,
    deleter: LastUseDeleter,
}

impl<C: Converter> EntitySynchronizer<C> {
    pub fn new(facade: RepositoryFacade, converter: C) -> Self {
        Self {
            deleter: LastUseDeleter::new(facade.clone()),
            facade,
            converter,
        }
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// Create or update `object` and return its guid.
    pub async fn save(&self, user_id: &str, object: &C::Object) -> Result<Guid> {
        self.facade.verify_store_active("save").await?;
        self.upsert(user_id, object).await
    }

    /// `save` without the store check, for use inside a larger operation.
    pub(crate) async fn upsert(&self, user_id: &str, object: &C::Object) -> Result<Guid> {
        identity::require_name(&self.converter, object, "save")?;

        let existing = identity::resolve(&self.facade, user_id, &self.converter, object).await?;
        let upserted =
            identity::upsert(&self.facade, user_id, &self.converter, object, existing).await?;

        tracing::debug!(
            guid = %upserted.node.guid,
            node_type = %upserted.node.node_type,
            created = upserted.created,
            "Entity saved"
        );
        Ok(upserted.node.guid)
    }

    pub async fn get(&self, user_id: &str, guid: &Guid) -> Result<C::Object> {
        self.facade.verify_store_active("get").await?;
        self.read(user_id, guid).await
    }

    pub(crate) async fn read(&self, user_id: &str, guid: &Guid) -> Result<C::Object> {
        let node = self
            .facade
            .get_node(user_id, guid, self.converter.base_type())
            .await?;
        self.converter.from_node(&node)
    }

    /// Delete the object unless something still refers to it. Returns
    /// whether it was deleted.
    pub async fn remove(&self, user_id: &str, guid: &Guid) -> Result<bool> {
        self.facade.verify_store_active("remove").await?;
        self.release(user_id, guid).await
    }

    pub(crate) async fn release(&self, user_id: &str, guid: &Guid) -> Result<bool> {
        self.deleter
            .delete_if_last_use(user_id, guid, self.converter.base_type())
            .await
    }

    /// Every object whose unique name is `name`.
    pub async fn find_by_name(
        &self,
        user_id: &str,
        name: &str,
        paging: Paging,
    ) -> Result<Vec<C::Object>> {
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
        nodes.iter().map(|n| self.converter.from_node(n)).collect()
    }
}
