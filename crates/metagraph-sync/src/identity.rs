//! Find-or-create for a single model object.
//!
//! An object is matched to a stored node by guid first, then by its unique
//! name. Several nodes with the same name are an `AmbiguousName` error.

use metagraph_core::error::Result;
use metagraph_core::{MetadataError, Node};
use metagraph_graph::RepositoryFacade;

use crate::converter::Converter;

/// Result of [`upsert`].
#[derive(Debug, Clone)]
pub(crate) struct Upserted {
    pub node: Node,
    pub created: bool,
}

/// The stored node `object` refers to, if any.
///
/// A guid that no longer resolves falls through to the name lookup. A blank
/// guid counts as no guid. A match that the store only holds as a proxy
/// fails with `ProxyOnly`, since its reference copy must not be overwritten.
pub(crate) async fn resolve<C: Converter>(
    facade: &RepositoryFacade,
    user_id: &str,
    converter: &C,
    object: &C::Object,
) -> Result<Option<Node>> {
    let base_type = converter.base_type();

    if let Some(guid) = converter.guid(object).filter(|g| !g.is_blank()) {
        if facade
            .get_node_summary(user_id, guid, base_type)
            .await?
            .is_some()
        {
            return facade.get_node(user_id, guid, base_type).await.map(Some);
        }
        tracing::debug!(guid = %guid, node_type = %base_type, "Stale guid, resolving by name");
    }

    let named = facade
        .get_unique_node_by_name(
            user_id,
            converter.unique_name(object),
            converter.name_properties(),
            base_type,
        )
        .await?;
    match named {
        Some(node) => facade.get_node(user_id, &node.guid, base_type).await.map(Some),
        None => Ok(None),
    }
}

/// Reject an object without a usable unique name before anything is written.
pub(crate) fn require_name<C: Converter>(
    converter: &C,
    object: &C::Object,
    method: &'static str,
) -> Result<()> {
    if converter.unique_name(object).trim().is_empty() {
        return Err(MetadataError::invalid_argument(
            "qualified_name",
            format!("every {} needs a unique name", converter.base_type()),
            method,
        ));
    }
    Ok(())
}

/// Create `object`'s node, or replace the properties of `existing`.
///
/// A stored node of a different concrete type is not converted in place.
pub(crate) async fn upsert<C: Converter>(
    facade: &RepositoryFacade,
    user_id: &str,
    converter: &C,
    object: &C::Object,
    existing: Option<Node>,
) -> Result<Upserted> {
    let node_type = converter.node_type(object);
    let properties = converter.to_properties(object);

    match existing {
        Some(current) => {
            if current.node_type.name != node_type.name {
                return Err(MetadataError::invalid_argument(
                    "kind",
                    format!(
                        "{} is stored as a {}, not a {node_type}",
                        current.guid, current.node_type
                    ),
                    "save",
                ));
            }
            let node = facade
                .update_node_properties(user_id, &current.guid, node_type, &properties)
                .await?;
            Ok(Upserted {
                node,
                created: false,
            })
        }
        None => {
            let node = facade.create_node(user_id, node_type, &properties).await?;
            Ok(Upserted {
                node,
                created: true,
            })
        }
    }
}
