//! metagraph-core: shared types, error taxonomy, and configuration for the
//! metagraph synchronization layer.
//!
//! - Generic graph records (nodes, edges, node proxies, property bags)
//! - The domain error taxonomy and the store failures it is translated from
//! - Configuration injected into the facade and synchronizers

pub mod config;
pub mod error;
pub mod types;

pub use config::{OrphanPolicy, SyncConfig};
pub use error::{ErrorKind, MetadataError, StoreError};
pub use types::{
    Edge, Guid, InstanceStatus, MatchCriteria, Node, NodeProxy, Paging, PropertyMap,
    PropertyValue, TypeRef,
};
