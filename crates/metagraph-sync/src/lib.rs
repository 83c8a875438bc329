//! metagraph-sync: keeps the metadata graph consistent with model objects.
//!
//! Resolves model objects to existing nodes (guid first, then unique name),
//! creates or updates them, keeps singleton relationships singleton, and
//! walks connection trees depth-first on save, read and remove. Deletion is
//! reference-counted: nothing still referenced is ever deleted.

pub mod cleanup;
pub mod connection;
pub mod converter;
pub mod entity;
mod identity;
pub mod model;
pub mod relationships;
pub mod schema;

pub use cleanup::LastUseDeleter;
pub use connection::{ConnectionSynchronizer, RemovalSummary};
pub use converter::{ConnectionConverter, ConnectorTypeConverter, Converter, EndpointConverter};
pub use entity::EntitySynchronizer;
pub use model::{Connection, ConnectionKind, ConnectorType, EmbeddedConnection, Endpoint};
pub use relationships::{EdgeReconciliation, RelationshipEnforcer};
