//! metagraph-graph: the metadata store capability and the repository facade.
//!
//! The facade is the single access point to the store. Every read and write
//! made by the synchronizers flows through it so that argument checks,
//! paging limits, and error translation are applied once.

pub mod client;
pub mod facade;
pub mod lookup;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod store;

pub use client::{load_neo4j_config, Neo4jConfig, Neo4jStore};
pub use facade::RepositoryFacade;
pub use lookup::Lookup;
pub use memory::{InMemoryStore, StoreStats};
pub use store::MetadataStore;
