//! Type identities and property names of the connection model.
//!
//! Edge direction is fixed per relationship type:
//!
//! | Relationship | end1 | end2 |
//! |---|---|---|
//! | `ConnectionEndpoint` | endpoint | connection |
//! | `ConnectionConnectorType` | connection | connector type |
//! | `EmbeddedConnection` | virtual parent | embedded child |

use metagraph_core::TypeRef;

// ── Node Types ───────────────────────────────────────────────────

pub static CONNECTION: TypeRef = TypeRef::of("metagraph:Connection", "Connection");
pub static VIRTUAL_CONNECTION: TypeRef =
    TypeRef::subtype_of("metagraph:VirtualConnection", "VirtualConnection", "Connection");
pub static ENDPOINT: TypeRef = TypeRef::of("metagraph:Endpoint", "Endpoint");
pub static CONNECTOR_TYPE: TypeRef = TypeRef::of("metagraph:ConnectorType", "ConnectorType");

// ── Relationship Types ───────────────────────────────────────────

pub static CONNECTION_ENDPOINT: TypeRef =
    TypeRef::of("metagraph:ConnectionEndpoint", "ConnectionEndpoint");
pub static CONNECTION_CONNECTOR_TYPE: TypeRef =
    TypeRef::of("metagraph:ConnectionConnectorType", "ConnectionConnectorType");
pub static EMBEDDED_CONNECTION: TypeRef =
    TypeRef::of("metagraph:EmbeddedConnection", "EmbeddedConnection");

// ── Property Names ───────────────────────────────────────────────

pub const QUALIFIED_NAME: &str = "qualifiedName";
pub const DISPLAY_NAME: &str = "displayName";
pub const DESCRIPTION: &str = "description";
pub const ADDITIONAL_PROPERTIES: &str = "additionalProperties";

pub const USER_ID: &str = "userId";
pub const ENCRYPTED_PASSWORD: &str = "encryptedPassword";
pub const CLEAR_PASSWORD: &str = "clearPassword";
pub const CONFIGURATION_PROPERTIES: &str = "configurationProperties";
pub const SECURED_PROPERTIES: &str = "securedProperties";

pub const NETWORK_ADDRESS: &str = "networkAddress";
pub const PROTOCOL: &str = "protocol";
pub const ENCRYPTION_METHOD: &str = "encryptionMethod";

pub const CONNECTOR_PROVIDER_CLASS_NAME: &str = "connectorProviderClassName";
pub const RECOGNIZED_ADDITIONAL_PROPERTIES: &str = "recognizedAdditionalProperties";
pub const RECOGNIZED_SECURED_PROPERTIES: &str = "recognizedSecuredProperties";
pub const RECOGNIZED_CONFIGURATION_PROPERTIES: &str = "recognizedConfigurationProperties";

/// Embedded connection edge properties.
pub const POSITION: &str = "position";
pub const ARGUMENTS: &str = "arguments";

/// The unique name every model object is resolved by.
pub const NAME_PROPERTIES: &[&str] = &[QUALIFIED_NAME];
