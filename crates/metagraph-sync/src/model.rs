//! The connection model synchronized by this crate.
//!
//! A [`Connection`] is a composite: it may point to one [`Endpoint`] and one
//! [`ConnectorType`], and a virtual connection embeds an ordered list of
//! further connections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use metagraph_core::{Guid, PropertyMap};

/// How to reach a connector's target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub guid: Option<Guid>,
    pub qualified_name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub network_address: Option<String>,
    pub protocol: Option<String>,
    pub encryption_method: Option<String>,
    pub additional_properties: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            ..Self::default()
        }
    }

    pub fn with_network_address(mut self, address: impl Into<String>) -> Self {
        self.network_address = Some(address.into());
        self
    }

    pub fn without_guids(mut self) -> Self {
        self.guid = None;
        self
    }
}

/// The connector implementation a connection is opened with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorType {
    pub guid: Option<Guid>,
    pub qualified_name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub connector_provider_class_name: Option<String>,
    pub recognized_additional_properties: Vec<String>,
    pub recognized_secured_properties: Vec<String>,
    pub recognized_configuration_properties: Vec<String>,
    pub additional_properties: BTreeMap<String, String>,
}

impl ConnectorType {
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            ..Self::default()
        }
    }

    pub fn with_provider(mut self, class_name: impl Into<String>) -> Self {
        self.connector_provider_class_name = Some(class_name.into());
        self
    }

    pub fn without_guids(mut self) -> Self {
        self.guid = None;
        self
    }
}

/// Whether a connection stands alone or is built from embedded connections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionKind {
    #[default]
    Standard,
    Virtual { embedded: Vec<EmbeddedConnection> },
}

/// One entry in a virtual connection's list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedConnection {
    pub position: i64,
    pub display_name: Option<String>,
    pub arguments: PropertyMap,
    pub connection: Connection,
}

impl EmbeddedConnection {
    pub fn new(position: i64, connection: Connection) -> Self {
        Self {
            position,
            display_name: None,
            arguments: PropertyMap::new(),
            connection,
        }
    }
}

/// Everything needed to open a connector to a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub guid: Option<Guid>,
    pub qualified_name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub user_id: Option<String>,
    pub encrypted_password: Option<String>,
    pub clear_password: Option<String>,
    pub configuration_properties: PropertyMap,
    pub secured_properties: BTreeMap<String, String>,
    pub additional_properties: BTreeMap<String, String>,
    pub endpoint: Option<Endpoint>,
    pub connector_type: Option<ConnectorType>,
    pub kind: ConnectionKind,
}

impl Connection {
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn with_connector_type(mut self, connector_type: ConnectorType) -> Self {
        self.connector_type = Some(connector_type);
        self
    }

    /// Turn this into a virtual connection embedding `embedded`.
    pub fn embedding(mut self, embedded: Vec<EmbeddedConnection>) -> Self {
        self.kind = ConnectionKind::Virtual { embedded };
        self
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.kind, ConnectionKind::Virtual { .. })
    }

    pub fn embedded(&self) -> &[EmbeddedConnection] {
        match &self.kind {
            ConnectionKind::Virtual { embedded } => embedded,
            ConnectionKind::Standard => &[],
        }
    }

    /// Levels of embedded connections below this one.
    pub fn nesting_depth(&self) -> usize {
        self.embedded()
            .iter()
            .map(|e| 1 + e.connection.nesting_depth())
            .max()
            .unwrap_or(0)
    }

    /// A copy with every guid in the tree cleared, for comparing a stored
    /// tree with the one it was saved from.
    pub fn without_guids(mut self) -> Self {
        self.guid = None;
        self.endpoint = self.endpoint.map(Endpoint::without_guids);
        self.connector_type = self.connector_type.map(ConnectorType::without_guids);
        if let ConnectionKind::Virtual { embedded } = &mut self.kind {
            for entry in embedded.iter_mut() {
                entry.connection = std::mem::take(&mut entry.connection).without_guids();
            }
        }
        self
    }
}
