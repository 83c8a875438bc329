//! Mapping between model objects and generic nodes.

use std::collections::BTreeMap;

use metagraph_core::error::Result;
use metagraph_core::{Guid, MetadataError, Node, PropertyMap, PropertyValue, TypeRef};

use crate::model::{Connection, ConnectionKind, ConnectorType, Endpoint};
use crate::schema::{self, NAME_PROPERTIES};

/// Maps one kind of model object to and from a (type, property bag) pair.
///
/// Only the object's own scalar payload is mapped here; related objects are
/// the synchronizer's business.
pub trait Converter: Send + Sync {
    type Object: Send + Sync;

    /// The type lookups are made against. Subtypes match it.
    fn base_type(&self) -> &'static TypeRef;

    /// The concrete type `object` is stored as.
    fn node_type(&self, object: &Self::Object) -> &'static TypeRef;

    /// Properties holding the unique name.
    fn name_properties(&self) -> &'static [&'static str] {
        NAME_PROPERTIES
    }

    fn guid<'a>(&self, object: &'a Self::Object) -> Option<&'a Guid>;

    fn unique_name<'a>(&self, object: &'a Self::Object) -> &'a str;

    fn to_properties(&self, object: &Self::Object) -> PropertyMap;

    /// Rebuild an object from its node. Related objects are left empty.
    fn from_node(&self, node: &Node) -> Result<Self::Object>;
}

// ── Connections ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionConverter;

impl Converter for ConnectionConverter {
    type Object = Connection;

    fn base_type(&self) -> &'static TypeRef {
        &schema::CONNECTION
    }

    fn node_type(&self, object: &Connection) -> &'static TypeRef {
        match object.kind {
            ConnectionKind::Standard => &schema::CONNECTION,
            ConnectionKind::Virtual { .. } => &schema::VIRTUAL_CONNECTION,
        }
    }

    fn guid<'a>(&self, object: &'a Connection) -> Option<&'a Guid> {
        object.guid.as_ref()
    }

    fn unique_name<'a>(&self, object: &'a Connection) -> &'a str {
        &object.qualified_name
    }

    fn to_properties(&self, c: &Connection) -> PropertyMap {
        let mut props = PropertyMap::new();
        put_text(&mut props, schema::QUALIFIED_NAME, Some(&c.qualified_name));
        put_text(&mut props, schema::DISPLAY_NAME, c.display_name.as_ref());
        put_text(&mut props, schema::DESCRIPTION, c.description.as_ref());
        put_text(&mut props, schema::USER_ID, c.user_id.as_ref());
        put_text(&mut props, schema::ENCRYPTED_PASSWORD, c.encrypted_password.as_ref());
        put_text(&mut props, schema::CLEAR_PASSWORD, c.clear_password.as_ref());
        put_map(&mut props, schema::CONFIGURATION_PROPERTIES, &c.configuration_properties);
        put_string_map(&mut props, schema::SECURED_PROPERTIES, &c.secured_properties);
        put_string_map(&mut props, schema::ADDITIONAL_PROPERTIES, &c.additional_properties);
        props
    }

    fn from_node(&self, node: &Node) -> Result<Connection> {
        let kind = if node.node_type.is_a(&schema::VIRTUAL_CONNECTION.name) {
            ConnectionKind::Virtual {
                embedded: Vec::new(),
            }
        } else {
            ConnectionKind::Standard
        };

        Ok(Connection {
            guid: Some(node.guid.clone()),
            qualified_name: required_text(node, schema::QUALIFIED_NAME)?,
            display_name: text(node, schema::DISPLAY_NAME),
            description: text(node, schema::DESCRIPTION),
            user_id: text(node, schema::USER_ID),
            encrypted_password: text(node, schema::ENCRYPTED_PASSWORD),
            clear_password: text(node, schema::CLEAR_PASSWORD),
            configuration_properties: map(node, schema::CONFIGURATION_PROPERTIES),
            secured_properties: string_map(node, schema::SECURED_PROPERTIES),
            additional_properties: string_map(node, schema::ADDITIONAL_PROPERTIES),
            endpoint: None,
            connector_type: None,
            kind,
        })
    }
}

// ── Endpoints ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct EndpointConverter;

impl Converter for EndpointConverter {
    type Object = Endpoint;

    fn base_type(&self) -> &'static TypeRef {
        &schema::ENDPOINT
    }

    fn node_type(&self, _: &Endpoint) -> &'static TypeRef {
        &schema::ENDPOINT
    }

    fn guid<'a>(&self, object: &'a Endpoint) -> Option<&'a Guid> {
        object.guid.as_ref()
    }

    fn unique_name<'a>(&self, object: &'a Endpoint) -> &'a str {
        &object.qualified_name
    }

    fn to_properties(&self, e: &Endpoint) -> PropertyMap {
        let mut props = PropertyMap::new();
        put_text(&mut props, schema::QUALIFIED_NAME, Some(&e.qualified_name));
        put_text(&mut props, schema::DISPLAY_NAME, e.display_name.as_ref());
        put_text(&mut props, schema::DESCRIPTION, e.description.as_ref());
        put_text(&mut props, schema::NETWORK_ADDRESS, e.network_address.as_ref());
        put_text(&mut props, schema::PROTOCOL, e.protocol.as_ref());
        put_text(&mut props, schema::ENCRYPTION_METHOD, e.encryption_method.as_ref());
        put_string_map(&mut props, schema::ADDITIONAL_PROPERTIES, &e.additional_properties);
        props
    }

    fn from_node(&self, node: &Node) -> Result<Endpoint> {
        Ok(Endpoint {
            guid: Some(node.guid.clone()),
            qualified_name: required_text(node, schema::QUALIFIED_NAME)?,
            display_name: text(node, schema::DISPLAY_NAME),
            description: text(node, schema::DESCRIPTION),
            network_address: text(node, schema::NETWORK_ADDRESS),
            protocol: text(node, schema::PROTOCOL),
            encryption_method: text(node, schema::ENCRYPTION_METHOD),
            additional_properties: string_map(node, schema::ADDITIONAL_PROPERTIES),
        })
    }
}

// ── Connector Types ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectorTypeConverter;

impl Converter for ConnectorTypeConverter {
    type Object = ConnectorType;

    fn base_type(&self) -> &'static TypeRef {
        &schema::CONNECTOR_TYPE
    }

    fn node_type(&self, _: &ConnectorType) -> &'static TypeRef {
        &schema::CONNECTOR_TYPE
    }

    fn guid<'a>(&self, object: &'a ConnectorType) -> Option<&'a Guid> {
        object.guid.as_ref()
    }

    fn unique_name<'a>(&self, object: &'a ConnectorType) -> &'a str {
        &object.qualified_name
    }

    fn to_properties(&self, t: &ConnectorType) -> PropertyMap {
        let mut props = PropertyMap::new();
        put_text(&mut props, schema::QUALIFIED_NAME, Some(&t.qualified_name));
        put_text(&mut props, schema::DISPLAY_NAME, t.display_name.as_ref());
        put_text(&mut props, schema::DESCRIPTION, t.description.as_ref());
        put_text(
            &mut props,
            schema::CONNECTOR_PROVIDER_CLASS_NAME,
            t.connector_provider_class_name.as_ref(),
        );
        put_list(
            &mut props,
            schema::RECOGNIZED_ADDITIONAL_PROPERTIES,
            &t.recognized_additional_properties,
        );
        put_list(
            &mut props,
            schema::RECOGNIZED_SECURED_PROPERTIES,
            &t.recognized_secured_properties,
        );
        put_list(
            &mut props,
            schema::RECOGNIZED_CONFIGURATION_PROPERTIES,
            &t.recognized_configuration_properties,
        );
        put_string_map(&mut props, schema::ADDITIONAL_PROPERTIES, &t.additional_properties);
        props
    }

    fn from_node(&self, node: &Node) -> Result<ConnectorType> {
        Ok(ConnectorType {
            guid: Some(node.guid.clone()),
            qualified_name: required_text(node, schema::QUALIFIED_NAME)?,
            display_name: text(node, schema::DISPLAY_NAME),
            description: text(node, schema::DESCRIPTION),
            connector_provider_class_name: text(node, schema::CONNECTOR_PROVIDER_CLASS_NAME),
            recognized_additional_properties: list(node, schema::RECOGNIZED_ADDITIONAL_PROPERTIES),
            recognized_secured_properties: list(node, schema::RECOGNIZED_SECURED_PROPERTIES),
            recognized_configuration_properties: list(
                node,
                schema::RECOGNIZED_CONFIGURATION_PROPERTIES,
            ),
            additional_properties: string_map(node, schema::ADDITIONAL_PROPERTIES),
        })
    }
}

// ── Property Helpers ─────────────────────────────────────────────
//
// Absent values and empty collections are not written, so a bag never holds
// an empty entry that would read back differently.

fn put_text(props: &mut PropertyMap, key: &str, value: Option<&String>) {
    if let Some(v) = value {
        props.insert(key.to_string(), PropertyValue::Text(v.clone()));
    }
}

fn put_map(props: &mut PropertyMap, key: &str, value: &PropertyMap) {
    if !value.is_empty() {
        props.insert(key.to_string(), PropertyValue::Map(value.clone()));
    }
}

fn put_string_map(props: &mut PropertyMap, key: &str, value: &BTreeMap<String, String>) {
    if !value.is_empty() {
        let map = value
            .iter()
            .map(|(k, v)| (k.clone(), PropertyValue::Text(v.clone())))
            .collect();
        props.insert(key.to_string(), PropertyValue::Map(map));
    }
}

fn put_list(props: &mut PropertyMap, key: &str, value: &[String]) {
    if !value.is_empty() {
        let list = value.iter().cloned().map(PropertyValue::Text).collect();
        props.insert(key.to_string(), PropertyValue::List(list));
    }
}

fn text(node: &Node, key: &str) -> Option<String> {
    node.property(key).and_then(PropertyValue::as_str).map(str::to_string)
}

fn required_text(node: &Node, key: &str) -> Result<String> {
    text(node, key).ok_or_else(|| {
        MetadataError::invariant(
            format!("{} {} has no {key}", node.node_type, node.guid),
            "from_node",
        )
    })
}

fn map(node: &Node, key: &str) -> PropertyMap {
    node.property(key)
        .and_then(PropertyValue::as_map)
        .cloned()
        .unwrap_or_default()
}

fn string_map(node: &Node, key: &str) -> BTreeMap<String, String> {
    map(node, key)
        .into_iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
        .collect()
}

fn list(node: &Node, key: &str) -> Vec<String> {
    node.property(key)
        .and_then(PropertyValue::as_list)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
