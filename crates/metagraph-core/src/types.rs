//! Core graph types for the metadata store.
//!
//! Nodes ("entities") and edges ("relationships") are generic records: a type
//! identity plus a property bag. Domain objects are mapped onto them by
//! converters in the sync crate.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ───────────────────────────────────────────────────

/// Globally unique identifier of a node or edge.
///
/// The store assigns guids; they are opaque strings to this layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Guid(pub String);

impl Guid {
    /// Allocate a fresh random guid (used by store backends).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A guid made only of whitespace can never resolve.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for Guid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Guid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Guid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Type identity ─────────────────────────────────────────────────

/// Identity of a node or edge type.
///
/// Type ids and names are opaque strings chosen by callers. A type may name
/// a single parent type; lookups that expect the parent accept the subtype.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub id: Cow<'static, str>,
    pub name: Cow<'static, str>,
    pub super_type: Option<Cow<'static, str>>,
}

impl TypeRef {
    /// A type known at compile time.
    pub const fn of(id: &'static str, name: &'static str) -> Self {
        Self {
            id: Cow::Borrowed(id),
            name: Cow::Borrowed(name),
            super_type: None,
        }
    }

    /// A compile-time type that specializes `super_type`.
    pub const fn subtype_of(
        id: &'static str,
        name: &'static str,
        super_type: &'static str,
    ) -> Self {
        Self {
            id: Cow::Borrowed(id),
            name: Cow::Borrowed(name),
            super_type: Some(Cow::Borrowed(super_type)),
        }
    }

    /// A type supplied at runtime.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Cow::Owned(id.into()),
            name: Cow::Owned(name.into()),
            super_type: None,
        }
    }

    /// Whether this type is `type_name` or a direct subtype of it.
    pub fn is_a(&self, type_name: &str) -> bool {
        self.name == type_name || self.super_type.as_deref() == Some(type_name)
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ── Properties ────────────────────────────────────────────────────

/// A property bag keyed by property name.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// A typed property value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<PropertyValue>),
    Map(PropertyMap),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&PropertyMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Scalars can be indexed and matched by the store; maps and lists cannot.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Text(_)
        )
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for PropertyValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for PropertyValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<PropertyMap> for PropertyValue {
    fn from(m: PropertyMap) -> Self {
        Self::Map(m)
    }
}

// ── Nodes ─────────────────────────────────────────────────────────

/// Lifecycle state of a stored instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    #[default]
    Active,
    Deleted,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "deleted" => Self::Deleted,
            _ => Self::Active,
        }
    }
}

/// A typed, identified record in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub guid: Guid,
    pub node_type: TypeRef,
    pub status: InstanceStatus,
    /// Full property set; this layer always replaces it wholesale.
    pub properties: PropertyMap,
    pub created_by: String,
    pub updated_by: Option<String>,
    pub create_time: DateTime<Utc>,
    pub update_time: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Node {
    pub fn proxy(&self) -> NodeProxy {
        NodeProxy {
            guid: self.guid.clone(),
            type_name: self.node_type.name.to_string(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

/// Id and type name of a node, as embedded in an edge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NodeProxy {
    pub guid: Guid,
    pub type_name: String,
}

// ── Edges ─────────────────────────────────────────────────────────

/// A typed, directed link between two nodes. End order is significant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub guid: Guid,
    pub edge_type: TypeRef,
    pub end1: NodeProxy,
    pub end2: NodeProxy,
    pub properties: PropertyMap,
    pub create_time: DateTime<Utc>,
}

impl Edge {
    /// Whether either end of the edge is `guid`.
    pub fn touches(&self, guid: &Guid) -> bool {
        &self.end1.guid == guid || &self.end2.guid == guid
    }

    /// Whether the edge runs from `end1` to `end2`, in that order.
    pub fn connects(&self, end1: &Guid, end2: &Guid) -> bool {
        &self.end1.guid == end1 && &self.end2.guid == end2
    }

    /// The end opposite `guid`, or `None` if the edge does not touch `guid`.
    ///
    /// For a self-loop both ends are `guid` and that end is returned.
    pub fn other_end(&self, guid: &Guid) -> Option<&NodeProxy> {
        if &self.end1.guid == guid {
            Some(&self.end2)
        } else if &self.end2.guid == guid {
            Some(&self.end1)
        } else {
            None
        }
    }
}

// ── Queries ───────────────────────────────────────────────────────

/// How a property filter combines its terms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchCriteria {
    /// Every supplied property must match.
    All,
    /// At least one supplied property must match.
    Any,
}

/// A window over a result list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Paging {
    pub start_from: usize,
    /// Zero means "use the configured default".
    pub page_size: usize,
}

impl Paging {
    pub fn first(page_size: usize) -> Self {
        Self {
            start_from: 0,
            page_size,
        }
    }

    /// Apply the window to an already ordered list.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.start_from)
            .take(self.page_size)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTION: TypeRef = TypeRef::of("conn-type", "Connection");
    const VIRTUAL: TypeRef = TypeRef::subtype_of("vconn-type", "VirtualConnection", "Connection");

    fn proxy(guid: &str) -> NodeProxy {
        NodeProxy {
            guid: Guid::from(guid),
            type_name: "Connection".to_string(),
        }
    }

    #[test]
    fn subtype_is_a_parent() {
        assert!(VIRTUAL.is_a("Connection"));
        assert!(VIRTUAL.is_a("VirtualConnection"));
        assert!(CONNECTION.is_a("Connection"));
        assert!(!CONNECTION.is_a("VirtualConnection"));
    }

    #[test]
    fn property_value_untagged_json() {
        let mut map = PropertyMap::new();
        map.insert("position".to_string(), PropertyValue::Int(3));
        map.insert("ratio".to_string(), PropertyValue::Float(0.5));
        map.insert("name".to_string(), "conn-1".into());
        map.insert(
            "tags".to_string(),
            PropertyValue::List(vec!["a".into(), "b".into()]),
        );

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(
            json,
            r#"{"name":"conn-1","position":3,"ratio":0.5,"tags":["a","b"]}"#
        );
        let back: PropertyMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn edge_ends_are_ordered() {
        let edge = Edge {
            guid: Guid::from("e1"),
            edge_type: TypeRef::of("rel", "ConnectionEndpoint"),
            end1: proxy("a"),
            end2: proxy("b"),
            properties: PropertyMap::new(),
            create_time: Utc::now(),
        };

        let a = Guid::from("a");
        let b = Guid::from("b");
        assert!(edge.connects(&a, &b));
        assert!(!edge.connects(&b, &a));
        assert_eq!(edge.other_end(&a).map(|p| &p.guid), Some(&b));
        assert_eq!(edge.other_end(&b).map(|p| &p.guid), Some(&a));
        assert!(edge.other_end(&Guid::from("c")).is_none());
    }

    #[test]
    fn paging_windows_results() {
        let page = Paging {
            start_from: 2,
            page_size: 2,
        };
        assert_eq!(page.apply(1..=10), vec![3, 4]);
        assert!(Paging::first(0).apply(1..=3).is_empty());
    }

    #[test]
    fn blank_guid_detected() {
        assert!(Guid::from("  ").is_blank());
        assert!(!Guid::new().is_blank());
    }
}
