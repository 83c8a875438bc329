//! Write operations for the Neo4j store.
//!
//! Every call writes exactly one node or one relationship. Scalar properties
//! are mirrored into `p_<name>` columns so that searches run in Cypher.

use chrono::Utc;
use neo4rs::{query, BoltType, Query};

use metagraph_core::{
    Edge, Guid, InstanceStatus, Node, PropertyMap, PropertyValue, StoreError, TypeRef,
};

use crate::client::Neo4jStore;
use crate::queries::{neo4j_node_to_node, row_to_edge, EDGE_COLUMNS};

impl Neo4jStore {
    // ── Nodes ────────────────────────────────────────────────────

    pub(crate) async fn insert_node(
        &self,
        user_id: &str,
        node_type: &TypeRef,
        properties: &PropertyMap,
    ) -> Result<Option<Node>, StoreError> {
        let labels = node_labels(node_type)?;
        let (assignments, values) = scalar_assignments(properties)?;

        let cypher = format!(
            "CREATE (n{labels} {{
               guid: $guid, type_id: $type_id, type_name: $type_name,
               super_type: $super_type, status: $status, proxy: false,
               props: $props, created_by: $user, create_time: $now, version: 1
             }})
             {assignments}
             RETURN n"
        );

        let q = query(&cypher)
            .param("guid", Guid::new().to_string())
            .param("type_id", node_type.id.to_string())
            .param("type_name", node_type.name.to_string())
            .param(
                "super_type",
                node_type.super_type.as_deref().unwrap_or_default().to_string(),
            )
            .param("status", InstanceStatus::Active.as_str().to_string())
            .param("props", props_json(properties)?)
            .param("user", user_id.to_string())
            .param("now", Utc::now().to_rfc3339());

        self.return_node(with_values(q, values)).await
    }

    pub(crate) async fn replace_properties(
        &self,
        user_id: &str,
        guid: &Guid,
        properties: &PropertyMap,
    ) -> Result<Option<Node>, StoreError> {
        let Some((current, _)) = self.fetch_node(guid).await? else {
            return Err(StoreError::EntityNotKnown {
                guid: guid.to_string(),
            });
        };

        let stale: Vec<String> = current
            .properties
            .iter()
            .filter(|(_, v)| v.is_scalar())
            .map(|(k, _)| property_key(k).map(|column| format!("n.`{column}`")))
            .collect::<Result<_, _>>()?;
        let removals = if stale.is_empty() {
            String::new()
        } else {
            format!("REMOVE {}", stale.join(", "))
        };
        let (assignments, values) = scalar_assignments(properties)?;

        let cypher = format!(
            "MATCH (n {{guid: $guid}})
             {removals}
             SET n.props = $props, n.updated_by = $user, n.update_time = $now,
                 n.version = n.version + 1
             {assignments}
             RETURN n"
        );

        let q = query(&cypher)
            .param("guid", guid.to_string())
            .param("props", props_json(properties)?)
            .param("user", user_id.to_string())
            .param("now", Utc::now().to_rfc3339());

        self.return_node(with_values(q, values)).await
    }

    /// Delete a node that has no relationships left.
    pub(crate) async fn remove_node(
        &self,
        node_type: &TypeRef,
        guid: &Guid,
    ) -> Result<(), StoreError> {
        let q = query(
            "MATCH (n {guid: $guid})
             OPTIONAL MATCH (n)-[r]-()
             RETURN n.type_name AS type_name, n.super_type AS super_type, count(r) AS rels",
        )
        .param("guid", guid.to_string());

        let Some(row) = self.query_one(q).await? else {
            return Err(StoreError::EntityNotKnown {
                guid: guid.to_string(),
            });
        };
        let type_name: String = row.get("type_name").unwrap_or_default();
        let super_type: String = row.get("super_type").unwrap_or_default();
        if type_name != node_type.name && super_type != node_type.name {
            return Err(StoreError::InvalidParameter {
                parameter: "node_type".to_string(),
                detail: format!("{guid} is a {type_name}, not a {node_type}"),
            });
        }
        if row.get::<i64>("rels").unwrap_or(0) > 0 {
            return Err(StoreError::backend(anyhow::anyhow!(
                "cannot delete {guid}: node still has relationships"
            )));
        }

        let q = query("MATCH (n {guid: $guid}) DELETE n").param("guid", guid.to_string());
        self.run(q).await
    }

    // ── Relationships ────────────────────────────────────────────

    pub(crate) async fn insert_edge(
        &self,
        user_id: &str,
        edge_type: &TypeRef,
        end1: &Guid,
        end2: &Guid,
        properties: &PropertyMap,
    ) -> Result<Option<Edge>, StoreError> {
        for end in [end1, end2] {
            if !self.node_exists(end).await? {
                return Err(StoreError::EntityNotKnown {
                    guid: end.to_string(),
                });
            }
        }

        let rel_type = type_label(edge_type)?;
        let cypher = format!(
            "MATCH (a {{guid: $end1}})
             MATCH (b {{guid: $end2}})
             CREATE (a)-[r:`{rel_type}` {{
               guid: $guid, type_id: $type_id, type_name: $type_name,
               super_type: $super_type, props: $props,
               created_by: $user, create_time: $now
             }}]->(b)
             RETURN {EDGE_COLUMNS}"
        );

        let q = query(&cypher)
            .param("end1", end1.to_string())
            .param("end2", end2.to_string())
            .param("guid", Guid::new().to_string())
            .param("type_id", edge_type.id.to_string())
            .param("type_name", edge_type.name.to_string())
            .param(
                "super_type",
                edge_type.super_type.as_deref().unwrap_or_default().to_string(),
            )
            .param("props", props_json(properties)?)
            .param("user", user_id.to_string())
            .param("now", Utc::now().to_rfc3339());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(row_to_edge(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn remove_edge(
        &self,
        edge_type: &TypeRef,
        guid: &Guid,
    ) -> Result<(), StoreError> {
        let q = query(
            "MATCH ()-[r {guid: $guid}]->()
             WHERE r.type_name = $type_name OR r.super_type = $type_name
             DELETE r
             RETURN count(r) AS cnt",
        )
        .param("guid", guid.to_string())
        .param("type_name", edge_type.name.to_string());

        let deleted = match self.query_one(q).await? {
            Some(row) => row.get::<i64>("cnt").unwrap_or(0),
            None => 0,
        };
        if deleted == 0 {
            return Err(StoreError::RelationshipNotKnown {
                guid: guid.to_string(),
            });
        }
        Ok(())
    }

    async fn return_node(&self, q: Query) -> Result<Option<Node>, StoreError> {
        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row.get("n").map_err(|e| {
                    StoreError::backend(anyhow::anyhow!("Failed to deserialize node: {e}"))
                })?;
                Ok(Some(neo4j_node_to_node(&node)?))
            }
            None => Ok(None),
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Labels or relationship types are interpolated into Cypher, so only plain
/// identifiers are accepted.
pub(crate) fn type_label(t: &TypeRef) -> Result<&str, StoreError> {
    checked_identifier(&t.name, "type name")
}

/// `:Type` or `:Type:SuperType`.
fn node_labels(t: &TypeRef) -> Result<String, StoreError> {
    let mut labels = format!(":`{}`", type_label(t)?);
    if let Some(super_type) = t.super_type.as_deref() {
        labels.push_str(&format!(":`{}`", checked_identifier(super_type, "super type")?));
    }
    Ok(labels)
}

/// Column that mirrors a scalar property.
pub(crate) fn property_key(name: &str) -> Result<String, StoreError> {
    Ok(format!("p_{}", checked_identifier(name, "property name")?))
}

fn checked_identifier<'a>(s: &'a str, what: &str) -> Result<&'a str, StoreError> {
    let valid = !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(s)
    } else {
        Err(StoreError::InvalidParameter {
            parameter: what.to_string(),
            detail: format!("{s:?} is not a plain identifier"),
        })
    }
}

/// Bolt value for a scalar property; `None` for maps and lists.
pub(crate) fn bolt_scalar(value: &PropertyValue) -> Option<BoltType> {
    match value {
        PropertyValue::Bool(b) => Some(BoltType::from(*b)),
        PropertyValue::Int(i) => Some(BoltType::from(*i)),
        PropertyValue::Float(f) => Some(BoltType::from(*f)),
        PropertyValue::Text(s) => Some(BoltType::from(s.clone())),
        PropertyValue::List(_) | PropertyValue::Map(_) => None,
    }
}

/// `SET n.p_a = $s0, ...` for the scalar properties, with their parameters.
fn scalar_assignments(
    properties: &PropertyMap,
) -> Result<(String, Vec<(String, BoltType)>), StoreError> {
    let mut sets = Vec::new();
    let mut values = Vec::new();
    for (key, value) in properties {
        let Some(bolt) = bolt_scalar(value) else {
            continue;
        };
        let i = values.len();
        sets.push(format!("n.`{}` = $s{i}", property_key(key)?));
        values.push((format!("s{i}"), bolt));
    }

    let clause = if sets.is_empty() {
        String::new()
    } else {
        format!("SET {}", sets.join(", "))
    };
    Ok((clause, values))
}

fn with_values(mut q: Query, values: Vec<(String, BoltType)>) -> Query {
    for (name, value) in values {
        q = q.param(&name, value);
    }
    q
}

fn props_json(properties: &PropertyMap) -> Result<String, StoreError> {
    serde_json::to_string(properties).map_err(StoreError::backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_include_super_type() {
        let t = TypeRef::subtype_of("vc", "VirtualConnection", "Connection");
        assert_eq!(node_labels(&t).unwrap(), ":`VirtualConnection`:`Connection`");
        assert_eq!(
            node_labels(&TypeRef::of("ep", "Endpoint")).unwrap(),
            ":`Endpoint`"
        );
    }

    #[test]
    fn injection_in_names_is_rejected() {
        let t = TypeRef::new("x", "Endpoint`) DETACH DELETE (m");
        assert!(matches!(
            type_label(&t),
            Err(StoreError::InvalidParameter { .. })
        ));
        assert!(property_key("qualified name").is_err());
        assert_eq!(property_key("qualifiedName").unwrap(), "p_qualifiedName");
    }

    #[test]
    fn only_scalars_are_mirrored() {
        let mut props = PropertyMap::new();
        props.insert("qualifiedName".to_string(), "conn-1".into());
        props.insert("position".to_string(), PropertyValue::Int(2));
        props.insert("arguments".to_string(), PropertyValue::Map(PropertyMap::new()));

        let (clause, values) = scalar_assignments(&props).unwrap();
        assert_eq!(clause, "SET n.`p_position` = $s0, n.`p_qualifiedName` = $s1");
        assert_eq!(values.len(), 2);
    }
}
