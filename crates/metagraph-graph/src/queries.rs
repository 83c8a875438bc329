//! Read operations and record conversion for the Neo4j store.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use neo4rs::query;

use metagraph_core::{
    Edge, Guid, InstanceStatus, MatchCriteria, Node, NodeProxy, Paging, PropertyMap, StoreError,
    TypeRef,
};

use crate::client::Neo4jStore;
use crate::mutations::{bolt_scalar, property_key, type_label};

/// Columns returned alongside a relationship so that both ends can be built.
pub(crate) const EDGE_COLUMNS: &str = "r,
     startNode(r).guid AS end1_guid, startNode(r).type_name AS end1_type,
     endNode(r).guid AS end2_guid, endNode(r).type_name AS end2_type";

impl Neo4jStore {
    // ── Single Node Lookups ──────────────────────────────────────

    /// Fetch a node and whether it is a proxy record.
    pub(crate) async fn fetch_node(&self, guid: &Guid) -> Result<Option<(Node, bool)>, StoreError> {
        let q = query("MATCH (n {guid: $guid}) RETURN n").param("guid", guid.to_string());

        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row
                    .get("n")
                    .map_err(|e| decode_error(format!("Failed to deserialize node: {e}")))?;
                let proxy = node.get::<bool>("proxy").unwrap_or(false);
                Ok(Some((neo4j_node_to_node(&node)?, proxy)))
            }
            None => Ok(None),
        }
    }

    pub(crate) async fn node_exists(&self, guid: &Guid) -> Result<bool, StoreError> {
        let q = query("MATCH (n {guid: $guid}) RETURN count(n) AS cnt")
            .param("guid", guid.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0) > 0),
            None => Ok(false),
        }
    }

    // ── Property Search ──────────────────────────────────────────

    /// Active nodes with the type's label whose scalar properties match.
    pub(crate) async fn match_nodes(
        &self,
        node_type: &TypeRef,
        properties: &PropertyMap,
        criteria: MatchCriteria,
        paging: Paging,
    ) -> Result<Vec<Node>, StoreError> {
        if properties.is_empty() && criteria == MatchCriteria::Any {
            return Ok(Vec::new());
        }

        let label = type_label(node_type)?;
        let mut terms = Vec::with_capacity(properties.len());
        let mut params = Vec::with_capacity(properties.len());
        for (i, (key, value)) in properties.iter().enumerate() {
            let column = property_key(key)?;
            let bolt = bolt_scalar(value).ok_or_else(|| StoreError::InvalidParameter {
                parameter: key.clone(),
                detail: "only scalar properties can be matched".to_string(),
            })?;
            terms.push(format!("n.`{column}` = $v{i}"));
            params.push((format!("v{i}"), bolt));
        }

        let joiner = match criteria {
            MatchCriteria::All => " AND ",
            MatchCriteria::Any => " OR ",
        };
        let filter = if terms.is_empty() {
            String::new()
        } else {
            format!(" AND ({})", terms.join(joiner))
        };

        let cypher = format!(
            "MATCH (n:`{label}`)
             WHERE n.status = 'active'{filter}
             RETURN n
             ORDER BY n.create_time, n.guid
             SKIP $skip LIMIT $limit"
        );

        let mut q = query(&cypher)
            .param("skip", paging.start_from as i64)
            .param("limit", paging.page_size as i64);
        for (name, value) in params {
            q = q.param(&name, value);
        }

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let node: neo4rs::Node = row
                .get("n")
                .map_err(|e| decode_error(format!("Failed to deserialize node: {e}")))?;
            results.push(neo4j_node_to_node(&node)?);
        }
        Ok(results)
    }

    // ── Relationship Queries ─────────────────────────────────────

    /// Relationships touching `guid` in either direction.
    pub(crate) async fn fetch_edges(
        &self,
        guid: &Guid,
        edge_type: Option<&TypeRef>,
        paging: Paging,
    ) -> Result<Vec<Edge>, StoreError> {
        if !self.node_exists(guid).await? {
            return Err(StoreError::EntityNotKnown {
                guid: guid.to_string(),
            });
        }

        let type_name = edge_type.map(|t| t.name.to_string()).unwrap_or_default();
        let cypher = format!(
            "MATCH (n {{guid: $guid}})-[r]-()
             WHERE $type_name = '' OR r.type_name = $type_name OR r.super_type = $type_name
             WITH DISTINCT r
             RETURN {EDGE_COLUMNS}
             ORDER BY r.create_time, r.guid
             SKIP $skip LIMIT $limit"
        );

        let q = query(&cypher)
            .param("guid", guid.to_string())
            .param("type_name", type_name)
            .param("skip", paging.start_from as i64)
            .param("limit", paging.page_size as i64);

        let rows = self.query_rows(q).await?;
        rows.iter().map(row_to_edge).collect()
    }
}

// ── Record Conversion ────────────────────────────────────────────

/// Convert a neo4rs::Node to a store node.
///
/// The JSON copy in `props` is authoritative; the per-property columns exist
/// only for matching.
pub(crate) fn neo4j_node_to_node(node: &neo4rs::Node) -> Result<Node, StoreError> {
    let guid: String = node.get("guid").unwrap_or_default();
    let type_id: String = node.get("type_id").unwrap_or_default();
    let type_name: String = node.get("type_name").unwrap_or_default();
    let super_type: String = node.get("super_type").unwrap_or_default();
    let status: String = node.get("status").unwrap_or_default();
    let props: String = node.get("props").unwrap_or_default();
    let created_by: String = node.get("created_by").unwrap_or_default();
    let updated_by: String = node.get("updated_by").unwrap_or_default();
    let create_time: String = node.get("create_time").unwrap_or_default();
    let update_time: String = node.get("update_time").unwrap_or_default();

    Ok(Node {
        guid: Guid(guid),
        node_type: type_ref(type_id, type_name, super_type),
        status: InstanceStatus::parse(&status),
        properties: parse_props(&props)?,
        created_by,
        updated_by: non_empty(updated_by),
        create_time: parse_time(&create_time).unwrap_or_else(Utc::now),
        update_time: parse_time(&update_time),
        version: node.get::<i64>("version").unwrap_or(1),
    })
}

/// Convert a row produced with [`EDGE_COLUMNS`] to an edge.
pub(crate) fn row_to_edge(row: &neo4rs::Row) -> Result<Edge, StoreError> {
    let rel: neo4rs::Relation = row
        .get("r")
        .map_err(|e| decode_error(format!("Failed to get relation: {e}")))?;

    let end = |guid_col: &str, type_col: &str| NodeProxy {
        guid: Guid(row.get::<String>(guid_col).unwrap_or_default()),
        type_name: row.get::<String>(type_col).unwrap_or_default(),
    };

    let props: String = rel.get("props").unwrap_or_default();
    let create_time: String = rel.get("create_time").unwrap_or_default();

    Ok(Edge {
        guid: Guid(rel.get::<String>("guid").unwrap_or_default()),
        edge_type: type_ref(
            rel.get::<String>("type_id").unwrap_or_default(),
            rel.get::<String>("type_name").unwrap_or_default(),
            rel.get::<String>("super_type").unwrap_or_default(),
        ),
        end1: end("end1_guid", "end1_type"),
        end2: end("end2_guid", "end2_type"),
        properties: parse_props(&props)?,
        create_time: parse_time(&create_time).unwrap_or_else(Utc::now),
    })
}

fn type_ref(id: String, name: String, super_type: String) -> TypeRef {
    TypeRef {
        id: Cow::Owned(id),
        name: Cow::Owned(name),
        super_type: non_empty(super_type).map(Cow::Owned),
    }
}

fn parse_props(json: &str) -> Result<PropertyMap, StoreError> {
    if json.is_empty() {
        return Ok(PropertyMap::new());
    }
    serde_json::from_str(json).map_err(|e| decode_error(format!("Malformed property bag: {e}")))
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

fn decode_error(msg: String) -> StoreError {
    StoreError::Backend(anyhow::anyhow!(msg))
}
