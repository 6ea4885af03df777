//! Neo4j mirror for the fact graph
//!
//! Each node becomes a vertex labelled by its type with the node's properties
//! flattened onto it. Each relationship becomes a typed directed edge between
//! vertices matched by id. Writes use MERGE on the primary id, so mirroring
//! the same record twice updates it in place.

use async_trait::async_trait;
use neo4rs::{Graph, Query, query};
use serde_json::Value;
use tracing::info;

use crate::config::ReplicaConfig;
use crate::domain::graph::{GraphNode, GraphRelationship, GraphSink, Properties};
use crate::error::{Error, Result};

const BACKEND: &str = "neo4j";

/// Keys written by the sink itself; user properties never override them
const RESERVED_KEYS: [&str; 5] = ["id", "title", "content", "confidence", "created_at"];

/// Graph sink writing to Neo4j over bolt
pub struct Neo4jSink {
    graph: Graph,
}

impl Neo4jSink {
    /// Connect to a Neo4j server
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(replication_error)?;

        info!(uri = %uri, user = %user, "Connected to Neo4j replica");
        Ok(Self { graph })
    }

    /// Connect using replica settings; the password comes from the environment
    pub async fn from_config(config: &ReplicaConfig) -> Result<Self> {
        let password = config
            .resolved_password()
            .map_err(|e| Error::ConfigError(e.to_string()))?
            .unwrap_or_default();
        Self::connect(&config.uri, &config.user, &password).await
    }
}

fn replication_error(e: neo4rs::Error) -> Error {
    Error::ReplicationError {
        backend: BACKEND.to_string(),
        reason: e.to_string(),
    }
}

/// Relationship types become Cypher identifiers: keep `[A-Za-z0-9_]`, uppercase
fn cypher_rel_type(raw: &str) -> Result<String> {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    if cleaned.trim_matches('_').is_empty() {
        return Err(Error::InvalidInput(format!(
            "relationship type '{}' cannot be used as a graph label",
            raw
        )));
    }
    Ok(cleaned)
}

/// Quote a property key for use after `n.`
fn cypher_key(key: &str) -> String {
    format!("`{}`", key.replace('`', "``"))
}

/// Append `SET target.key = $pN` clauses for each flattenable property
fn set_properties(
    mut cypher: String,
    mut q_params: Vec<(String, Value)>,
    target: &str,
    properties: &Properties,
) -> (String, Vec<(String, Value)>) {
    for (key, value) in properties {
        if value.is_null() || RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        let param = format!("p{}", q_params.len());
        cypher.push_str(&format!(", {}.{} = ${}", target, cypher_key(key), param));
        q_params.push((param, value.clone()));
    }
    (cypher, q_params)
}

/// MERGE statement for one relationship, reporting how many edges it touched
fn relationship_cypher(
    rel_type: &str,
    properties: &Properties,
) -> (String, Vec<(String, Value)>) {
    let base = format!(
        "MATCH (a {{id: $source}}), (b {{id: $target}}) MERGE (a)-[r:{} {{id: $id}}]->(b) SET r.confidence = $confidence, r.created_at = $created_at",
        rel_type
    );
    let (mut cypher, params) = set_properties(base, Vec::new(), "r", properties);
    cypher.push_str(" RETURN count(r) AS linked");
    (cypher, params)
}

/// A MATCH that finds no endpoints writes nothing yet still succeeds
fn ensure_linked(linked: i64, relationship: &GraphRelationship) -> Result<()> {
    if linked > 0 {
        return Ok(());
    }
    Err(Error::ReplicationError {
        backend: BACKEND.to_string(),
        reason: format!(
            "relationship {} not mirrored: endpoint {} or {} is missing on the replica",
            relationship.id, relationship.source_id, relationship.target_id
        ),
    })
}

/// Bind a JSON value; nested values are stored as JSON text
fn bind(q: Query, name: &str, value: Value) -> Query {
    match value {
        Value::Bool(b) => q.param(name, b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => q.param(name, i),
            None => q.param(name, n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => q.param(name, s),
        other => q.param(name, other.to_string()),
    }
}

#[async_trait]
impl GraphSink for Neo4jSink {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn mirror_node(&self, node: &GraphNode) -> Result<()> {
        // Node type labels come from a closed set
        let base = format!(
            "MERGE (n:{} {{id: $id}}) SET n.title = $title, n.content = $content, n.confidence = $confidence, n.created_at = $created_at",
            node.node_type.as_str()
        );
        let (cypher, params) = set_properties(base, Vec::new(), "n", &node.properties);

        let mut q = query(&cypher)
            .param("id", node.id.clone())
            .param("title", node.title.clone())
            .param("content", node.content.clone())
            .param("confidence", f64::from(node.confidence))
            .param("created_at", node.created_at.to_rfc3339());
        for (name, value) in params {
            q = bind(q, &name, value);
        }

        self.graph.run(q).await.map_err(replication_error)
    }

    async fn mirror_relationship(&self, relationship: &GraphRelationship) -> Result<()> {
        let rel_type = cypher_rel_type(relationship.relationship_type.as_str())?;
        let (cypher, params) = relationship_cypher(&rel_type, &relationship.properties);

        let mut q = query(&cypher)
            .param("source", relationship.source_id.clone())
            .param("target", relationship.target_id.clone())
            .param("id", relationship.id.clone())
            .param("confidence", f64::from(relationship.confidence))
            .param("created_at", relationship.created_at.to_rfc3339());
        for (name, value) in params {
            q = bind(q, &name, value);
        }

        let mut rows = self.graph.execute(q).await.map_err(replication_error)?;
        let linked = match rows.next().await.map_err(replication_error)? {
            Some(row) => row.get::<i64>("linked").map_err(|e| Error::ReplicationError {
                backend: BACKEND.to_string(),
                reason: e.to_string(),
            })?,
            None => 0,
        };

        ensure_linked(linked, relationship)
    }
}
