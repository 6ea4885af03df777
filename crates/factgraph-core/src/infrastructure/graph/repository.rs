//! SQLite implementation of the GraphStore
//!
//! Properties are stored as JSON text. Structured lookups (session id, file
//! path) go through `json_extract`, which the v2 migration indexes.
//!
//! Writes are single statements so they take the write lock up front; a read
//! followed by a write inside one deferred transaction fails under WAL once
//! another connection has committed.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::graph::{
    ConnectedNode, GraphAnalytics, GraphNode, GraphRelationship, GraphStore, MetricSample,
    NodeType, Properties, Provenance, RelationshipType,
};
use crate::error::{Error, Result};

/// SQLite implementation of the graph store
#[derive(Clone)]
pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    /// Create a new SQLite graph store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Attempts at a compare-and-swap property update before giving up
const UPDATE_ATTEMPTS: usize = 16;

/// Fixed-width UTC timestamp so stored values sort chronologically as text
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn check_confidence(confidence: f32, what: &str) -> Result<()> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{} confidence {} is outside 0.0-1.0",
            what, confidence
        )))
    }
}

/// Escape LIKE wildcards so user input matches literally
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

async fn node_exists(pool: &SqlitePool, id: &str) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as("SELECT id FROM nodes WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    // ========== Node Operations ==========

    async fn insert_node(&self, node: &GraphNode) -> Result<()> {
        check_confidence(node.confidence, "node")?;
        let properties_json = serde_json::to_string(&node.properties)?;

        sqlx::query(
            r#"
            INSERT INTO nodes (
                id, node_type, title, content, search_text, properties,
                conversation_id, file_path, confidence, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&node.id)
        .bind(node.node_type.as_str())
        .bind(&node.title)
        .bind(&node.content)
        .bind(GraphNode::search_key(&node.title, &node.content))
        .bind(&properties_json)
        .bind(&node.provenance.conversation_id)
        .bind(&node.provenance.file_path)
        .bind(node.confidence)
        .bind(timestamp(&node.created_at))
        .bind(timestamp(&node.updated_at))
        .execute(&self.pool)
        .await?;

        debug!(node_id = %node.id, node_type = %node.node_type, "Node inserted");
        Ok(())
    }

    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>> {
        let row: Option<NodeRow> = sqlx::query_as("SELECT * FROM nodes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_node()).transpose()
    }

    async fn list_nodes(&self, node_type: Option<NodeType>, limit: usize) -> Result<Vec<GraphNode>> {
        let rows: Vec<NodeRow> = match node_type {
            Some(node_type) => {
                sqlx::query_as(
                    "SELECT * FROM nodes WHERE node_type = ? ORDER BY created_at DESC, id LIMIT ?",
                )
                .bind(node_type.as_str())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM nodes ORDER BY created_at DESC, id LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn search_nodes(&self, query: &str, limit: usize) -> Result<Vec<GraphNode>> {
        let pattern = like_pattern(&query.to_lowercase());

        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT * FROM nodes
            WHERE search_text LIKE ? ESCAPE '\'
            ORDER BY confidence DESC, created_at, id
            LIMIT ?
            "#,
        )
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn update_node_properties(&self, id: &str, patch: &Properties) -> Result<GraphNode> {
        // Compare-and-swap on the stored JSON
        for attempt in 1..=UPDATE_ATTEMPTS {
            let row: Option<NodeRow> = sqlx::query_as("SELECT * FROM nodes WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            let row = row.ok_or_else(|| Error::NodeNotFound(id.to_string()))?;
            let previous = row.properties.clone();

            let mut node = row.into_node()?;
            node.merge_properties(patch.clone());
            let properties_json = serde_json::to_string(&node.properties)?;

            let updated = sqlx::query(
                "UPDATE nodes SET properties = ?, updated_at = ? WHERE id = ? AND properties = ?",
            )
            .bind(&properties_json)
            .bind(timestamp(&node.updated_at))
            .bind(id)
            .bind(&previous)
            .execute(&self.pool)
            .await?;

            if updated.rows_affected() == 1 {
                debug!(node_id = %id, keys = patch.len(), attempt, "Node properties updated");
                return Ok(node);
            }
        }

        Err(Error::Other(format!(
            "Node '{}' changed concurrently {} times; properties not updated",
            id, UPDATE_ATTEMPTS
        )))
    }

    async fn count_nodes(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM nodes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    // ========== Relationship Operations ==========

    async fn insert_relationship(&self, relationship: &GraphRelationship) -> Result<()> {
        check_confidence(relationship.confidence, "relationship")?;
        let properties_json = serde_json::to_string(&relationship.properties)?;

        // Endpoint check and insert in one statement
        let inserted = sqlx::query(
            r#"
            INSERT INTO relationships (
                id, source_id, target_id, relationship_type,
                properties, confidence, created_at
            )
            SELECT ?, ?, ?, ?, ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM nodes WHERE id = ?)
              AND EXISTS (SELECT 1 FROM nodes WHERE id = ?)
            "#,
        )
        .bind(&relationship.id)
        .bind(&relationship.source_id)
        .bind(&relationship.target_id)
        .bind(relationship.relationship_type.as_str())
        .bind(&properties_json)
        .bind(relationship.confidence)
        .bind(timestamp(&relationship.created_at))
        .bind(&relationship.source_id)
        .bind(&relationship.target_id)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            // Nodes are never deleted, so whichever endpoint is absent now was absent then
            let missing = if node_exists(&self.pool, &relationship.source_id).await? {
                &relationship.target_id
            } else {
                &relationship.source_id
            };
            return Err(Error::ReferenceError(missing.clone()));
        }

        debug!(
            relationship_id = %relationship.id,
            source = %relationship.source_id,
            target = %relationship.target_id,
            relationship_type = %relationship.relationship_type,
            "Relationship inserted"
        );
        Ok(())
    }

    async fn get_relationship(&self, id: &str) -> Result<Option<GraphRelationship>> {
        let row: Option<RelationshipRow> =
            sqlx::query_as("SELECT * FROM relationships WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.into_relationship()).transpose()
    }

    async fn list_outgoing(
        &self,
        node_id: &str,
        relationship_type: Option<&RelationshipType>,
    ) -> Result<Vec<GraphRelationship>> {
        let rows: Vec<RelationshipRow> = match relationship_type {
            Some(t) => {
                sqlx::query_as(
                    "SELECT * FROM relationships WHERE source_id = ? AND relationship_type = ? ORDER BY created_at, id",
                )
                .bind(node_id)
                .bind(t.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM relationships WHERE source_id = ? ORDER BY created_at, id",
                )
                .bind(node_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(|r| r.into_relationship()).collect()
    }

    async fn list_incoming(
        &self,
        node_id: &str,
        relationship_type: Option<&RelationshipType>,
    ) -> Result<Vec<GraphRelationship>> {
        let rows: Vec<RelationshipRow> = match relationship_type {
            Some(t) => {
                sqlx::query_as(
                    "SELECT * FROM relationships WHERE target_id = ? AND relationship_type = ? ORDER BY created_at, id",
                )
                .bind(node_id)
                .bind(t.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT * FROM relationships WHERE target_id = ? ORDER BY created_at, id",
                )
                .bind(node_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(|r| r.into_relationship()).collect()
    }

    async fn count_relationships(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM relationships")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    // ========== Traversal Operations ==========

    async fn informing_insights(&self, decision_id: &str) -> Result<Vec<GraphNode>> {
        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT n.* FROM relationships r
            JOIN nodes n ON n.id = r.target_id
            WHERE r.source_id = ?
              AND r.relationship_type = 'WAS_INFORMED_BY'
              AND n.node_type = 'Insight'
            ORDER BY n.created_at, n.id
            "#,
        )
        .bind(decision_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn files_behind_decision(&self, decision_id: &str) -> Result<Vec<GraphNode>> {
        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT f.* FROM relationships into_decision
            JOIN relationships from_file ON from_file.target_id = into_decision.source_id
            JOIN nodes f ON f.id = from_file.source_id
            WHERE into_decision.target_id = ?
              AND into_decision.relationship_type = 'RESULTS_FROM'
              AND f.node_type = 'File'
            ORDER BY f.created_at, f.id
            "#,
        )
        .bind(decision_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn session_insights(&self, session_id: &str) -> Result<Vec<GraphNode>> {
        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT i.* FROM nodes s
            JOIN relationships r
              ON r.target_id = s.id AND r.relationship_type = 'WAS_DISCUSSED_IN'
            JOIN nodes i
              ON i.id = r.source_id AND i.node_type = 'Insight'
            WHERE s.node_type = 'Session'
              AND json_extract(s.properties, '$.session_id') = ?
            ORDER BY i.created_at, i.id
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn decisions_informed_by(&self, insight_id: &str) -> Result<Vec<GraphNode>> {
        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT n.* FROM relationships r
            JOIN nodes n ON n.id = r.source_id
            WHERE r.target_id = ?
              AND r.relationship_type = 'WAS_INFORMED_BY'
              AND n.node_type = 'Decision'
            ORDER BY n.created_at, n.id
            "#,
        )
        .bind(insight_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn sessions_for_node(
        &self,
        node_id: &str,
        relationship_type: &RelationshipType,
    ) -> Result<Vec<GraphNode>> {
        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT n.* FROM relationships r
            JOIN nodes n ON n.id = r.target_id
            WHERE r.source_id = ?
              AND r.relationship_type = ?
              AND n.node_type = 'Session'
            ORDER BY n.created_at, n.id
            "#,
        )
        .bind(node_id)
        .bind(relationship_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn files_by_path(&self, file_path: &str) -> Result<Vec<GraphNode>> {
        let rows: Vec<NodeRow> = sqlx::query_as(
            r#"
            SELECT * FROM nodes
            WHERE node_type = 'File'
              AND json_extract(properties, '$.file_path') = ?
            ORDER BY created_at, id
            "#,
        )
        .bind(file_path)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_node()).collect()
    }

    async fn graph_analytics(&self, top_n: usize) -> Result<GraphAnalytics> {
        let mut tx = self.pool.begin().await?;

        let nodes_by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT node_type, COUNT(*) FROM nodes GROUP BY node_type ORDER BY node_type",
        )
        .fetch_all(&mut *tx)
        .await?;

        let relationships_by_type: Vec<(String, i64)> = sqlx::query_as(
            "SELECT relationship_type, COUNT(*) FROM relationships GROUP BY relationship_type ORDER BY relationship_type",
        )
        .fetch_all(&mut *tx)
        .await?;

        let connected: Vec<ConnectedRow> = sqlx::query_as(
            r#"
            WITH ends AS (
                SELECT source_id AS node_id FROM relationships
                UNION ALL
                -- a self-loop counts once
                SELECT target_id AS node_id FROM relationships WHERE target_id <> source_id
            ),
            degrees AS (
                SELECT node_id, COUNT(*) AS degree FROM ends GROUP BY node_id
            )
            SELECT n.id AS id, n.title AS title, n.node_type AS node_type,
                   COALESCE(d.degree, 0) AS degree
            FROM nodes n
            LEFT JOIN degrees d ON d.node_id = n.id
            ORDER BY degree DESC, n.created_at, n.id
            LIMIT ?
            "#,
        )
        .bind(top_n as i64)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let nodes_by_type: std::collections::BTreeMap<String, u64> = nodes_by_type
            .into_iter()
            .map(|(t, c)| (t, c as u64))
            .collect();
        let relationships_by_type: std::collections::BTreeMap<String, u64> =
            relationships_by_type
                .into_iter()
                .map(|(t, c)| (t, c as u64))
                .collect();

        let most_connected = connected
            .into_iter()
            .map(|r| r.into_connected())
            .collect::<Result<Vec<_>>>()?;

        Ok(GraphAnalytics {
            total_nodes: nodes_by_type.values().sum(),
            total_relationships: relationships_by_type.values().sum(),
            nodes_by_type,
            relationships_by_type,
            most_connected,
        })
    }

    // ========== Metrics Log ==========

    async fn record_metrics(&self, samples: &[MetricSample]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for sample in samples {
            let metadata = sample
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            sqlx::query(
                r#"
                INSERT INTO graph_analytics (metric_name, metric_value, metadata, calculated_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&sample.metric_name)
            .bind(sample.metric_value)
            .bind(&metadata)
            .bind(timestamp(&sample.calculated_at))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(samples = samples.len(), "Metrics recorded");
        Ok(())
    }

    async fn metric_history(&self, metric_name: &str, limit: usize) -> Result<Vec<MetricSample>> {
        let rows: Vec<MetricRow> = sqlx::query_as(
            r#"
            SELECT metric_name, metric_value, metadata, calculated_at
            FROM graph_analytics
            WHERE metric_name = ?
            ORDER BY calculated_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(metric_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_sample()).collect()
    }
}

// ========== Row Types ==========

#[derive(Debug, FromRow)]
struct NodeRow {
    id: String,
    node_type: String,
    title: String,
    content: String,
    properties: String,
    conversation_id: Option<String>,
    file_path: Option<String>,
    confidence: f32,
    created_at: String,
    updated_at: String,
}

impl NodeRow {
    fn into_node(self) -> Result<GraphNode> {
        let node_type = NodeType::parse(&self.node_type)
            .ok_or_else(|| Error::Other(format!("Invalid node type: {}", self.node_type)))?;
        let properties: Properties = serde_json::from_str(&self.properties)?;

        Ok(GraphNode {
            id: self.id,
            node_type,
            title: self.title,
            content: self.content,
            properties,
            provenance: Provenance::new(self.conversation_id, self.file_path),
            confidence: self.confidence,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct RelationshipRow {
    id: String,
    source_id: String,
    target_id: String,
    relationship_type: String,
    properties: String,
    confidence: f32,
    created_at: String,
}

impl RelationshipRow {
    fn into_relationship(self) -> Result<GraphRelationship> {
        let properties: Properties = serde_json::from_str(&self.properties)?;

        Ok(GraphRelationship {
            id: self.id,
            source_id: self.source_id,
            target_id: self.target_id,
            relationship_type: RelationshipType::parse(&self.relationship_type),
            properties,
            confidence: self.confidence,
            created_at: parse_timestamp(&self.created_at),
        })
    }
}

#[derive(Debug, FromRow)]
struct ConnectedRow {
    id: String,
    title: String,
    node_type: String,
    degree: i64,
}

impl ConnectedRow {
    fn into_connected(self) -> Result<ConnectedNode> {
        let node_type = NodeType::parse(&self.node_type)
            .ok_or_else(|| Error::Other(format!("Invalid node type: {}", self.node_type)))?;

        Ok(ConnectedNode {
            id: self.id,
            title: self.title,
            node_type,
            degree: self.degree as u64,
        })
    }
}

#[derive(Debug, FromRow)]
struct MetricRow {
    metric_name: String,
    metric_value: f64,
    metadata: Option<String>,
    calculated_at: String,
}

impl MetricRow {
    fn into_sample(self) -> Result<MetricSample> {
        let metadata = self
            .metadata
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(MetricSample {
            metric_name: self.metric_name,
            metric_value: self.metric_value,
            metadata,
            calculated_at: parse_timestamp(&self.calculated_at),
        })
    }
}
