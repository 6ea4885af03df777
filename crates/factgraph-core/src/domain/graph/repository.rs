//! Repository trait for fact graph persistence
//!
//! The store owns the canonical node and relationship records. Records are
//! append-only: the only mutation is merging node properties.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

use super::node::{GraphNode, NodeType, Properties};
use super::relationship::{GraphRelationship, RelationshipType};

/// Durable storage for the fact graph
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ========== Node Operations ==========

    /// Insert a new node; an existing id is an error, never overwritten
    async fn insert_node(&self, node: &GraphNode) -> Result<()>;

    /// Get a node by ID
    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>>;

    /// List nodes, optionally of one type, newest first
    async fn list_nodes(&self, node_type: Option<NodeType>, limit: usize) -> Result<Vec<GraphNode>>;

    /// Case-insensitive substring search over title and content
    async fn search_nodes(&self, query: &str, limit: usize) -> Result<Vec<GraphNode>>;

    /// Merge keys into a node's properties and return the updated node
    async fn update_node_properties(&self, id: &str, patch: &Properties) -> Result<GraphNode>;

    /// Count nodes
    async fn count_nodes(&self) -> Result<u64>;

    // ========== Relationship Operations ==========

    /// Insert a relationship after checking that both endpoints exist
    async fn insert_relationship(&self, relationship: &GraphRelationship) -> Result<()>;

    /// Get a relationship by ID
    async fn get_relationship(&self, id: &str) -> Result<Option<GraphRelationship>>;

    /// Relationships whose source is the given node
    async fn list_outgoing(
        &self,
        node_id: &str,
        relationship_type: Option<&RelationshipType>,
    ) -> Result<Vec<GraphRelationship>>;

    /// Relationships whose target is the given node
    async fn list_incoming(
        &self,
        node_id: &str,
        relationship_type: Option<&RelationshipType>,
    ) -> Result<Vec<GraphRelationship>>;

    /// Count relationships
    async fn count_relationships(&self) -> Result<u64>;

    // ========== Traversal Operations ==========

    /// Insights a decision was informed by (one WAS_INFORMED_BY hop)
    async fn informing_insights(&self, decision_id: &str) -> Result<Vec<GraphNode>>;

    /// File nodes linked to anything that a RESULTS_FROM edge into the decision starts from
    async fn files_behind_decision(&self, decision_id: &str) -> Result<Vec<GraphNode>>;

    /// Insights discussed in the session with the given `session_id` property
    async fn session_insights(&self, session_id: &str) -> Result<Vec<GraphNode>>;

    /// Decisions informed by an insight
    async fn decisions_informed_by(&self, insight_id: &str) -> Result<Vec<GraphNode>>;

    /// Session nodes a node points at through the given relationship type
    async fn sessions_for_node(
        &self,
        node_id: &str,
        relationship_type: &RelationshipType,
    ) -> Result<Vec<GraphNode>>;

    /// File nodes whose `file_path` property equals the path
    async fn files_by_path(&self, file_path: &str) -> Result<Vec<GraphNode>>;

    /// Aggregate counts and the most connected nodes, from one consistent snapshot
    async fn graph_analytics(&self, top_n: usize) -> Result<GraphAnalytics>;

    // ========== Metrics Log ==========

    /// Append metric samples
    async fn record_metrics(&self, samples: &[MetricSample]) -> Result<()>;

    /// Most recent samples of a metric, newest first
    async fn metric_history(&self, metric_name: &str, limit: usize) -> Result<Vec<MetricSample>>;
}

/// Insights and files behind a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub decision: GraphNode,
    pub insights: Vec<GraphNode>,
    pub files: Vec<GraphNode>,
}

/// A node ranked by total degree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedNode {
    pub id: String,
    pub title: String,
    pub node_type: NodeType,
    pub degree: u64,
}

/// Aggregate view of the graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphAnalytics {
    pub total_nodes: u64,
    pub total_relationships: u64,
    pub nodes_by_type: BTreeMap<String, u64>,
    pub relationships_by_type: BTreeMap<String, u64>,
    pub most_connected: Vec<ConnectedNode>,
}

impl GraphAnalytics {
    /// Flatten into metric samples for the metrics log
    pub fn to_samples(&self) -> Vec<MetricSample> {
        let mut samples = vec![
            MetricSample::new("total_nodes", self.total_nodes as f64),
            MetricSample::new("total_relationships", self.total_relationships as f64),
        ];
        for (node_type, count) in &self.nodes_by_type {
            samples.push(MetricSample::new(format!("nodes.{}", node_type), *count as f64));
        }
        for (rel_type, count) in &self.relationships_by_type {
            samples.push(MetricSample::new(
                format!("relationships.{}", rel_type),
                *count as f64,
            ));
        }
        samples
    }
}

/// One value in the metrics log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub metric_name: String,
    pub metric_value: f64,
    pub metadata: Option<Value>,
    pub calculated_at: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(metric_name: impl Into<String>, metric_value: f64) -> Self {
        Self {
            metric_name: metric_name.into(),
            metric_value,
            metadata: None,
            calculated_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A file node and the sessions it was modified during
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileModification {
    pub file: GraphNode,
    pub sessions: Vec<GraphNode>,
}

/// An insight with the decisions it informed and where it was discussed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightNetwork {
    pub insight: GraphNode,
    pub decisions: Vec<GraphNode>,
    pub sessions: Vec<GraphNode>,
}
