//! Knowledge graph engine
//!
//! Wires the extractor, store, builder, replicator and query engine together.
//! Every write goes to the store first and is mirrored only after it commits.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

use super::builder::{ConversationBatch, RelationshipBuilder};
use super::extractor::{ExtractionResult, FactCategory, PatternExtractor};
use super::node::{GraphNode, NodeType, Properties, Provenance};
use super::query::QueryEngine;
use super::relationship::{GraphRelationship, RelationshipType};
use super::replicator::Replicator;
use super::repository::{
    DecisionTrace, FileModification, GraphAnalytics, GraphStore, InsightNetwork, MetricSample,
};

/// Maximum title length for nodes built from extracted text
const TITLE_CHARS: usize = 50;

const CATEGORIES: [FactCategory; 6] = [
    FactCategory::Insight,
    FactCategory::Decision,
    FactCategory::ActionItem,
    FactCategory::Test,
    FactCategory::Agent,
    FactCategory::FileReference,
];

/// Provenance of one conversation, passed explicitly to every call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: String,
    pub file_path: Option<String>,
    pub session_id: Option<String>,
}

impl ConversationContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            file_path: None,
            session_id: None,
        }
    }

    pub fn with_file_path(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    fn provenance(&self) -> Provenance {
        Provenance::new(Some(self.conversation_id.clone()), self.file_path.clone())
    }
}

/// Ids of everything written for one conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedConversation {
    pub conversation_id: String,
    pub nodes: ConversationBatch,
    pub relationships: Vec<String>,
}

impl ProcessedConversation {
    pub fn node_count(&self) -> usize {
        self.nodes.node_count()
    }
}

/// Façade over the fact graph
pub struct KnowledgeGraphEngine<S: GraphStore> {
    store: Arc<S>,
    extractor: PatternExtractor,
    builder: RelationshipBuilder,
    replicator: Replicator,
    queries: QueryEngine<S>,
}

impl<S: GraphStore> KnowledgeGraphEngine<S> {
    /// Create an engine with built-in rules and no replica
    pub fn new(store: Arc<S>) -> Self {
        Self {
            queries: QueryEngine::new(Arc::clone(&store)),
            store,
            extractor: PatternExtractor::new(),
            builder: RelationshipBuilder::new(),
            replicator: Replicator::disabled(),
        }
    }

    pub fn with_extractor(mut self, extractor: PatternExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_replicator(mut self, replicator: Replicator) -> Self {
        self.replicator = replicator;
        self
    }

    pub fn with_query_engine(mut self, queries: QueryEngine<S>) -> Self {
        self.queries = queries;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    pub fn queries(&self) -> &QueryEngine<S> {
        &self.queries
    }

    // ========== Writes ==========

    /// Persist a node, then mirror it
    pub async fn create_node(&self, node: GraphNode) -> Result<String> {
        if !node.confidence.is_finite() || !(0.0..=1.0).contains(&node.confidence) {
            return Err(Error::InvalidInput(format!(
                "node confidence {} is outside 0.0-1.0",
                node.confidence
            )));
        }

        self.store.insert_node(&node).await?;
        self.replicator.replicate_node(&node).await;
        Ok(node.id)
    }

    /// Persist a relationship between existing nodes, then mirror it
    pub async fn create_relationship(&self, relationship: GraphRelationship) -> Result<String> {
        if !relationship.confidence.is_finite() || !(0.0..=1.0).contains(&relationship.confidence)
        {
            return Err(Error::InvalidInput(format!(
                "relationship confidence {} is outside 0.0-1.0",
                relationship.confidence
            )));
        }
        if relationship.relationship_type.as_str().trim().is_empty() {
            return Err(Error::InvalidInput("relationship type is empty".into()));
        }

        self.store.insert_relationship(&relationship).await?;
        self.replicator.replicate_relationship(&relationship).await;
        Ok(relationship.id)
    }

    /// Merge a property patch into a node
    pub async fn update_node_properties(&self, id: &str, patch: &Properties) -> Result<GraphNode> {
        let node = self.store.update_node_properties(id, patch).await?;
        self.replicator.replicate_node(&node).await;
        Ok(node)
    }

    // ========== Extraction ==========

    pub fn extract(&self, text: &str) -> ExtractionResult {
        self.extractor.extract(text)
    }

    pub fn extract_bytes(&self, bytes: &[u8]) -> ExtractionResult {
        self.extractor.extract_bytes(bytes)
    }

    /// Extract facts from a conversation and write them with their default edges
    ///
    /// Each node and edge is its own commit. A failure part-way leaves the
    /// already-written records in place.
    pub async fn process_conversation(
        &self,
        context: &ConversationContext,
        text: &str,
    ) -> Result<ProcessedConversation> {
        let extraction = self.extractor.extract(text);
        let provenance = context.provenance();
        let mut batch = ConversationBatch::new();

        if let Some(session_id) = &context.session_id {
            let node = GraphNode::new(
                NodeType::Session,
                format!("Session {}", session_id),
                format!("Session {}", session_id),
            )
            .with_property("session_id", session_id.as_str())
            .with_confidence(0.9)
            .with_provenance(provenance.clone());
            batch.session = Some(self.create_node(node).await?);
        }

        if let Some(file_path) = &context.file_path {
            let name = Path::new(file_path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_path.clone());
            let node = GraphNode::new(NodeType::File, name, file_path.as_str())
                .with_property("file_path", file_path.as_str())
                .with_confidence(1.0)
                .with_provenance(provenance.clone());
            batch.context_file = Some(self.create_node(node).await?);
        }

        for category in CATEGORIES {
            for candidate in extraction.get(category) {
                let mut node = GraphNode::new(
                    category.node_type(),
                    GraphNode::title_from(&candidate.content, TITLE_CHARS),
                    candidate.content.as_str(),
                )
                .with_property("source", category.source_tag())
                .with_property("category", category.as_str())
                .with_confidence(candidate.confidence)
                .with_provenance(provenance.clone());

                if category == FactCategory::FileReference {
                    node = node.with_property("file_path", candidate.content.as_str());
                }

                let id = self.create_node(node).await?;
                batch.push(category, id);
            }
        }

        let mut relationships = Vec::new();
        for edge in self.builder.plan(&batch) {
            relationships.push(self.create_relationship(edge).await?);
        }

        info!(
            conversation_id = %context.conversation_id,
            nodes = batch.node_count(),
            relationships = relationships.len(),
            "Conversation processed"
        );

        Ok(ProcessedConversation {
            conversation_id: context.conversation_id.clone(),
            nodes: batch,
            relationships,
        })
    }

    // ========== Reads ==========

    pub async fn get_node(&self, id: &str) -> Result<Option<GraphNode>> {
        self.store.get_node(id).await
    }

    /// Get a node or fail with `NodeNotFound`
    pub async fn require_node(&self, id: &str) -> Result<GraphNode> {
        self.store
            .get_node(id)
            .await?
            .ok_or_else(|| Error::NodeNotFound(id.to_string()))
    }

    pub async fn list_nodes(&self, node_type: Option<NodeType>, limit: usize) -> Result<Vec<GraphNode>> {
        self.store.list_nodes(node_type, limit).await
    }

    pub async fn get_relationship(&self, id: &str) -> Result<Option<GraphRelationship>> {
        self.store.get_relationship(id).await
    }

    /// Outgoing edges of a node, optionally of one type
    pub async fn relationships_from(
        &self,
        node_id: &str,
        relationship_type: Option<&RelationshipType>,
    ) -> Result<Vec<GraphRelationship>> {
        self.store.list_outgoing(node_id, relationship_type).await
    }

    /// Incoming edges of a node, optionally of one type
    pub async fn relationships_to(
        &self,
        node_id: &str,
        relationship_type: Option<&RelationshipType>,
    ) -> Result<Vec<GraphRelationship>> {
        self.store.list_incoming(node_id, relationship_type).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<GraphNode>> {
        self.queries.search(query).await
    }

    pub async fn decision_trace(&self, decision_id: &str) -> Result<Option<DecisionTrace>> {
        self.queries.decision_trace(decision_id).await
    }

    pub async fn session_insights(&self, session_id: &str) -> Result<Vec<GraphNode>> {
        self.queries.session_insights(session_id).await
    }

    pub async fn analytics(&self) -> Result<GraphAnalytics> {
        self.queries.analytics().await
    }

    pub async fn record_analytics(&self) -> Result<GraphAnalytics> {
        self.queries.record_analytics().await
    }

    pub async fn metric_history(&self, metric_name: &str, limit: usize) -> Result<Vec<MetricSample>> {
        self.queries.metric_history(metric_name, limit).await
    }

    pub async fn file_modifications(&self, file_path: &str) -> Result<Vec<FileModification>> {
        self.queries.file_modifications(file_path).await
    }

    pub async fn insight_network(&self, insight_id: &str) -> Result<Option<InsightNetwork>> {
        self.queries.insight_network(insight_id).await
    }
}

impl<S: GraphStore> std::fmt::Debug for KnowledgeGraphEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeGraphEngine")
            .field("rules", &self.extractor.rule_count())
            .field("replicator", &self.replicator)
            .finish()
    }
}
