//! Default relationship topology for one conversation batch
//!
//! Planning is pure: the builder only decides which edges to create. The
//! engine writes them through the store afterwards.

use serde::{Deserialize, Serialize};

use super::extractor::FactCategory;
use super::relationship::{GraphRelationship, RelationshipType};

/// Node ids created while processing one conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationBatch {
    /// Session node, when the conversation belongs to a session
    pub session: Option<String>,
    /// File node for the file the conversation was about
    pub context_file: Option<String>,
    pub insights: Vec<String>,
    pub decisions: Vec<String>,
    pub action_items: Vec<String>,
    pub tests: Vec<String>,
    pub agents: Vec<String>,
    pub file_references: Vec<String>,
}

impl ConversationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_node_id: impl Into<String>) -> Self {
        self.session = Some(session_node_id.into());
        self
    }

    pub fn with_context_file(mut self, file_node_id: impl Into<String>) -> Self {
        self.context_file = Some(file_node_id.into());
        self
    }

    /// Record a node created for an extracted candidate
    pub fn push(&mut self, category: FactCategory, node_id: impl Into<String>) {
        let node_id = node_id.into();
        match category {
            FactCategory::Insight => self.insights.push(node_id),
            FactCategory::Decision => self.decisions.push(node_id),
            FactCategory::ActionItem => self.action_items.push(node_id),
            FactCategory::Test => self.tests.push(node_id),
            FactCategory::Agent => self.agents.push(node_id),
            FactCategory::FileReference => self.file_references.push(node_id),
        }
    }

    /// Total number of node ids in the batch
    pub fn node_count(&self) -> usize {
        usize::from(self.session.is_some())
            + usize::from(self.context_file.is_some())
            + self.insights.len()
            + self.decisions.len()
            + self.action_items.len()
            + self.tests.len()
            + self.agents.len()
            + self.file_references.len()
    }
}

/// Derives the default edges between the nodes of a batch
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationshipBuilder;

impl RelationshipBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Plan the default relationships for a batch
    ///
    /// Session edges exist only when the batch has a session node. Agent and
    /// file-reference nodes get no default edges.
    pub fn plan(&self, batch: &ConversationBatch) -> Vec<GraphRelationship> {
        let mut edges = Vec::new();

        if let Some(session) = &batch.session {
            for insight in &batch.insights {
                edges.push(GraphRelationship::new(
                    insight,
                    session,
                    RelationshipType::WasDiscussedIn,
                ));
            }
            for test in &batch.tests {
                edges.push(GraphRelationship::new(
                    test,
                    session,
                    RelationshipType::WasDesignedIn,
                ));
            }
        }

        for decision in &batch.decisions {
            for insight in &batch.insights {
                edges.push(GraphRelationship::new(
                    decision,
                    insight,
                    RelationshipType::WasInformedBy,
                ));
            }
        }

        for action in &batch.action_items {
            for decision in &batch.decisions {
                edges.push(GraphRelationship::new(
                    action,
                    decision,
                    RelationshipType::ResultsFrom,
                ));
            }
        }

        if let (Some(file), Some(session)) = (&batch.context_file, &batch.session) {
            edges.push(GraphRelationship::new(
                file,
                session,
                RelationshipType::WasModifiedDuring,
            ));
        }

        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(edges: &[GraphRelationship], t: RelationshipType) -> usize {
        edges.iter().filter(|e| e.is(&t)).count()
    }

    #[test]
    fn test_cross_product_of_insights_and_decisions() {
        let mut batch = ConversationBatch::new();
        batch.push(FactCategory::Insight, "i1");
        batch.push(FactCategory::Insight, "i2");
        batch.push(FactCategory::Decision, "d1");
        batch.push(FactCategory::Decision, "d2");

        let edges = RelationshipBuilder::new().plan(&batch);

        assert_eq!(count(&edges, RelationshipType::WasInformedBy), 4);
        assert_eq!(edges.len(), 4);
        assert!(edges.iter().all(|e| e.confidence == 0.7));
        assert!(edges
            .iter()
            .any(|e| e.source_id == "d2" && e.target_id == "i1"));
    }

    #[test]
    fn test_session_edges_require_session() {
        let mut batch = ConversationBatch::new().with_context_file("f1");
        batch.push(FactCategory::Insight, "i1");
        batch.push(FactCategory::Test, "t1");

        let edges = RelationshipBuilder::new().plan(&batch);
        assert!(edges.is_empty());

        let batch = batch.with_session("s1");
        let edges = RelationshipBuilder::new().plan(&batch);

        assert_eq!(count(&edges, RelationshipType::WasDiscussedIn), 1);
        assert_eq!(count(&edges, RelationshipType::WasDesignedIn), 1);
        assert_eq!(count(&edges, RelationshipType::WasModifiedDuring), 1);

        let modified = edges
            .iter()
            .find(|e| e.is(&RelationshipType::WasModifiedDuring))
            .unwrap();
        assert_eq!(modified.source_id, "f1");
        assert_eq!(modified.target_id, "s1");
        assert_eq!(modified.confidence, 0.9);
    }

    #[test]
    fn test_actions_result_from_every_decision() {
        let mut batch = ConversationBatch::new();
        batch.push(FactCategory::Decision, "d1");
        batch.push(FactCategory::Decision, "d2");
        batch.push(FactCategory::ActionItem, "a1");

        let edges = RelationshipBuilder::new().plan(&batch);
        assert_eq!(count(&edges, RelationshipType::ResultsFrom), 2);
        assert!(edges
            .iter()
            .all(|e| e.source_id == "a1" && e.confidence == 0.6));
    }

    #[test]
    fn test_agents_and_file_references_are_unlinked() {
        let mut batch = ConversationBatch::new().with_session("s1");
        batch.push(FactCategory::Agent, "g1");
        batch.push(FactCategory::FileReference, "f2");

        let edges = RelationshipBuilder::new().plan(&batch);
        assert!(edges.is_empty());
        assert_eq!(batch.node_count(), 3);
    }
}
