//! Fixed-pattern queries over the graph store
//!
//! Every query is read-only except [`QueryEngine::record_analytics`], which
//! appends to the metrics log. Unknown ids yield `None` or empty lists.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;

use super::node::{GraphNode, NodeType};
use super::relationship::RelationshipType;
use super::repository::{
    DecisionTrace, FileModification, GraphAnalytics, GraphStore, InsightNetwork, MetricSample,
};

/// Default number of most-connected nodes in analytics
pub const DEFAULT_TOP_N: usize = 10;

/// Default cap on search results
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Query and traversal engine
pub struct QueryEngine<S: GraphStore> {
    store: Arc<S>,
    top_n: usize,
    search_limit: usize,
}

impl<S: GraphStore> Clone for QueryEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            top_n: self.top_n,
            search_limit: self.search_limit,
        }
    }
}

impl<S: GraphStore> QueryEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            top_n: DEFAULT_TOP_N,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Set how many most-connected nodes analytics reports
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Set the maximum number of search results
    pub fn with_search_limit(mut self, search_limit: usize) -> Self {
        self.search_limit = search_limit;
        self
    }

    /// Insights and files linked to a decision
    ///
    /// Returns `None` when the id is unknown or is not a decision.
    pub async fn decision_trace(&self, decision_id: &str) -> Result<Option<DecisionTrace>> {
        let Some(decision) = self.store.get_node(decision_id).await? else {
            return Ok(None);
        };
        if decision.node_type != NodeType::Decision {
            debug!(node_id = %decision_id, node_type = %decision.node_type, "Trace requested for non-decision node");
            return Ok(None);
        }

        let insights = self.store.informing_insights(decision_id).await?;
        let files = self.store.files_behind_decision(decision_id).await?;

        debug!(
            decision_id = %decision_id,
            insights = insights.len(),
            files = files.len(),
            "Decision traced"
        );

        Ok(Some(DecisionTrace {
            decision,
            insights,
            files,
        }))
    }

    /// Insights discussed in a session
    pub async fn session_insights(&self, session_id: &str) -> Result<Vec<GraphNode>> {
        self.store.session_insights(session_id).await
    }

    /// Counts by type plus the most connected nodes
    pub async fn analytics(&self) -> Result<GraphAnalytics> {
        self.store.graph_analytics(self.top_n).await
    }

    /// Analytics, also appended to the metrics log
    pub async fn record_analytics(&self) -> Result<GraphAnalytics> {
        let analytics = self.analytics().await?;
        let samples = analytics.to_samples();
        self.store.record_metrics(&samples).await?;

        info!(
            samples = samples.len(),
            total_nodes = analytics.total_nodes,
            total_relationships = analytics.total_relationships,
            "Analytics snapshot recorded"
        );
        Ok(analytics)
    }

    /// Recorded values of one metric, newest first
    pub async fn metric_history(&self, metric_name: &str, limit: usize) -> Result<Vec<MetricSample>> {
        self.store.metric_history(metric_name, limit).await
    }

    /// File nodes for a path and the sessions each was modified during
    pub async fn file_modifications(&self, file_path: &str) -> Result<Vec<FileModification>> {
        let files = self.store.files_by_path(file_path).await?;
        let mut modifications = Vec::with_capacity(files.len());

        for file in files {
            let sessions = self
                .store
                .sessions_for_node(&file.id, &RelationshipType::WasModifiedDuring)
                .await?;
            modifications.push(FileModification { file, sessions });
        }

        Ok(modifications)
    }

    /// An insight with the decisions it informed and the sessions it was discussed in
    pub async fn insight_network(&self, insight_id: &str) -> Result<Option<InsightNetwork>> {
        let Some(insight) = self.store.get_node(insight_id).await? else {
            return Ok(None);
        };
        if insight.node_type != NodeType::Insight {
            return Ok(None);
        }

        let decisions = self.store.decisions_informed_by(insight_id).await?;
        let sessions = self
            .store
            .sessions_for_node(insight_id, &RelationshipType::WasDiscussedIn)
            .await?;

        Ok(Some(InsightNetwork {
            insight,
            decisions,
            sessions,
        }))
    }

    /// Substring search over titles and content
    pub async fn search(&self, query: &str) -> Result<Vec<GraphNode>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.store.search_nodes(query, self.search_limit).await
    }
}
