//! Fact graph domain module
//!
//! Turns free-text conversation records into a typed graph of facts and the
//! context they came from, and answers traceability questions over it.
//!
//! ## Pipeline
//!
//! ```text
//! text + ConversationContext
//!        ↓
//! PatternExtractor → FactCandidate* → GraphStore::insert_node
//!        ↓
//! RelationshipBuilder::plan → GraphStore::insert_relationship
//!        ↓
//! Replicator (best effort) → GraphSink
//! ```
//!
//! Reads go through [`QueryEngine`], which only ever touches the store.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use factgraph_core::domain::graph::{ConversationContext, KnowledgeGraphEngine};
//!
//! let engine = KnowledgeGraphEngine::new(store);
//! let ctx = ConversationContext::new("conv-42").with_session("s-1");
//! let processed = engine
//!     .process_conversation(&ctx, "Key insight: X\nDecision: Y")
//!     .await?;
//!
//! for decision in &processed.nodes.decisions {
//!     let trace = engine.decision_trace(decision).await?;
//! }
//! ```

mod builder;
mod extractor;
mod node;
mod query;
mod relationship;
mod replicator;
mod repository;
mod service;

pub use builder::{ConversationBatch, RelationshipBuilder};
pub use extractor::{
    ExtractionResult, ExtractionRule, FactCandidate, FactCategory, PatternExtractor,
};
pub use node::{GraphNode, NodeType, Properties, Provenance};
pub use query::{DEFAULT_SEARCH_LIMIT, DEFAULT_TOP_N, QueryEngine};
pub use relationship::{GraphRelationship, RelationshipType};
pub use replicator::{GraphSink, NoopSink, Replicator};
pub use repository::{
    ConnectedNode, DecisionTrace, FileModification, GraphAnalytics, GraphStore, InsightNetwork,
    MetricSample,
};
pub use service::{ConversationContext, KnowledgeGraphEngine, ProcessedConversation};
