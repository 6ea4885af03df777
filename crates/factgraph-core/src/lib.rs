//! Factgraph Core Library
//!
//! This crate turns free-text conversation records into a typed fact graph:
//! - Pattern-based fact extraction (insights, decisions, action items, tests, agents, files)
//! - Append-only graph storage (SQLite)
//! - Default relationship building per conversation
//! - Best-effort replication to Neo4j
//! - Decision traces, session lookups and graph analytics
//! - TOML configuration

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod storage;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::graph::{
        ConversationContext, DecisionTrace, ExtractionResult, FactCategory, GraphAnalytics,
        GraphNode, GraphRelationship, GraphStore, KnowledgeGraphEngine, NodeType,
        PatternExtractor, ProcessedConversation, QueryEngine, RelationshipType, Replicator,
    };
    pub use crate::error::{Error, Result};
    pub use crate::infrastructure::graph::{SqliteGraphStore, replicator_from_config};
    pub use crate::storage::Database;
}
