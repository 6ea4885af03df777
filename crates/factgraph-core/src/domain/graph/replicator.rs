//! Best-effort mirroring to a secondary graph backend
//!
//! The local store is authoritative. A sink only ever sees records that were
//! already committed locally, and its failures never reach the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;

use super::node::GraphNode;
use super::relationship::GraphRelationship;

/// A graph backend that can mirror committed records
#[async_trait]
pub trait GraphSink: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Mirror a node, reusing its primary id
    async fn mirror_node(&self, node: &GraphNode) -> Result<()>;

    /// Mirror a relationship between two already-mirrored nodes
    async fn mirror_relationship(&self, relationship: &GraphRelationship) -> Result<()>;
}

/// Sink that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl GraphSink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    async fn mirror_node(&self, _node: &GraphNode) -> Result<()> {
        Ok(())
    }

    async fn mirror_relationship(&self, _relationship: &GraphRelationship) -> Result<()> {
        Ok(())
    }
}

/// Forwards committed writes to a sink, swallowing its errors
#[derive(Clone)]
pub struct Replicator {
    sink: Arc<dyn GraphSink>,
    failures: Arc<AtomicU64>,
}

impl Default for Replicator {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("sink", &self.sink.name())
            .field("failures", &self.failure_count())
            .finish()
    }
}

impl Replicator {
    pub fn new(sink: Arc<dyn GraphSink>) -> Self {
        Self {
            sink,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replicator backed by [`NoopSink`]
    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopSink))
    }

    pub fn backend(&self) -> &str {
        self.sink.name()
    }

    /// Number of mirror writes that failed since creation
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub async fn replicate_node(&self, node: &GraphNode) {
        match self.sink.mirror_node(node).await {
            Ok(()) => debug!(backend = self.sink.name(), node_id = %node.id, "Node mirrored"),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    backend = self.sink.name(),
                    node_id = %node.id,
                    error = %e,
                    "Failed to mirror node; local copy is authoritative"
                );
            }
        }
    }

    pub async fn replicate_relationship(&self, relationship: &GraphRelationship) {
        match self.sink.mirror_relationship(relationship).await {
            Ok(()) => debug!(
                backend = self.sink.name(),
                relationship_id = %relationship.id,
                "Relationship mirrored"
            ),
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    backend = self.sink.name(),
                    relationship_id = %relationship.id,
                    error = %e,
                    "Failed to mirror relationship; local copy is authoritative"
                );
            }
        }
    }
}
