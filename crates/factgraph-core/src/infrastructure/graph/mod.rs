//! Graph persistence and replica backends

#[cfg(feature = "neo4j")]
mod neo4j;
mod repository;

#[cfg(feature = "neo4j")]
pub use neo4j::Neo4jSink;
pub use repository::SqliteGraphStore;

use tracing::warn;

use crate::config::ReplicaConfig;
use crate::domain::graph::Replicator;

/// Build the replicator selected by configuration
///
/// A disabled replica, a missing backend, or a failed connection all yield a
/// no-op replicator; the local store keeps working either way.
pub async fn replicator_from_config(config: &ReplicaConfig) -> Replicator {
    if !config.enabled {
        return Replicator::disabled();
    }

    #[cfg(feature = "neo4j")]
    {
        match Neo4jSink::from_config(config).await {
            Ok(sink) => Replicator::new(std::sync::Arc::new(sink)),
            Err(e) => {
                warn!(uri = %config.uri, error = %e, "Replica unavailable, continuing without it");
                Replicator::disabled()
            }
        }
    }

    #[cfg(not(feature = "neo4j"))]
    {
        warn!(uri = %config.uri, "Replica enabled but built without the neo4j feature");
        Replicator::disabled()
    }
}
