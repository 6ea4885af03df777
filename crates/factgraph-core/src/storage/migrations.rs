//! Database migrations
//!
//! This module manages SQLite schema migrations for factgraph.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

use crate::domain::graph::GraphNode;

/// Current schema version
pub const CURRENT_VERSION: i32 = 3;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Graph tables
const MIGRATION_V1: &str = r#"
    -- Nodes are append-only; only properties and updated_at change
    CREATE TABLE IF NOT EXISTS nodes (
        id TEXT PRIMARY KEY NOT NULL,
        node_type TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        properties TEXT NOT NULL DEFAULT '{}',
        conversation_id TEXT,
        file_path TEXT,
        confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    -- Relationships are immutable; duplicates of the same type are allowed
    CREATE TABLE IF NOT EXISTS relationships (
        id TEXT PRIMARY KEY NOT NULL,
        source_id TEXT NOT NULL REFERENCES nodes(id),
        target_id TEXT NOT NULL REFERENCES nodes(id),
        relationship_type TEXT NOT NULL CHECK (length(relationship_type) > 0),
        properties TEXT NOT NULL DEFAULT '{}',
        confidence REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
        created_at TEXT NOT NULL
    );

    -- Append-only log of analytics snapshots
    CREATE TABLE IF NOT EXISTS graph_analytics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        metric_name TEXT NOT NULL,
        metric_value REAL NOT NULL,
        metadata TEXT,
        calculated_at TEXT NOT NULL
    );
"#;

/// Migration 2: Traversal indexes
const MIGRATION_V2: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(node_type);
    CREATE INDEX IF NOT EXISTS idx_nodes_conversation ON nodes(conversation_id);
    CREATE INDEX IF NOT EXISTS idx_nodes_created_at ON nodes(created_at);
    CREATE INDEX IF NOT EXISTS idx_nodes_session_key
        ON nodes(json_extract(properties, '$.session_id'));
    CREATE INDEX IF NOT EXISTS idx_nodes_file_path_key
        ON nodes(json_extract(properties, '$.file_path'));

    CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_id, relationship_type);
    CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id, relationship_type);
    CREATE INDEX IF NOT EXISTS idx_relationships_type ON relationships(relationship_type);

    CREATE INDEX IF NOT EXISTS idx_graph_analytics_metric
        ON graph_analytics(metric_name, calculated_at);
"#;

/// Migration 3: Case-folded search column, filled by the store on insert
const MIGRATION_V3: &str = r#"
    ALTER TABLE nodes ADD COLUMN search_text TEXT NOT NULL DEFAULT '';
"#;

/// Fill `search_text` for rows written before v3
async fn backfill_search_text(pool: &SqlitePool) -> anyhow::Result<()> {
    let rows: Vec<(String, String, String)> =
        sqlx::query_as("SELECT id, title, content FROM nodes WHERE search_text = ''")
            .fetch_all(pool)
            .await?;

    let mut tx = pool.begin().await?;
    for (id, title, content) in &rows {
        sqlx::query("UPDATE nodes SET search_text = ? WHERE id = ?")
            .bind(GraphNode::search_key(title, content))
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    tracing::debug!(rows = rows.len(), "Search text backfilled");
    Ok(())
}

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    // Ensure migrations table exists
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Graph tables");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Traversal indexes");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    if current_version < 3 {
        tracing::info!("Applying migration v3: Search text");
        sqlx::raw_sql(MIGRATION_V3).execute(pool).await?;
        backfill_search_text(pool).await?;
        record_migration(pool, 3).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Check if the database needs migrations
pub async fn needs_migration(pool: &SqlitePool) -> anyhow::Result<bool> {
    let current_version = get_current_version(pool).await?;
    Ok(current_version < CURRENT_VERSION)
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone, serde::Serialize)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}
