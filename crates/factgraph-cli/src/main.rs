//! Factgraph CLI - fact graph from conversation records

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use factgraph_core::config::Config;
use factgraph_core::domain::graph::{
    ConversationContext, ExtractionResult, FactCategory, GraphNode, GraphRelationship,
    KnowledgeGraphEngine, NodeType, Properties, QueryEngine, RelationshipType,
};
use factgraph_core::infrastructure::graph::{SqliteGraphStore, replicator_from_config};
use factgraph_core::storage::{Database, resolve_database_path};
use serde::Serialize;
use tracing::{debug, warn};

type Engine = KnowledgeGraphEngine<SqliteGraphStore>;

#[derive(Parser)]
#[command(name = "factgraph")]
#[command(author, version, about = "Typed fact graph from conversation records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database file (overrides FACTGRAPH_DB_PATH and config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract facts from a conversation and store them
    Ingest {
        /// Text file to read (stdin when omitted or "-")
        input: Option<PathBuf>,
        /// Conversation id (generated when omitted)
        #[arg(short, long)]
        conversation: Option<String>,
        /// File the conversation was about
        #[arg(short, long)]
        file_path: Option<String>,
        /// Session the conversation belongs to
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show what would be extracted without storing anything
    Extract {
        /// Text file to read (stdin when omitted or "-")
        input: Option<PathBuf>,
    },

    /// Inspect and annotate nodes
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },

    /// Create a relationship between two nodes
    Link {
        /// Source node ID
        source: String,
        /// Target node ID
        target: String,
        /// Relationship type (e.g. WAS_INFORMED_BY or a custom type)
        relationship_type: String,
        /// Confidence (defaults to the type's default)
        #[arg(long)]
        confidence: Option<f32>,
    },

    /// Show the insights and files behind a decision
    Trace {
        /// Decision node ID
        decision_id: String,
    },

    /// List insights discussed in a session
    Session {
        /// Session ID
        session_id: String,
    },

    /// Show sessions a file was modified during
    Files {
        /// File path as recorded at ingest
        path: String,
    },

    /// Show the decisions and sessions around an insight
    Network {
        /// Insight node ID
        insight_id: String,
    },

    /// Graph counts and most connected nodes
    Analytics {
        /// Also append the snapshot to the metrics log
        #[arg(long)]
        record: bool,
    },

    /// Show recorded values of a metric
    Metrics {
        /// Metric name (e.g. total_nodes, nodes.Insight)
        name: String,
        /// Maximum samples to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum NodeAction {
    /// Show a node and its relationships
    Show { id: String },
    /// List nodes
    List {
        /// Only nodes of this type
        #[arg(short = 't', long = "type")]
        node_type: Option<String>,
        /// Maximum nodes to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Search titles and content
    Search { query: String },
    /// Set a property on a node (value parsed as JSON, else stored as text)
    Set { id: String, key: String, value: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show configuration file path
    Path,
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so JSON output stays clean
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("factgraph=info,factgraph_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        report_error(&e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let out = Output {
        format: cli.format,
        quiet: cli.quiet,
    };
    let db_path = cli.db;

    match cli.command {
        Commands::Ingest {
            input,
            conversation,
            file_path,
            session,
        } => {
            let engine = open_engine(db_path.as_deref()).await?;
            cmd_ingest(&engine, input.as_deref(), conversation, file_path, session, out).await
        }

        Commands::Extract { input } => cmd_extract(input.as_deref(), out),

        Commands::Node { action } => {
            let engine = open_engine(db_path.as_deref()).await?;
            cmd_node(&engine, action, out).await
        }

        Commands::Link {
            source,
            target,
            relationship_type,
            confidence,
        } => {
            let engine = open_engine(db_path.as_deref()).await?;
            cmd_link(&engine, &source, &target, &relationship_type, confidence, out).await
        }

        Commands::Trace { decision_id } => {
            let engine = open_engine(db_path.as_deref()).await?;
            cmd_trace(&engine, &decision_id, out).await
        }

        Commands::Session { session_id } => {
            let engine = open_engine(db_path.as_deref()).await?;
            cmd_session(&engine, &session_id, out).await
        }

        Commands::Files { path } => {
            let engine = open_engine(db_path.as_deref()).await?;
            cmd_files(&engine, &path, out).await
        }

        Commands::Network { insight_id } => {
            let engine = open_engine(db_path.as_deref()).await?;
            cmd_network(&engine, &insight_id, out).await
        }

        Commands::Analytics { record } => {
            let engine = open_engine(db_path.as_deref()).await?;
            cmd_analytics(&engine, record, out).await
        }

        Commands::Metrics { name, limit } => {
            let engine = open_engine(db_path.as_deref()).await?;
            cmd_metrics(&engine, &name, limit, out).await
        }

        Commands::Config { action } => cmd_config(action, out),

        Commands::Doctor => cmd_doctor(db_path.as_deref(), out).await,
    }
}

/// Print an error with its code and a suggested next command when known
fn report_error(e: &anyhow::Error) {
    match e.downcast_ref::<factgraph_core::Error>() {
        Some(core) => {
            eprintln!("Error [{}]: {}", core.code(), core);
            if let Some(suggestion) = core.suggestion() {
                eprintln!("  Try: {}", suggestion);
            }
        }
        None => eprintln!("Error: {:#}", e),
    }
}

// ============================================================================
// Setup
// ============================================================================

async fn open_engine(db_path: Option<&Path>) -> anyhow::Result<Engine> {
    let config = Config::load()?;
    let path = resolve_database_path(db_path, config.storage.database_path.as_deref());
    debug!(path = %path.display(), "Opening graph database");

    let db = Database::open(&path).await?;
    let store = Arc::new(SqliteGraphStore::new(db.pool().clone()));

    let extractor = config.extraction.build_extractor()?;
    let replicator = replicator_from_config(&config.replica).await;
    let queries = QueryEngine::new(Arc::clone(&store))
        .with_top_n(config.query.top_n)
        .with_search_limit(config.query.search_limit);

    Ok(KnowledgeGraphEngine::new(store)
        .with_extractor(extractor)
        .with_replicator(replicator)
        .with_query_engine(queries))
}

fn read_input(input: Option<&Path>) -> anyhow::Result<Vec<u8>> {
    use anyhow::Context;

    match input {
        Some(path) if path != Path::new("-") => std::fs::read(path)
            .with_context(|| format!("Failed to read input file: {}", path.display())),
        _ => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Clone, Copy)]
struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    fn print_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

fn node_line(node: &GraphNode) -> String {
    format!(
        "  {} [{}] {} ({:.2})",
        node.id, node.node_type, node.title, node.confidence
    )
}

fn print_nodes(heading: &str, nodes: &[GraphNode]) {
    println!("{} ({}):", heading, nodes.len());
    for node in nodes {
        println!("{}", node_line(node));
    }
}

fn print_extraction(result: &ExtractionResult) {
    let categories = [
        (FactCategory::Insight, "Insights"),
        (FactCategory::Decision, "Decisions"),
        (FactCategory::ActionItem, "Action items"),
        (FactCategory::Test, "Tests"),
        (FactCategory::Agent, "Agents"),
        (FactCategory::FileReference, "File references"),
    ];

    for (category, label) in categories {
        let candidates = result.get(category);
        if candidates.is_empty() {
            continue;
        }
        println!("{} ({}):", label, candidates.len());
        for candidate in candidates {
            println!("  - {} ({:.1})", candidate.content, candidate.confidence);
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_ingest(
    engine: &Engine,
    input: Option<&Path>,
    conversation: Option<String>,
    file_path: Option<String>,
    session: Option<String>,
    out: Output,
) -> anyhow::Result<()> {
    let bytes = read_input(input)?;
    let text = String::from_utf8_lossy(&bytes);

    let conversation_id = conversation.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let mut context = ConversationContext::new(conversation_id);
    if let Some(path) = file_path {
        context = context.with_file_path(path);
    }
    if let Some(session_id) = session {
        context = context.with_session(session_id);
    }

    let processed = engine.process_conversation(&context, &text).await?;

    if engine.replicator().failure_count() > 0 {
        warn!(
            failures = engine.replicator().failure_count(),
            "Some writes were not mirrored to the replica"
        );
    }

    if out.json() {
        return out.print_json(&processed);
    }
    if out.quiet {
        println!("{}", processed.conversation_id);
        return Ok(());
    }

    let nodes = &processed.nodes;
    println!("Ingested conversation {}", processed.conversation_id);
    println!("  Nodes: {}", processed.node_count());
    println!("  Relationships: {}", processed.relationships.len());
    println!("  Insights: {}", nodes.insights.len());
    println!("  Decisions: {}", nodes.decisions.len());
    println!("  Action items: {}", nodes.action_items.len());
    println!("  Tests: {}", nodes.tests.len());
    println!("  Agents: {}", nodes.agents.len());
    println!("  File references: {}", nodes.file_references.len());
    if let Some(id) = &nodes.session {
        println!("  Session node: {}", id);
    }
    if let Some(id) = &nodes.context_file {
        println!("  File node: {}", id);
    }
    Ok(())
}

fn cmd_extract(input: Option<&Path>, out: Output) -> anyhow::Result<()> {
    let config = Config::load()?;
    let extractor = config.extraction.build_extractor()?;
    let result = extractor.extract_bytes(&read_input(input)?);

    if out.json() {
        return out.print_json(&result);
    }
    if result.is_empty() {
        if !out.quiet {
            println!("No facts found.");
        }
        return Ok(());
    }
    print_extraction(&result);
    Ok(())
}

async fn cmd_node(engine: &Engine, action: NodeAction, out: Output) -> anyhow::Result<()> {
    match action {
        NodeAction::Show { id } => {
            let node = engine.require_node(&id).await?;
            let outgoing = engine.relationships_from(&id, None).await?;
            let incoming = engine.relationships_to(&id, None).await?;

            if out.json() {
                return out.print_json(&serde_json::json!({
                    "node": node,
                    "outgoing": outgoing,
                    "incoming": incoming,
                }));
            }

            println!("{}: {}", node.node_type, node.title);
            println!("  ID: {}", node.id);
            println!("  Confidence: {:.2}", node.confidence);
            println!("  Content: {}", node.content);
            if let Some(conversation) = &node.provenance.conversation_id {
                println!("  Conversation: {}", conversation);
            }
            if let Some(path) = &node.provenance.file_path {
                println!("  Source file: {}", path);
            }
            if !node.properties.is_empty() {
                println!("  Properties: {}", serde_json::Value::Object(node.properties.clone()));
            }
            println!("  Created: {}", node.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!("  Updated: {}", node.updated_at.format("%Y-%m-%d %H:%M:%S"));

            if !out.quiet {
                for rel in &outgoing {
                    println!("  -> {} {} ({:.2})", rel.relationship_type, rel.target_id, rel.confidence);
                }
                for rel in &incoming {
                    println!("  <- {} {} ({:.2})", rel.relationship_type, rel.source_id, rel.confidence);
                }
            }
        }

        NodeAction::List { node_type, limit } => {
            let node_type = match node_type {
                Some(t) => Some(NodeType::parse(&t).ok_or_else(|| {
                    factgraph_core::Error::InvalidInput(format!(
                        "unknown node type '{}'; expected one of: {}",
                        t,
                        NodeType::all()
                            .iter()
                            .map(|t| t.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ))
                })?),
                None => None,
            };
            let nodes = engine.list_nodes(node_type, limit).await?;

            if out.json() {
                return out.print_json(&nodes);
            }
            if nodes.is_empty() {
                if !out.quiet {
                    println!("No nodes found.");
                    println!("\nAdd some with: factgraph ingest <file>");
                }
                return Ok(());
            }
            for node in &nodes {
                println!("{}", node_line(node));
            }
        }

        NodeAction::Search { query } => {
            let nodes = engine.search(&query).await?;
            if out.json() {
                return out.print_json(&nodes);
            }
            if nodes.is_empty() {
                if !out.quiet {
                    println!("No nodes match '{}'.", query);
                }
                return Ok(());
            }
            for node in &nodes {
                println!("{}", node_line(node));
            }
        }

        NodeAction::Set { id, key, value } => {
            let value = serde_json::from_str(&value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            let mut patch = Properties::new();
            patch.insert(key.clone(), value);

            let node = engine.update_node_properties(&id, &patch).await?;
            if out.json() {
                return out.print_json(&node);
            }
            if !out.quiet {
                println!("Set {}.{} on node {}", node.node_type, key, node.id);
            }
        }
    }
    Ok(())
}

async fn cmd_link(
    engine: &Engine,
    source: &str,
    target: &str,
    relationship_type: &str,
    confidence: Option<f32>,
    out: Output,
) -> anyhow::Result<()> {
    let mut relationship =
        GraphRelationship::new(source, target, RelationshipType::parse(relationship_type));
    if let Some(confidence) = confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(factgraph_core::Error::InvalidInput(format!(
                "confidence {} is outside 0.0-1.0",
                confidence
            ))
            .into());
        }
        relationship = relationship.with_confidence(confidence);
    }

    let id = engine.create_relationship(relationship).await?;

    if out.json() {
        return out.print_json(&serde_json::json!({ "id": id }));
    }
    if out.quiet {
        println!("{}", id);
    } else {
        println!("Linked {} -[{}]-> {}", source, relationship_type, target);
        println!("  ID: {}", id);
    }
    Ok(())
}

async fn cmd_trace(engine: &Engine, decision_id: &str, out: Output) -> anyhow::Result<()> {
    let trace = engine.decision_trace(decision_id).await?;

    if out.json() {
        return out.print_json(&trace);
    }
    let Some(trace) = trace else {
        return Err(anyhow::anyhow!(
            "Decision '{}' not found. Run `factgraph node list --type decision` to see decisions.",
            decision_id
        ));
    };

    println!("Decision: {}", trace.decision.content);
    print_nodes("Informed by insights", &trace.insights);
    print_nodes("Related files", &trace.files);
    Ok(())
}

async fn cmd_session(engine: &Engine, session_id: &str, out: Output) -> anyhow::Result<()> {
    let insights = engine.session_insights(session_id).await?;

    if out.json() {
        return out.print_json(&insights);
    }
    if insights.is_empty() {
        if !out.quiet {
            println!("No insights recorded for session {}.", session_id);
        }
        return Ok(());
    }
    print_nodes(&format!("Insights in session {}", session_id), &insights);
    Ok(())
}

async fn cmd_files(engine: &Engine, path: &str, out: Output) -> anyhow::Result<()> {
    let modifications = engine.file_modifications(path).await?;

    if out.json() {
        return out.print_json(&modifications);
    }
    if modifications.is_empty() {
        if !out.quiet {
            println!("No records for {}.", path);
        }
        return Ok(());
    }
    for modification in &modifications {
        println!("{}", node_line(&modification.file));
        for session in &modification.sessions {
            println!("    modified during {}", session.title);
        }
    }
    Ok(())
}

async fn cmd_network(engine: &Engine, insight_id: &str, out: Output) -> anyhow::Result<()> {
    let network = engine.insight_network(insight_id).await?;

    if out.json() {
        return out.print_json(&network);
    }
    let Some(network) = network else {
        return Err(anyhow::anyhow!(
            "Insight '{}' not found. Run `factgraph node list --type insight` to see insights.",
            insight_id
        ));
    };

    println!("Insight: {}", network.insight.content);
    print_nodes("Informed decisions", &network.decisions);
    print_nodes("Discussed in sessions", &network.sessions);
    Ok(())
}

async fn cmd_analytics(engine: &Engine, record: bool, out: Output) -> anyhow::Result<()> {
    let analytics = if record {
        engine.record_analytics().await?
    } else {
        engine.analytics().await?
    };

    if out.json() {
        return out.print_json(&analytics);
    }

    println!("Nodes: {}", analytics.total_nodes);
    for (node_type, count) in &analytics.nodes_by_type {
        println!("  {}: {}", node_type, count);
    }
    println!("Relationships: {}", analytics.total_relationships);
    for (rel_type, count) in &analytics.relationships_by_type {
        println!("  {}: {}", rel_type, count);
    }
    if !out.quiet && !analytics.most_connected.is_empty() {
        println!("Most connected:");
        for node in &analytics.most_connected {
            println!("  {} [{}] {} - {} edges", node.id, node.node_type, node.title, node.degree);
        }
    }
    if record && !out.quiet {
        println!("\nSnapshot recorded.");
    }
    Ok(())
}

async fn cmd_metrics(engine: &Engine, name: &str, limit: usize, out: Output) -> anyhow::Result<()> {
    let samples = engine.metric_history(name, limit).await?;

    if out.json() {
        return out.print_json(&samples);
    }
    if samples.is_empty() {
        if !out.quiet {
            println!("No samples for {}.", name);
            println!("\nRecord one with: factgraph analytics --record");
        }
        return Ok(());
    }
    for sample in &samples {
        println!(
            "  {}  {}",
            sample.calculated_at.format("%Y-%m-%d %H:%M:%S"),
            sample.metric_value
        );
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, out: Output) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !out.quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            if out.json() {
                let map: serde_json::Map<String, serde_json::Value> = items
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                return out.print_json(&map);
            }
            for (key, value) in items {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !out.quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(db_path: Option<&Path>, out: Output) -> anyhow::Result<()> {
    if !out.quiet {
        println!("Factgraph Health Check");
        println!("======================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if !out.quiet {
                println!("[OK] Configuration: Valid");
            }
            config
        }
        Err(e) => {
            all_ok = false;
            if !out.quiet {
                println!("[!!] Configuration: Error - {:#}", e);
            }
            Config::default()
        }
    };

    let path = resolve_database_path(db_path, config.storage.database_path.as_deref());
    match Database::open(&path).await {
        Ok(db) => {
            let status = db.migration_status().await?;
            db.health_check().await?;
            if !out.quiet {
                println!("[OK] Database: {}", path.display());
                println!(
                    "[OK] Schema: v{} (latest v{})",
                    status.current_version, status.target_version
                );
            }
            if !db.foreign_keys_enabled().await? {
                all_ok = false;
                if !out.quiet {
                    println!("[!!] Foreign keys: Disabled");
                }
            }
        }
        Err(e) => {
            all_ok = false;
            if !out.quiet {
                println!("[!!] Database: {} - {:#}", path.display(), e);
            }
        }
    }

    if config.replica.enabled {
        let replicator = replicator_from_config(&config.replica).await;
        if replicator.backend() == "noop" {
            all_ok = false;
            if !out.quiet {
                println!("[!!] Replica: Unreachable at {}", config.replica.uri);
            }
        } else if !out.quiet {
            println!("[OK] Replica: {} ({})", config.replica.uri, replicator.backend());
        }
    } else if !out.quiet {
        println!("[--] Replica: Disabled");
    }

    if !out.quiet {
        println!();
        if all_ok {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    if all_ok {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Health check failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "factgraph", "trace", "abc", "--db", "/tmp/g.db", "--format", "json",
        ])
        .unwrap();

        assert_eq!(cli.db, Some(PathBuf::from("/tmp/g.db")));
        assert!(cli.format == OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Trace { ref decision_id } if decision_id == "abc"));
    }

    #[test]
    fn test_ingest_arguments() {
        let cli = Cli::try_parse_from([
            "factgraph", "ingest", "notes.txt", "--session", "s-1", "--file-path", "src/a.py",
        ])
        .unwrap();

        match cli.command {
            Commands::Ingest {
                input,
                session,
                file_path,
                conversation,
            } => {
                assert_eq!(input, Some(PathBuf::from("notes.txt")));
                assert_eq!(session.as_deref(), Some("s-1"));
                assert_eq!(file_path.as_deref(), Some("src/a.py"));
                assert!(conversation.is_none());
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_node_list_type_flag() {
        let cli = Cli::try_parse_from(["factgraph", "node", "list", "--type", "insight"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Node {
                action: NodeAction::List { node_type: Some(ref t), limit: 50 }
            } if t == "insight"
        ));
    }
}
