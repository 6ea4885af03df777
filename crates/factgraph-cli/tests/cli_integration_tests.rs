//! CLI integration tests for factgraph
//!
//! Tests the factgraph CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const CONVERSATION: &str = "\
Key insight: 60-day lookback improves accuracy.
Discovered that volatility clusters by sector
Decision: use a 60-day window
TODO: update risk_calculator.py
Claude suggested adding a cache
";

/// Isolated config dir and database per test
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn db(&self) -> String {
        self.dir.path().join("graph.db").display().to_string()
    }

    #[allow(deprecated)]
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("factgraph").unwrap();
        cmd.env("FACTGRAPH_CONFIG_DIR", self.dir.path().join("config"));
        cmd.env_remove("FACTGRAPH_DB_PATH");
        cmd.env_remove("FACTGRAPH_REPLICA_PASSWORD");
        cmd.env_remove("NEO4J_PASSWORD");
        cmd.env("RUST_LOG", "off");
        cmd.args(["--db", &self.db()]);
        cmd
    }

    fn json(&self, args: &[&str], stdin: Option<&str>) -> Value {
        let mut cmd = self.cmd();
        cmd.args(args).args(["--format", "json"]);
        if let Some(input) = stdin {
            cmd.write_stdin(input);
        }
        let output = cmd.assert().success().get_output().stdout.clone();
        serde_json::from_slice(&output).expect("stdout should be JSON")
    }

    fn ingest(&self, session: &str) -> Value {
        self.json(
            &["ingest", "--session", session, "--file-path", "src/risk.py"],
            Some(CONVERSATION),
        )
    }
}

#[test]
fn test_help_command() {
    Sandbox::new()
        .cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Typed fact graph"));
}

#[test]
fn test_version_output() {
    Sandbox::new()
        .cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("factgraph"));
}

#[test]
fn test_extract_is_a_dry_run() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .arg("extract")
        .write_stdin("Key insight: X\nDecision: Y\nTODO: Z")
        .assert()
        .success()
        .stdout(predicate::str::contains("Insights (1):"))
        .stdout(predicate::str::contains("- X"))
        .stdout(predicate::str::contains("Decisions (1):"))
        .stdout(predicate::str::contains("Action items (1):"));

    assert!(!std::path::Path::new(&sandbox.db()).exists());
}

#[test]
fn test_extract_json() {
    let sandbox = Sandbox::new();
    let result = sandbox.json(&["extract"], Some("Decision: Y\nsee notes.md"));

    assert_eq!(result["decisions"][0]["content"], "Y");
    assert_eq!(result["file_references"][0]["content"], "notes.md");
    assert!(result["insights"].as_array().unwrap().is_empty());
}

#[test]
fn test_ingest_from_file() {
    let sandbox = Sandbox::new();
    let input = sandbox.dir.path().join("conversation.txt");
    std::fs::write(&input, CONVERSATION).unwrap();

    sandbox
        .cmd()
        .args(["ingest", input.to_str().unwrap(), "--conversation", "conv-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ingested conversation conv-1"))
        .stdout(predicate::str::contains("Insights: 2"))
        .stdout(predicate::str::contains("Decisions: 1"));
}

#[test]
fn test_ingest_builds_default_edges() {
    let sandbox = Sandbox::new();
    let processed = sandbox.ingest("s-1");

    let nodes = &processed["nodes"];
    assert!(nodes["session"].is_string());
    assert!(nodes["context_file"].is_string());
    assert_eq!(nodes["insights"].as_array().unwrap().len(), 2);
    assert_eq!(nodes["decisions"].as_array().unwrap().len(), 1);
    assert_eq!(nodes["action_items"].as_array().unwrap().len(), 1);
    assert_eq!(nodes["agents"].as_array().unwrap().len(), 1);

    // 2 discussed-in + 2 informed-by + 1 results-from + 1 modified-during
    assert_eq!(processed["relationships"].as_array().unwrap().len(), 6);
}

#[test]
fn test_trace_lists_informing_insights() {
    let sandbox = Sandbox::new();
    let processed = sandbox.ingest("s-1");
    let decision = processed["nodes"]["decisions"][0].as_str().unwrap().to_string();

    let trace = sandbox.json(&["trace", &decision], None);
    assert_eq!(trace["decision"]["content"], "use a 60-day window");
    assert_eq!(trace["insights"].as_array().unwrap().len(), 2);
    assert!(trace["files"].as_array().unwrap().is_empty());

    sandbox
        .cmd()
        .args(["trace", &decision])
        .assert()
        .success()
        .stdout(predicate::str::contains("Informed by insights (2):"));
}

#[test]
fn test_trace_unknown_decision_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["trace", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_session_insights_are_exact() {
    let sandbox = Sandbox::new();
    sandbox.ingest("s-1");
    sandbox.ingest("s-10");

    let insights = sandbox.json(&["session", "s-1"], None);
    assert_eq!(insights.as_array().unwrap().len(), 2);

    sandbox
        .cmd()
        .args(["session", "s-2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No insights recorded"));
}

#[test]
fn test_files_and_network() {
    let sandbox = Sandbox::new();
    let processed = sandbox.ingest("s-7");

    let files = sandbox.json(&["files", "src/risk.py"], None);
    assert_eq!(files.as_array().unwrap().len(), 1);
    assert_eq!(files[0]["sessions"][0]["title"], "Session s-7");

    let insight = processed["nodes"]["insights"][0].as_str().unwrap().to_string();
    let network = sandbox.json(&["network", &insight], None);
    assert_eq!(network["decisions"].as_array().unwrap().len(), 1);
    assert_eq!(network["sessions"].as_array().unwrap().len(), 1);
}

#[test]
fn test_link_requires_existing_nodes() {
    let sandbox = Sandbox::new();
    let processed = sandbox.ingest("s-1");
    let decision = processed["nodes"]["decisions"][0].as_str().unwrap().to_string();

    sandbox
        .cmd()
        .args(["link", &decision, "ghost", "WAS_INFORMED_BY"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E100"))
        .stderr(predicate::str::contains("ghost"));

    let insight = processed["nodes"]["insights"][0].as_str().unwrap().to_string();
    sandbox
        .cmd()
        .args(["link", &insight, &decision, "SUPPORTS", "--confidence", "0.3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Linked"));
}

#[test]
fn test_node_show_and_set() {
    let sandbox = Sandbox::new();
    let processed = sandbox.ingest("s-1");
    let file = processed["nodes"]["context_file"].as_str().unwrap().to_string();

    sandbox
        .cmd()
        .args(["node", "set", &file, "reviewed", "true"])
        .assert()
        .success();

    let shown = sandbox.json(&["node", "show", &file], None);
    assert_eq!(shown["node"]["properties"]["reviewed"], true);
    assert_eq!(shown["node"]["properties"]["file_path"], "src/risk.py");
    assert_eq!(shown["node"]["title"], "risk.py");
    assert_eq!(shown["outgoing"][0]["relationship_type"], "WAS_MODIFIED_DURING");
}

#[test]
fn test_node_show_missing() {
    Sandbox::new()
        .cmd()
        .args(["node", "show", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E001"));
}

#[test]
fn test_node_list_and_search() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["node", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No nodes found."));

    sandbox.ingest("s-1");

    let insights = sandbox.json(&["node", "list", "--type", "insight"], None);
    assert_eq!(insights.as_array().unwrap().len(), 2);

    let found = sandbox.json(&["node", "search", "VOLATILITY"], None);
    assert_eq!(found.as_array().unwrap().len(), 1);

    sandbox
        .cmd()
        .args(["node", "list", "--type", "widget"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown node type"));
}

#[test]
fn test_analytics_and_metrics() {
    let sandbox = Sandbox::new();
    sandbox.ingest("s-1");

    let analytics = sandbox.json(&["analytics", "--record"], None);
    let total_nodes = analytics["total_nodes"].as_u64().unwrap();
    let by_type: u64 = analytics["nodes_by_type"]
        .as_object()
        .unwrap()
        .values()
        .map(|v| v.as_u64().unwrap())
        .sum();
    assert_eq!(total_nodes, by_type);
    assert_eq!(analytics["total_relationships"], 6);

    let samples = sandbox.json(&["metrics", "total_nodes"], None);
    assert_eq!(samples[0]["metric_value"].as_f64().unwrap(), total_nodes as f64);
}

#[test]
fn test_config_set_get_and_reset() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["config", "set", "query.top_n", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set query.top_n = 3"));

    sandbox
        .cmd()
        .args(["config", "get", "query.top_n"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3"));

    sandbox.cmd().args(["config", "reset"]).assert().success();

    sandbox
        .cmd()
        .args(["config", "get", "query.top_n"])
        .assert()
        .success()
        .stdout(predicate::str::contains("10"));
}

#[test]
fn test_config_rejects_stored_password() {
    Sandbox::new()
        .cmd()
        .args(["config", "set", "replica.password", "secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("environment variable"));
}

#[test]
fn test_config_path_uses_override_dir() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_unreachable_replica_does_not_block_writes() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "set", "replica.enabled", "true"])
        .assert()
        .success();
    sandbox
        .cmd()
        .args(["config", "set", "replica.uri", "127.0.0.1:1"])
        .assert()
        .success();

    let processed = sandbox.ingest("s-1");
    assert_eq!(processed["relationships"].as_array().unwrap().len(), 6);
}

#[test]
fn test_doctor_command() {
    Sandbox::new()
        .cmd()
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] Database"))
        .stdout(predicate::str::contains("All checks passed."));
}
