//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::graph::{FactCategory, PatternExtractor};

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "FACTGRAPH_CONFIG_DIR";

/// Environment variables holding the replica password, in lookup order
pub const REPLICA_PASSWORD_ENV: [&str; 2] = ["FACTGRAPH_REPLICA_PASSWORD", "NEO4J_PASSWORD"];

/// Factgraph configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub replica: ReplicaConfig,
    pub query: QueryConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file; the platform data directory is used when unset
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    pub enabled: bool,
    pub uri: String,
    pub user: String,
    #[serde(skip)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of most-connected nodes reported by analytics
    pub top_n: usize,
    /// Cap on search results
    pub search_limit: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Rules appended after the built-in table
    pub extra_rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub category: FactCategory,
    pub pattern: String,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: None,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_n: crate::domain::graph::DEFAULT_TOP_N,
            search_limit: crate::domain::graph::DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl ReplicaConfig {
    pub fn resolved_password(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(REPLICA_PASSWORD_ENV
            .iter()
            .find_map(|name| env::var(name).ok().filter(|v| !v.is_empty())))
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.password.is_some() {
            return Err(anyhow!(
                "Replica passwords must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl ExtractionConfig {
    /// Build an extractor with the built-in rules plus the configured ones
    pub fn build_extractor(&self) -> crate::Result<PatternExtractor> {
        let mut extractor = PatternExtractor::new();
        for rule in &self.extra_rules {
            extractor.add_rule(rule.category, &rule.pattern)?;
        }
        Ok(extractor)
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("factgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.replica.enforce_env_only()?;

        if self.replica.enabled && self.replica.uri.trim().is_empty() {
            return Err(anyhow!("replica.uri must be set when replication is enabled"));
        }
        if self.query.top_n == 0 {
            return Err(anyhow!("query.top_n must be at least 1"));
        }
        if self.query.search_limit == 0 {
            return Err(anyhow!("query.search_limit must be at least 1"));
        }

        self.extraction
            .build_extractor()
            .map_err(|e| anyhow!("Invalid extraction rule: {}", e))?;

        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // Storage settings
            "storage.database_path" => Ok(self
                .storage
                .database_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(default)".to_string())),

            // Replica settings
            "replica.enabled" => Ok(self.replica.enabled.to_string()),
            "replica.uri" => Ok(self.replica.uri.clone()),
            "replica.user" => Ok(self.replica.user.clone()),
            "replica.password" => match self.replica.resolved_password()? {
                Some(_) => Ok("***".to_string()),
                None => Ok(format!(
                    "(not set - use {} or {} env var)",
                    REPLICA_PASSWORD_ENV[0], REPLICA_PASSWORD_ENV[1]
                )),
            },

            // Query settings
            "query.top_n" => Ok(self.query.top_n.to_string()),
            "query.search_limit" => Ok(self.query.search_limit.to_string()),

            // Extraction settings
            "extraction.extra_rules" => Ok(self.extraction.extra_rules.len().to_string()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `factgraph config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "storage.database_path" => {
                let value = value.trim();
                self.storage.database_path = if value.is_empty() || value == "default" {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }

            "replica.enabled" => {
                self.replica.enabled = value
                    .parse()
                    .with_context(|| format!("Invalid boolean value: {}", value))?;
            }
            "replica.uri" => {
                if value.trim().is_empty() {
                    return Err(anyhow!("replica.uri cannot be empty"));
                }
                self.replica.uri = value.trim().to_string();
            }
            "replica.user" => {
                self.replica.user = value.to_string();
            }
            "replica.password" => {
                return Err(anyhow!(
                    "Replica passwords cannot be stored in configuration. \
                     Set the {} or {} environment variable instead.",
                    REPLICA_PASSWORD_ENV[0],
                    REPLICA_PASSWORD_ENV[1]
                ));
            }

            "query.top_n" => {
                let top_n: usize = value
                    .parse()
                    .with_context(|| format!("Invalid top_n value: {}", value))?;
                if top_n == 0 {
                    return Err(anyhow!("query.top_n must be at least 1"));
                }
                self.query.top_n = top_n;
            }
            "query.search_limit" => {
                let limit: usize = value
                    .parse()
                    .with_context(|| format!("Invalid search_limit value: {}", value))?;
                if limit == 0 {
                    return Err(anyhow!("query.search_limit must be at least 1"));
                }
                self.query.search_limit = limit;
            }

            "extraction.extra_rules" => {
                return Err(anyhow!(
                    "Extraction rules are edited in the config file as [[extraction.extra_rules]] entries"
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `factgraph config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "storage.database_path",
            "replica.enabled",
            "replica.uri",
            "replica.user",
            "replica.password",
            "query.top_n",
            "query.search_limit",
            "extraction.extra_rules",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert!(!config.replica.enabled);
        assert_eq!(config.query.top_n, 10);
        assert_eq!(config.get("storage.database_path").unwrap(), "(default)");
    }

    #[test]
    fn test_set_and_get() {
        let mut config = Config::default();
        config.set("query.top_n", "5").unwrap();
        config.set("replica.enabled", "true").unwrap();
        config.set("storage.database_path", "/tmp/g.db").unwrap();

        assert_eq!(config.get("query.top_n").unwrap(), "5");
        assert_eq!(config.get("replica.enabled").unwrap(), "true");
        assert_eq!(config.get("storage.database_path").unwrap(), "/tmp/g.db");
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let mut config = Config::default();
        assert!(config.set("query.top_n", "0").is_err());
        assert!(config.set("query.search_limit", "many").is_err());
        assert!(config.set("replica.enabled", "maybe").is_err());
        assert!(config.set("replica.password", "hunter2").is_err());
        assert!(config.set("nope.key", "1").is_err());
    }

    #[test]
    fn test_list_covers_every_key() {
        let config = Config::default();
        let entries = config.list().unwrap();
        assert_eq!(entries.len(), 8);
        assert!(entries.iter().any(|(k, _)| k == "replica.uri"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.set("query.search_limit", "7").unwrap();
        config.extraction.extra_rules.push(RuleConfig {
            category: FactCategory::Decision,
            pattern: r"(?im)\bruling:[ \t]*(.+)$".to_string(),
        });
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.query.search_limit, 7);
        assert_eq!(loaded.extraction.extra_rules, config.extraction.extra_rules);
        assert!(loaded.replica.password.is_none());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.query.top_n, 10);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[query]\ntop_n = 3\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.query.top_n, 3);
        assert_eq!(loaded.query.search_limit, 50);
        assert_eq!(loaded.replica.user, "neo4j");
    }

    #[test]
    fn test_invalid_rule_fails_validation() {
        let mut config = Config::default();
        config.extraction.extra_rules.push(RuleConfig {
            category: FactCategory::Insight,
            pattern: "(".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_configured_rules_extend_builtins() {
        let mut config = Config::default();
        config.extraction.extra_rules.push(RuleConfig {
            category: FactCategory::Decision,
            pattern: r"(?im)\bruling:[ \t]*(.+)$".to_string(),
        });

        let extractor = config.extraction.build_extractor().unwrap();
        let result = extractor.extract("Ruling: keep it\nDecision: also this");
        assert_eq!(result.decisions.len(), 2);
    }
}
