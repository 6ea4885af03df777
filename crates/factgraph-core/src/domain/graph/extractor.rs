//! Pattern-based fact extraction
//!
//! Classifies free text into typed fact candidates using an ordered table of
//! `(category, regex)` rules. Every rule is applied to the whole text and all of
//! its non-overlapping matches are collected, so results come out in
//! rule-then-match order. Confidence is a fixed constant per category.
//!
//! Extraction is total: it never returns an error. Text without matches
//! yields empty candidate lists.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::node::NodeType;

/// Built-in rule table
///
/// A marker appears once here even when several spellings of it exist: the
/// patterns are case-insensitive, so `DECISION:` and `decision:` are one rule.
const DEFAULT_RULES: &[(FactCategory, &str)] = &[
    // Insights
    (FactCategory::Insight, r"(?i)\bkey insight(?::|\b)\s*([^:\s][^\n]*)"),
    (FactCategory::Insight, r"(?i)\bimportant finding(?::|\b)\s*([^:\s][^\n]*)"),
    (FactCategory::Insight, r"(?im)\bdiscovered that[ \t]+(.+)$"),
    (FactCategory::Insight, r"(?im)\brealized that[ \t]+(.+)$"),
    (FactCategory::Insight, r"(?im)\blearned that[ \t]+(.+)$"),
    (FactCategory::Insight, r"(?im)^[ \t]*insight:[ \t]*(.+)$"),
    (FactCategory::Insight, r"(?m)💡[ \t]*(.+)$"),
    // Decisions
    (FactCategory::Decision, r"(?im)\bdecided to[ \t]+(.+)$"),
    (FactCategory::Decision, r"(?im)\bdecision:[ \t]*(.+)$"),
    (FactCategory::Decision, r"(?im)\bchose to[ \t]+(.+)$"),
    (FactCategory::Decision, r"(?im)\bwill implement[ \t]+(.+)$"),
    (FactCategory::Decision, r"(?m)✅[ \t]*(.+)$"),
    // Action items
    (FactCategory::ActionItem, r"(?im)\btodo:[ \t]*(.+)$"),
    (FactCategory::ActionItem, r"(?i)\baction item(?::|\b)\s*([^:\s][^\n]*)"),
    (FactCategory::ActionItem, r"(?im)\bneed to[ \t]+(.+)$"),
    (FactCategory::ActionItem, r"(?i)\bnext step(?::|\b)\s*([^:\s][^\n]*)"),
    (FactCategory::ActionItem, r"(?im)\bshould[ \t]+(.+)$"),
    (FactCategory::ActionItem, r"(?m)🎯[ \t]*(.+)$"),
    // Tests
    (FactCategory::Test, r"(?i)\btest[ \t]+(\w+)"),
    (FactCategory::Test, r"(?im)\btesting[ \t]+(.+)$"),
    (FactCategory::Test, r"(?im)\bverify[ \t]+(.+)$"),
    (FactCategory::Test, r"(?im)\bcheck[ \t]+(.+)$"),
    (FactCategory::Test, r"(?i)\btest[^\n]*?\b(\w+algorithm)\b"),
    (FactCategory::Test, r"(?m)🧪[ \t]*(.+)$"),
    // Agents
    (
        FactCategory::Agent,
        r"(?i)\b(claude[ \t]+(?:suggested|recommended|implemented|created))\b",
    ),
    (FactCategory::Agent, r"(?i)\b(ai[ \t]+(?:generated|created|suggested))\b"),
    (
        FactCategory::Agent,
        r"(?i)\b(system[ \t]+(?:detected|found|identified))\b",
    ),
    (FactCategory::Agent, r"(?m)🤖[ \t]*(.+)$"),
    // File references (case-sensitive)
    (FactCategory::FileReference, r"\b([A-Za-z0-9_]+\.py)\b"),
    (FactCategory::FileReference, r"\b([A-Za-z0-9_]+\.md)\b"),
    (FactCategory::FileReference, r"\b([A-Za-z0-9_]+\.sh)\b"),
    (FactCategory::FileReference, r"\b([A-Za-z0-9_]+\.json)\b"),
];

static DEFAULT_RULE_TABLE: Lazy<Vec<ExtractionRule>> = Lazy::new(|| {
    DEFAULT_RULES
        .iter()
        .filter_map(|(category, pattern)| match ExtractionRule::new(*category, pattern) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(category = %category, pattern, error = %e, "Skipping built-in extraction rule");
                None
            }
        })
        .collect()
});

/// Category of an extracted fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactCategory {
    Insight,
    Decision,
    ActionItem,
    Test,
    Agent,
    FileReference,
}

impl FactCategory {
    /// Fixed confidence for candidates of this category
    pub fn confidence(&self) -> f32 {
        match self {
            Self::Insight => 0.8,
            Self::Decision => 0.7,
            Self::ActionItem => 0.6,
            Self::Test => 0.5,
            Self::Agent => 0.4,
            Self::FileReference => 0.9,
        }
    }

    /// Node type created for candidates of this category
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Insight => NodeType::Insight,
            Self::Decision => NodeType::Decision,
            Self::ActionItem => NodeType::ActionItem,
            Self::Test => NodeType::Test,
            Self::Agent => NodeType::Agent,
            Self::FileReference => NodeType::File,
        }
    }

    /// Value recorded in a node's `source` property
    pub fn source_tag(&self) -> &'static str {
        match self {
            Self::FileReference => "file_reference",
            _ => "pattern_match",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insight => "insight",
            Self::Decision => "decision",
            Self::ActionItem => "action_item",
            Self::Test => "test",
            Self::Agent => "agent",
            Self::FileReference => "file_reference",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "insight" | "insights" => Some(Self::Insight),
            "decision" | "decisions" => Some(Self::Decision),
            "action_item" | "action_items" | "action-item" => Some(Self::ActionItem),
            "test" | "tests" => Some(Self::Test),
            "agent" | "agents" => Some(Self::Agent),
            "file_reference" | "file" | "files" => Some(Self::FileReference),
            _ => None,
        }
    }
}

impl std::fmt::Display for FactCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A text fragment classified by the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCandidate {
    pub category: FactCategory,
    pub content: String,
    pub confidence: f32,
}

/// One compiled extraction rule
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    category: FactCategory,
    pattern: Regex,
}

impl ExtractionRule {
    pub fn new(category: FactCategory, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            Error::InvalidInput(format!("invalid {} pattern '{}': {}", category, pattern, e))
        })?;
        Ok(Self { category, pattern })
    }

    pub fn category(&self) -> FactCategory {
        self.category
    }

    /// Apply the rule to the full text, in match order
    fn apply<'a>(&'a self, text: &'a str) -> impl Iterator<Item = String> + 'a {
        self.pattern.captures_iter(text).filter_map(|caps| {
            let matched = caps.get(1).or_else(|| caps.get(0))?;
            let cleaned = clean_match(matched.as_str());
            (!cleaned.is_empty()).then_some(cleaned)
        })
    }
}

/// Trim surrounding whitespace and a single trailing period
fn clean_match(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_suffix('.')
        .unwrap_or(trimmed)
        .trim_end()
        .to_string()
}

/// Candidates grouped by category, each list in rule-then-match order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub insights: Vec<FactCandidate>,
    pub decisions: Vec<FactCandidate>,
    pub action_items: Vec<FactCandidate>,
    pub tests: Vec<FactCandidate>,
    pub agents: Vec<FactCandidate>,
    pub file_references: Vec<FactCandidate>,
}

impl ExtractionResult {
    /// Candidates of one category
    pub fn get(&self, category: FactCategory) -> &[FactCandidate] {
        match category {
            FactCategory::Insight => &self.insights,
            FactCategory::Decision => &self.decisions,
            FactCategory::ActionItem => &self.action_items,
            FactCategory::Test => &self.tests,
            FactCategory::Agent => &self.agents,
            FactCategory::FileReference => &self.file_references,
        }
    }

    fn push(&mut self, candidate: FactCandidate) {
        let list = match candidate.category {
            FactCategory::Insight => &mut self.insights,
            FactCategory::Decision => &mut self.decisions,
            FactCategory::ActionItem => &mut self.action_items,
            FactCategory::Test => &mut self.tests,
            FactCategory::Agent => &mut self.agents,
            FactCategory::FileReference => &mut self.file_references,
        };
        list.push(candidate);
    }

    /// Total number of candidates across all categories
    pub fn total(&self) -> usize {
        self.insights.len()
            + self.decisions.len()
            + self.action_items.len()
            + self.tests.len()
            + self.agents.len()
            + self.file_references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Regex rule executor
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    rules: Vec<ExtractionRule>,
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternExtractor {
    /// Create an extractor with the built-in rule table
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_RULE_TABLE.clone(),
        }
    }

    /// Create an extractor from an explicit rule table (no built-ins)
    pub fn with_rules(rules: &[(FactCategory, &str)]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|(category, pattern)| ExtractionRule::new(*category, pattern))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Append a rule after the existing ones
    pub fn add_rule(&mut self, category: FactCategory, pattern: &str) -> Result<()> {
        self.rules.push(ExtractionRule::new(category, pattern)?);
        Ok(())
    }

    /// Number of active rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Extract fact candidates from text
    pub fn extract(&self, text: &str) -> ExtractionResult {
        let mut result = ExtractionResult::default();

        for rule in &self.rules {
            let category = rule.category();
            for content in rule.apply(text) {
                result.push(FactCandidate {
                    category,
                    content,
                    confidence: category.confidence(),
                });
            }
        }

        debug!(
            insights = result.insights.len(),
            decisions = result.decisions.len(),
            action_items = result.action_items.len(),
            tests = result.tests.len(),
            agents = result.agents.len(),
            file_references = result.file_references.len(),
            "Extracted fact candidates"
        );

        result
    }

    /// Extract from raw bytes, replacing invalid UTF-8 sequences
    pub fn extract_bytes(&self, bytes: &[u8]) -> ExtractionResult {
        self.extract(&String::from_utf8_lossy(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(candidates: &[FactCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.content.as_str()).collect()
    }

    #[test]
    fn test_bare_marker_captures_following_line() {
        let extractor = PatternExtractor::new();

        let result = extractor.extract("Key insight:\nthe cache is cold");
        assert_eq!(contents(&result.insights), vec!["the cache is cold"]);

        let result = extractor.extract("Next step:\n  ship the index\nAction item");
        assert_eq!(contents(&result.action_items), vec!["ship the index"]);

        assert!(extractor.extract("Important finding:").is_empty());
    }

    #[test]
    fn test_marker_prefix_of_longer_word_is_ignored() {
        let result = PatternExtractor::new().extract("Key insights were shared");
        assert!(result.insights.is_empty());
    }

    #[test]
    fn test_basic_markers_extract_once_each() {
        let extractor = PatternExtractor::new();
        let result = extractor.extract("Key insight: X\nDecision: Y\nTODO: Z");

        assert_eq!(contents(&result.insights), vec!["X"]);
        assert_eq!(contents(&result.decisions), vec!["Y"]);
        assert_eq!(contents(&result.action_items), vec!["Z"]);
        assert!(result.tests.is_empty());
        assert!(result.agents.is_empty());
        assert!(result.file_references.is_empty());
        assert_eq!(result.total(), 3);
    }

    #[test]
    fn test_trims_whitespace_and_single_trailing_period() {
        let extractor = PatternExtractor::new();
        let result = extractor.extract("Key insight:   caching helps.  \nDecision: ship it...");

        assert_eq!(contents(&result.insights), vec!["caching helps"]);
        // Only one period is removed
        assert_eq!(contents(&result.decisions), vec!["ship it.."]);
    }

    #[test]
    fn test_fixed_confidence_per_category() {
        let extractor = PatternExtractor::new();
        let result = extractor.extract(
            "Key insight: a\nDecision: b\nTODO: c\ntesting the parser\nClaude suggested it\nsee notes.md",
        );

        assert_eq!(result.insights[0].confidence, 0.8);
        assert_eq!(result.decisions[0].confidence, 0.7);
        assert_eq!(result.action_items[0].confidence, 0.6);
        assert_eq!(result.tests[0].confidence, 0.5);
        assert_eq!(result.agents[0].confidence, 0.4);
        assert_eq!(result.file_references[0].confidence, 0.9);
    }

    #[test]
    fn test_rule_then_match_order_without_dedup() {
        let extractor = PatternExtractor::new();
        let text = "We discovered that A\nKey insight: B\nKey insight: B";
        let result = extractor.extract(text);

        // "key insight" rule runs before "discovered that"; duplicates are kept
        assert_eq!(contents(&result.insights), vec!["B", "B", "A"]);
    }

    #[test]
    fn test_uppercase_tags_are_single_rules() {
        let extractor = PatternExtractor::new();
        let result = extractor.extract("DECISION: use sqlite\nINSIGHT: wal mode is faster");

        assert_eq!(contents(&result.decisions), vec!["use sqlite"]);
        assert_eq!(contents(&result.insights), vec!["wal mode is faster"]);
    }

    #[test]
    fn test_emoji_markers() {
        let extractor = PatternExtractor::new();
        let result = extractor.extract("💡 batching halves latency\n✅ adopt batching\n🎯 tune size\n🧪 load test\n🤖 bot ran lint");

        assert_eq!(contents(&result.insights), vec!["batching halves latency"]);
        assert_eq!(contents(&result.decisions), vec!["adopt batching"]);
        assert_eq!(contents(&result.action_items), vec!["tune size"]);
        assert!(contents(&result.tests).contains(&"load test"));
        assert_eq!(contents(&result.agents), vec!["bot ran lint"]);
    }

    #[test]
    fn test_agent_phrases_capture_actor() {
        let extractor = PatternExtractor::new();
        let result = extractor.extract("Claude recommended a retry. The system detected drift.");

        assert_eq!(
            contents(&result.agents),
            vec!["Claude recommended", "system detected"]
        );
    }

    #[test]
    fn test_file_references_are_case_sensitive_names() {
        let extractor = PatternExtractor::new();
        let result = extractor.extract("Edit risk_calculator.py and README.md, then run build.sh with cfg.json");

        assert_eq!(
            contents(&result.file_references),
            vec!["risk_calculator.py", "README.md", "build.sh", "cfg.json"]
        );
    }

    #[test]
    fn test_algorithm_test_rule() {
        let extractor = PatternExtractor::new();
        let result = extractor.extract("Test coverage for the SortingAlgorithm is thin");

        assert!(contents(&result.tests).contains(&"SortingAlgorithm"));
    }

    #[test]
    fn test_no_matches_yields_empty_result() {
        let extractor = PatternExtractor::new();
        let result = extractor.extract("nothing of note here");
        assert!(result.is_empty());

        let empty = extractor.extract("");
        assert!(empty.is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let extractor = PatternExtractor::new();
        let mut bytes = b"Key insight: caching \xff works".to_vec();
        bytes.extend_from_slice(b"\nTODO: fix encoding");

        let result = extractor.extract_bytes(&bytes);
        assert_eq!(result.insights.len(), 1);
        assert!(result.insights[0].content.contains('\u{FFFD}'));
        assert_eq!(contents(&result.action_items), vec!["fix encoding"]);
    }

    #[test]
    fn test_custom_rules() {
        let mut extractor =
            PatternExtractor::with_rules(&[(FactCategory::Decision, r"(?im)\bruling:[ \t]*(.+)$")])
                .unwrap();
        assert_eq!(extractor.rule_count(), 1);

        extractor
            .add_rule(FactCategory::Insight, r"(?im)\bnote:[ \t]*(.+)$")
            .unwrap();

        let result = extractor.extract("Ruling: keep v1\nNote: v2 is slower\nDecision: ignored");
        assert_eq!(contents(&result.decisions), vec!["keep v1"]);
        assert_eq!(contents(&result.insights), vec!["v2 is slower"]);
    }

    #[test]
    fn test_invalid_custom_rule_is_rejected() {
        let err = PatternExtractor::with_rules(&[(FactCategory::Insight, "(unclosed")]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_all_builtin_rules_compile() {
        assert_eq!(PatternExtractor::new().rule_count(), DEFAULT_RULES.len());
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!(FactCategory::parse("insights"), Some(FactCategory::Insight));
        assert_eq!(FactCategory::parse("action_item"), Some(FactCategory::ActionItem));
        assert_eq!(FactCategory::parse("file"), Some(FactCategory::FileReference));
        assert_eq!(FactCategory::parse("nope"), None);
        assert_eq!(FactCategory::FileReference.node_type(), NodeType::File);
    }
}
