//! Graph node types
//!
//! Nodes are the typed facts and context entities of the graph. A node is
//! written once and never deleted; only its properties may change afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Open-ended key/value properties attached to nodes and relationships
pub type Properties = Map<String, Value>;

/// A node in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique identifier, assigned at creation
    pub id: String,
    /// Type of the node (immutable)
    pub node_type: NodeType,
    /// Short label
    pub title: String,
    /// Full text
    pub content: String,
    /// Open-ended properties
    pub properties: Properties,
    /// Where the fact came from
    pub provenance: Provenance,
    /// Extraction confidence (0.0 to 1.0)
    pub confidence: f32,
    /// When the node was created
    pub created_at: DateTime<Utc>,
    /// When the node's properties were last changed
    pub updated_at: DateTime<Utc>,
}

impl GraphNode {
    /// Create a new node with a fresh id
    pub fn new(node_type: NodeType, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            node_type,
            title: title.into(),
            content: content.into(),
            properties: Properties::new(),
            provenance: Provenance::default(),
            confidence: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the properties
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Set a single property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set the provenance
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Set confidence score (clamped to 0.0-1.0)
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Look up a property as a string
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Merge a property patch into this node
    ///
    /// Existing keys are overwritten. Type, content and confidence are untouched.
    pub fn merge_properties(&mut self, patch: Properties) {
        for (key, value) in patch {
            self.properties.insert(key, value);
        }
        self.updated_at = Utc::now();
    }

    /// Lowercased text that substring search matches against
    ///
    /// Folding uses Unicode rules; SQLite's own `lower` and `LIKE` only fold ASCII.
    pub fn search_key(title: &str, content: &str) -> String {
        format!("{}\n{}", title, content).to_lowercase()
    }

    /// Build a short title from longer content
    ///
    /// Content longer than `max_chars` characters is cut and suffixed with `...`.
    pub fn title_from(content: &str, max_chars: usize) -> String {
        if content.chars().count() <= max_chars {
            return content.to_string();
        }
        let mut title: String = content.chars().take(max_chars).collect();
        title.push_str("...");
        title
    }
}

/// Where a node's content originated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Conversation the fact was extracted from
    pub conversation_id: Option<String>,
    /// Source file the conversation was about
    pub file_path: Option<String>,
}

impl Provenance {
    pub fn new(conversation_id: Option<String>, file_path: Option<String>) -> Self {
        Self {
            conversation_id,
            file_path,
        }
    }

    pub fn conversation(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            file_path: None,
        }
    }
}

/// Types of graph nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    /// A working session a conversation belongs to
    Session,
    /// A file touched or referenced by a conversation
    File,
    /// Something learned or realized
    Insight,
    /// A choice that was made
    Decision,
    /// Follow-up work
    #[serde(rename = "Action_Item")]
    ActionItem,
    /// A test or verification step
    Test,
    /// An automated actor mentioned in the conversation
    Agent,
}

impl NodeType {
    /// Get the string representation stored in the database and used as replica label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "Session",
            Self::File => "File",
            Self::Insight => "Insight",
            Self::Decision => "Decision",
            Self::ActionItem => "Action_Item",
            Self::Test => "Test",
            Self::Agent => "Agent",
        }
    }

    /// Parse from string (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "session" => Some(Self::Session),
            "file" => Some(Self::File),
            "insight" => Some(Self::Insight),
            "decision" => Some(Self::Decision),
            "action_item" | "action-item" | "actionitem" => Some(Self::ActionItem),
            "test" => Some(Self::Test),
            "agent" => Some(Self::Agent),
            _ => None,
        }
    }

    /// Get all node types
    pub fn all() -> &'static [NodeType] {
        &[
            Self::Session,
            Self::File,
            Self::Insight,
            Self::Decision,
            Self::ActionItem,
            Self::Test,
            Self::Agent,
        ]
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
