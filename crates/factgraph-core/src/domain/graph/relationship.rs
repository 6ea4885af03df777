//! Graph relationships
//!
//! Relationships are directed, typed, confidence-weighted edges between two
//! existing nodes. They are immutable once written. Several edges of the same
//! type may connect the same pair of nodes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::node::Properties;

/// A directed relationship between two graph nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationship {
    /// Unique identifier for the relationship
    pub id: String,
    /// ID of the source node
    pub source_id: String,
    /// ID of the target node
    pub target_id: String,
    /// Type of relationship
    pub relationship_type: RelationshipType,
    /// Open-ended properties
    pub properties: Properties,
    /// Confidence in the relationship (0.0 to 1.0)
    pub confidence: f32,
    /// When the relationship was created
    pub created_at: DateTime<Utc>,
}

impl GraphRelationship {
    /// Create a new relationship between two nodes
    ///
    /// Confidence starts at the type's default.
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relationship_type: RelationshipType,
    ) -> Self {
        let confidence = relationship_type.default_confidence();

        Self {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type,
            properties: Properties::new(),
            confidence,
            created_at: Utc::now(),
        }
    }

    /// Set the confidence (clamped to 0.0-1.0)
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the properties
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Check whether this edge has the given type
    pub fn is(&self, relationship_type: &RelationshipType) -> bool {
        &self.relationship_type == relationship_type
    }
}

/// Types of relationships between nodes
///
/// The set is open: collaborators may link nodes with their own types, which
/// round-trip through [`RelationshipType::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RelationshipType {
    /// Insight was discussed in a session
    WasDiscussedIn,
    /// Decision was informed by an insight
    WasInformedBy,
    /// Action item results from a decision
    ResultsFrom,
    /// Test was designed in a session
    WasDesignedIn,
    /// File was modified during a session
    WasModifiedDuring,
    /// Node was captured in a journal entry
    CapturedInEntry,
    /// Node was recorded in a journal entry
    RecordedInEntry,
    /// Any other collaborator-defined type
    Custom(String),
}

impl RelationshipType {
    /// Get the string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::WasDiscussedIn => "WAS_DISCUSSED_IN",
            Self::WasInformedBy => "WAS_INFORMED_BY",
            Self::ResultsFrom => "RESULTS_FROM",
            Self::WasDesignedIn => "WAS_DESIGNED_IN",
            Self::WasModifiedDuring => "WAS_MODIFIED_DURING",
            Self::CapturedInEntry => "CAPTURED_IN_ENTRY",
            Self::RecordedInEntry => "RECORDED_IN_ENTRY",
            Self::Custom(s) => s,
        }
    }

    /// Parse from string
    ///
    /// Known types match case-insensitively; anything else becomes `Custom`
    /// with the caller's spelling preserved.
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "WAS_DISCUSSED_IN" => Self::WasDiscussedIn,
            "WAS_INFORMED_BY" => Self::WasInformedBy,
            "RESULTS_FROM" => Self::ResultsFrom,
            "WAS_DESIGNED_IN" => Self::WasDesignedIn,
            "WAS_MODIFIED_DURING" => Self::WasModifiedDuring,
            "CAPTURED_IN_ENTRY" => Self::CapturedInEntry,
            "RECORDED_IN_ENTRY" => Self::RecordedInEntry,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Default confidence assigned to edges of this type
    pub fn default_confidence(&self) -> f32 {
        match self {
            Self::WasModifiedDuring => 0.9,
            Self::WasDiscussedIn => 0.8,
            Self::WasInformedBy => 0.7,
            Self::ResultsFrom => 0.6,
            Self::WasDesignedIn => 0.5,
            Self::CapturedInEntry | Self::RecordedInEntry | Self::Custom(_) => 0.5,
        }
    }

    /// Get all built-in relationship types
    pub fn known() -> Vec<RelationshipType> {
        vec![
            Self::WasDiscussedIn,
            Self::WasInformedBy,
            Self::ResultsFrom,
            Self::WasDesignedIn,
            Self::WasModifiedDuring,
            Self::CapturedInEntry,
            Self::RecordedInEntry,
        ]
    }
}

impl From<String> for RelationshipType {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<RelationshipType> for String {
    fn from(t: RelationshipType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
