//! Intent classification
//!
//! Transcripts are classified in two stages: an embedding-similarity fast path
//! against a catalog of known phrases, then an LLM slow path when the fast
//! path is not confident enough. [`router::IntentRouter`] ties both to agent
//! dispatch.

pub mod catalog;
pub mod embedder;
pub mod fast;
pub mod llm;
pub mod router;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use catalog::{IntentGroup, load_catalog, parse_catalog};
pub use embedder::{Embedder, HttpEmbedder};
pub use fast::{FastClassifier, KeywordGroup, KnownIntentExample, ParameterRule, ParameterSource};
pub use llm::{
    IntentParseError, LlmClassifier, OllamaClient, SYSTEM_PROMPT, TextGenerator,
    extract_json_object, parse_intent,
};
pub use router::{
    CLARIFY_RESPONSE, IntentRouter, Outcome, RoutePath, RoutedIntent, UNHANDLED_RESPONSE,
};

/// Minimum cosine similarity for a fast-path match
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;

/// Fast-path confidence at which the LLM is skipped
pub const DEFAULT_FAST_ACCEPT_THRESHOLD: f32 = 0.95;

/// Final confidence required before an agent is invoked
pub const DEFAULT_DISPATCH_THRESHOLD: f32 = 0.7;

/// Type reported when nothing could be classified
pub const UNKNOWN_TYPE: &str = "unknown";

/// A recognized user command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    /// Intent type; selects the agent
    #[serde(rename = "type")]
    pub kind: String,

    /// Action within the type
    #[serde(default)]
    pub action: String,

    /// Structured arguments
    #[serde(default)]
    pub parameters: Map<String, Value>,

    /// Confidence in [0, 1]
    pub confidence: f32,
}

impl Intent {
    /// Create an intent with no parameters
    #[must_use]
    pub fn new(kind: impl Into<String>, action: impl Into<String>, confidence: f32) -> Self {
        Self {
            kind: kind.into(),
            action: action.into(),
            parameters: Map::new(),
            confidence,
        }
    }

    /// Fallback intent for anything that could not be classified
    #[must_use]
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_TYPE, "", 0.0)
    }

    /// Add a parameter
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// A string parameter, if present and non-empty
    #[must_use]
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

impl Default for Intent {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Outcome of a fast-path classification
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassificationResult {
    /// Whether the best score reached the similarity threshold
    pub has_match: bool,

    /// Best similarity score, reported even without a match
    pub confidence: f32,

    /// Matched intent type (empty without a match)
    pub kind: String,

    /// Matched action (empty without a match)
    pub action: String,

    /// Parameters extracted by keyword rules
    pub parameters: Map<String, Value>,
}

impl ClassificationResult {
    /// Result for a transcript that matched nothing
    #[must_use]
    pub fn no_match(confidence: f32) -> Self {
        Self {
            confidence,
            ..Self::default()
        }
    }

    /// Convert into an intent
    #[must_use]
    pub fn into_intent(self) -> Intent {
        if !self.has_match {
            return Intent::unknown();
        }

        Intent {
            kind: self.kind,
            action: self.action,
            parameters: self.parameters,
            confidence: self.confidence,
        }
    }
}

/// Lowercase and strip punctuation, collapsing runs of whitespace
///
/// Anything that is not a letter, digit, or whitespace counts as
/// punctuation, including curly quotes and other non-ASCII marks.
#[must_use]
pub fn normalize_text(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cosine similarity of two vectors
///
/// Returns 0 when the lengths differ, either vector is empty, or either has
/// zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
