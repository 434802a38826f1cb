//! Embedding-similarity classifier (fast path)
//!
//! Every catalog phrase is embedded once at construction. A transcript is
//! classified by nearest-neighbour cosine similarity against those examples,
//! then a small keyword rule table fills in parameters for actions that need
//! them.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::catalog::IntentGroup;
use super::embedder::Embedder;
use super::{ClassificationResult, cosine_similarity, normalize_text};
use crate::{Error, Result};

/// A catalog phrase with its precomputed embedding
#[derive(Debug, Clone, PartialEq)]
pub struct KnownIntentExample {
    /// Phrase as written in the catalog
    pub source_phrase: String,
    /// Embedding of the normalized phrase
    pub embedding: Vec<f32>,
    /// Intent type
    pub kind: String,
    /// Action
    pub action: String,
}

/// Keywords that select one parameter value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordGroup {
    /// Whole words or phrases to look for
    pub keywords: Vec<String>,
    /// Value assigned when any keyword is present
    pub value: String,
}

/// Where a rule takes its value from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterSource {
    /// First group with a keyword present in the normalized transcript
    Keywords(Vec<KeywordGroup>),
    /// The raw transcript, untouched
    Transcript,
}

/// Fills one parameter for one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRule {
    /// Action the rule applies to
    pub action: String,
    /// Parameter name
    pub parameter: String,
    /// Value source
    pub source: ParameterSource,
}

impl ParameterRule {
    /// Rule that picks a value by keyword presence
    #[must_use]
    pub fn keywords(action: &str, parameter: &str, groups: &[(&[&str], &str)]) -> Self {
        let groups = groups
            .iter()
            .map(|(keywords, value)| KeywordGroup {
                keywords: keywords.iter().map(|k| normalize_text(k)).collect(),
                value: (*value).to_string(),
            })
            .collect();

        Self {
            action: action.to_string(),
            parameter: parameter.to_string(),
            source: ParameterSource::Keywords(groups),
        }
    }

    /// Rule that passes the raw transcript through
    #[must_use]
    pub fn transcript(action: &str, parameter: &str) -> Self {
        Self {
            action: action.to_string(),
            parameter: parameter.to_string(),
            source: ParameterSource::Transcript,
        }
    }

    fn apply(&self, normalized: &str, raw: &str) -> Option<Value> {
        match &self.source {
            ParameterSource::Transcript => {
                let raw = raw.trim();
                (!raw.is_empty()).then(|| Value::String(raw.to_string()))
            }
            ParameterSource::Keywords(groups) => {
                let words: Vec<&str> = normalized.split_whitespace().collect();
                groups
                    .iter()
                    .find(|group| group.keywords.iter().any(|k| contains_words(&words, k)))
                    .map(|group| Value::String(group.value.clone()))
            }
        }
    }
}

/// Whether `phrase` appears in `words` on word boundaries
fn contains_words(words: &[&str], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return false;
    }
    words.windows(needle.len()).any(|window| window == needle.as_slice())
}

/// Built-in rules for application names and volume direction
#[must_use]
pub fn default_rules() -> Vec<ParameterRule> {
    let applications: &[(&[&str], &str)] = &[
        (&["chrome", "browser", "google chrome"], "chrome"),
        (&["firefox"], "firefox"),
        (&["notepad", "text editor"], "notepad"),
        (&["terminal", "console"], "terminal"),
        (&["calculator"], "calculator"),
        (&["file manager", "files", "explorer"], "files"),
    ];

    vec![
        ParameterRule::keywords("launch_application", "name", applications),
        ParameterRule::keywords("close_application", "name", applications),
        ParameterRule::keywords(
            "set_volume",
            "direction",
            &[
                (&["up", "increase", "louder", "raise"], "up"),
                (&["down", "decrease", "quieter", "lower"], "down"),
                (&["mute", "silence"], "mute"),
            ],
        ),
        ParameterRule::transcript("evaluate_expression", "expression"),
    ]
}

/// Nearest-neighbour classifier over embedded catalog phrases
pub struct FastClassifier {
    examples: Vec<KnownIntentExample>,
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    rules: Vec<ParameterRule>,
}

impl FastClassifier {
    /// Embed every catalog phrase
    ///
    /// # Errors
    ///
    /// Returns error if any phrase cannot be embedded or the embeddings do not
    /// share one dimension
    pub async fn build(
        groups: &[IntentGroup],
        embedder: Arc<dyn Embedder>,
        threshold: f32,
    ) -> Result<Self> {
        tracing::info!("pre-computing embeddings for known intents");

        let mut pending = Vec::new();
        for group in groups {
            for prompt in &group.prompts {
                let normalized = normalize_text(prompt);
                if normalized.is_empty() {
                    tracing::warn!(prompt = %prompt, "skipping catalog phrase with no words");
                    continue;
                }
                pending.push((group, prompt, normalized));
            }
        }

        let texts: Vec<&str> = pending.iter().map(|(_, _, n)| n.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        if embeddings.len() != pending.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                pending.len(),
                embeddings.len()
            )));
        }

        let mut dimension = None;
        let mut examples = Vec::with_capacity(pending.len());

        for ((group, prompt, _), embedding) in pending.into_iter().zip(embeddings) {
            if embedding.is_empty() {
                return Err(Error::Embedding(format!("empty embedding for '{prompt}'")));
            }

            let expected = *dimension.get_or_insert(embedding.len());
            if embedding.len() != expected {
                return Err(Error::Embedding(format!(
                    "embedding for '{prompt}' has dimension {}, expected {expected}",
                    embedding.len()
                )));
            }

            examples.push(KnownIntentExample {
                source_phrase: prompt.clone(),
                embedding,
                kind: group.kind.clone(),
                action: group.action.clone(),
            });
        }

        tracing::info!(examples = examples.len(), "fast classifier ready");

        Ok(Self {
            examples,
            embedder,
            threshold,
            rules: default_rules(),
        })
    }

    /// Replace the parameter rule table
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<ParameterRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Classify a transcript
    ///
    /// Embedding failures are logged and reported as no match.
    pub async fn classify(&self, transcript: &str) -> ClassificationResult {
        let normalized = normalize_text(transcript);
        if normalized.is_empty() {
            return ClassificationResult::no_match(0.0);
        }

        let embedding = match self.embedder.embed(&normalized).await {
            Ok(embedding) if !embedding.is_empty() => embedding,
            Ok(_) => {
                tracing::warn!("embedding service returned an empty vector");
                return ClassificationResult::no_match(0.0);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to embed transcript");
                return ClassificationResult::no_match(0.0);
            }
        };

        // Strict comparison keeps the first example on ties
        let mut best_score = 0.0;
        let mut best = None;
        for example in &self.examples {
            let score = cosine_similarity(&embedding, &example.embedding);
            if score > best_score {
                best_score = score;
                best = Some(example);
            }
        }

        let Some(example) = best.filter(|_| best_score >= self.threshold) else {
            tracing::debug!(score = best_score, "no fast-path match");
            return ClassificationResult::no_match(best_score);
        };

        let mut parameters = Map::new();
        for rule in self.rules.iter().filter(|r| r.action == example.action) {
            if parameters.contains_key(&rule.parameter) {
                continue;
            }
            if let Some(value) = rule.apply(&normalized, transcript) {
                parameters.insert(rule.parameter.clone(), value);
            }
        }

        tracing::debug!(
            score = best_score,
            kind = %example.kind,
            action = %example.action,
            phrase = %example.source_phrase,
            "fast-path match"
        );

        ClassificationResult {
            has_match: true,
            confidence: best_score,
            kind: example.kind.clone(),
            action: example.action.clone(),
            parameters,
        }
    }

    /// Number of embedded examples
    #[must_use]
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// Whether the catalog was empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Embedded examples in catalog order
    #[must_use]
    pub fn examples(&self) -> &[KnownIntentExample] {
        &self.examples
    }

    /// Similarity threshold for a match
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }
}
