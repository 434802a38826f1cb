//! Two-stage classification and dispatch gate

use std::sync::Arc;

use super::fast::FastClassifier;
use super::llm::LlmClassifier;
use super::{DEFAULT_DISPATCH_THRESHOLD, DEFAULT_FAST_ACCEPT_THRESHOLD, Intent};
use crate::agents::AgentRegistry;

/// Response when the final intent is below the dispatch threshold
pub const CLARIFY_RESPONSE: &str =
    "I'm not very confident about that. Could you please rephrase?";

/// Response when no agent handles the intent type
pub const UNHANDLED_RESPONSE: &str = "I'm not sure how to handle that request.";

/// Which classifier produced the final intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutePath {
    /// Embedding similarity
    Fast,
    /// LLM
    Slow,
}

/// Final intent and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedIntent {
    /// Final intent
    pub intent: Intent,
    /// Producing classifier
    pub path: RoutePath,
}

/// Result of handling one transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// An agent produced a response
    Dispatched {
        /// Agent response
        response: String,
    },
    /// Confidence below the dispatch threshold
    LowConfidence,
    /// No agent registered for the intent type
    Unhandled,
}

impl Outcome {
    /// Text to speak back to the user
    #[must_use]
    pub fn response(&self) -> &str {
        match self {
            Self::Dispatched { response } => response,
            Self::LowConfidence => CLARIFY_RESPONSE,
            Self::Unhandled => UNHANDLED_RESPONSE,
        }
    }
}

/// Fast path first, LLM fallback, then a confidence gate before dispatch
pub struct IntentRouter {
    fast: FastClassifier,
    slow: LlmClassifier,
    agents: Arc<AgentRegistry>,
    fast_accept_threshold: f32,
    dispatch_threshold: f32,
}

impl IntentRouter {
    /// Create a router with the default thresholds
    #[must_use]
    pub fn new(fast: FastClassifier, slow: LlmClassifier, agents: Arc<AgentRegistry>) -> Self {
        Self {
            fast,
            slow,
            agents,
            fast_accept_threshold: DEFAULT_FAST_ACCEPT_THRESHOLD,
            dispatch_threshold: DEFAULT_DISPATCH_THRESHOLD,
        }
    }

    /// Override both thresholds
    #[must_use]
    pub const fn with_thresholds(mut self, fast_accept: f32, dispatch: f32) -> Self {
        self.fast_accept_threshold = fast_accept;
        self.dispatch_threshold = dispatch;
        self
    }

    /// Classify a transcript
    ///
    /// The LLM is only consulted when the fast path has no match or its
    /// confidence is below the fast-accept threshold.
    pub async fn classify(&self, transcript: &str) -> RoutedIntent {
        let fast = self.fast.classify(transcript).await;

        if fast.has_match && fast.confidence >= self.fast_accept_threshold {
            tracing::info!(
                kind = %fast.kind,
                action = %fast.action,
                confidence = fast.confidence,
                "fast path accepted"
            );
            return RoutedIntent {
                intent: fast.into_intent(),
                path: RoutePath::Fast,
            };
        }

        tracing::debug!(
            has_match = fast.has_match,
            confidence = fast.confidence,
            "fast path not confident, falling back to LLM"
        );

        RoutedIntent {
            intent: self.slow.classify(transcript).await,
            path: RoutePath::Slow,
        }
    }

    /// Gate an intent on confidence and dispatch it
    pub async fn dispatch(&self, intent: &Intent) -> Outcome {
        if intent.confidence < self.dispatch_threshold {
            tracing::info!(
                kind = %intent.kind,
                confidence = intent.confidence,
                threshold = self.dispatch_threshold,
                "confidence too low to dispatch"
            );
            return Outcome::LowConfidence;
        }

        match self.agents.dispatch(intent).await {
            Some(response) => Outcome::Dispatched { response },
            None => {
                tracing::warn!(kind = %intent.kind, "no agent registered for intent type");
                Outcome::Unhandled
            }
        }
    }

    /// Classify and dispatch a transcript
    pub async fn handle(&self, transcript: &str) -> Outcome {
        let routed = self.classify(transcript).await;
        self.dispatch(&routed.intent).await
    }

    /// Registered agents
    #[must_use]
    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }
}
