//! LLM-based classifier (slow path)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::Intent;
use crate::config::LlmConfig;
use crate::{Error, Result};

/// Instructions sent with every classification request
pub const SYSTEM_PROMPT: &str = r#"You are a non-conversational API endpoint that converts user text into a structured JSON object.
Your ONLY output MUST be a single, raw JSON object. Do not provide any explanation, preamble, or markdown formatting.

Rules:
- Output is ONLY JSON.
- Do NOT add conversational text.
- Do NOT use markdown like ```json.
- The JSON has keys: "type", "action", "parameters", "confidence".
- "type" must be one of: "system_control", "calculation", "search", "general", "unknown".

Intent schema:
* type "system_control": action "set_volume" (parameters: direction = up|down|mute), "launch_application" (parameters: name), "close_application" (parameters: name)
* type "calculation": action "evaluate_expression" (parameters: expression)
* type "search": action "web_search" (parameters: query)
* type "general": action "get_time", "conversation" (parameters: query)

Examples:

User: "turn the volume up"
{"type":"system_control","action":"set_volume","parameters":{"direction":"up"},"confidence":0.95}

User: "launch chrome for me"
{"type":"system_control","action":"launch_application","parameters":{"name":"chrome"},"confidence":1.0}

User: "what is twelve times seven"
{"type":"calculation","action":"evaluate_expression","parameters":{"expression":"12 * 7"},"confidence":1.0}

User: "search for pictures of cats"
{"type":"search","action":"web_search","parameters":{"query":"pictures of cats"},"confidence":1.0}

User: "what time is it?"
{"type":"general","action":"get_time","parameters":{},"confidence":1.0}

User: "tell me a funny story"
{"type":"general","action":"conversation","parameters":{"query":"tell me a funny story"},"confidence":0.9}

User: "fsdjakl fjdsa"
{"type":"unknown","action":"","parameters":{},"confidence":0.1}
"#;

/// Generates free-form text from a system and user prompt
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion
    ///
    /// # Errors
    ///
    /// Returns error if the generation service fails
    async fn generate(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Ollama `/api/generate` client with deterministic decoding
pub struct OllamaClient {
    client: reqwest::Client,
    endpoint: url::Url,
    model: String,
    num_ctx: u64,
    num_predict: u64,
}

impl OllamaClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns error if the host URL is invalid or the model is unset
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.model.trim().is_empty() {
            return Err(Error::Config("llm.model must be set".to_string()));
        }

        let base = format!("{}/", config.host.trim_end_matches('/'));
        let endpoint = url::Url::parse(&base)?.join("api/generate")?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| Error::Llm(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            num_ctx: config.num_ctx,
            num_predict: config.max_tokens,
        })
    }

    /// Model name
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String> {
        #[derive(serde::Serialize)]
        struct Options {
            num_ctx: u64,
            temperature: f32,
            top_k: u32,
            top_p: f32,
            num_predict: u64,
        }

        #[derive(serde::Serialize)]
        struct GenerateRequest<'a> {
            model: &'a str,
            system: &'a str,
            prompt: &'a str,
            stream: bool,
            options: Options,
        }

        #[derive(serde::Deserialize)]
        struct GenerateResponse {
            response: String,
        }

        let request = GenerateRequest {
            model: &self.model,
            system,
            prompt,
            stream: false,
            options: Options {
                num_ctx: self.num_ctx,
                temperature: 0.0,
                top_k: 1,
                top_p: 1.0,
                num_predict: self.num_predict,
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Llm(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("Ollama error {status}: {body}")));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("invalid Ollama response: {e}")))?;

        Ok(result.response)
    }
}

/// Why an LLM response could not be turned into an intent
#[derive(Debug, thiserror::Error)]
pub enum IntentParseError {
    /// No `{...}` span in the response
    #[error("no JSON object in response")]
    NoJsonObject,

    /// The span did not parse
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Parsed, but not an object
    #[error("JSON payload is not an object")]
    NotAnObject,

    /// A required key is absent
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A key has the wrong JSON type
    #[error("field '{field}' must be {expected}")]
    InvalidField {
        /// Offending key
        field: &'static str,
        /// Expected JSON type
        expected: &'static str,
    },
}

/// Slice from the first `{` to the last `}`, if both exist in that order
#[must_use]
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Parse an LLM response into an intent
///
/// `type`, `confidence` and `parameters` are required; `action` defaults to
/// empty. Confidence is clamped into [0, 1].
///
/// # Errors
///
/// Returns error if the response has no JSON object or a field is missing or
/// of the wrong type
pub fn parse_intent(raw: &str) -> std::result::Result<Intent, IntentParseError> {
    let json = extract_json_object(raw).ok_or(IntentParseError::NoJsonObject)?;
    let value: Value = serde_json::from_str(json)?;
    let object = value.as_object().ok_or(IntentParseError::NotAnObject)?;

    let kind = object
        .get("type")
        .ok_or(IntentParseError::MissingField("type"))?
        .as_str()
        .ok_or(IntentParseError::InvalidField {
            field: "type",
            expected: "a string",
        })?;

    let confidence = object
        .get("confidence")
        .ok_or(IntentParseError::MissingField("confidence"))?
        .as_f64()
        .ok_or(IntentParseError::InvalidField {
            field: "confidence",
            expected: "a number",
        })?;

    let parameters = object
        .get("parameters")
        .ok_or(IntentParseError::MissingField("parameters"))?
        .as_object()
        .ok_or(IntentParseError::InvalidField {
            field: "parameters",
            expected: "an object",
        })?;

    let action = match object.get("action") {
        None | Some(Value::Null) => "",
        Some(value) => value.as_str().ok_or(IntentParseError::InvalidField {
            field: "action",
            expected: "a string",
        })?,
    };

    #[allow(clippy::cast_possible_truncation)]
    let confidence = confidence.clamp(0.0, 1.0) as f32;

    Ok(Intent {
        kind: kind.to_string(),
        action: action.to_string(),
        parameters: parameters.clone(),
        confidence,
    })
}

/// Classifies transcripts by prompting a text generator
pub struct LlmClassifier {
    generator: Arc<dyn TextGenerator>,
}

impl LlmClassifier {
    /// Create a classifier over a generator
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Classify a transcript
    ///
    /// Never fails: service errors and malformed responses produce
    /// [`Intent::unknown`].
    pub async fn classify(&self, transcript: &str) -> Intent {
        tracing::info!(transcript = %transcript, "classifying with LLM");

        let raw = match self.generator.generate(SYSTEM_PROMPT, transcript).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(error = %e, "LLM classification request failed");
                return Intent::unknown();
            }
        };

        match parse_intent(&raw) {
            Ok(intent) => {
                tracing::debug!(
                    kind = %intent.kind,
                    action = %intent.action,
                    confidence = intent.confidence,
                    "LLM classified intent"
                );
                intent
            }
            Err(e) => {
                tracing::error!(error = %e, raw = %raw, "failed to parse LLM intent response");
                Intent::unknown()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object() {
        assert_eq!(extract_json_object("Sure! {\"a\":1} ok"), Some("{\"a\":1}"));
        assert_eq!(
            extract_json_object("{\"a\":{\"b\":2}} trailing }"),
            Some("{\"a\":{\"b\":2}} trailing }")
        );
        assert_eq!(extract_json_object("no braces"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn test_parse_intent_with_commentary() {
        let raw = r#"Sure! {"type":"general","action":"get_time","parameters":{},"confidence":1.0} thanks"#;
        let intent = parse_intent(raw).unwrap();

        assert_eq!(intent.kind, "general");
        assert_eq!(intent.action, "get_time");
        assert!(intent.parameters.is_empty());
        assert!((intent.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_intent_action_optional() {
        let intent =
            parse_intent(r#"{"type":"unknown","parameters":{},"confidence":0.1}"#).unwrap();
        assert_eq!(intent.action, "");
    }

    #[test]
    fn test_parse_intent_required_fields() {
        assert!(matches!(
            parse_intent(r#"{"action":"x","parameters":{},"confidence":1}"#),
            Err(IntentParseError::MissingField("type"))
        ));
        assert!(matches!(
            parse_intent(r#"{"type":"general","parameters":{}}"#),
            Err(IntentParseError::MissingField("confidence"))
        ));
        assert!(matches!(
            parse_intent(r#"{"type":"general","confidence":1}"#),
            Err(IntentParseError::MissingField("parameters"))
        ));
        assert!(matches!(
            parse_intent(r#"{"type":"general","parameters":[],"confidence":1}"#),
            Err(IntentParseError::InvalidField { field: "parameters", .. })
        ));
    }

    #[test]
    fn test_parse_intent_clamps_confidence() {
        let intent =
            parse_intent(r#"{"type":"general","parameters":{},"confidence":3.5}"#).unwrap();
        assert!((intent.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_intent_garbage() {
        assert!(matches!(
            parse_intent("I'm sorry, I can't do that."),
            Err(IntentParseError::NoJsonObject)
        ));
        assert!(matches!(parse_intent("{not json}"), Err(IntentParseError::Json(_))));
    }

    #[test]
    fn test_system_prompt_lists_types() {
        for kind in ["system_control", "calculation", "search", "general", "unknown"] {
            assert!(SYSTEM_PROMPT.contains(kind));
        }
    }
}
