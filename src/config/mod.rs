//! Configuration management for the Loki assistant
//!
//! Typed settings are built from a [`ConfigSource`]. Every threshold and
//! frame-count constant is overridable; the values below are defaults only.

pub mod file;
mod source;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub use source::ConfigSource;

use crate::voice::VadSettings;
use crate::{Error, Result};

/// Assistant configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Audio stream format
    pub audio: AudioConfig,

    /// Voice-activity detection settings
    pub vad: VadSettings,

    /// Bundled wake word engine settings
    pub wake_word: WakeWordConfig,

    /// Intent classification settings
    pub intent: IntentConfig,

    /// Generative model (slow path, conversation)
    pub llm: LlmConfig,

    /// Embedding service (fast path)
    pub embedding: ServiceConfig,

    /// Speech-to-text service
    pub stt: ServiceConfig,

    /// Text-to-speech service
    pub tts: TtsConfig,

    /// Consumer loop settings
    pub daemon: DaemonConfig,
}

/// Audio stream format
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Samples per frame handed to the wake word engine and VAD
    pub frame_length: usize,
}

/// Wake word settings
#[derive(Debug, Clone)]
pub struct WakeWordConfig {
    /// RMS level a frame must exceed to count as loud
    pub threshold: f32,

    /// Consecutive loud frames needed to fire
    pub trigger_frames: usize,

    /// Phrases a transcript must contain to be acted on, lowercase
    ///
    /// Empty accepts every transcript.
    pub phrases: Vec<String>,
}

/// Intent classification settings
#[derive(Debug, Clone)]
pub struct IntentConfig {
    /// Path to the intent catalog JSON file
    pub catalog_path: PathBuf,

    /// Minimum cosine similarity for a fast-path match
    pub similarity_threshold: f32,

    /// Fast-path confidence at which the LLM is skipped
    pub fast_accept_threshold: f32,

    /// Final confidence required before dispatching to an agent
    pub dispatch_threshold: f32,
}

/// Generative model settings (Ollama)
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Ollama base URL
    pub host: String,

    /// Model name
    pub model: String,

    /// Context window
    pub num_ctx: u64,

    /// Generation cap
    pub max_tokens: u64,
}

/// An OpenAI-compatible HTTP service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Base URL including the version prefix (e.g. `https://api.openai.com/v1`)
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Bearer token, if the service needs one
    pub api_key: Option<String>,
}

impl ServiceConfig {
    /// Join `path` onto the base URL
    ///
    /// HTTPS endpoints are treated as hosted and require an API key.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or a hosted endpoint has no key
    pub fn endpoint(&self, path: &str, label: &str) -> Result<url::Url> {
        let base = format!("{}/", self.base_url.trim_end_matches('/'));
        let endpoint = url::Url::parse(&base)?.join(path)?;

        if endpoint.scheme() == "https" && self.api_key.is_none() {
            return Err(Error::Config(format!(
                "{label} endpoint {} requires an API key",
                self.base_url
            )));
        }

        Ok(endpoint)
    }
}

/// Text-to-speech settings
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Service endpoint
    pub service: ServiceConfig,

    /// Voice identifier
    pub voice: String,

    /// Speed multiplier (0.25 to 4.0)
    pub speed: f32,

    /// Per-request timeout for queued synthesis
    pub timeout: Duration,
}

/// Consumer loop settings
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// How often the consumer checks for a finished command
    pub poll_interval: Duration,

    /// Speak responses aloud (disable for text-only operation)
    pub speak_responses: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::build(&ConfigSource::new())
    }
}

impl Config {
    /// Load configuration from a file (or the default path) and environment
    ///
    /// # Errors
    ///
    /// Returns error if an explicit file cannot be loaded or a value is out of range
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let source = ConfigSource::load(path)?;
        Self::from_source(&source)
    }

    /// Build and validate configuration from a source
    ///
    /// # Errors
    ///
    /// Returns error if a threshold is outside [0, 1] or a frame setting is zero
    pub fn from_source(source: &ConfigSource) -> Result<Self> {
        let config = Self::build(source);
        config.validate()?;
        Ok(config)
    }

    fn build(source: &ConfigSource) -> Self {
        let defaults = VadSettings::default();
        let openai_key = std::env::var("OPENAI_API_KEY").ok();

        let vad = VadSettings {
            threshold: source.get_float("vad.threshold", defaults.threshold),
            silent_frames_after_speech: to_u32(
                source.get_u64(
                    "vad.silent_frames_after_speech",
                    u64::from(defaults.silent_frames_after_speech),
                ),
                defaults.silent_frames_after_speech,
            ),
            silent_frames_no_speech: to_u32(
                source.get_u64(
                    "vad.silent_frames_no_speech",
                    u64::from(defaults.silent_frames_no_speech),
                ),
                defaults.silent_frames_no_speech,
            ),
            min_command_ms: source.get_u64("vad.min_command_ms", defaults.min_command_ms),
            max_command_ms: source.get_u64("vad.max_command_ms", defaults.max_command_ms),
        };

        let audio = AudioConfig {
            sample_rate: to_u32(
                source.get_u64("audio.sample_rate", u64::from(crate::voice::SAMPLE_RATE)),
                crate::voice::SAMPLE_RATE,
            ),
            frame_length: to_usize(source.get_u64("audio.frame_length", 512), 512),
        };

        let wake_word = WakeWordConfig {
            threshold: source.get_float("wake_word.threshold", 0.08),
            trigger_frames: to_usize(source.get_u64("wake_word.trigger_frames", 8), 8),
            phrases: parse_list(&source.get("wake_word.phrases", "hey loki,loki")),
        };

        let intent = IntentConfig {
            catalog_path: PathBuf::from(source.get("intent.catalog_path", "assets/intents.json")),
            similarity_threshold: source.get_float(
                "intent.similarity_threshold",
                crate::intent::DEFAULT_SIMILARITY_THRESHOLD,
            ),
            fast_accept_threshold: source.get_float(
                "intent.fast_accept_threshold",
                crate::intent::DEFAULT_FAST_ACCEPT_THRESHOLD,
            ),
            dispatch_threshold: source.get_float(
                "intent.dispatch_threshold",
                crate::intent::DEFAULT_DISPATCH_THRESHOLD,
            ),
        };

        let llm = LlmConfig {
            host: source.get("llm.host", "http://localhost:11434"),
            model: source.get("llm.model", "dolphin-phi"),
            num_ctx: source.get_u64("llm.num_ctx", 1024),
            max_tokens: source.get_u64("llm.max_tokens", 128),
        };

        let embedding = ServiceConfig {
            base_url: source.get("embedding.base_url", "http://localhost:11434/v1"),
            model: source.get("embedding.model", "nomic-embed-text"),
            api_key: source.get_opt("embedding.api_key"),
        };

        let stt = ServiceConfig {
            base_url: source.get("stt.base_url", "https://api.openai.com/v1"),
            model: source.get("stt.model", "whisper-1"),
            api_key: source.get_opt("stt.api_key").or_else(|| openai_key.clone()),
        };

        let tts = TtsConfig {
            service: ServiceConfig {
                base_url: source.get("tts.base_url", "https://api.openai.com/v1"),
                model: source.get("tts.model", "tts-1"),
                api_key: source.get_opt("tts.api_key").or(openai_key),
            },
            voice: source.get("tts.voice", "alloy"),
            speed: source.get_float("tts.speed", 1.0),
            timeout: Duration::from_millis(source.get_u64("tts.timeout_ms", 10_000)),
        };

        let daemon = DaemonConfig {
            poll_interval: Duration::from_millis(source.get_u64("daemon.poll_interval_ms", 50)),
            speak_responses: source.get_bool("daemon.speak_responses", true),
        };

        Self {
            audio,
            vad,
            wake_word,
            intent,
            llm,
            embedding,
            stt,
            tts,
            daemon,
        }
    }

    fn validate(&self) -> Result<()> {
        let thresholds = [
            ("intent.similarity_threshold", self.intent.similarity_threshold),
            ("intent.fast_accept_threshold", self.intent.fast_accept_threshold),
            ("intent.dispatch_threshold", self.intent.dispatch_threshold),
            ("vad.threshold", self.vad.threshold),
        ];

        for (key, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{key} must be between 0 and 1, got {value}")));
            }
        }

        if self.audio.frame_length == 0 || self.audio.sample_rate == 0 {
            return Err(Error::Config(
                "audio.frame_length and audio.sample_rate must be non-zero".to_string(),
            ));
        }

        if self.vad.silent_frames_after_speech == 0 || self.vad.silent_frames_no_speech == 0 {
            return Err(Error::Config("VAD silent frame counts must be non-zero".to_string()));
        }

        Ok(())
    }
}

/// Split a comma-separated list, dropping blank entries
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn to_u32(value: u64, default: u32) -> u32 {
    u32::try_from(value).unwrap_or(default)
}

fn to_usize(value: u64, default: usize) -> usize {
    usize::try_from(value).unwrap_or(default)
}
