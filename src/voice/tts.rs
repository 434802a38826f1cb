//! Text-to-speech (TTS) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::TtsConfig;
use crate::{Error, Result};

/// Synthesizes speech from text
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize text to encoded audio bytes (WAV or MP3)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;
}

/// Synthesizes through an OpenAI-compatible `/audio/speech` endpoint
pub struct HttpSynthesizer {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<SecretString>,
    voice: String,
    speed: f32,
    model: String,
}

impl HttpSynthesizer {
    /// Create a new synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or a hosted endpoint has no API key
    pub fn new(config: &TtsConfig) -> Result<Self> {
        let endpoint = config.service.endpoint("audio/speech", "TTS")?;

        if !(0.25..=4.0).contains(&config.speed) {
            return Err(Error::Config(format!(
                "tts.speed must be between 0.25 and 4.0, got {}",
                config.speed
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key: config.service.api_key.clone().map(SecretString::from),
            voice: config.voice.clone(),
            speed: config.speed,
            model: config.service.model.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "wav",
        };

        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }
}
