//! Speech-to-text (STT) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::capture::samples_to_wav;
use crate::config::ServiceConfig;
use crate::{Error, Result};

/// Converts a finished command buffer to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe 16kHz mono samples; an empty string means no speech
    ///
    /// # Errors
    ///
    /// Returns error if the transcription service fails
    async fn transcribe(&self, samples: &[f32]) -> Result<String>;
}

/// Response from an OpenAI-compatible transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes through an OpenAI-compatible `/audio/transcriptions` endpoint
pub struct WhisperTranscriber {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<SecretString>,
    model: String,
    sample_rate: u32,
}

impl WhisperTranscriber {
    /// Create a new transcriber
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or a hosted endpoint has no API key
    pub fn new(config: &ServiceConfig, sample_rate: u32) -> Result<Self> {
        let endpoint = config.endpoint("audio/transcriptions", "STT")?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key: config.api_key.clone().map(SecretString::from),
            model: config.model.clone(),
            sample_rate,
        })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, samples: &[f32]) -> Result<String> {
        let audio = samples_to_wav(samples, self.sample_rate)?;
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let mut request = self.client.post(self.endpoint.clone()).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "Whisper request failed");
            e
        })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        let text = result.text.trim().to_string();
        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}
