//! Text embedding for the fast classifier

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::ServiceConfig;
use crate::{Error, Result};

/// Produces fixed-width embedding vectors
///
/// An empty vector is treated as a failure by callers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    ///
    /// # Errors
    ///
    /// Returns error if the embedding service fails
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order
    ///
    /// # Errors
    ///
    /// Returns error if any embedding fails
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint
#[derive(Debug)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: url::Url,
    api_key: Option<SecretString>,
    model: String,
}

impl HttpEmbedder {
    /// Create a new embedder
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or a hosted endpoint has no API key
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        if config.model.trim().is_empty() {
            return Err(Error::Config("embedding.model must be set".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint("embeddings", "embedding")?,
            api_key: config.api_key.clone().map(SecretString::from),
            model: config.model.clone(),
        })
    }

    /// Model identifier
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        #[derive(serde::Serialize)]
        struct EmbeddingRequest<'a> {
            model: &'a str,
            input: &'a [&'a str],
        }

        #[derive(serde::Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(serde::Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
            index: usize,
        }

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut builder = self.client.post(self.endpoint.clone()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!("Embedding API error {status}: {body}")));
        }

        let mut result: EmbeddingResponse = response.json().await?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        // Sort by index to maintain input order
        result.data.sort_by_key(|d| d.index);

        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_model_rejected() {
        let config = ServiceConfig {
            base_url: "http://localhost:11434/v1".to_string(),
            model: " ".to_string(),
            api_key: None,
        };
        assert!(matches!(HttpEmbedder::new(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_local_endpoint_needs_no_key() {
        let config = ServiceConfig {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
        };
        let embedder = HttpEmbedder::new(&config).unwrap();
        assert_eq!(embedder.model(), "nomic-embed-text");
        assert_eq!(embedder.endpoint.as_str(), "http://localhost:11434/v1/embeddings");
    }
}
