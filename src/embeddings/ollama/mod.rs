
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::OllamaConfig;
use crate::embeddings::Embedder;
use crate::http::{build_agent, is_success, read_response, run_blocking};
use crate::{Result, StudioError};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
    concurrency: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub text: String,
    pub embedding: Vec<f32>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| StudioError::Config(e.to_string()))?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
            concurrency: config.concurrency.max(1),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Test connection to Ollama server and verify model availability
    #[inline]
    pub fn check_connection(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models()?;

        // Ollama reports tagged names, so "mxbai-embed-large" matches "mxbai-embed-large:latest"
        let available = models.iter().any(|m| {
            m.name == self.model || m.name.split(':').next() == Some(self.model.as_str())
        });

        if available {
            info!(
                "Health check passed for Ollama server at {} with model {}",
                self.base_url, self.model
            );
            Ok(())
        } else {
            let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available_models
            );
            Err(StudioError::Embedding(format!(
                "Model '{}' is not available. Available models: {:?}",
                self.model, available_models
            )))
        }
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;
        debug!("Fetching available models from {}", url);

        let response = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(read_response);
        let body = self.check_response(response)?;

        let models_response: ModelsResponse = serde_json::from_str(&body).map_err(|e| {
            StudioError::Embedding(format!("Failed to parse models response: {}", e))
        })?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate an embedding for a single text input
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> Result<EmbeddingResult> {
        debug!("Generating embedding for text (length: {})", text.len());

        let url = self.endpoint("/api/embeddings")?;
        let request_json = serde_json::to_string(&EmbedRequest {
            model: &self.model,
            prompt: text,
        })
        .map_err(|e| {
            StudioError::Embedding(format!("Failed to serialize embedding request: {}", e))
        })?;

        let response = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(request_json.as_str())
            .and_then(read_response);
        let body = self.check_response(response)?;

        let embed_response: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            StudioError::Embedding(format!("Failed to parse embedding response: {}", e))
        })?;

        if embed_response.embedding.is_empty() {
            return Err(StudioError::Embedding(format!(
                "Model '{}' returned an empty embedding",
                self.model
            )));
        }

        debug!(
            "Generated embedding with {} dimensions",
            embed_response.embedding.len()
        );

        Ok(EmbeddingResult {
            text: text.to_string(),
            embedding: embed_response.embedding,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| StudioError::Config(format!("Failed to build Ollama URL: {}", e)))
    }

    fn check_response(
        &self,
        response: std::result::Result<(u16, String), ureq::Error>,
    ) -> Result<String> {
        match response {
            Ok((status, body)) if is_success(status) => Ok(body),
            Ok((status, body)) => {
                let message = serde_json::from_str::<ErrorResponse>(&body)
                    .map_or(body, |e| e.error);
                warn!("Ollama returned HTTP {}: {}", status, message);
                Err(StudioError::Embedding(format!(
                    "Ollama returned HTTP {}: {}",
                    status, message
                )))
            }
            Err(e) => {
                error!("Failed to reach Ollama at {}: {}", self.base_url, e);
                Err(StudioError::Embedding(format!(
                    "Failed to reach Ollama at {}: {}",
                    self.base_url, e
                )))
            }
        }
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    /// One request per text, up to `concurrency` in flight, reassembled in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Generating embeddings for {} texts with concurrency {}",
            texts.len(),
            self.concurrency
        );

        let embeddings: Vec<Vec<f32>> = futures::stream::iter(texts.iter().cloned())
            .map(|text| {
                let client = self.clone();
                run_blocking(move || {
                    client
                        .generate_embedding(&text)
                        .map(|result| result.embedding)
                })
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        debug!("Generated {} embeddings total", embeddings.len());
        Ok(embeddings)
    }

    async fn health_check(&self) -> Result<()> {
        let client = self.clone();
        run_blocking(move || client.check_connection()).await
    }
}
