use crate::config::ProviderConfig;
use crate::SearchError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Requests per embeddings call; keeps single payloads well under the API limits.
const OPENAI_BATCH_SIZE: usize = 64;

const OPENAI_PROVIDER: &str = "openai";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError>;

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SearchError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        Ok(self.embed_text(text))
    }
}

/// Embeddings through the OpenAI-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    provider: ProviderConfig,
}

impl OpenAiEmbedder {
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            provider,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub(crate) error: ApiErrorDetail,
}

#[derive(Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub(crate) message: String,
}

/// Pulls `error.message` out of an OpenAI error body, falling back to the raw body.
pub(crate) fn api_error_message(body: String) -> String {
    serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|parsed| parsed.error.message)
        .unwrap_or(body)
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.provider.embedding_dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, SearchError> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::Embedding {
                provider: OPENAI_PROVIDER.to_string(),
                message: "api returned no embedding".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, SearchError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = self
            .provider
            .api_key()
            .ok_or_else(|| SearchError::Unauthorized {
                provider: OPENAI_PROVIDER.to_string(),
            })?;
        let endpoint = self.provider.endpoint("embeddings")?;

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(OPENAI_BATCH_SIZE) {
            debug!(
                batch_size = batch.len(),
                model = %self.provider.embedding_model,
                "embedding batch"
            );

            let response = self
                .client
                .post(endpoint.clone())
                .bearer_auth(api_key)
                .json(&EmbeddingRequest {
                    model: &self.provider.embedding_model,
                    input: batch,
                })
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                error!(%status, "embedding request rejected");
                return Err(SearchError::Unauthorized {
                    provider: OPENAI_PROVIDER.to_string(),
                });
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                error!(%status, "embedding request failed");
                return Err(SearchError::Embedding {
                    provider: OPENAI_PROVIDER.to_string(),
                    message: format!("api returned {status}: {}", api_error_message(body)),
                });
            }

            let parsed: EmbeddingResponse = response.json().await?;
            if parsed.data.len() != batch.len() {
                return Err(SearchError::Embedding {
                    provider: OPENAI_PROVIDER.to_string(),
                    message: format!(
                        "asked for {} embeddings, received {}",
                        batch.len(),
                        parsed.data.len()
                    ),
                });
            }

            for item in parsed.data {
                if item.embedding.len() != self.dimensions() {
                    return Err(SearchError::DimensionMismatch {
                        expected: self.dimensions(),
                        found: item.embedding.len(),
                    });
                }
                vectors.push(item.embedding);
            }
        }

        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::{api_error_message, CharacterNgramEmbedder, Embedder, OpenAiEmbedder};
    use crate::config::ProviderConfig;
    use crate::SearchError;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed_text("Net profit for the year");
        let second = embedder.embed_text("Net profit for the year");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn embedder_outputs_expected_length() -> Result<(), SearchError> {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc").await?;
        assert_eq!(vector.len(), 32);
        assert_eq!(embedder.dimensions(), 32);
        Ok(())
    }

    #[tokio::test]
    async fn batch_embedding_preserves_order() -> Result<(), SearchError> {
        let embedder = CharacterNgramEmbedder::default();
        let batch = embedder.embed_batch(&["revenue", "dividend"]).await?;
        assert_eq!(batch[0], embedder.embed_text("revenue"));
        assert_eq!(batch[1], embedder.embed_text("dividend"));
        Ok(())
    }

    #[tokio::test]
    async fn openai_embedder_without_key_is_unauthorized() {
        let embedder = OpenAiEmbedder::new(ProviderConfig::default());
        let result = embedder.embed("net profit").await;
        assert!(matches!(result, Err(SearchError::Unauthorized { .. })));
    }

    #[test]
    fn api_error_body_is_unwrapped() {
        let body = r#"{"error":{"message":"Rate limit reached","type":"requests"}}"#;
        assert_eq!(api_error_message(body.to_string()), "Rate limit reached");
        assert_eq!(api_error_message("gateway timeout".to_string()), "gateway timeout");
    }
}
