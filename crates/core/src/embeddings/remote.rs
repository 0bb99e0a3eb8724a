use super::Embedder;
use crate::error::EmbedError;
use crate::models::EmbeddingVector;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Client for an OpenAI-compatible `/embeddings` endpoint. Requests are sent
/// once; errors are never retried.
#[derive(Clone)]
pub struct RemoteEmbeddingClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: EmbeddingVector,
    #[serde(default)]
    index: Option<usize>,
}

impl RemoteEmbeddingClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key: api_key.trim().to_string(),
        })
    }
}

#[async_trait]
impl Embedder for RemoteEmbeddingClient {
    async fn try_embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(endpoint = %self.endpoint, inputs = texts.len(), "requesting remote embeddings");
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: texts,
        });
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut payload: EmbeddingResponse = response.json().await?;
        if payload.data.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: payload.data.len(),
            });
        }
        if payload.data.iter().all(|item| item.index.is_some()) {
            payload.data.sort_by_key(|item| item.index);
        }

        Ok(payload.data.into_iter().map(|item| item.embedding).collect())
    }
}
