//! Ollama client for embeddings and completions with retry logic

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::{EmbeddingConfig, LlmConfig};
use crate::error::{Error, Result};
use crate::types::TokenUsage;

use super::embedding::Embedder;
use super::llm::{Completer, Completion, CompletionChunk, CompletionStream};

/// Ollama API client with automatic retry
pub struct OllamaClient {
    /// HTTP client
    client: Client,
    base_url: String,
    generate_model: String,
    embed_model: String,
    dimensions: usize,
    /// Maximum retries
    max_retries: u32,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

impl GenerateResponse {
    fn usage(&self) -> TokenUsage {
        TokenUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        )
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl OllamaClient {
    /// Create a new Ollama client with retry support
    pub fn new(llm: &LlmConfig, embeddings: &EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(llm.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            generate_model: llm.generate_model.clone(),
            embed_model: embeddings.model.clone(),
            dimensions: embeddings.dimensions,
            max_retries: llm.max_retries,
        })
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                        tracing::warn!(
                            "Ollama request failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            self.max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::generation("Unknown Ollama error")))
    }

    async fn embed_once(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbedRequest {
            model: &self.embed_model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::retrieval(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::retrieval(format!(
                "Embedding failed: HTTP {}",
                response.status()
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::retrieval(format!("Failed to parse embedding response: {}", e)))?;

        if embed_response.embedding.is_empty() {
            return Err(Error::retrieval("Embedding response was empty"));
        }

        Ok(embed_response.embedding)
    }

    async fn complete_once(&self, prompt: &str, temperature: f32) -> Result<Completion> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.generate_model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::generation(format!("Generation request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::generation(format!(
                "Generation failed: HTTP {} - {}",
                status, body
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::generation(format!("Failed to parse generation response: {}", e)))?;

        Ok(Completion {
            usage: generated.usage(),
            text: generated.response,
        })
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.retry_request(|| self.embed_once(text)).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[async_trait]
impl Completer for OllamaClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<Completion> {
        tracing::debug!(
            "Completing with model {} (temperature {:.2})",
            self.generate_model,
            temperature
        );
        self.retry_request(|| self.complete_once(prompt, temperature)).await
    }

    async fn stream(&self, prompt: &str, temperature: f32) -> Result<CompletionStream> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.generate_model,
            prompt,
            stream: true,
            options: GenerateOptions { temperature },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::generation(format!("Stream request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::generation(format!(
                "Stream failed: HTTP {}",
                response.status()
            )));
        }

        // NDJSON lines can straddle network chunks, so buffer partial lines
        let chunks = response
            .bytes_stream()
            .scan(String::new(), |buffer, bytes| {
                let items = match bytes {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        drain_ndjson_lines(buffer)
                    }
                    Err(e) => vec![Err(Error::generation(format!("Stream error: {}", e)))],
                };
                futures_util::future::ready(Some(items))
            })
            .flat_map(stream::iter);

        Ok(chunks.boxed())
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.generate_model
    }
}

/// Parse every complete line in the buffer, leaving a trailing partial line behind
fn drain_ndjson_lines(buffer: &mut String) -> Vec<Result<CompletionChunk>> {
    let mut items = Vec::new();

    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<GenerateResponse>(line) {
            Ok(parsed) => items.push(Ok(CompletionChunk {
                usage: parsed.done.then(|| parsed.usage()),
                done: parsed.done,
                text: parsed.response,
            })),
            Err(e) => items.push(Err(Error::generation(format!(
                "Malformed stream line: {}",
                e
            )))),
        }
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_keeps_partial_line() {
        let mut buffer = String::from(
            "{\"response\":\"Hel\",\"done\":false}\n{\"response\":\"lo\",\"do",
        );
        let items = drain_ndjson_lines(&mut buffer);

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().text, "Hel");
        assert_eq!(buffer, "{\"response\":\"lo\",\"do");

        buffer.push_str("ne\":true,\"prompt_eval_count\":12,\"eval_count\":3}\n");
        let items = drain_ndjson_lines(&mut buffer);
        let last = items[0].as_ref().unwrap();
        assert!(last.done);
        assert_eq!(last.usage, Some(TokenUsage::new(12, 3)));
        assert!(buffer.is_empty());
    }
}
