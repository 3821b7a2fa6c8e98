//! Ollama LLM Provider
//!
//! Local provider, typically at http://localhost:11434. Uses `/api/chat` for
//! completions (with `format: "json"` in structured mode) and
//! `/api/embeddings` for embeddings.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CompletionRequest, LLMError, LLMProvider, Message, Result};
use crate::config::OllamaConfig;

/// Ollama provider
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    embed_model: String,
    client: Client,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Arguments
    /// * `base_url` - Base URL for Ollama API (e.g., "http://localhost:11434")
    /// * `model` - Chat model name (e.g., "llama3.1:8b")
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self::with_timeout(base_url, model, Duration::from_secs(120))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        let model = model.into();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            embed_model: model.clone(),
            model,
            client,
        }
    }

    pub fn from_config(config: &OllamaConfig) -> Self {
        Self::with_timeout(
            &config.base_url,
            &config.model,
            Duration::from_secs(config.request_timeout_secs),
        )
        .with_embed_model(&config.embed_model)
    }

    pub fn with_embed_model(mut self, embed_model: impl Into<String>) -> Self {
        self.embed_model = embed_model.into();
        self
    }

    fn convert_messages(messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .map(|msg| OllamaMessage {
                role: msg.role.to_string(),
                content: msg.content.clone(),
            })
            .collect()
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| LLMError::from_transport(e, "Ollama", &self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::from_status(status, "Ollama", &error_text));
        }

        Ok(response)
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let messages = Self::convert_messages(&request.messages);

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            total_chars = messages.iter().map(|m| m.content.len()).sum::<usize>(),
            json_mode = request.json_mode,
            "Ollama chat request"
        );

        let body = OllamaRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            format: request.json_mode.then(|| "json".to_string()),
            options: OllamaOptions {
                temperature: request.temperature,
                top_p: request.top_p,
                num_predict: request.max_tokens,
            },
        };

        let start = std::time::Instant::now();
        let response = self.post("/api/chat", &body).await?;

        let parsed: OllamaResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Failed to parse Ollama response: {}", e)))?;

        tracing::debug!(
            "Ollama response received in {:.1}s",
            start.elapsed().as_secs_f64()
        );

        Ok(parsed.message.content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = OllamaEmbeddingRequest {
            model: &self.embed_model,
            prompt: text,
        };

        let response = self.post("/api/embeddings", &body).await?;
        let parsed: OllamaEmbeddingResponse = response.json().await.map_err(|e| {
            LLMError::ParseError(format!("Failed to parse Ollama embedding: {}", e))
        })?;

        if parsed.embedding.is_empty() {
            return Err(LLMError::ParseError("Ollama returned an empty embedding".into()));
        }
        Ok(parsed.embedding)
    }

    async fn check_health(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Ollama API request format
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    num_predict: u32,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

/// Ollama API response format
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(json_mode: bool) -> CompletionRequest {
        CompletionRequest {
            messages: vec![Message::system("plan"), Message::user("climate policy 2024")],
            json_mode,
            temperature: 0.2,
            top_p: None,
            max_tokens: 256,
        }
    }

    #[test]
    fn test_ollama_provider_properties() {
        let provider = OllamaProvider::new("http://localhost:11434/", "llama3.1:8b");
        assert_eq!(provider.name(), "ollama");
        assert!(provider.is_local());
        assert_eq!(provider.base_url, "http://localhost:11434");
    }

    #[tokio::test]
    async fn test_complete_sends_json_format() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"format": "json", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3.1:8b",
                "message": {"role": "assistant", "content": "{\"steps\": []}"},
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(server.uri(), "llama3.1:8b");
        let content = provider.complete(&request(true)).await.unwrap();
        assert_eq!(content, "{\"steps\": []}");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(server.uri(), "llama3.1:8b");
        let err = provider.complete(&request(false)).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_garbage_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(server.uri(), "llama3.1:8b");
        let err = provider.complete(&request(false)).await.unwrap_err();
        assert!(matches!(err, LLMError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_embed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embeddings"))
            .and(body_partial_json(json!({"model": "nomic-embed-text"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"embedding": [0.1, 0.2, 0.3]})),
            )
            .mount(&server)
            .await;

        let provider =
            OllamaProvider::new(server.uri(), "llama3.1:8b").with_embed_model("nomic-embed-text");
        let vector = provider.embed("hello").await.unwrap();
        assert_eq!(vector.len(), 3);
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        // Port 9 (discard) is almost never listening
        let provider = OllamaProvider::new("http://127.0.0.1:9", "llama3.1:8b");
        let err = provider.complete(&request(false)).await.unwrap_err();
        assert!(err.is_transient());
    }
}
