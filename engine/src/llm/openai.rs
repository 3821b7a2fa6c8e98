//! OpenAI-compatible provider
//!
//! Works against any server exposing `/chat/completions` and `/embeddings`
//! with bearer authentication. The API key is read from the environment
//! variable named in config, never from the config file itself.

use super::{CompletionRequest, LLMError, LLMProvider, Result};
use crate::config::OpenAIConfig;
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct OpenAIProvider {
    base_url: String,
    model: String,
    embed_model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &OpenAIConfig, api_key: Option<String>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embed_model: config.embed_model.clone(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: reqwest::Client::new(),
        }
    }

    /// Build from config, reading the key from `config.api_key_env`
    pub fn from_env(config: &OpenAIConfig) -> Self {
        Self::new(config, std::env::var(&config.api_key_env).ok())
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            LLMError::AuthenticationFailed("OpenAI API key is not set".to_string())
        })
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<Value> {
        let api_key = self.api_key()?;
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| LLMError::from_transport(e, "OpenAI", &self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LLMError::from_status(status, "OpenAI", &error_text));
        }

        response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Failed to parse OpenAI response: {}", e)))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn check_health(&self) -> bool {
        self.api_key.is_some()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|msg| json!({ "role": msg.role.to_string(), "content": msg.content }))
            .collect();

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if let Some(top_p) = request.top_p {
            payload["top_p"] = json!(top_p);
        }
        if request.json_mode {
            payload["response_format"] = json!({ "type": "json_object" });
        }

        let body = self.post("/chat/completions", &payload).await?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| {
                LLMError::ParseError("Missing choices[0].message.content".to_string())
            })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let payload = json!({ "model": self.embed_model, "input": text });
        let body = self.post("/embeddings", &payload).await?;

        let values = body["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| LLMError::ParseError("Missing data[0].embedding".to_string()))?;

        values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| LLMError::ParseError("Non-numeric embedding value".to_string()))
            })
            .collect()
    }
}
