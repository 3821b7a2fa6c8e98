//! Scripted provider for deterministic gateway, planner and executor tests

use super::gateway::{GatewaySettings, ModelGateway, RetryPolicy};
use super::{CompletionRequest, LLMError, LLMProvider, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) struct ScriptedProvider {
    name: String,
    rules: Mutex<Vec<(String, Result<String>)>>,
    queue: Mutex<VecDeque<Result<String>>>,
    when_empty: Result<String>,
    requests: Mutex<Vec<CompletionRequest>>,
    embed_calls: Mutex<usize>,
}

impl ScriptedProvider {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rules: Mutex::new(Vec::new()),
            queue: Mutex::new(VecDeque::new()),
            when_empty: Err(LLMError::ProviderUnavailable("script exhausted".into())),
            requests: Mutex::new(Vec::new()),
            embed_calls: Mutex::new(0),
        }
    }

    /// Queue a reply, consumed in order
    pub(crate) fn reply(self, content: impl Into<String>) -> Self {
        self.queue.lock().unwrap().push_back(Ok(content.into()));
        self
    }

    /// Queue a failure, consumed in order
    pub(crate) fn fail(self, err: LLMError) -> Self {
        self.queue.lock().unwrap().push_back(Err(err));
        self
    }

    /// Answer every request whose prompt contains `needle`, ahead of the queue
    pub(crate) fn when(self, needle: &str, response: Result<String>) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push((needle.to_string(), response));
        self
    }

    /// What to return once the queue is empty
    pub(crate) fn otherwise(mut self, response: Result<String>) -> Self {
        self.when_empty = response;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn embed_calls(&self) -> usize {
        *self.embed_calls.lock().unwrap()
    }
}

/// Retry policy without backoff delays
pub(crate) fn instant_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        jitter: false,
    }
}

/// Gateway over a scripted provider with three instant attempts
pub(crate) fn scripted_gateway(provider: Arc<ScriptedProvider>) -> ModelGateway {
    ModelGateway::new(provider, instant_policy(3), GatewaySettings::default())
}

/// Bag-of-words embedding: texts sharing words get a high cosine similarity
pub(crate) fn word_hash_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; 64];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let hash = blake3::hash(word.to_lowercase().as_bytes());
        let slot = hash.as_bytes()[0] as usize % vector.len();
        vector[slot] += 1.0;
    }
    vector
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());

        let prompt: String = request
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        if let Some((_, response)) = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
        {
            return response.clone();
        }

        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.when_empty.clone())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        *self.embed_calls.lock().unwrap() += 1;
        Ok(word_hash_embedding(text))
    }
}
