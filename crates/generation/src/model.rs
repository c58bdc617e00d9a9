use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

use crate::config::{GenerationConfig, GenerationMode};
use crate::error::{GenerationError, Result};
use crate::prompt::{CompletionRequest, RequestKind};
use crate::stream::SseAccumulator;

/// A language model that answers one user message with one (accumulated) text response.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Resolve the model described by `config`.
pub fn model_from_config(config: &GenerationConfig) -> Result<Box<dyn ChatModel>> {
    match config.mode {
        GenerationMode::Echo => Ok(Box::new(EchoModel)),
        GenerationMode::Remote => Ok(Box::new(OpenAiCompatModel::from_config(config)?)),
    }
}

/// Offline model: code requests echo the payload, classification always answers `False`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoModel;

#[async_trait]
impl ChatModel for EchoModel {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        Ok(match request.kind {
            RequestKind::Code => request.payload.clone(),
            RequestKind::Classify => "False".to_string(),
        })
    }
}

/// Streaming client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiCompatModel {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiCompatModel {
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(GenerationError::unavailable("no generation endpoint configured"));
        }
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            log::warn!(
                "{} is not set; sending generation requests without credentials",
                config.api_key_env
            );
        }
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GenerationError::unavailable(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            timeout: config.timeout(),
        })
    }

    async fn stream_completion(&self, request: &CompletionRequest) -> Result<String> {
        let body = json!({
            "model": self.model,
            "stream": true,
            "messages": [{ "role": "user", "content": request.message_text() }],
        });
        let mut builder = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let mut acc = SseAccumulator::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            acc.push(&chunk?);
            if acc.is_done() {
                break;
            }
        }
        Ok(acc.finish())
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        tokio::time::timeout(self.timeout, self.stream_completion(request))
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))?
    }
}
