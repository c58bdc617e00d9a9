use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::GenerationConfig;
use crate::error::{GenerationError, Result};
use crate::model::{model_from_config, ChatModel};
use crate::prompt::{parse_strict_bool, strip_code_fence, CompletionRequest};

/// Entry point for code generation and prompt classification.
///
/// The model handle is resolved on first use and cached until [`GenerationClient::reset`].
pub struct GenerationClient {
    config: GenerationConfig,
    model: Mutex<Option<Arc<dyn ChatModel>>>,
}

impl GenerationClient {
    pub fn new(config: GenerationConfig) -> Self {
        Self {
            config,
            model: Mutex::new(None),
        }
    }

    /// Client bound to an already constructed model (tests, embedding hosts).
    pub fn with_model(config: GenerationConfig, model: Arc<dyn ChatModel>) -> Self {
        Self {
            config,
            model: Mutex::new(Some(model)),
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Drop the cached model; the next request resolves it again from config.
    pub async fn reset(&self) {
        self.model.lock().await.take();
    }

    async fn model(&self) -> Result<Arc<dyn ChatModel>> {
        let mut guard = self.model.lock().await;
        if let Some(model) = guard.as_ref() {
            return Ok(Arc::clone(model));
        }
        let model: Arc<dyn ChatModel> = Arc::from(model_from_config(&self.config)?);
        log::info!("Using generation model '{}'", model.name());
        *guard = Some(Arc::clone(&model));
        Ok(model)
    }

    /// Generate code, reporting why nothing usable came back.
    pub async fn try_generate_code(&self, text: &str) -> Result<String> {
        let model = self.model().await?;
        let request = CompletionRequest::code(&self.config.language, text);
        let response = model.complete(&request).await?;
        let code = strip_code_fence(&response);
        if code.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        log::debug!("Generated {} bytes of code", code.len());
        Ok(code)
    }

    /// Generate code for `text`; failures are logged and reported as `None`.
    pub async fn generate_code(&self, text: &str) -> Option<String> {
        match self.try_generate_code(text).await {
            Ok(code) => Some(code),
            Err(err) => {
                log::warn!("Code generation failed: {err}");
                None
            }
        }
    }

    /// Ask whether `text` reads like prompt content. Any failure or non-`true` answer is `false`.
    pub async fn classify_is_prompt_like(&self, text: &str) -> bool {
        let request = CompletionRequest::classify(text, self.config.classify_prefix_chars);
        let model = match self.model().await {
            Ok(model) => model,
            Err(err) => {
                log::warn!("Prompt classification skipped: {err}");
                return false;
            }
        };
        match model.complete(&request).await {
            Ok(answer) => {
                log::debug!("Classification answer: {answer:?}");
                parse_strict_bool(&answer)
            }
            Err(err) => {
                log::warn!("Prompt classification failed: {err}");
                false
            }
        }
    }
}
