use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::{GenerationError, Result};

/// How code is produced.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    /// Stream completions from an OpenAI-compatible chat endpoint.
    #[default]
    Remote,
    /// Offline passthrough: the request text is returned as the code.
    Echo,
}

impl GenerationMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "echo" => Ok(Self::Echo),
            other => Err(GenerationError::invalid_config(format!(
                "Unsupported generation mode '{other}' (expected 'remote' or 'echo')"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Echo => "echo",
        }
    }
}

/// Settings for the generation client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub mode: GenerationMode,

    /// Chat-completions URL of an OpenAI-compatible service
    pub endpoint: String,

    /// Model name sent with every request
    pub model: String,

    /// Name of the environment variable holding the API key (the key itself never lives in config)
    pub api_key_env: String,

    /// Upper bound for a single generation request, in seconds
    pub timeout_secs: u64,

    /// How many leading characters of a file are sent for prompt classification
    pub classify_prefix_chars: usize,

    /// Target language named in the code template
    pub language: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            mode: GenerationMode::Remote,
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
            classify_prefix_chars: 100,
            language: "Python".to_string(),
        }
    }
}

impl GenerationConfig {
    /// Offline configuration used by smoke tests and demos
    pub fn echo() -> Self {
        Self {
            mode: GenerationMode::Echo,
            ..Self::default()
        }
    }

    /// Defaults overridden by `CONDOR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Apply `CONDOR_*` environment overrides on top of `self`.
    pub fn merge_env(mut self) -> Result<Self> {
        if let Ok(raw) = env::var("CONDOR_GENERATION_MODE") {
            self.mode = GenerationMode::parse(&raw)?;
        }
        if let Ok(endpoint) = env::var("CONDOR_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(model) = env::var("CONDOR_MODEL") {
            self.model = model;
        }
        if let Ok(name) = env::var("CONDOR_API_KEY_ENV") {
            self.api_key_env = name;
        }
        if let Ok(raw) = env::var("CONDOR_TIMEOUT_SECS") {
            self.timeout_secs = raw.trim().parse().map_err(|_| {
                GenerationError::invalid_config(format!("CONDOR_TIMEOUT_SECS '{raw}' is not a number"))
            })?;
        }
        if let Ok(raw) = env::var("CONDOR_CLASSIFY_CHARS") {
            self.classify_prefix_chars = raw.trim().parse().map_err(|_| {
                GenerationError::invalid_config(format!("CONDOR_CLASSIFY_CHARS '{raw}' is not a number"))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(GenerationError::invalid_config("timeout_secs must be > 0"));
        }
        if self.classify_prefix_chars == 0 {
            return Err(GenerationError::invalid_config(
                "classify_prefix_chars must be > 0",
            ));
        }
        if self.mode == GenerationMode::Remote && self.endpoint.trim().is_empty() {
            return Err(GenerationError::invalid_config(
                "endpoint is required in remote mode",
            ));
        }
        Ok(())
    }
}
