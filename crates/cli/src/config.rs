//! `condor.toml` loading and override layering.

use anyhow::{Context, Result};
use condor_dap::AdapterConfig;
use condor_debugger::InterpreterConfig;
use condor_generation::{GenerationConfig, GenerationMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "condor.toml";

/// Everything a `condor` invocation can be configured with.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CondorConfig {
    pub generation: GenerationConfig,
    pub interpreter: InterpreterConfig,
    pub adapter: AdapterConfig,
}

/// Command line overrides; `None` keeps the lower layers.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub mode: Option<GenerationMode>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub python: Option<String>,
    pub storage_dir: Option<PathBuf>,
}

impl CondorConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("invalid condor configuration")
    }

    /// Read `path`. A missing file is only an error when it was named explicitly.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        match std::fs::read_to_string(&path) {
            Ok(raw) => {
                log::debug!("Loaded configuration from {}", path.display());
                Self::parse(&raw).with_context(|| format!("in {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    /// Layer `CONDOR_*` environment variables over the file values.
    pub fn merge_env(self) -> Result<Self> {
        Ok(Self {
            generation: self.generation.merge_env()?,
            interpreter: self.interpreter.merge_env(),
            adapter: self.adapter.merge_env(),
        })
    }

    /// Command line flags win over everything else.
    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(mode) = overrides.mode {
            self.generation.mode = mode;
        }
        if let Some(endpoint) = overrides.endpoint {
            self.generation.endpoint = endpoint;
        }
        if let Some(model) = overrides.model {
            self.generation.model = model;
        }
        if let Some(python) = overrides.python {
            self.interpreter.program = python;
        }
        if let Some(dir) = overrides.storage_dir {
            self.adapter.storage_dir = Some(dir);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = CondorConfig::parse(
            r#"
            [generation]
            mode = "echo"
            model = "local-coder"

            [adapter]
            configuration_done_wait_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.generation.mode, GenerationMode::Echo);
        assert_eq!(config.generation.model, "local-coder");
        assert_eq!(config.generation.classify_prefix_chars, 100);
        assert_eq!(config.interpreter, InterpreterConfig::default());
        assert_eq!(config.adapter.configuration_done_wait_ms, 250);
        assert_eq!(config.adapter.progress_steps, 100);
    }

    #[test]
    fn flags_override_file_values() {
        let config = CondorConfig::parse("[interpreter]\nprogram = \"python3.11\"\n")
            .unwrap()
            .apply(Overrides {
                python: Some("pypy3".to_string()),
                storage_dir: Some(PathBuf::from("/tmp/condor-out")),
                ..Overrides::default()
            });
        assert_eq!(config.interpreter.program, "pypy3");
        assert_eq!(
            config.adapter.storage_dir.as_deref(),
            Some(Path::new("/tmp/condor-out"))
        );
    }

    #[test]
    fn missing_default_file_is_fine_but_named_file_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let named = dir.path().join("absent.toml");
        assert!(CondorConfig::load(Some(&named)).is_err());

        let file = dir.path().join("condor.toml");
        std::fs::write(&file, "[generation]\nmode = \"echo\"\n").unwrap();
        let config = CondorConfig::load(Some(&file)).unwrap();
        assert_eq!(config.generation.mode, GenerationMode::Echo);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(CondorConfig::parse("[generation]\nmode = \"telepathy\"\n").is_err());
    }
}
