use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Adapter-side settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdapterConfig {
    /// How long a launch waits for `configurationDone` before starting anyway
    pub configuration_done_wait_ms: u64,

    /// Directory receiving the generated program; the system temp dir when unset
    pub storage_dir: Option<PathBuf>,

    /// Number of updates in the REPL `progress` demo
    pub progress_steps: u32,

    pub progress_step_delay_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            configuration_done_wait_ms: 1000,
            storage_dir: None,
            progress_steps: 100,
            progress_step_delay_ms: 500,
        }
    }
}

impl AdapterConfig {
    /// Overlay `CONDOR_STORAGE_DIR`.
    pub fn merge_env(mut self) -> Self {
        if let Ok(dir) = std::env::var("CONDOR_STORAGE_DIR") {
            if !dir.trim().is_empty() {
                self.storage_dir = Some(PathBuf::from(dir));
            }
        }
        self
    }

    pub fn configuration_done_wait(&self) -> Duration {
        Duration::from_millis(self.configuration_done_wait_ms)
    }

    pub fn progress_step_delay(&self) -> Duration {
        Duration::from_millis(self.progress_step_delay_ms)
    }

    pub fn resolved_storage_dir(&self) -> PathBuf {
        self.storage_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("condor"))
    }
}
