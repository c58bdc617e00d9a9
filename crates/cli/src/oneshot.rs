//! One-shot commands: generate code for a whole text file and optionally run it.

use anyhow::{Context, Result};
use condor_debugger::{ExecutionOutput, Interpreter};
use condor_generation::GenerationClient;
use condor_runtime::{ExecutionContextBuilder, FileAccessor, GENERATED_FILE_NAME};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How long the generated file stays on disk after a run.
pub const CLEANUP_DELAY: Duration = Duration::from_millis(2000);

/// Result of [`OneShot::run`]: the program's output plus the pending removal of its script.
pub struct RunOutcome {
    pub output: ExecutionOutput,
    pub cleanup: JoinHandle<()>,
}

/// Remove `path` after `delay` without holding up the caller.
pub fn schedule_removal(
    storage: Arc<dyn FileAccessor>,
    path: PathBuf,
    delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = storage.remove_file(&path).await {
            log::debug!("Could not remove {}: {e}", path.display());
        }
    })
}

pub struct OneShot {
    storage: Arc<dyn FileAccessor>,
    generation: Arc<GenerationClient>,
    interpreter: Interpreter,
    storage_dir: PathBuf,
}

impl OneShot {
    pub fn new(
        storage: Arc<dyn FileAccessor>,
        generation: Arc<GenerationClient>,
        interpreter: Interpreter,
        storage_dir: PathBuf,
    ) -> Self {
        Self {
            storage,
            generation,
            interpreter,
            storage_dir,
        }
    }

    pub fn generated_file(&self) -> PathBuf {
        self.storage_dir.join(GENERATED_FILE_NAME)
    }

    /// Context of the file's siblings plus the whole file, turned into code.
    pub async fn generate(&self, path: &Path) -> Result<String> {
        let text = self
            .storage
            .read_file(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let context = ExecutionContextBuilder::new(Arc::clone(&self.storage), Arc::clone(&self.generation))
            .build(path)
            .await;
        let prompt = format!("{context}\n{text}");
        log::debug!("Generating code for {} ({} chars)", path.display(), prompt.len());
        self.generation
            .try_generate_code(&prompt)
            .await
            .context("code generation failed")
    }

    /// Generate, persist and execute `path`; the generated file is removed [`CLEANUP_DELAY`]
    /// after the run, in the background.
    pub async fn run(&self, path: &Path) -> Result<RunOutcome> {
        let code = self.generate(path).await?;
        let script = self.generated_file();
        self.storage
            .write_file(&script, code.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", script.display()))?;
        log::info!("Running {}", script.display());

        match self.interpreter.run_file(&script).await {
            Ok(output) => Ok(RunOutcome {
                output,
                cleanup: schedule_removal(Arc::clone(&self.storage), script, CLEANUP_DELAY),
            }),
            Err(err) => {
                if let Err(e) = self.storage.remove_file(&script).await {
                    log::debug!("Could not remove {}: {e}", script.display());
                }
                Err(err.into())
            }
        }
    }

    /// Interpreter version, via an inline `-c` run.
    pub async fn check_interpreter(&self) -> Result<String> {
        let output = self
            .interpreter
            .run_inline("import sys; print(sys.version)")
            .await
            .with_context(|| format!("interpreter '{}' is not usable", self.interpreter.program()))?;
        Ok(output.into_result()?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use condor_debugger::InterpreterConfig;
    use condor_generation::{EchoModel, GenerationConfig};
    use condor_runtime::LocalFileAccessor;

    fn oneshot(dir: &Path) -> OneShot {
        OneShot::new(
            Arc::new(LocalFileAccessor),
            Arc::new(GenerationClient::with_model(
                GenerationConfig::echo(),
                Arc::new(EchoModel),
            )),
            Interpreter::new(InterpreterConfig {
                program: "condor-no-such-python".to_string(),
                ..InterpreterConfig::default()
            }),
            dir.join("storage"),
        )
    }

    #[tokio::test]
    async fn generate_sends_the_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("program.txt");
        std::fs::write(&program, "print('a')\nprint('b')").unwrap();

        let code = oneshot(dir.path()).generate(&program).await.unwrap();
        assert!(code.contains("print('a')\nprint('b')"));
    }

    #[tokio::test]
    async fn generate_reports_unreadable_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = oneshot(dir.path())
            .generate(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[tokio::test]
    async fn removal_happens_after_the_delay_without_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join(GENERATED_FILE_NAME);
        std::fs::write(&script, "print(1)\n").unwrap();

        let cleanup = schedule_removal(
            Arc::new(LocalFileAccessor),
            script.clone(),
            Duration::from_millis(50),
        );
        assert!(script.exists());
        cleanup.await.unwrap();
        assert!(!script.exists());
    }

    #[tokio::test]
    async fn failed_runs_remove_the_script_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("program.txt");
        std::fs::write(&program, "print('a')").unwrap();

        let oneshot = oneshot(dir.path());
        assert!(oneshot.run(&program).await.is_err());
        assert!(!oneshot.generated_file().exists());
    }

    #[tokio::test]
    async fn missing_interpreter_fails_the_check() {
        let dir = tempfile::tempdir().unwrap();
        let err = oneshot(dir.path()).check_interpreter().await.unwrap_err();
        assert!(err.to_string().contains("condor-no-such-python"));
    }
}
