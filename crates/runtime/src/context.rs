use condor_generation::GenerationClient;
use std::path::Path;
use std::sync::Arc;

use crate::storage::{normalize_path, FileAccessor};

/// Files considered for the execution context, relative to the program's directory.
pub const CONTEXT_PATTERN: &str = "**/*.txt";

const SEPARATOR: &str = "\n";

/// Builds the shared execution context from prompt-like sibling files.
pub struct ExecutionContextBuilder {
    storage: Arc<dyn FileAccessor>,
    generation: Arc<GenerationClient>,
}

impl ExecutionContextBuilder {
    pub fn new(storage: Arc<dyn FileAccessor>, generation: Arc<GenerationClient>) -> Self {
        Self {
            storage,
            generation,
        }
    }

    /// Concatenate every sibling text file (recursive, sorted, current file excluded) that the
    /// classifier accepts. Unreadable files are skipped.
    pub async fn build(&self, current: &Path) -> String {
        let Some(dir) = current.parent() else {
            return String::new();
        };
        let mut files = match self.storage.list_files(dir, CONTEXT_PATTERN).await {
            Ok(files) => files,
            Err(err) => {
                log::warn!("Listing context files in {} failed: {err}", dir.display());
                return String::new();
            }
        };
        files.sort();

        let mut context = String::new();
        let windows = self.storage.is_windows();
        let current_key = path_key(current, windows);
        for file in files.iter().filter(|f| path_key(f, windows) != current_key) {
            let text = match self.storage.read_file(file).await {
                Ok(text) => text,
                Err(err) => {
                    log::warn!("Skipping context file {}: {err}", file.display());
                    continue;
                }
            };
            if self.generation.classify_is_prompt_like(&text).await {
                log::info!("Prompt file: {}", file.display());
                context.push_str(&text);
                context.push_str(SEPARATOR);
            }
        }
        context
    }
}

fn path_key(path: &Path, windows: bool) -> String {
    normalize_path(&path.to_string_lossy(), windows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalFileAccessor;
    use async_trait::async_trait;
    use condor_generation::{ChatModel, CompletionRequest, GenerationConfig};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Accepts files whose payload mentions "prompt" and records what it was asked.
    #[derive(Default)]
    struct KeywordClassifier {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatModel for KeywordClassifier {
        fn name(&self) -> &str {
            "keyword"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> condor_generation::Result<String> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.payload.clone());
            }
            Ok(if request.payload.contains("prompt") {
                "True".to_string()
            } else {
                "False".to_string()
            })
        }
    }

    #[tokio::test]
    async fn concatenates_accepted_siblings_in_sorted_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("lib")).expect("mkdir");
        std::fs::write(dir.path().join("main.txt"), "prompt: main").expect("write");
        std::fs::write(dir.path().join("b.txt"), "prompt two").expect("write");
        std::fs::write(dir.path().join("a.txt"), "prompt one").expect("write");
        std::fs::write(dir.path().join("notes.txt"), "grocery list").expect("write");
        std::fs::write(dir.path().join("lib/c.txt"), "prompt three").expect("write");
        std::fs::write(dir.path().join("ignored.md"), "prompt md").expect("write");

        let model = Arc::new(KeywordClassifier::default());
        let generation = Arc::new(GenerationClient::with_model(
            GenerationConfig::default(),
            model.clone(),
        ));
        let builder = ExecutionContextBuilder::new(Arc::new(LocalFileAccessor), generation);
        let context = builder.build(&dir.path().join("main.txt")).await;

        assert_eq!(context, "prompt one\nprompt two\nprompt three\n");
        let seen = model.seen.lock().expect("seen").clone();
        assert!(!seen.iter().any(|s| s.contains("main")));
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn empty_when_nothing_qualifies() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("main.txt"), "x").expect("write");
        let generation = Arc::new(GenerationClient::new(GenerationConfig::echo()));
        let builder = ExecutionContextBuilder::new(Arc::new(LocalFileAccessor), generation);
        assert_eq!(builder.build(&dir.path().join("main.txt")).await, "");
    }

    /// Case-insensitive in-memory drive that lists paths in its own spelling.
    struct WindowsDrive {
        files: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl FileAccessor for WindowsDrive {
        fn is_windows(&self) -> bool {
            true
        }

        async fn read_file(&self, path: &Path) -> std::io::Result<String> {
            self.files
                .iter()
                .find(|(name, _)| Path::new(name) == path)
                .map(|(_, text)| text.to_string())
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
        }

        async fn write_file(&self, _path: &Path, _contents: &[u8]) -> std::io::Result<()> {
            Ok(())
        }

        async fn remove_file(&self, _path: &Path) -> std::io::Result<()> {
            Ok(())
        }

        async fn list_files(&self, _dir: &Path, _pattern: &str) -> std::io::Result<Vec<PathBuf>> {
            Ok(self.files.iter().map(|(name, _)| PathBuf::from(name)).collect())
        }
    }

    #[tokio::test]
    async fn current_file_is_excluded_by_normalized_path() {
        let storage = WindowsDrive {
            files: vec![("C:/Work/MAIN.txt", "prompt: main"), ("C:/Work/a.txt", "prompt one")],
        };
        let model = Arc::new(KeywordClassifier::default());
        let generation = Arc::new(GenerationClient::with_model(
            GenerationConfig::default(),
            model.clone(),
        ));
        let builder = ExecutionContextBuilder::new(Arc::new(storage), generation);
        let context = builder.build(Path::new("c:/work/main.txt")).await;

        assert_eq!(context, "prompt one\n");
        let seen = model.seen.lock().expect("seen").clone();
        assert_eq!(seen.len(), 1);
    }
}
