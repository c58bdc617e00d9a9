//! File access capability used by the runtime, so hosts can swap in virtual file systems.

use async_trait::async_trait;
use globset::GlobBuilder;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[async_trait]
pub trait FileAccessor: Send + Sync {
    /// Whether paths are compared case-insensitively with `\` separators.
    fn is_windows(&self) -> bool {
        cfg!(windows)
    }

    async fn read_file(&self, path: &Path) -> io::Result<String>;

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Files under `dir` (recursively) whose path relative to `dir` matches `pattern`.
    async fn list_files(&self, dir: &Path, pattern: &str) -> io::Result<Vec<PathBuf>>;
}

/// The local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileAccessor;

#[async_trait]
impl FileAccessor for LocalFileAccessor {
    async fn read_file(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write_file(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn list_files(&self, dir: &Path, pattern: &str) -> io::Result<Vec<PathBuf>> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
            .compile_matcher();
        let root = dir.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            for entry in WalkDir::new(&root).follow_links(false) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        log::warn!("Failed to read entry: {e}");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path());
                if matcher.is_match(rel) {
                    files.push(entry.path().to_path_buf());
                }
            }
            log::debug!("Found {} files matching {}", files.len(), matcher.glob());
            files
        })
        .await
        .map_err(io::Error::other)
    }
}

/// Canonical spelling of a path for table keys: `\` and lowercase on Windows, `/` elsewhere.
pub fn normalize_path(path: &str, windows: bool) -> String {
    if windows {
        path.replace('/', "\\").to_lowercase()
    } else {
        path.replace('\\', "/")
    }
}
