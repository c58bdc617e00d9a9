use std::path::{Path, PathBuf};

use crate::error::{Result, RuntimeError};
use crate::storage::FileAccessor;

/// A loaded text program: one trimmed string per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    path: PathBuf,
    lines: Vec<String>,
}

impl SourceDocument {
    pub async fn load(storage: &dyn FileAccessor, path: &Path) -> Result<Self> {
        let text = storage
            .read_file(path)
            .await
            .map_err(|e| RuntimeError::storage(path, e))?;
        log::debug!("Loaded {} ({} bytes)", path.display(), text.len());
        Ok(Self::from_text(path, &text))
    }

    pub fn from_text(path: &Path, text: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            lines: text.split('\n').map(|l| l.trim().to_string()).collect(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Result<&str> {
        self.lines
            .get(index)
            .map(String::as_str)
            .ok_or(RuntimeError::OutOfRange {
                index,
                len: self.lines.len(),
            })
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Whole program text, lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalFileAccessor;
    use pretty_assertions::assert_eq;

    #[test]
    fn lines_are_trimmed_and_stable() {
        let doc = SourceDocument::from_text(Path::new("demo.txt"), "  print hi  \r\n\n+ skip\n");
        assert_eq!(doc.len(), 4);
        for _ in 0..2 {
            assert_eq!(doc.line(0).expect("line"), "print hi");
            assert_eq!(doc.line(1).expect("line"), "");
            assert_eq!(doc.line(2).expect("line"), "+ skip");
        }
    }

    #[test]
    fn out_of_range_is_an_error() {
        let doc = SourceDocument::from_text(Path::new("demo.txt"), "one");
        assert!(matches!(
            doc.line(1),
            Err(RuntimeError::OutOfRange { index: 1, len: 1 })
        ));
    }

    #[tokio::test]
    async fn load_reads_through_storage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("prog.txt");
        std::fs::write(&path, "a\nb").expect("write");
        let doc = SourceDocument::load(&LocalFileAccessor, &path)
            .await
            .expect("load");
        assert_eq!(doc.lines(), &["a".to_string(), "b".to_string()]);
        assert_eq!(doc.path(), path.as_path());

        let missing = SourceDocument::load(&LocalFileAccessor, &dir.path().join("nope.txt")).await;
        assert!(matches!(missing, Err(RuntimeError::Storage { .. })));
    }
}
