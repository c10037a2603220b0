//! On-disk layout for downloaded PDFs and converted Markdown.
//!
//! ```text
//! <root>/pdf/<identifier>.pdf
//! <root>/md/<identifier>.md
//! ```
//!
//! A Markdown file's existence is its only validity check. Entries are never
//! invalidated by this crate; delete the file to force a re-conversion.

use crate::error::Arxiv2MdError;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MarkdownCache {
    root: PathBuf,
}

impl MarkdownCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pdf_dir(&self) -> PathBuf {
        self.root.join("pdf")
    }

    pub fn markdown_dir(&self) -> PathBuf {
        self.root.join("md")
    }

    pub fn pdf_path(&self, id: &str) -> PathBuf {
        self.pdf_dir().join(format!("{id}.pdf"))
    }

    pub fn markdown_path(&self, id: &str) -> PathBuf {
        self.markdown_dir().join(format!("{id}.md"))
    }

    /// Cached Markdown for `id`, or `None` when no entry exists.
    pub async fn read(&self, id: &str) -> Result<Option<String>, Arxiv2MdError> {
        read_markdown(&self.markdown_path(id)).await
    }

    /// Store Markdown for `id`, replacing any existing entry.
    pub async fn write(&self, id: &str, markdown: &str) -> Result<PathBuf, Arxiv2MdError> {
        let path = self.markdown_path(id);
        write_atomic(&path, markdown).await?;
        Ok(path)
    }
}

/// Read a Markdown file, mapping "not found" to `Ok(None)`.
pub async fn read_markdown(path: &Path) -> Result<Option<String>, Arxiv2MdError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            debug!("Cache hit: {}", path.display());
            Ok(Some(text))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Arxiv2MdError::CacheReadFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Write `contents` to `path` via a temp file in the same directory and a
/// rename, so readers never observe a partial file.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), Arxiv2MdError> {
    let path = path.to_path_buf();
    let contents = contents.to_owned();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &contents))
        .await
        .map_err(|e| Arxiv2MdError::Internal(format!("Cache write task panicked: {e}")))?
}

fn write_atomic_blocking(path: &Path, contents: &str) -> Result<(), Arxiv2MdError> {
    let write_err = |source: std::io::Error| Arxiv2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(contents.as_bytes()).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}
