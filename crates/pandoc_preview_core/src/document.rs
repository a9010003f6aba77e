//! Document identity and accepted-type checks.
//!
//! A loaded document is an absolute source path plus its base directory; the
//! bytes are read fresh on every pipeline run. The MIME mapping here is the
//! single source of truth for which files the tool accepts and for naming the
//! offending type when a drop is rejected.

use crate::error::PipelineError;
use std::path::{Path, PathBuf};

/// The only MIME type accepted for opening.
pub const MARKDOWN_MIME: &str = "text/markdown";

/// Lowercase file extensions recognised as markdown.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown", "mdown", "mkdn", "mkd"];

/// Extension to MIME name mapping for everything the tool may encounter:
/// markdown sources, satellite data files, and the asset types a compiled
/// document typically references.
const MIME_BY_EXTENSION: &[(&str, &str)] = &[
    ("md", MARKDOWN_MIME),
    ("markdown", MARKDOWN_MIME),
    ("mdown", MARKDOWN_MIME),
    ("mkdn", MARKDOWN_MIME),
    ("mkd", MARKDOWN_MIME),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("js", "text/javascript"),
    ("json", "application/json"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("pdf", "application/pdf"),
];

/// MIME name for a path, derived from its extension (case-insensitive).
///
/// Unknown extensions and extension-less paths report
/// `application/octet-stream`.
pub fn mime_name(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return "application/octet-stream";
    };
    let ext = ext.to_ascii_lowercase();
    MIME_BY_EXTENSION
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

/// Whether a path names a markdown document.
pub fn is_markdown(path: &Path) -> bool {
    mime_name(path) == MARKDOWN_MIME
}

/// The currently loaded source document.
///
/// Exactly one document is loaded at a time; opening another one replaces it
/// wholesale (watched set and scroll state included).
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    dir: PathBuf,
}

impl Document {
    /// Resolve `path` into a loadable document.
    ///
    /// Rejects non-markdown files with [`PipelineError::WrongMimeType`]. The
    /// file does not have to exist yet; a missing file surfaces later as a
    /// read failure on the first run.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let path = path.into();
        if !is_markdown(&path) {
            return Err(PipelineError::WrongMimeType {
                mime_type: mime_name(&path).to_string(),
            });
        }

        let path = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()
                .map_err(|e| PipelineError::ReadFailure {
                    path: path.clone(),
                    reason: e.to_string(),
                })?
                .join(path)
        };

        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| PipelineError::ReadFailure {
                path: path.clone(),
                reason: "path has no parent directory".to_string(),
            })?;

        Ok(Self { path, dir })
    }

    /// Absolute path of the source document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base directory for resolving satellite files and relative assets.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read the source bytes fresh from disk.
    pub async fn read(&self) -> Result<Vec<u8>, PipelineError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| PipelineError::ReadFailure {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_name_markdown() {
        assert_eq!(mime_name(Path::new("notes.md")), MARKDOWN_MIME);
        assert_eq!(mime_name(Path::new("NOTES.MD")), MARKDOWN_MIME);
        assert_eq!(mime_name(Path::new("a/b/c.markdown")), MARKDOWN_MIME);
    }

    #[test]
    fn test_mime_name_other() {
        assert_eq!(mime_name(Path::new("shot.png")), "image/png");
        assert_eq!(mime_name(Path::new("table.csv")), "text/csv");
        assert_eq!(
            mime_name(Path::new("mystery.bin")),
            "application/octet-stream"
        );
        assert_eq!(mime_name(Path::new("no_extension")), "application/octet-stream");
    }

    #[test]
    fn test_open_rejects_wrong_mime() {
        let err = Document::open("/tmp/shot.png").unwrap_err();
        match err {
            PipelineError::WrongMimeType { mime_type } => assert_eq!(mime_type, "image/png"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_open_resolves_dir() {
        let doc = Document::open("/tmp/docs/report.md").unwrap();
        assert_eq!(doc.path(), Path::new("/tmp/docs/report.md"));
        assert_eq!(doc.dir(), Path::new("/tmp/docs"));
    }

    #[test]
    fn test_open_absolutizes_relative_path() {
        let doc = Document::open("report.md").unwrap();
        assert!(doc.path().is_absolute());
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let doc = Document::open("/definitely/not/here.md").unwrap();
        let err = doc.read().await.unwrap_err();
        assert!(matches!(err, PipelineError::ReadFailure { .. }));
        assert!(err.aborts_run());
    }
}
