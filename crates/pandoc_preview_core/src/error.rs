//! Error types for the document pipeline.
//!
//! Every failure the pipeline can produce is non-fatal: the controller reports
//! it and returns to the ready state. The distinction that matters is whether
//! a failure aborts the current run (no surface update) or merely degrades it.

use std::path::PathBuf;
use thiserror::Error;

/// A failure produced somewhere in the document pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The watch backend rejected a path. The document still loads, but edits
    /// to that path will not re-trigger the pipeline.
    #[error("cannot watch {path}: {reason}")]
    WatchFailure { path: PathBuf, reason: String },

    /// The source document could not be read.
    #[error("cannot open {path}: {reason}")]
    ReadFailure { path: PathBuf, reason: String },

    /// The table helper exited non-zero. Whatever it wrote to stdout has
    /// already been spliced into the output; the run continues.
    #[error("table helper failed for {satellite}: {stderr}")]
    HelperFailure { satellite: PathBuf, stderr: String },

    /// The converter exited non-zero or could not be started.
    #[error("pandoc failed: {stderr}")]
    CompileFailure { stderr: String },

    /// A dropped or opened file is not a markdown document.
    #[error("wrong MIME type: {mime_type}")]
    WrongMimeType { mime_type: String },

    /// A table directive is truncated or otherwise unparseable.
    #[error("malformed table directive at byte {offset}: {reason}")]
    MalformedDirective { offset: usize, reason: &'static str },
}

impl PipelineError {
    /// Short title for the error dialog shown to the user.
    pub fn dialog_title(&self) -> &'static str {
        match self {
            Self::WatchFailure { .. } => "Watch failed",
            Self::ReadFailure { .. } => "Open failed",
            Self::HelperFailure { .. } => "Table error",
            Self::CompileFailure { .. } => "Compile error",
            Self::WrongMimeType { .. } => "Open rejected",
            Self::MalformedDirective { .. } => "Malformed directive",
        }
    }

    /// Whether this failure aborts the current pipeline run.
    ///
    /// Aborted runs leave the preview surface untouched. The remaining kinds
    /// are reported and the run carries on without them.
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            Self::ReadFailure { .. }
                | Self::CompileFailure { .. }
                | Self::MalformedDirective { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_aborting_kinds() {
        let read = PipelineError::ReadFailure {
            path: "/tmp/x.md".into(),
            reason: "gone".into(),
        };
        let helper = PipelineError::HelperFailure {
            satellite: "/tmp/t.csv".into(),
            stderr: "boom".into(),
        };
        let watch = PipelineError::WatchFailure {
            path: "/tmp/x.md".into(),
            reason: "enoent".into(),
        };
        assert!(read.aborts_run());
        assert!(!helper.aborts_run());
        assert!(!watch.aborts_run());
    }

    #[test]
    fn test_dialog_titles() {
        let compile = PipelineError::CompileFailure {
            stderr: "parse error".into(),
        };
        assert_eq!(compile.dialog_title(), "Compile error");
        assert!(compile.to_string().contains("parse error"));
    }
}
