//! Directive pre-processing pass.
//!
//! The source bytes are split into plain text spans and `<!--TABLE "path"-->`
//! directives. Each directive is replaced by the stdout of the table helper
//! invoked on the referenced satellite file; the satellite paths discovered
//! this way are reported so the watcher can pick them up.
//!
//! Parsing is strict about the directive it recognises and explicit about
//! everything else:
//! - only the literal `<!--TABLE "` opener starts a directive; comments with
//!   any other verb or spacing pass through untouched,
//! - a directive truncated before its closing quote or its `-->` terminator
//!   is a [`PipelineError::MalformedDirective`],
//! - directives do not nest and helper output is not re-scanned.

use crate::error::PipelineError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Literal opener of a table directive, including the one mandatory space
/// and the opening quote.
const DIRECTIVE_OPEN: &[u8] = b"<!--TABLE \"";

/// Literal terminator following the quoted path.
const DIRECTIVE_CLOSE: &[u8] = b"-->";

/// One parsed piece of the source document.
#[derive(Debug, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Bytes copied through verbatim.
    Text(&'a [u8]),
    /// A table directive referencing a satellite file.
    Table {
        /// Satellite path relative to the source document's directory.
        path: &'a str,
        /// Byte offset of the directive opener, for diagnostics.
        offset: usize,
    },
}

/// Split `input` into text spans and directives.
pub fn parse(input: &[u8]) -> Result<Vec<Segment<'_>>, PipelineError> {
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < input.len() {
        if input[i] != b'<' || !input[i..].starts_with(DIRECTIVE_OPEN) {
            i += 1;
            continue;
        }

        if text_start < i {
            segments.push(Segment::Text(&input[text_start..i]));
        }

        let path_start = i + DIRECTIVE_OPEN.len();
        let Some(quote) = input[path_start..].iter().position(|&b| b == b'"') else {
            return Err(PipelineError::MalformedDirective {
                offset: i,
                reason: "missing closing quote",
            });
        };
        let path_end = path_start + quote;

        let close_start = path_end + 1;
        if input.len() < close_start + DIRECTIVE_CLOSE.len() {
            return Err(PipelineError::MalformedDirective {
                offset: i,
                reason: "truncated before \"-->\"",
            });
        }
        if &input[close_start..close_start + DIRECTIVE_CLOSE.len()] != DIRECTIVE_CLOSE {
            return Err(PipelineError::MalformedDirective {
                offset: i,
                reason: "expected \"-->\" after quoted path",
            });
        }

        let path = std::str::from_utf8(&input[path_start..path_end]).map_err(|_| {
            PipelineError::MalformedDirective {
                offset: i,
                reason: "satellite path is not valid UTF-8",
            }
        })?;

        segments.push(Segment::Table { path, offset: i });
        i = close_start + DIRECTIVE_CLOSE.len();
        text_start = i;
    }

    if text_start < input.len() {
        segments.push(Segment::Text(&input[text_start..]));
    }

    Ok(segments)
}

/// What a helper invocation produced.
///
/// A non-zero exit still yields whatever the helper wrote to stdout; the
/// failure rides along so the caller can report it without aborting the run.
#[derive(Debug)]
pub struct TableOutput {
    pub bytes: Vec<u8>,
    pub failure: Option<PipelineError>,
}

/// Renders one satellite file into its inline replacement.
#[async_trait]
pub trait TableHelper: Send + Sync {
    async fn render(&self, satellite: &Path) -> TableOutput;
}

/// The shipped helper: `python <app-dir>/markdown-table.py <satellite>`.
#[derive(Debug, Clone)]
pub struct PythonTableHelper {
    interpreter: PathBuf,
    script: PathBuf,
}

impl PythonTableHelper {
    pub fn new(script: PathBuf) -> Self {
        Self {
            interpreter: PathBuf::from("python"),
            script,
        }
    }

    /// Override the interpreter; used by tests to stand in for python.
    pub fn with_interpreter(interpreter: PathBuf, script: PathBuf) -> Self {
        Self {
            interpreter,
            script,
        }
    }
}

#[async_trait]
impl TableHelper for PythonTableHelper {
    async fn render(&self, satellite: &Path) -> TableOutput {
        let output = Command::new(&self.interpreter)
            .arg(&self.script)
            .arg(satellite)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => TableOutput {
                bytes: output.stdout,
                failure: None,
            },
            Ok(output) => TableOutput {
                bytes: output.stdout,
                failure: Some(PipelineError::HelperFailure {
                    satellite: satellite.to_path_buf(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }),
            },
            Err(e) => TableOutput {
                bytes: Vec::new(),
                failure: Some(PipelineError::HelperFailure {
                    satellite: satellite.to_path_buf(),
                    stderr: format!(
                        "failed to start {}: {e}",
                        self.interpreter.display()
                    ),
                }),
            },
        }
    }
}

/// Result of the pre-processing pass.
#[derive(Debug)]
pub struct Expanded {
    /// The source bytes with every directive replaced by helper output.
    pub bytes: Vec<u8>,
    /// Satellite paths discovered this run, absolute, in directive order.
    pub satellites: Vec<PathBuf>,
    /// Helper failures; reported to the user, but the run continues.
    pub warnings: Vec<PipelineError>,
}

/// Expand every directive in `input`, resolving satellite paths against
/// `source_dir`.
pub async fn expand(
    input: &[u8],
    source_dir: &Path,
    helper: &dyn TableHelper,
) -> Result<Expanded, PipelineError> {
    let segments = parse(input)?;

    let mut bytes = Vec::with_capacity(input.len());
    let mut satellites = Vec::new();
    let mut warnings = Vec::new();

    for segment in segments {
        match segment {
            Segment::Text(text) => bytes.extend_from_slice(text),
            Segment::Table { path, offset } => {
                let satellite = source_dir.join(path);
                tracing::debug!(
                    satellite = %satellite.display(),
                    offset,
                    "expanding table directive"
                );
                let output = helper.render(&satellite).await;
                bytes.extend_from_slice(&output.bytes);
                if let Some(failure) = output.failure {
                    warnings.push(failure);
                }
                satellites.push(satellite);
            }
        }
    }

    Ok(Expanded {
        bytes,
        satellites,
        warnings,
    })
}
