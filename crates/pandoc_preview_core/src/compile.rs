//! Markdown to HTML compilation via pandoc.
//!
//! The converter runs as a child process: the pre-processed buffer goes to
//! its stdin (closed to signal end of input), and the child's working
//! directory is set to the document's base directory so relative links
//! resolve without touching the process-wide CWD.

use crate::error::PipelineError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Page geometry for the live preview.
pub const PREVIEW_GEOMETRY: &str = "a4paper,margin=1cm";

/// Page geometry for exported artifacts.
pub const EXPORT_GEOMETRY: &str = "a4paper,margin=2cm";

/// Invokes the external converter with a fixed argument profile.
#[derive(Debug, Clone)]
pub struct Compiler {
    program: PathBuf,
    mathjax: PathBuf,
}

impl Compiler {
    /// A compiler using `pandoc` from `PATH` and the given math typesetting
    /// script for previews.
    pub fn new(mathjax: PathBuf) -> Self {
        Self {
            program: PathBuf::from("pandoc"),
            mathjax,
        }
    }

    /// Override the converter executable; used by tests.
    pub fn with_program(program: PathBuf, mathjax: PathBuf) -> Self {
        Self { program, mathjax }
    }

    /// Locate `pandoc` on `PATH`, for a startup diagnostic.
    pub fn locate() -> Option<PathBuf> {
        which::which("pandoc").ok()
    }

    fn preview_args(&self) -> Vec<OsString> {
        let mut mathjax = OsString::from("--mathjax=");
        mathjax.push(self.mathjax.as_os_str());
        vec![
            "-s".into(),
            "--from=markdown".into(),
            "--to=html".into(),
            "--toc".into(),
            "-V".into(),
            format!("geometry:{PREVIEW_GEOMETRY}").into(),
            mathjax,
        ]
    }

    fn export_args(&self, target: &Path) -> Vec<OsString> {
        vec![
            "-s".into(),
            "--from=markdown".into(),
            "--toc".into(),
            "-V".into(),
            format!("geometry:{EXPORT_GEOMETRY}").into(),
            "-o".into(),
            target.into(),
        ]
    }

    /// Compile `input` and return the HTML written to the converter's stdout.
    pub async fn preview(&self, input: &[u8], base_dir: &Path) -> Result<String, PipelineError> {
        let stdout = self.run(self.preview_args(), base_dir, input, true).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    /// Compile `input` into a standalone artifact at `target`.
    ///
    /// The target is absolutized first; the child resolves relative paths
    /// against `base_dir`, not against the caller's CWD.
    pub async fn export(
        &self,
        input: &[u8],
        base_dir: &Path,
        target: &Path,
    ) -> Result<(), PipelineError> {
        let target = if target.is_absolute() {
            target.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| PipelineError::CompileFailure {
                    stderr: e.to_string(),
                })?
                .join(target)
        };
        self.run(self.export_args(&target), base_dir, input, false)
            .await?;
        Ok(())
    }

    async fn run(
        &self,
        args: Vec<OsString>,
        base_dir: &Path,
        input: &[u8],
        capture_stdout: bool,
    ) -> Result<Vec<u8>, PipelineError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .current_dir(base_dir)
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .stdout(if capture_stdout {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        tracing::debug!(program = %self.program.display(), "invoking converter");

        let mut child = cmd.spawn().map_err(|e| PipelineError::CompileFailure {
            stderr: format!("failed to start {}: {e}", self.program.display()),
        })?;

        // Feed stdin from a separate task so a chatty child cannot deadlock
        // against a full pipe; dropping the handle closes the stream.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = input.to_vec();
            tokio::spawn(async move {
                let _ = stdin.write_all(&input).await;
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| PipelineError::CompileFailure {
                stderr: e.to_string(),
            })?;

        if let Some(writer) = writer {
            let _ = writer.await;
        }

        if !output.status.success() {
            return Err(PipelineError::CompileFailure {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(output.stdout)
    }
}
