//! Pipeline orchestration.
//!
//! The controller is an actor owning all mutable pipeline state: the loaded
//! document, the watched set, the scroll model, and the export destination.
//! Triggers (open, reload, file changed) start a pipeline run in a separate
//! task; each run is tagged with a monotonic sequence number and a completion
//! that is no longer the newest run is discarded, so the displayed content
//! always corresponds to the last successfully completed run.

use crate::compile::Compiler;
use crate::config::AppConfig;
use crate::document::{self, Document};
use crate::error::PipelineError;
use crate::export::Exporter;
use crate::preprocess::{self, TableHelper};
use crate::surface::{PreviewSurface, ScrollFeedback, SurfaceHandle, SurfaceMessage};
use crate::watcher::{DocumentWatcher, WatchEvent};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, RwLock};

/// Base URL the rendered page resolves relative asset references against;
/// the server maps it onto the current document's directory.
pub const DOC_BASE_URL: &str = "/doc/";

/// UI-visible pipeline state. Not consulted for correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Ready,
    Processing,
    Compiling,
}

impl PipelineStatus {
    /// Status label shown in the page's status bar.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ready => "Ready.",
            Self::Processing => "Processing document...",
            Self::Compiling => "Compiling document...",
        }
    }
}

/// Messages the controller reacts to.
#[derive(Debug)]
pub enum ControllerMsg {
    /// Open a document, replacing the current one.
    Open(PathBuf),
    /// Re-run the pipeline for the current document.
    Reload,
    /// Export to the given destination, the remembered one, or prompt.
    Export(Option<PathBuf>),
    /// A watched file changed on disk.
    FileChanged(PathBuf),
    /// Scroll feedback from the page.
    Scroll(ScrollFeedback),
    /// Stick-to-end policy toggle.
    StickToEnd(bool),
    /// The page finished a layout pass.
    Resized { viewport_area: f64 },
    /// A file object was dropped on the page.
    Drop { name: String, mime: String },
    /// A pipeline run finished.
    RunDone {
        seq: u64,
        result: Result<RunSuccess, PipelineError>,
    },
    /// An export run finished.
    ExportDone {
        target: PathBuf,
        result: Result<Vec<PipelineError>, PipelineError>,
    },
}

/// Payload of a successful pipeline run.
#[derive(Debug)]
pub struct RunSuccess {
    pub html: String,
    pub satellites: Vec<PathBuf>,
    pub warnings: Vec<PipelineError>,
    pub elapsed: Duration,
}

/// Everything the presentation layer needs to talk to a running controller.
pub struct ControllerHandle {
    pub msg_tx: mpsc::UnboundedSender<ControllerMsg>,
    pub surface: SurfaceHandle,
    pub status_rx: watch::Receiver<PipelineStatus>,
    /// Directory `DOC_BASE_URL` is served from; follows the open document.
    pub served_root: Arc<RwLock<Option<PathBuf>>>,
    /// Recent files known at startup, for the page's start screen.
    pub initial_recent: Vec<String>,
}

/// Per-run context handed to the run task: sequence gating plus the status
/// outlets. Only the newest run gets to update the status indicator.
#[derive(Clone)]
struct RunContext {
    seq: u64,
    latest: Arc<AtomicU64>,
    status_tx: watch::Sender<PipelineStatus>,
    ui: SurfaceHandle,
}

impl RunContext {
    fn set_status(&self, status: PipelineStatus) {
        if self.latest.load(Ordering::SeqCst) == self.seq {
            let _ = self.status_tx.send(status);
            self.ui.status(status.label());
        }
    }
}

/// The pipeline controller actor.
pub struct PipelineController<H> {
    document: Option<Document>,
    watcher: DocumentWatcher,
    helper: H,
    compiler: Compiler,
    surface: PreviewSurface,
    ui: SurfaceHandle,
    exporter: Exporter,
    config: AppConfig,
    status_tx: watch::Sender<PipelineStatus>,
    msg_tx: mpsc::UnboundedSender<ControllerMsg>,
    latest_seq: Arc<AtomicU64>,
    served_root: Arc<RwLock<Option<PathBuf>>>,
}

impl<H> PipelineController<H>
where
    H: TableHelper + Clone + Send + Sync + 'static,
{
    /// Start the controller actor and return its handle.
    pub fn spawn(
        helper: H,
        compiler: Compiler,
        config: AppConfig,
    ) -> Result<ControllerHandle, notify::Error> {
        let (msg_tx, mut msg_rx) = mpsc::unbounded_channel();
        let (watcher, mut watch_rx) = DocumentWatcher::new()?;
        let surface = PreviewSurface::new();
        let ui = surface.handle();
        let (status_tx, status_rx) = watch::channel(PipelineStatus::Ready);
        let served_root = Arc::new(RwLock::new(None));
        let initial_recent = config.recent();

        let mut controller = Self {
            document: None,
            watcher,
            helper,
            compiler,
            surface,
            ui: ui.clone(),
            exporter: Exporter::default(),
            config,
            status_tx,
            msg_tx: msg_tx.clone(),
            latest_seq: Arc::new(AtomicU64::new(0)),
            served_root: Arc::clone(&served_root),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = msg_rx.recv() => match msg {
                        Some(msg) => controller.handle(msg).await,
                        None => break,
                    },
                    event = watch_rx.recv() => match event {
                        Some(WatchEvent::Changed(path)) => {
                            controller.handle(ControllerMsg::FileChanged(path)).await;
                        }
                        Some(WatchEvent::Error(e)) => {
                            tracing::warn!(error = %e, "watch backend error");
                        }
                        None => break,
                    },
                }
            }
            tracing::debug!("pipeline controller stopped");
        });

        Ok(ControllerHandle {
            msg_tx,
            surface: ui,
            status_rx,
            served_root,
            initial_recent,
        })
    }

    async fn handle(&mut self, msg: ControllerMsg) {
        match msg {
            ControllerMsg::Open(path) => self.open(path).await,
            ControllerMsg::Reload => self.start_run("reload"),
            ControllerMsg::Export(target) => self.export(target),
            ControllerMsg::FileChanged(path) => {
                tracing::debug!(path = %path.display(), "watched file changed");
                if self.document.is_some() {
                    self.start_run("file changed");
                }
            }
            ControllerMsg::Scroll(feedback) => self.surface.note_feedback(feedback),
            ControllerMsg::StickToEnd(enabled) => self.surface.set_stick_to_end(enabled),
            ControllerMsg::Resized { viewport_area } => {
                self.surface.restore_scroll(viewport_area);
            }
            ControllerMsg::Drop { name, mime } => self.drop_file(name, mime),
            ControllerMsg::RunDone { seq, result } => self.finish_run(seq, result),
            ControllerMsg::ExportDone { target, result } => self.finish_export(target, result),
        }
    }

    async fn open(&mut self, path: PathBuf) {
        let doc = match Document::open(path) {
            Ok(doc) => doc,
            Err(e) => {
                self.ui.report(&e);
                return;
            }
        };
        tracing::info!(path = %doc.path().display(), "opening document");

        // The previous document's state is replaced wholesale.
        self.watcher.unwatch_all();
        self.surface.reset();
        self.exporter.reset();

        if let Err(e) = self.watcher.watch(doc.path()) {
            // The document still loads; edits just won't re-trigger.
            self.ui.report(&e);
        }

        *self.served_root.write().await = Some(doc.dir().to_path_buf());
        self.config.add_recent(doc.path());
        self.ui.send(SurfaceMessage::RecentFiles {
            files: self.config.recent(),
        });

        self.document = Some(doc);
        self.start_run("open");
    }

    fn start_run(&mut self, trigger: &str) {
        let Some(doc) = self.document.clone() else {
            return;
        };
        let seq = self.latest_seq.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(seq, trigger, "starting pipeline run");

        let ctx = RunContext {
            seq,
            latest: Arc::clone(&self.latest_seq),
            status_tx: self.status_tx.clone(),
            ui: self.ui.clone(),
        };
        let helper = self.helper.clone();
        let compiler = self.compiler.clone();
        let msg_tx = self.msg_tx.clone();

        tokio::spawn(async move {
            let result = execute_run(doc, helper, compiler, &ctx).await;
            let _ = msg_tx.send(ControllerMsg::RunDone { seq, result });
        });
    }

    fn finish_run(&mut self, seq: u64, result: Result<RunSuccess, PipelineError>) {
        if seq != self.latest_seq.load(Ordering::SeqCst) {
            tracing::debug!(seq, "discarding superseded run");
            return;
        }

        match result {
            Ok(run) => {
                if let Some(doc) = &self.document {
                    // Recompute the watched set: the source plus exactly the
                    // satellites this run referenced.
                    let mut desired: HashSet<PathBuf> =
                        run.satellites.iter().cloned().collect();
                    desired.insert(doc.path().to_path_buf());
                    for warning in self.watcher.apply(&desired) {
                        self.ui.report(&warning);
                    }
                }
                for warning in &run.warnings {
                    self.ui.report(warning);
                }

                self.surface.record_scroll();
                self.surface.set_content(run.html, DOC_BASE_URL.to_string());
                self.set_status(PipelineStatus::Ready);
                self.ui.message(format!(
                    "Compiled in {:.2} seconds.",
                    run.elapsed.as_secs_f64()
                ));
            }
            Err(e) => {
                self.ui.report(&e);
                self.set_status(PipelineStatus::Ready);
            }
        }
    }

    fn export(&mut self, requested: Option<PathBuf>) {
        let Some(doc) = self.document.clone() else {
            self.ui.dialog("Export failed", "no document is loaded");
            return;
        };
        let target = match requested
            .or_else(|| self.exporter.last_destination().map(Path::to_path_buf))
        {
            Some(target) => target,
            None => {
                self.ui.send(SurfaceMessage::PromptExport);
                return;
            }
        };

        let helper = self.helper.clone();
        let compiler = self.compiler.clone();
        let msg_tx = self.msg_tx.clone();
        let status_tx = self.status_tx.clone();
        let ui = self.ui.clone();

        tokio::spawn(async move {
            let _ = status_tx.send(PipelineStatus::Processing);
            ui.status(PipelineStatus::Processing.label());

            let result = async {
                let bytes = doc.read().await?;
                let expanded = preprocess::expand(&bytes, doc.dir(), &helper).await?;
                let _ = status_tx.send(PipelineStatus::Compiling);
                ui.status(PipelineStatus::Compiling.label());
                compiler.export(&expanded.bytes, doc.dir(), &target).await?;
                Ok(expanded.warnings)
            }
            .await;

            let _ = msg_tx.send(ControllerMsg::ExportDone { target, result });
        });
    }

    fn finish_export(
        &mut self,
        target: PathBuf,
        result: Result<Vec<PipelineError>, PipelineError>,
    ) {
        match result {
            Ok(warnings) => {
                for warning in &warnings {
                    self.ui.report(warning);
                }
                self.exporter.remember(target);
            }
            Err(e) => self.ui.report(&e),
        }
        self.set_status(PipelineStatus::Ready);
    }

    fn drop_file(&self, name: String, mime: String) {
        // Browsers often leave the MIME type empty for markdown; fall back
        // to the extension mapping before judging.
        let mime = if mime.is_empty() {
            document::mime_name(Path::new(&name)).to_string()
        } else {
            mime
        };
        if mime == document::MARKDOWN_MIME {
            self.ui.dialog(
                "Open failed",
                format!("the browser does not expose the path of \"{name}\"; open it by path instead"),
            );
        } else {
            self.ui.report(&PipelineError::WrongMimeType { mime_type: mime });
        }
    }

    fn set_status(&self, status: PipelineStatus) {
        let _ = self.status_tx.send(status);
        self.ui.status(status.label());
    }
}

/// One end-to-end pipeline run: read, preprocess, compile.
async fn execute_run<H: TableHelper>(
    doc: Document,
    helper: H,
    compiler: Compiler,
    ctx: &RunContext,
) -> Result<RunSuccess, PipelineError> {
    let started = Instant::now();

    ctx.set_status(PipelineStatus::Processing);
    let bytes = doc.read().await?;
    let expanded = preprocess::expand(&bytes, doc.dir(), &helper).await?;

    ctx.set_status(PipelineStatus::Compiling);
    let html = compiler.preview(&expanded.bytes, doc.dir()).await?;

    Ok(RunSuccess {
        html,
        satellites: expanded.satellites,
        warnings: expanded.warnings,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::preprocess::PythonTableHelper;
    use std::os::unix::fs::PermissionsExt;
    use tokio::sync::broadcast;

    const IDENTITY_CONVERTER: &str = "cat";

    /// Converter stub honoring both profiles: writes stdin to the `-o`
    /// target when given, otherwise echoes stdin.
    const DUAL_MODE_CONVERTER: &str = r#"out=""
while [ "$#" -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
if [ -n "$out" ]; then cat > "$out"; else cat; fi"#;

    fn stub_converter(dir: &Path, body: &str) -> Compiler {
        let path = dir.join("stub-pandoc");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        Compiler::with_program(path, PathBuf::from("unused.js"))
    }

    /// Table helper stub: `cat <empty script> <satellite>` reduces to the
    /// satellite's bytes.
    fn stub_helper(dir: &Path) -> PythonTableHelper {
        let script = dir.join("empty.py");
        std::fs::write(&script, b"").unwrap();
        PythonTableHelper::with_interpreter("cat".into(), script)
    }

    async fn next_content(rx: &mut broadcast::Receiver<SurfaceMessage>) -> (String, String) {
        let deadline = Duration::from_secs(15);
        tokio::time::timeout(deadline, async {
            loop {
                match rx.recv().await.expect("surface channel closed") {
                    SurfaceMessage::SetContent { html, base_url } => return (html, base_url),
                    _ => continue,
                }
            }
        })
        .await
        .expect("no content update within timeout")
    }

    async fn next_dialog(rx: &mut broadcast::Receiver<SurfaceMessage>) -> (String, String) {
        let deadline = Duration::from_secs(15);
        tokio::time::timeout(deadline, async {
            loop {
                match rx.recv().await.expect("surface channel closed") {
                    SurfaceMessage::Dialog { title, detail } => return (title, detail),
                    SurfaceMessage::SetContent { .. } => {
                        panic!("surface updated although the run should have failed")
                    }
                    _ => continue,
                }
            }
        })
        .await
        .expect("no dialog within timeout")
    }

    #[tokio::test]
    async fn test_open_expands_and_renders() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.md");
        std::fs::write(&source, "A\n<!--TABLE \"t.csv\"-->\nB").unwrap();
        std::fs::write(dir.path().join("t.csv"), "# C\nv\n").unwrap();

        let handle = PipelineController::spawn(
            stub_helper(dir.path()),
            stub_converter(dir.path(), IDENTITY_CONVERTER),
            AppConfig::load(None),
        )
        .unwrap();

        let mut rx = handle.surface.subscribe();
        handle.msg_tx.send(ControllerMsg::Open(source)).unwrap();

        let (html, base_url) = next_content(&mut rx).await;
        // Identity converter: the rendered HTML is exactly the preprocessed
        // byte sequence.
        assert_eq!(html, "A\n# C\nv\n\nB");
        assert_eq!(base_url, DOC_BASE_URL);
    }

    #[tokio::test]
    async fn test_satellite_edit_triggers_rerender() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.md");
        let satellite = dir.path().join("t.csv");
        std::fs::write(&source, "<!--TABLE \"t.csv\"-->").unwrap();
        std::fs::write(&satellite, "first\n").unwrap();

        let handle = PipelineController::spawn(
            stub_helper(dir.path()),
            stub_converter(dir.path(), IDENTITY_CONVERTER),
            AppConfig::load(None),
        )
        .unwrap();

        let mut rx = handle.surface.subscribe();
        handle.msg_tx.send(ControllerMsg::Open(source)).unwrap();
        let (html, _) = next_content(&mut rx).await;
        assert_eq!(html, "first\n");

        // Let the run completion register the satellite with the watcher.
        tokio::time::sleep(Duration::from_millis(500)).await;
        std::fs::write(&satellite, "second\n").unwrap();

        let (html, _) = next_content(&mut rx).await;
        assert_eq!(html, "second\n");
    }

    #[tokio::test]
    async fn test_compile_failure_shows_dialog_without_surface_update() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.md");
        std::fs::write(&source, "# Hi").unwrap();

        let handle = PipelineController::spawn(
            stub_helper(dir.path()),
            stub_converter(dir.path(), "echo 'bad input' >&2; exit 1"),
            AppConfig::load(None),
        )
        .unwrap();

        let mut rx = handle.surface.subscribe();
        handle.msg_tx.send(ControllerMsg::Open(source)).unwrap();

        let (title, detail) = next_dialog(&mut rx).await;
        assert_eq!(title, "Compile error");
        assert!(detail.contains("bad input"));
    }

    #[tokio::test]
    async fn test_export_prompts_then_remembers_destination() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.md");
        std::fs::write(&source, "# Hi").unwrap();
        let target = dir.path().join("out.html");

        let handle = PipelineController::spawn(
            stub_helper(dir.path()),
            stub_converter(dir.path(), DUAL_MODE_CONVERTER),
            AppConfig::load(None),
        )
        .unwrap();

        let mut rx = handle.surface.subscribe();
        handle.msg_tx.send(ControllerMsg::Open(source)).unwrap();
        let _ = next_content(&mut rx).await;

        // Save with no known destination prompts instead of exporting.
        handle.msg_tx.send(ControllerMsg::Export(None)).unwrap();
        let deadline = Duration::from_secs(15);
        tokio::time::timeout(deadline, async {
            loop {
                if matches!(
                    rx.recv().await.expect("surface channel closed"),
                    SurfaceMessage::PromptExport
                ) {
                    break;
                }
            }
        })
        .await
        .expect("no export prompt within timeout");

        // Save As with a destination exports and remembers it.
        handle
            .msg_tx
            .send(ControllerMsg::Export(Some(target.clone())))
            .unwrap();
        wait_for_file(&target).await;
        assert_eq!(std::fs::read(&target).unwrap(), b"# Hi");

        // The destination is remembered when the completion message lands,
        // which may trail the file write.
        tokio::time::sleep(Duration::from_millis(500)).await;

        // The next plain save reuses the remembered destination.
        std::fs::remove_file(&target).unwrap();
        handle.msg_tx.send(ControllerMsg::Export(None)).unwrap();
        wait_for_file(&target).await;
    }

    async fn wait_for_file(path: &Path) {
        let deadline = Instant::now() + Duration::from_secs(15);
        while !path.exists() {
            assert!(Instant::now() < deadline, "file {path:?} never appeared");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    #[tokio::test]
    async fn test_drop_with_wrong_mime_is_rejected_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let handle = PipelineController::spawn(
            stub_helper(dir.path()),
            stub_converter(dir.path(), IDENTITY_CONVERTER),
            AppConfig::load(None),
        )
        .unwrap();

        let mut rx = handle.surface.subscribe();
        handle
            .msg_tx
            .send(ControllerMsg::Drop {
                name: "shot.png".into(),
                mime: "image/png".into(),
            })
            .unwrap();

        let (title, detail) = next_dialog(&mut rx).await;
        assert_eq!(title, "Open rejected");
        assert!(detail.contains("image/png"));
    }

    #[tokio::test]
    async fn test_status_returns_to_ready_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.md");
        std::fs::write(&source, "# Hi").unwrap();

        let handle = PipelineController::spawn(
            stub_helper(dir.path()),
            stub_converter(dir.path(), "exit 3"),
            AppConfig::load(None),
        )
        .unwrap();

        let mut rx = handle.surface.subscribe();
        let mut status_rx = handle.status_rx.clone();
        handle.msg_tx.send(ControllerMsg::Open(source)).unwrap();
        let _ = next_dialog(&mut rx).await;

        let deadline = Duration::from_secs(15);
        tokio::time::timeout(deadline, async {
            loop {
                if *status_rx.borrow_and_update() == PipelineStatus::Ready {
                    break;
                }
                status_rx.changed().await.expect("status channel closed");
            }
        })
        .await
        .expect("status never returned to ready");
    }
}
