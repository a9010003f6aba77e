//! Preview surface: scroll state, restore policy, and the message protocol
//! spoken to the rendering page.
//!
//! The surface does not own a widget. The page it talks to renders the HTML,
//! keeps reporting scroll feedback, and executes the scroll commands pushed
//! back at it. All policy lives here: what offset to capture before a
//! re-render and whether it may be re-applied afterwards.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Fixed display zoom factor of the rendering page.
pub const ZOOM_FACTOR: f64 = 1.25;

/// Continuous scroll feedback reported by the rendering page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollFeedback {
    /// Current vertical scroll offset in content pixels.
    pub scroll_y: f64,
    /// Total content height.
    pub content_height: f64,
    /// Window viewport area (`width * height`); scroll offsets are only
    /// meaningful while this stays unchanged.
    pub viewport_area: f64,
}

/// Messages pushed to the rendering page.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceMessage {
    /// Replace the rendered page.
    SetContent { html: String, base_url: String },
    /// Scroll the view to a vertical offset.
    ScrollTo { y: f64 },
    /// Update the permanent status label.
    Status { text: String },
    /// Show a transient status message.
    Message { text: String },
    /// Show a modal dialog with a short title and a diagnostic.
    Dialog { title: String, detail: String },
    /// Ask the page for an export destination.
    PromptExport,
    /// Recently opened documents, most recent first.
    RecentFiles { files: Vec<String> },
}

/// Signals the rendering page sends back; the external-collaborator side of
/// the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiSignal {
    /// Open request for a document path.
    Open { path: String },
    /// A file object was dropped on the page; only its name and reported
    /// MIME type are available.
    Drop { name: String, mime: String },
    /// Export request, optionally carrying a destination.
    Export { path: Option<String> },
    /// Explicit re-render request.
    Reload,
    /// Scroll feedback.
    Scroll {
        scroll_y: f64,
        content_height: f64,
        viewport_area: f64,
    },
    /// Stick-to-end policy toggle.
    StickToEnd { enabled: bool },
    /// The rendered content was laid out (the engine resizes asynchronously
    /// after a content replacement).
    Resized { viewport_area: f64 },
}

/// Cheap cloneable sender half of the surface channel.
#[derive(Debug, Clone)]
pub struct SurfaceHandle {
    tx: broadcast::Sender<SurfaceMessage>,
}

impl SurfaceHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceMessage> {
        self.tx.subscribe()
    }

    pub fn send(&self, msg: SurfaceMessage) {
        // No receiver connected yet is fine; the page catches up on connect.
        let _ = self.tx.send(msg);
    }

    pub fn status(&self, text: impl Into<String>) {
        self.send(SurfaceMessage::Status { text: text.into() });
    }

    pub fn message(&self, text: impl Into<String>) {
        self.send(SurfaceMessage::Message { text: text.into() });
    }

    pub fn dialog(&self, title: impl Into<String>, detail: impl Into<String>) {
        self.send(SurfaceMessage::Dialog {
            title: title.into(),
            detail: detail.into(),
        });
    }

    /// Report a pipeline error as a dialog.
    pub fn report(&self, error: &crate::error::PipelineError) {
        tracing::warn!(error = %error, "pipeline error");
        self.dialog(error.dialog_title(), error.to_string());
    }
}

/// The presentation surface: rendered content, scroll context, and the
/// policy for where to scroll after a re-render.
#[derive(Debug)]
pub struct PreviewSurface {
    tx: broadcast::Sender<SurfaceMessage>,
    feedback: ScrollFeedback,
    stick_to_end: bool,
    recorded_offset: f64,
    recorded_area: f64,
}

impl PreviewSurface {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self {
            tx,
            feedback: ScrollFeedback::default(),
            stick_to_end: false,
            recorded_offset: 0.0,
            recorded_area: 0.0,
        }
    }

    pub fn handle(&self) -> SurfaceHandle {
        SurfaceHandle {
            tx: self.tx.clone(),
        }
    }

    /// Reset scroll context for a freshly opened document. The stick-to-end
    /// toggle is a user preference and survives.
    pub fn reset(&mut self) {
        self.feedback = ScrollFeedback::default();
        self.recorded_offset = 0.0;
        self.recorded_area = 0.0;
    }

    pub fn note_feedback(&mut self, feedback: ScrollFeedback) {
        self.feedback = feedback;
    }

    pub fn set_stick_to_end(&mut self, enabled: bool) {
        self.stick_to_end = enabled;
    }

    pub fn stick_to_end(&self) -> bool {
        self.stick_to_end
    }

    /// Capture the scroll offset and viewport area ahead of a re-render.
    ///
    /// With stick-to-end set the captured offset is twice the content height,
    /// a value guaranteed past the end that the page clamps to the bottom.
    pub fn record_scroll(&mut self) {
        self.recorded_offset = if self.stick_to_end {
            self.feedback.content_height * 2.0
        } else {
            self.feedback.scroll_y
        };
        self.recorded_area = self.feedback.viewport_area;
    }

    /// Offset to re-apply after layout, if any.
    ///
    /// The captured offset is only meaningful while the window's viewport
    /// area is unchanged; otherwise the view stays at the top.
    pub fn restore_target(&self, viewport_area: f64) -> Option<f64> {
        (viewport_area == self.recorded_area).then(|| self.recorded_offset / ZOOM_FACTOR)
    }

    /// Push new rendered content to the page.
    pub fn set_content(&self, html: String, base_url: String) {
        let _ = self.tx.send(SurfaceMessage::SetContent { html, base_url });
    }

    /// Re-apply the captured offset after the page reports a layout pass.
    pub fn restore_scroll(&mut self, viewport_area: f64) {
        self.feedback.viewport_area = viewport_area;
        if let Some(y) = self.restore_target(viewport_area) {
            let _ = self.tx.send(SurfaceMessage::ScrollTo { y });
        }
    }
}

impl Default for PreviewSurface {
    fn default() -> Self {
        Self::new()
    }
}
