//! Core library for the pandoc preview pipeline.
//!
//! A change-driven document pipeline: a watched markdown source (plus the
//! satellite files its table directives reference) is pre-processed, compiled
//! to HTML by pandoc, and handed to a presentation surface that preserves
//! scroll context across re-renders.
//!
//! # Modules
//!
//! - [`document`] - Document identity and accepted-type checks
//! - [`watcher`] - File watching over the source and its satellites
//! - [`preprocess`] - Table directive expansion via the helper script
//! - [`compile`] - Markdown to HTML compilation via pandoc
//! - [`surface`] - Scroll model and the page message protocol
//! - [`pipeline`] - The controller actor orchestrating runs
//! - [`export`] - Export destination policy
//! - [`config`] - Persisted recent-files state
//! - [`paths`] - Install and resource directory discovery
//! - [`error`] - Pipeline error kinds

pub mod compile;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod paths;
pub mod pipeline;
pub mod preprocess;
pub mod surface;
pub mod watcher;

// Re-export commonly used types at crate root.
pub use compile::Compiler;
pub use config::AppConfig;
pub use document::Document;
pub use error::PipelineError;
pub use paths::AppPaths;
pub use pipeline::{ControllerMsg, ControllerHandle, PipelineController, PipelineStatus};
pub use preprocess::{PythonTableHelper, TableHelper};
pub use surface::{ScrollFeedback, SurfaceHandle, SurfaceMessage, UiSignal};
pub use watcher::{DocumentWatcher, WatchEvent};
