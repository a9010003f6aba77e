//! Export destination policy.
//!
//! An export is a parameterised pipeline run: the same pre-processing pass,
//! then the converter in export mode writing an artifact instead of
//! returning bytes. The run itself is orchestrated by the controller; this
//! module keeps the "save" / "save as" destination memory.

use std::path::{Path, PathBuf};

/// Remembers the export destination across "save" requests.
///
/// The destination is forgotten when another document is opened.
#[derive(Debug, Default)]
pub struct Exporter {
    last_destination: Option<PathBuf>,
}

impl Exporter {
    /// Destination a plain "save" should reuse, if known.
    pub fn last_destination(&self) -> Option<&Path> {
        self.last_destination.as_deref()
    }

    /// Remember the destination of a completed export.
    pub fn remember(&mut self, target: PathBuf) {
        self.last_destination = Some(target);
    }

    /// Forget the destination; called when a new document is opened.
    pub fn reset(&mut self) {
        self.last_destination = None;
    }
}
