// crates/voicetuner-core/src/collaborators.rs
//
// Contracts for the parts of the application that live outside the pipeline:
// recording, picking an existing video, and saving the result. Front ends
// implement these; the pipeline only ever calls through them.

use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Recording finished; the movie file is at this path.
    Finished(PathBuf),
    Cancelled,
    Failed(String),
}

/// Produces a raw input video by recording.
pub trait CaptureSource {
    fn record(&mut self) -> CaptureOutcome;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PickerOutcome {
    Selected(PathBuf),
    Cancelled,
}

/// Lets the user choose an existing video.
pub trait VideoPicker {
    fn pick(&mut self) -> PickerOutcome;
}

/// Saves a finished video somewhere the user keeps their media.
pub trait Persistence {
    /// Whether saving is currently permitted. Asking the user is the
    /// implementor's business; the pipeline only checks the answer.
    fn authorize(&mut self) -> bool;

    /// Store the file at `path`, returning where it ended up.
    fn save(&mut self, path: &Path) -> Result<PathBuf>;
}
