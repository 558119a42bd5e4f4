// crates/voicetuner-core/src/paths.rs
// Where a session keeps its intermediate files.
//
// Each session owns a fresh temp directory; it is deleted when the
// `SessionPaths` is dropped. Producing steps call `clear()` on their target
// before writing so a stale file from an earlier attempt never survives.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

pub const EXTRACTED_AUDIO_NAME: &str = "audio.m4a";
pub const RENDERED_AUDIO_NAME:  &str = "newAudio.aac";
pub const OUTPUT_VIDEO_NAME:    &str = "convertedVideo.mp4";

#[derive(Debug)]
pub struct SessionPaths {
    dir: TempDir,
}

impl SessionPaths {
    pub fn create_in(root: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix("voicetuner-").tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path { self.dir.path() }

    pub fn extracted_audio(&self) -> PathBuf { self.dir.path().join(EXTRACTED_AUDIO_NAME) }
    pub fn rendered_audio(&self)  -> PathBuf { self.dir.path().join(RENDERED_AUDIO_NAME) }
}

/// Remove `path` if it exists. A missing file is not an error.
pub fn clear(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_dir_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let dir = {
            let s = SessionPaths::create_in(root.path()).unwrap();
            assert!(s.extracted_audio().ends_with("audio.m4a"));
            assert!(s.rendered_audio().ends_with("newAudio.aac"));
            std::fs::write(s.rendered_audio(), b"x").unwrap();
            s.dir().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[test]
    fn sessions_do_not_share_files() {
        let root = tempfile::tempdir().unwrap();
        let a = SessionPaths::create_in(root.path()).unwrap();
        let b = SessionPaths::create_in(root.path()).unwrap();
        assert_ne!(a.extracted_audio(), b.extracted_audio());
    }

    #[test]
    fn clear_tolerates_missing_file() {
        let root = tempfile::tempdir().unwrap();
        let p = root.path().join("nope");
        clear(&p).unwrap();
        std::fs::write(&p, b"x").unwrap();
        clear(&p).unwrap();
        assert!(!p.exists());
    }
}
