// crates/voicetuner-cli/src/collab.rs
//
// Filesystem stand-ins for the front-end collaborators.
//
//   PathPicker       "picks" the video named on the command line
//   FolderLibrary    saves finished videos into a directory; `--deny-save`
//                    makes it refuse authorization

use std::path::{Path, PathBuf};

use voicetuner_core::collaborators::{Persistence, PickerOutcome, VideoPicker};
use voicetuner_core::presets::EffectPreset;
use voicetuner_core::Result;

pub struct PathPicker {
    path: Option<PathBuf>,
}

impl PathPicker {
    pub fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }
}

impl VideoPicker for PathPicker {
    /// Yields the path once. A path that does not exist counts as a cancel.
    fn pick(&mut self) -> PickerOutcome {
        match self.path.take() {
            Some(p) if p.is_file() => PickerOutcome::Selected(p),
            Some(p) => {
                tracing::warn!("[picker] {} is not a file", p.display());
                PickerOutcome::Cancelled
            }
            None => PickerOutcome::Cancelled,
        }
    }
}

pub struct FolderLibrary {
    dir:     PathBuf,
    allowed: bool,
    name:    String,
}

impl FolderLibrary {
    pub fn new(dir: PathBuf, allowed: bool, source: &Path, preset: EffectPreset) -> Self {
        let stem = source.file_stem().and_then(|s| s.to_str()).unwrap_or("video");
        Self { dir, allowed, name: saved_name(stem, preset) }
    }
}

/// `clip.mov` with the monster preset is saved as `clip-monster.mp4`.
pub fn saved_name(stem: &str, preset: EffectPreset) -> String {
    format!("{stem}-{preset}.mp4")
}

impl Persistence for FolderLibrary {
    fn authorize(&mut self) -> bool {
        if !self.allowed {
            tracing::warn!("[library] saving to {} not permitted", self.dir.display());
        }
        self.allowed
    }

    fn save(&mut self, path: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let dst = self.dir.join(&self.name);
        std::fs::copy(path, &dst)?;
        tracing::debug!("[library] {} -> {}", path.display(), dst.display());
        Ok(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picker_yields_existing_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("in.mov");
        std::fs::write(&f, b"x").unwrap();
        let mut p = PathPicker::new(f.clone());
        assert_eq!(p.pick(), PickerOutcome::Selected(f));
        assert_eq!(p.pick(), PickerOutcome::Cancelled);
    }

    #[test]
    fn missing_file_is_a_cancel() {
        let mut p = PathPicker::new("/definitely/not/here.mov".into());
        assert_eq!(p.pick(), PickerOutcome::Cancelled);
    }

    #[test]
    fn library_copies_under_preset_name() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("convertedVideo.mp4");
        std::fs::write(&src, b"movie").unwrap();

        let out = dir.path().join("library");
        let mut lib = FolderLibrary::new(out.clone(), true, Path::new("/x/clip.mov"), EffectPreset::Girl);
        assert!(lib.authorize());
        let saved = lib.save(&src).unwrap();
        assert_eq!(saved, out.join("clip-girl.mp4"));
        assert_eq!(std::fs::read(saved).unwrap(), b"movie");
    }

    #[test]
    fn denied_library_refuses() {
        let mut lib = FolderLibrary::new("/tmp".into(), false, Path::new("a.mov"), EffectPreset::Man);
        assert!(!lib.authorize());
    }
}
