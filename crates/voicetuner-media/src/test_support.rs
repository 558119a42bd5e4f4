// crates/voicetuner-media/src/test_support.rs
//
// Fixture generation for the ffmpeg-backed tests. Inputs are synthesised with
// the `ffmpeg` CLI (lavfi testsrc / sine); tests that need them return early
// when the binary is not on PATH.

use std::path::{Path, PathBuf};
use std::process::Command;

pub fn ffmpeg_available() -> bool {
    let ok = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !ok {
        eprintln!("[test] ffmpeg CLI not found, skipping fixture test");
    }
    ok
}

fn run(args: &[&str]) {
    let out = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .args(args)
        .output()
        .expect("spawn ffmpeg");
    assert!(out.status.success(), "ffmpeg {args:?}: {}", String::from_utf8_lossy(&out.stderr));
}

/// H.264 test pattern of `video_secs` at 320×240/30 fps, with an optional
/// 440 Hz AAC track of `audio_secs`, optionally tagged with a display
/// rotation of `rotate` degrees.
pub fn make_video(
    dir:        &Path,
    name:       &str,
    video_secs: f64,
    audio_secs: Option<f64>,
    rotate:     Option<i32>,
) -> PathBuf {
    let plain = dir.join(format!("plain-{name}"));
    let testsrc = format!("testsrc=size=320x240:rate=30:duration={video_secs}");
    let plain_s = plain.to_string_lossy().into_owned();

    match audio_secs {
        Some(a) => {
            let sine = format!("sine=frequency=440:sample_rate=44100:duration={a}");
            run(&[
                "-f", "lavfi", "-i", &testsrc,
                "-f", "lavfi", "-i", &sine,
                "-c:v", "libx264", "-pix_fmt", "yuv420p",
                "-c:a", "aac", &plain_s,
            ]);
        }
        None => {
            run(&["-f", "lavfi", "-i", &testsrc, "-c:v", "libx264", "-pix_fmt", "yuv420p", &plain_s]);
        }
    }

    let Some(deg) = rotate else { return plain };
    let rotated = dir.join(name);
    let deg_s = deg.to_string();
    run(&[
        "-display_rotation", &deg_s, "-i", &plain_s,
        "-c", "copy", &rotated.to_string_lossy(),
    ]);
    rotated
}

/// Standalone AAC-in-MP4 audio file of `secs` seconds.
pub fn make_audio(dir: &Path, name: &str, secs: f64) -> PathBuf {
    let path = dir.join(name);
    let sine = format!("sine=frequency=330:sample_rate=44100:duration={secs}");
    run(&["-f", "lavfi", "-i", &sine, "-c:a", "aac", "-f", "mp4", &path.to_string_lossy()]);
    path
}
