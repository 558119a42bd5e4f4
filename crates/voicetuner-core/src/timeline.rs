// crates/voicetuner-core/src/timeline.rs
//
// Composition timeline used by the muxer.
//
// The video track is authoritative: both inserted ranges span the video's
// duration, starting at zero. How the audio asset is fitted into that range
// is described by `AudioFit`, so truncation and silence padding are explicit,
// testable outcomes rather than whatever the encoder happens to do.
//
// `VideoTransform` is the container's 3×3 display matrix (16.16 fixed point
// for the rotation/scale terms, 2.30 for the last column), the same layout
// ffmpeg exposes as DISPLAYMATRIX side data. The muxer copies it verbatim.

use serde::{Deserialize, Serialize};

use crate::helpers::time::{secs_to_frames, within};

/// Half-open time range in seconds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start:    f64,
    pub duration: f64,
}

impl TimeRange {
    pub fn from_zero(duration: f64) -> Self {
        Self { start: 0.0, duration: duration.max(0.0) }
    }

    pub fn end(&self) -> f64 { self.start + self.duration }
}

// ── Orientation ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoTransform {
    pub matrix: [i32; 9],
}

/// Size in bytes of a serialized display matrix.
pub const DISPLAY_MATRIX_BYTES: usize = 36;

impl VideoTransform {
    pub const IDENTITY: VideoTransform = VideoTransform {
        matrix: [1 << 16, 0, 0, 0, 1 << 16, 0, 0, 0, 1 << 30],
    };

    /// Matrix for an anticlockwise display rotation of `degrees`, laid out
    /// like `av_display_rotation_set`.
    pub fn from_rotation(degrees: f64) -> Self {
        let radians = -degrees.to_radians();
        let (s, c) = radians.sin_cos();
        let fp = |x: f64| (x * 65536.0).round() as i32;
        let mut matrix = [0i32; 9];
        matrix[0] = fp(c);
        matrix[1] = fp(-s);
        matrix[3] = fp(s);
        matrix[4] = fp(c);
        matrix[8] = 1 << 30;
        Self { matrix }
    }

    /// Anticlockwise display rotation in degrees, normalised to `[0, 360)`.
    /// Inverse of `from_rotation`. `None` for a degenerate (zero-scale) matrix.
    pub fn rotation_degrees(&self) -> Option<f64> {
        let m = |i: usize| self.matrix[i] as f64 / 65536.0;
        let scale0 = m(0).hypot(m(3));
        let scale1 = m(1).hypot(m(4));
        if scale0 == 0.0 || scale1 == 0.0 {
            return None;
        }
        let ccw = (m(1) / scale1).atan2(m(0) / scale0).to_degrees();
        Some(ccw.rem_euclid(360.0))
    }

    /// True when the displayed frame is the coded frame turned by 90° or 270°,
    /// i.e. displayed width and height are swapped.
    pub fn is_quarter_turn(&self) -> bool {
        self.rotation_degrees()
            .map(|r| {
                let r = r.round() as i64;
                r == 90 || r == 270
            })
            .unwrap_or(false)
    }

    pub fn to_ne_bytes(&self) -> [u8; DISPLAY_MATRIX_BYTES] {
        let mut out = [0u8; DISPLAY_MATRIX_BYTES];
        for (chunk, v) in out.chunks_exact_mut(4).zip(self.matrix.iter()) {
            chunk.copy_from_slice(&v.to_ne_bytes());
        }
        out
    }

    pub fn from_ne_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < DISPLAY_MATRIX_BYTES {
            return None;
        }
        let mut matrix = [0i32; 9];
        for (v, chunk) in matrix.iter_mut().zip(bytes.chunks_exact(4)) {
            *v = i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Some(Self { matrix })
    }
}

impl Default for VideoTransform {
    fn default() -> Self { Self::IDENTITY }
}

// ── Composition ───────────────────────────────────────────────────────────────

/// How the audio asset is fitted into the video-authoritative range.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum AudioFit {
    /// Durations agree (within one video frame).
    Exact,
    /// Audio is longer; this many seconds of its tail are dropped.
    Truncate { dropped: f64 },
    /// Audio is shorter; this many seconds of silence follow it.
    PadSilence { padded: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositionTimeline {
    pub video:     TimeRange,
    pub audio:     TimeRange,
    pub transform: VideoTransform,
    pub audio_fit: AudioFit,
}

impl CompositionTimeline {
    /// Build the timeline for a mux. `tolerance` is the duration difference
    /// (seconds) still treated as an exact match, normally one frame.
    pub fn video_authoritative(
        video_duration: f64,
        audio_duration: f64,
        transform:      VideoTransform,
        tolerance:      f64,
    ) -> Self {
        let range = TimeRange::from_zero(video_duration);
        let diff  = audio_duration - range.duration;
        let audio_fit = if within(audio_duration, range.duration, tolerance) {
            AudioFit::Exact
        } else if diff > 0.0 {
            AudioFit::Truncate { dropped: diff }
        } else {
            AudioFit::PadSilence { padded: -diff }
        };
        Self { video: range, audio: range, transform, audio_fit }
    }

    /// Number of audio samples the output track must contain at `rate`.
    pub fn audio_samples(&self, rate: u32) -> u64 {
        secs_to_frames(self.audio.duration, rate)
    }

    /// Number of video frames the output track must contain at `fps`.
    pub fn video_frames(&self, fps: u32) -> u64 {
        secs_to_frames(self.video.duration, fps)
    }
}
