// crates/voicetuner-core/src/helpers/time.rs
//
// Frame/second conversions shared by the PCM buffer, the composition
// timeline and the engine, plus human-readable durations for the CLI.

/// Number of frames covering `secs` seconds at `rate` Hz, rounded to nearest.
///
/// ```
/// use voicetuner_core::helpers::time::secs_to_frames;
/// assert_eq!(secs_to_frames(1.5, 44_100), 66_150);
/// assert_eq!(secs_to_frames(-1.0, 44_100), 0);
/// ```
pub fn secs_to_frames(secs: f64, rate: u32) -> u64 {
    (secs.max(0.0) * rate as f64).round() as u64
}

pub fn frames_to_secs(frames: u64, rate: u32) -> f64 {
    if rate == 0 { 0.0 } else { frames as f64 / rate as f64 }
}

/// True when two durations agree within `tolerance` seconds.
pub fn within(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance
}

/// Format a duration in seconds as a compact human-readable string.
///
/// | Range         | Format       | Example   |
/// |---------------|--------------|-----------|
/// | ≥ 3600 s      | `H:MM:SS`    | `1:04:35` |
/// | ≥ 60 s        | `M:SS`       | `3:07`    |
/// | < 60 s        | `S.Xs`       | `4.2s`    |
///
/// ```
/// use voicetuner_core::helpers::time::format_duration;
/// assert_eq!(format_duration(4.2),    "4.2s");
/// assert_eq!(format_duration(187.0),  "3:07");
/// assert_eq!(format_duration(3875.0), "1:04:35");
/// ```
pub fn format_duration(secs: f64) -> String {
    let whole = secs.max(0.0) as u64;
    if secs >= 3600.0 {
        format!("{}:{:02}:{:02}", whole / 3600, (whole % 3600) / 60, whole % 60)
    } else if secs >= 60.0 {
        format!("{}:{:02}", whole / 60, whole % 60)
    } else {
        format!("{secs:.1}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_and_secs_agree() {
        let f = secs_to_frames(3.0, 44_100);
        assert_eq!(f, 132_300);
        assert!(within(frames_to_secs(f, 44_100), 3.0, 1e-9));
        assert_eq!(frames_to_secs(10, 0), 0.0);
    }
}
