// crates/voicetuner-cli/src/helpers/format.rs
//
// Terminal string utilities. Durations come from
// voicetuner_core::helpers::time; this module only lays text out.

use voicetuner_core::graph::GraphParameters;

/// Fixed-width text progress bar, e.g. `[#####.....]  50%`.
/// A zero `total` renders as empty rather than dividing by zero.
pub fn progress_bar(done: u64, total: u64, width: usize) -> String {
    let frac = if total == 0 { 0.0 } else { (done.min(total) as f64) / total as f64 };
    let filled = (frac * width as f64).round() as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        ".".repeat(width - filled),
        (frac * 100.0).round() as u32,
    )
}

/// One-line summary of a parameter set for `presets` and log lines.
pub fn describe_params(p: &GraphParameters) -> String {
    let pitch = if p.pitch_cents == 0 {
        "pitch 0".to_string()
    } else {
        format!("pitch {:+} cents", p.pitch_cents)
    };
    let mut parts = vec![pitch];
    if p.reverb_wet_dry_mix > 0.0 {
        parts.push(format!("reverb {:.0}%", p.reverb_wet_dry_mix));
    }
    if p.distortion.wet_dry_mix > 0.0 {
        parts.push(format!(
            "distortion {:?} {:.0}% @ {:+.0} dB",
            p.distortion.preset, p.distortion.wet_dry_mix, p.distortion.pre_gain_db,
        ));
    }
    parts.join(", ")
}

/// Clips `s` to at most `max` bytes on a character boundary.
pub fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    s.char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .map(|i| &s[..i])
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicetuner_core::presets::EffectPreset;

    #[test]
    fn bar_ends() {
        assert_eq!(progress_bar(0, 10, 10),  "[..........]   0%");
        assert_eq!(progress_bar(10, 10, 10), "[##########] 100%");
        assert_eq!(progress_bar(5, 0, 4),    "[....]   0%");
    }

    #[test]
    fn bar_clamps_overshoot() {
        assert_eq!(progress_bar(31, 30, 6), "[######] 100%");
    }

    #[test]
    fn neutral_params_are_just_pitch() {
        assert_eq!(describe_params(&GraphParameters::neutral()), "pitch 0");
    }

    #[test]
    fn monster_mentions_pitch_drop() {
        let s = describe_params(&GraphParameters::for_preset(EffectPreset::Monster));
        assert!(s.starts_with("pitch -800 cents"), "{s}");
    }

    #[test]
    fn truncate_keeps_codepoints_whole() {
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("élan", 1), "");
        assert_eq!(truncate("short", 10), "short");
    }
}
