// crates/voicetuner-core/src/presets.rs
//
// Voice effect presets: a closed set, each a pure mapping to node parameters.
//
// `params()` always starts from `PresetParams::neutral()` and overlays the
// preset's own values. Nothing here is cumulative: the result for a preset is
// the same no matter which preset was active before, which is what lets the
// engine apply one with a single absolute overwrite of the graph parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Distortion factory presets ────────────────────────────────────────────────

/// Factory presets for the distortion node. Loading one sets the node's
/// algorithm, its default pre-gain and its default wet/dry mix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistortionPreset {
    /// Gentle bit reduction. Used as the neutral preset (with mix forced to 0).
    DrumsBitBrush,
    /// Ring modulation plus sample-rate decimation: the "alien" voice.
    SpeechAlienChatter,
}

impl DistortionPreset {
    pub fn default_pre_gain_db(self) -> f32 {
        match self {
            DistortionPreset::DrumsBitBrush      => -6.0,
            DistortionPreset::SpeechAlienChatter => -6.0,
        }
    }

    pub fn default_wet_dry_mix(self) -> f32 {
        match self {
            DistortionPreset::DrumsBitBrush      => 50.0,
            DistortionPreset::SpeechAlienChatter => 100.0,
        }
    }
}

/// Parameter block of the distortion node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DistortionParams {
    pub preset:      DistortionPreset,
    /// 0–100, percent of processed signal.
    pub wet_dry_mix: f32,
    /// Gain applied before the nonlinearity, in dB.
    pub pre_gain_db: f32,
}

impl DistortionParams {
    /// Equivalent of loading a factory preset: every field comes from `preset`.
    pub fn load_factory(preset: DistortionPreset) -> Self {
        Self {
            preset,
            wet_dry_mix: preset.default_wet_dry_mix(),
            pre_gain_db: preset.default_pre_gain_db(),
        }
    }
}

/// Every processing-node parameter a preset controls.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresetParams {
    /// Pitch shift in cents (100 cents = one semitone).
    pub pitch_cents:        i32,
    /// 0–100, percent of reverberated signal.
    pub reverb_wet_dry_mix: f32,
    pub distortion:         DistortionParams,
}

impl PresetParams {
    /// Neutral node state: reverb 0, pitch 0, bit-brush distortion at mix 0.
    pub fn neutral() -> Self {
        let mut distortion = DistortionParams::load_factory(DistortionPreset::DrumsBitBrush);
        distortion.wet_dry_mix = 0.0;
        Self {
            pitch_cents:        0,
            reverb_wet_dry_mix: 0.0,
            distortion,
        }
    }
}

impl Default for PresetParams {
    fn default() -> Self { Self::neutral() }
}

// ── EffectPreset ──────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EffectPreset {
    Man,
    Monster,
    Girl,
    Cartoon,
    Room,
    Alien,
    #[default]
    Default,
}

impl EffectPreset {
    /// The selectable voice effects, in picker order. `Default` is the
    /// implicit "no selection" state and is not listed.
    pub const ALL: [EffectPreset; 6] = [
        EffectPreset::Man,
        EffectPreset::Monster,
        EffectPreset::Girl,
        EffectPreset::Cartoon,
        EffectPreset::Room,
        EffectPreset::Alien,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EffectPreset::Man     => "man",
            EffectPreset::Monster => "monster",
            EffectPreset::Girl    => "girl",
            EffectPreset::Cartoon => "cartoon",
            EffectPreset::Room    => "room",
            EffectPreset::Alien   => "alien",
            EffectPreset::Default => "default",
        }
    }

    /// Name of the icon resource a front end should show for this preset.
    /// Resolving the name to an image is the front end's job.
    pub fn icon_name(self) -> String {
        format!("{}Ico", self.name())
    }

    /// Full parameter set for this preset: neutral state plus overrides.
    pub fn params(self) -> PresetParams {
        let mut p = PresetParams::neutral();
        match self {
            EffectPreset::Default => {}
            EffectPreset::Man => {
                p.pitch_cents = -200;
            }
            EffectPreset::Monster => {
                p.pitch_cents = -800;
                p.reverb_wet_dry_mix = 30.0;
            }
            EffectPreset::Girl => {
                p.pitch_cents = 600;
                p.distortion.pre_gain_db = -30.0;
            }
            EffectPreset::Cartoon => {
                p.pitch_cents = 1200;
            }
            EffectPreset::Room => {
                p.reverb_wet_dry_mix = 50.0;
            }
            EffectPreset::Alien => {
                p.distortion = DistortionParams::load_factory(DistortionPreset::SpeechAlienChatter);
            }
        }
        p
    }
}

impl fmt::Display for EffectPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        std::iter::once(EffectPreset::Default)
            .chain(EffectPreset::ALL)
            .find(|p| p.name() == lower)
            .ok_or_else(|| format!("unknown preset '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_neutral() {
        assert_eq!(EffectPreset::Default.params(), PresetParams::neutral());
    }

    #[test]
    fn monster_params() {
        let p = EffectPreset::Monster.params();
        assert_eq!(p.pitch_cents, -800);
        assert_eq!(p.reverb_wet_dry_mix, 30.0);
        assert_eq!(p.distortion.wet_dry_mix, 0.0);
    }

    #[test]
    fn girl_only_touches_pitch_and_pre_gain() {
        let p = EffectPreset::Girl.params();
        let n = PresetParams::neutral();
        assert_eq!(p.pitch_cents, 600);
        assert_eq!(p.distortion.pre_gain_db, -30.0);
        assert_eq!(p.reverb_wet_dry_mix, n.reverb_wet_dry_mix);
        assert_eq!(p.distortion.preset, n.distortion.preset);
        assert_eq!(p.distortion.wet_dry_mix, n.distortion.wet_dry_mix);
    }

    #[test]
    fn alien_loads_factory_mix() {
        let p = EffectPreset::Alien.params();
        assert_eq!(p.distortion.preset, DistortionPreset::SpeechAlienChatter);
        assert_eq!(p.distortion.wet_dry_mix, 100.0);
        assert_eq!(p.pitch_cents, 0);
    }

    #[test]
    fn pitch_range_matches_presets() {
        let cents: Vec<i32> = EffectPreset::ALL.iter().map(|p| p.params().pitch_cents).collect();
        assert_eq!(cents.iter().min(), Some(&-800));
        assert_eq!(cents.iter().max(), Some(&1200));
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for p in EffectPreset::ALL {
            assert_eq!(p.name().parse::<EffectPreset>().unwrap(), p);
        }
        assert_eq!("DEFAULT".parse::<EffectPreset>().unwrap(), EffectPreset::Default);
        assert!("robot".parse::<EffectPreset>().is_err());
    }

    #[test]
    fn icon_names() {
        assert_eq!(EffectPreset::Monster.icon_name(), "monsterIco");
    }
}
