//! Player configuration, loadable from TOML. Every field has a default.
//!
//! ```toml
//! volume = 50.0        # 0..=100
//! frequency = 440.0    # Hz, pitch multiplier = frequency / base_frequency
//! tempo = 120.0        # BPM
//! reverb = 0.0         # 0..=100
//!
//! [timing]
//! debounce_ms = 150.0
//!
//! [[melody]]
//! pitch_hz = 329.63
//! relative_duration = 0.25
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, PlayerResult};
use crate::melody::{Melody, MelodyEvent, BASE_FREQUENCY_HZ, REFERENCE_TEMPO_BPM};
use crate::nodes::Wave;
use crate::reverb::{DEFAULT_IMPULSE_DECAY, DEFAULT_IMPULSE_SECONDS};

pub const VOLUME_RANGE: (f32, f32) = (0.0, 100.0);
pub const REVERB_RANGE: (f32, f32) = (0.0, 100.0);
pub const TEMPO_RANGE: (f32, f32) = (10.0, 960.0);
pub const FREQUENCY_RANGE: (f32, f32) = (20.0, 20_000.0);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Initial volume, 0..=100.
    pub volume: f32,
    /// Initial pitch base in Hz.
    pub frequency: f32,
    /// Initial tempo in BPM.
    pub tempo: f32,
    /// Initial reverb amount, 0..=100.
    pub reverb: f32,
    /// Pitch that leaves the melody untransposed.
    pub base_frequency: f32,
    /// Tempo at which melody durations are read as seconds.
    pub reference_tempo: f32,
    pub wave: Wave,
    pub timing: TimingConfig,
    pub impulse: ImpulseConfig,
    /// Replaces the built-in melody when present.
    pub melody: Option<Vec<MelodyEvent>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Quiet period before a tempo change is committed.
    pub debounce_ms: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    /// Glide time constants for live changes.
    pub volume_glide_ms: f32,
    pub pitch_glide_ms: f32,
    pub reverb_glide_ms: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpulseConfig {
    pub seconds: f32,
    pub decay: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: 50.0,
            frequency: BASE_FREQUENCY_HZ,
            tempo: REFERENCE_TEMPO_BPM,
            reverb: 0.0,
            base_frequency: BASE_FREQUENCY_HZ,
            reference_tempo: REFERENCE_TEMPO_BPM,
            wave: Wave::Sine,
            timing: TimingConfig::default(),
            impulse: ImpulseConfig::default(),
            melody: None,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150.0,
            attack_ms: 10.0,
            release_ms: 50.0,
            volume_glide_ms: 10.0,
            pitch_glide_ms: 15.0,
            reverb_glide_ms: 10.0,
        }
    }
}

impl Default for ImpulseConfig {
    fn default() -> Self {
        Self { seconds: DEFAULT_IMPULSE_SECONDS, decay: DEFAULT_IMPULSE_DECAY }
    }
}

impl PlayerConfig {
    pub fn from_toml_str(src: &str) -> PlayerResult<Self> {
        let cfg: Self = toml::from_str(src)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> PlayerResult<Self> {
        let src = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PlayerError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&src)
    }

    /// The melody to play: the configured table or the built-in one.
    pub fn melody(&self) -> PlayerResult<Melody> {
        match &self.melody {
            Some(events) => Melody::new(events.clone()),
            None => Ok(Melody::default()),
        }
    }

    pub fn validate(&self) -> PlayerResult {
        let positive = |name: &str, v: f64| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(PlayerError::Config(format!("{name} must be positive, got {v}")))
            }
        };
        positive("base_frequency", f64::from(self.base_frequency))?;
        positive("reference_tempo", f64::from(self.reference_tempo))?;
        positive("timing.debounce_ms", self.timing.debounce_ms)?;
        positive("impulse.seconds", f64::from(self.impulse.seconds))?;
        self.melody()?;
        Ok(())
    }
}
