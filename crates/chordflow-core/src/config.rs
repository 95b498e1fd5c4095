//! Engine tuning constants
//!
//! Every value here has a musical default; a config file only needs to
//! name the fields it changes.

use serde::{Deserialize, Serialize};

use crate::error::{ChordflowError, Result};
use crate::pattern::{Dynamics, StrumSpeed};
use crate::theory::STANDARD_TUNING;

/// Order in which an arpeggio step walks its strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArpeggioOrder {
    /// Highest string index (low E) first
    #[default]
    BassFirst,
    /// Lowest string index (high E) first
    TrebleFirst,
}

/// Velocity multipliers per dynamics level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DynamicsConfig {
    pub soft: f64,
    pub medium: f64,
    pub loud: f64,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            soft: 0.7,
            medium: 1.0,
            loud: 1.2,
        }
    }
}

impl DynamicsConfig {
    pub fn multiplier(&self, dynamics: Dynamics) -> f64 {
        match dynamics {
            Dynamics::Soft => self.soft,
            Dynamics::Medium => self.medium,
            Dynamics::Loud => self.loud,
        }
    }
}

/// Delay between successive strings of a strum, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StrumDelays {
    pub fast_ms: f64,
    pub medium_ms: f64,
    pub slow_ms: f64,
}

impl Default for StrumDelays {
    fn default() -> Self {
        Self {
            fast_ms: 10.0,
            medium_ms: 25.0,
            slow_ms: 50.0,
        }
    }
}

impl StrumDelays {
    pub fn secs(&self, speed: StrumSpeed) -> f64 {
        let ms = match speed {
            StrumSpeed::Fast => self.fast_ms,
            StrumSpeed::Medium => self.medium_ms,
            StrumSpeed::Slow => self.slow_ms,
        };
        ms.max(0.0) / 1000.0
    }
}

/// Pitch bend behaviour for slides and bends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BendConfig {
    /// Receiver pitch bend range, in semitones each way
    pub range_semitones: f64,
    /// Ramp sample rate
    pub steps_per_sec: f64,
    /// Delay after note-off before the wheel is recentred
    pub reset_delay_ms: f64,
    /// Upper bound on the slide's pre-ramp hold, in beats
    pub slide_delay_max_beats: f64,
    /// Bend amount used when source and target share a pitch
    pub default_semitones: f64,
    /// Bend curve phases as fractions of the bend span
    pub pre_hold: f64,
    pub attack: f64,
    pub peak_hold: f64,
    pub release: f64,
}

impl Default for BendConfig {
    fn default() -> Self {
        Self {
            range_semitones: 2.0,
            steps_per_sec: 50.0,
            reset_delay_ms: 50.0,
            slide_delay_max_beats: 0.25,
            default_semitones: 2.0,
            pre_hold: 0.1,
            attack: 0.3,
            peak_hold: 0.3,
            release: 0.3,
        }
    }
}

impl BendConfig {
    pub fn reset_delay_secs(&self) -> f64 {
        self.reset_delay_ms.max(0.0) / 1000.0
    }

    /// Phase fractions normalized to sum to 1
    pub fn phases(&self) -> [f64; 4] {
        let raw = [self.pre_hold, self.attack, self.peak_hold, self.release].map(|p| p.max(0.0));
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return [0.0, 0.5, 0.0, 0.5];
        }
        raw.map(|p| p / total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VibratoConfig {
    pub rate_hz: f64,
    pub samples_per_cycle: u32,
    /// Peak deviation from the note, in semitones
    pub depth_semitones: f64,
    /// Shorter notes are played without vibrato
    pub min_length_beats: f64,
}

impl Default for VibratoConfig {
    fn default() -> Self {
        Self {
            rate_hz: 5.0,
            samples_per_cycle: 20,
            depth_semitones: 0.4,
            min_length_beats: 0.1,
        }
    }
}

/// Engine-wide playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub base_velocity: u8,
    pub dynamics: DynamicsConfig,
    /// Numerator of the multi-note velocity scaling `base * factor / sqrt(n)`
    pub adaptive_velocity_factor: f64,
    pub strum_delays: StrumDelays,
    pub arpeggio_order: ArpeggioOrder,
    pub bend: BendConfig,
    pub vibrato: VibratoConfig,
    pub pull_off_velocity_factor: f64,
    pub drum_hit_ms: f64,
    pub drum_channel: u8,
    /// MIDI note of scale degree 1, octave 0, in C
    pub melody_base_note: u8,
    /// Open-string notes, high E first
    pub tuning: Vec<u8>,
    /// Position update interval
    pub tick_interval_ms: u64,
    pub preview_channel: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_velocity: 100,
            dynamics: DynamicsConfig::default(),
            adaptive_velocity_factor: 1.2,
            strum_delays: StrumDelays::default(),
            arpeggio_order: ArpeggioOrder::default(),
            bend: BendConfig::default(),
            vibrato: VibratoConfig::default(),
            pull_off_velocity_factor: 0.5,
            drum_hit_ms: 100.0,
            drum_channel: 9,
            melody_base_note: 60,
            tuning: STANDARD_TUNING.to_vec(),
            tick_interval_ms: 30,
            preview_channel: 0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ChordflowError::InvalidConfig(msg.to_string()));

        if self.base_velocity == 0 || self.base_velocity > 127 {
            return invalid("baseVelocity must be in 1..=127");
        }
        if self.tuning.is_empty() || self.tuning.iter().any(|n| *n > 127) {
            return invalid("tuning must list at least one MIDI note");
        }
        if !(self.bend.range_semitones > 0.0) {
            return invalid("bend.rangeSemitones must be positive");
        }
        if !(self.bend.steps_per_sec > 0.0) {
            return invalid("bend.stepsPerSec must be positive");
        }
        if !(self.vibrato.rate_hz > 0.0) || self.vibrato.samples_per_cycle == 0 {
            return invalid("vibrato rate and samplesPerCycle must be positive");
        }
        if !(self.adaptive_velocity_factor > 0.0) {
            return invalid("adaptiveVelocityFactor must be positive");
        }
        if self.drum_channel > 15 || self.preview_channel > 15 {
            return invalid("channels must be in 0..=15");
        }
        if self.tick_interval_ms == 0 {
            return invalid("tickIntervalMs must be positive");
        }
        Ok(())
    }

    pub fn drum_hit_secs(&self) -> f64 {
        self.drum_hit_ms.max(0.0) / 1000.0
    }
}
