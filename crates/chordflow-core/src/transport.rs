//! Tempo context, transport state and controls

use serde::{Deserialize, Serialize};

use crate::error::{ChordflowError, Result};

/// Time signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSignature {
    pub beats_per_measure: u8,
    pub beat_unit: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats_per_measure: 4,
            beat_unit: 4,
        }
    }
}

/// Tempo used to convert beat positions into wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TempoContext {
    /// Tempo in BPM, always > 0
    pub bpm: f64,
    #[serde(default)]
    pub time_signature: TimeSignature,
}

impl Default for TempoContext {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            time_signature: TimeSignature::default(),
        }
    }
}

impl TempoContext {
    pub fn new(bpm: f64) -> Result<Self> {
        let tempo = Self {
            bpm,
            ..Default::default()
        };
        tempo.validate()?;
        Ok(tempo)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.bpm.is_finite() || self.bpm <= 0.0 {
            return Err(ChordflowError::InvalidTempo(self.bpm));
        }
        Ok(())
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn beats_to_secs(&self, beats: f64) -> f64 {
        beats * self.seconds_per_beat()
    }

    pub fn secs_to_beats(&self, secs: f64) -> f64 {
        secs * self.bpm / 60.0
    }

    pub fn beats_per_measure(&self) -> f64 {
        self.time_signature.beats_per_measure.max(1) as f64
    }
}

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// Loop region in beats
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopRegion {
    pub start_beat: f64,
    pub end_beat: f64,
}

impl LoopRegion {
    pub fn new(start_beat: f64, end_beat: f64) -> Option<Self> {
        let start_beat = start_beat.max(0.0);
        (end_beat > start_beat).then_some(Self {
            start_beat,
            end_beat,
        })
    }

    pub fn length_beats(&self) -> f64 {
        self.end_beat - self.start_beat
    }
}

/// Transport controls and position
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transport {
    pub state: TransportState,
    /// Current position in beats
    pub position_beats: f64,
    pub loop_region: Option<LoopRegion>,
    pub loop_enabled: bool,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn play(&mut self) {
        self.state = TransportState::Playing;
    }

    pub fn pause(&mut self) {
        self.state = TransportState::Paused;
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Idle;
        self.position_beats = 0.0;
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == TransportState::Paused
    }

    pub fn set_position(&mut self, beats: f64) {
        self.position_beats = if beats.is_finite() { beats.max(0.0) } else { 0.0 };
    }

    /// Set and enable the loop region; returns false for an empty region
    pub fn set_loop(&mut self, start_beat: f64, end_beat: f64) -> bool {
        match LoopRegion::new(start_beat, end_beat) {
            Some(region) => {
                self.loop_region = Some(region);
                self.loop_enabled = true;
                true
            }
            None => false,
        }
    }

    pub fn clear_loop(&mut self) {
        self.loop_region = None;
        self.loop_enabled = false;
    }

    /// Active loop region, if looping is on
    pub fn active_loop(&self) -> Option<LoopRegion> {
        self.loop_region.filter(|_| self.loop_enabled)
    }

    /// Where playback must jump when `position` has reached the loop end
    pub fn loop_wrap(&self, position: f64) -> Option<f64> {
        let region = self.active_loop()?;
        (position >= region.end_beat).then_some(region.start_beat)
    }

    /// Format position as MM:SS.ss at the given tempo
    pub fn format_time(&self, tempo: &TempoContext) -> String {
        let secs = tempo.beats_to_secs(self.position_beats);
        let mins = (secs / 60.0) as u32;
        let secs_rem = secs % 60.0;
        format!("{:02}:{:05.2}", mins, secs_rem)
    }

    /// Format position as 1-based bar.beat
    pub fn format_bars(&self, tempo: &TempoContext) -> String {
        let per_bar = tempo.beats_per_measure();
        let bar = (self.position_beats / per_bar).floor() as u32 + 1;
        let beat = (self.position_beats % per_bar).floor() as u32 + 1;
        format!("{}.{}", bar, beat)
    }
}
