//! Tracks and the segments placed on them

use serde::{Deserialize, Serialize};

use crate::drum::DrumPatternId;
use crate::melody::{MelodicSegmentId, SoloNote};
use crate::pattern::{ChordId, Dynamics, PatternId};

/// Mixer attributes shared by every track kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSettings {
    pub name: String,
    #[serde(default)]
    pub mute: bool,
    #[serde(default)]
    pub solo: bool,
    /// Velocity multiplier (0.0 - 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// MIDI channel (0 - 15); drum tracks always play on `EngineConfig::drum_channel`
    #[serde(default)]
    pub channel: u8,
}

fn default_volume() -> f32 {
    1.0
}

impl TrackSettings {
    pub fn new(name: impl Into<String>, channel: u8) -> Self {
        Self {
            name: name.into(),
            mute: false,
            solo: false,
            volume: 1.0,
            channel: channel.min(15),
        }
    }

    pub fn channel(&self) -> u8 {
        self.channel.min(15)
    }

    pub fn volume(&self) -> f64 {
        self.volume.clamp(0.0, 1.0) as f64
    }
}

/// A chord played with a pattern, placed inside an accompaniment segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChordEvent {
    pub chord: ChordId,
    pub pattern: PatternId,
    /// Beat offset from the segment start
    pub start_beat: f64,
    pub duration_beats: f64,
    #[serde(default)]
    pub dynamics: Dynamics,
}

impl ChordEvent {
    pub fn new(chord: ChordId, pattern: PatternId, start_beat: f64, duration_beats: f64) -> Self {
        Self {
            chord,
            pattern,
            start_beat,
            duration_beats,
            dynamics: Dynamics::Medium,
        }
    }

    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration_beats
    }
}

/// Strummed/arpeggiated chord progression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccompanimentSegment {
    pub name: String,
    /// Track-relative start beat
    pub start_beat: f64,
    pub length_beats: f64,
    pub events: Vec<ChordEvent>,
}

/// Single-string lead line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoloSegment {
    pub name: String,
    /// Track-relative start beat
    pub start_beat: f64,
    pub length_beats: f64,
    pub notes: Vec<SoloNote>,
}

/// A segment on a guitar track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GuitarSegment {
    Accompaniment(AccompanimentSegment),
    Solo(SoloSegment),
}

impl GuitarSegment {
    pub fn name(&self) -> &str {
        match self {
            Self::Accompaniment(s) => &s.name,
            Self::Solo(s) => &s.name,
        }
    }

    pub fn start_beat(&self) -> f64 {
        match self {
            Self::Accompaniment(s) => s.start_beat,
            Self::Solo(s) => s.start_beat,
        }
    }

    pub fn length_beats(&self) -> f64 {
        match self {
            Self::Accompaniment(s) => s.length_beats,
            Self::Solo(s) => s.length_beats,
        }
    }

    pub fn end_beat(&self) -> f64 {
        self.start_beat() + self.length_beats().max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuitarTrack {
    pub settings: TrackSettings,
    /// Semitones added to every fretted note
    #[serde(default)]
    pub capo: u8,
    #[serde(default)]
    pub segments: Vec<GuitarSegment>,
}

impl GuitarTrack {
    pub fn new(settings: TrackSettings) -> Self {
        Self {
            settings,
            capo: 0,
            segments: Vec::new(),
        }
    }

    pub fn add_segment(&mut self, segment: GuitarSegment) {
        self.segments.push(segment);
    }
}

/// A drum pattern looped from `start_beat` until the next placement (or its own duration)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrumPlacement {
    pub pattern: DrumPatternId,
    pub start_beat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_beats: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrumTrack {
    /// `channel` is not used here, hits go to the engine's drum channel
    pub settings: TrackSettings,
    #[serde(default)]
    pub segments: Vec<DrumPlacement>,
}

impl DrumTrack {
    pub fn new(settings: TrackSettings) -> Self {
        Self {
            settings,
            segments: Vec::new(),
        }
    }

    /// Placements in start order
    pub fn sorted_segments(&self) -> Vec<&DrumPlacement> {
        let mut segments: Vec<&DrumPlacement> = self.segments.iter().collect();
        segments.sort_by(|a, b| a.start_beat.total_cmp(&b.start_beat));
        segments
    }
}

/// A melodic segment placed on a lyric track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricPlacement {
    pub segment: MelodicSegmentId,
    pub start_beat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LyricTrack {
    pub settings: TrackSettings,
    #[serde(default)]
    pub segments: Vec<LyricPlacement>,
}

impl LyricTrack {
    pub fn new(settings: TrackSettings) -> Self {
        Self {
            settings,
            segments: Vec::new(),
        }
    }
}
