//! Chords and guitar playing patterns

use serde::{Deserialize, Serialize};

/// Number of guitar strings
pub const STRING_COUNT: usize = 6;

/// Unique identifier for chords
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChordId(pub u64);

/// Unique identifier for guitar patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(pub u64);

/// A chord shape.
///
/// `frets` is indexed by string, 0 = high E (string 1) .. 5 = low E (string 6).
/// -1 = muted, 0 = open, >0 = fretted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chord {
    pub id: ChordId,
    pub name: String,
    pub frets: [i8; STRING_COUNT],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingers: Option<[u8; STRING_COUNT]>,
}

impl Chord {
    pub fn new(id: ChordId, name: impl Into<String>, frets: [i8; STRING_COUNT]) -> Self {
        Self {
            id,
            name: name.into(),
            frets,
            fingers: None,
        }
    }

    pub fn fret(&self, string: usize) -> Option<i8> {
        self.frets.get(string).copied()
    }

    pub fn is_muted(&self, string: usize) -> bool {
        self.fret(string).is_none_or(|f| f < 0)
    }
}

/// Note resolution of a pattern grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoteResolution {
    #[default]
    Eighth,
    Sixteenth,
}

impl NoteResolution {
    pub fn steps_per_beat(&self) -> u32 {
        match self {
            Self::Eighth => 2,
            Self::Sixteenth => 4,
        }
    }
}

/// What a pattern step does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepKind {
    #[default]
    Rest,
    Arpeggio,
    Strum,
}

/// Strum direction. A down strum travels from the bass string toward the treble string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrumDirection {
    #[default]
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrumSpeed {
    Fast,
    #[default]
    Medium,
    Slow,
}

/// Per-measure loudness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dynamics {
    Soft,
    #[default]
    Medium,
    Loud,
}

/// Replaces the chord's fret on one string for a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FretOverride {
    pub string: u8,
    pub fret: i8,
}

/// One slot of a guitar pattern
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default)]
    pub kind: StepKind,
    /// Active string indices
    #[serde(default)]
    pub strings: Vec<u8>,
    #[serde(default)]
    pub fret_overrides: Vec<FretOverride>,
    #[serde(default)]
    pub direction: StrumDirection,
    #[serde(default)]
    pub speed: StrumSpeed,
}

impl Step {
    pub fn rest() -> Self {
        Self::default()
    }

    pub fn strum(strings: impl Into<Vec<u8>>, direction: StrumDirection, speed: StrumSpeed) -> Self {
        Self {
            kind: StepKind::Strum,
            strings: strings.into(),
            direction,
            speed,
            ..Default::default()
        }
    }

    pub fn arpeggio(strings: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: StepKind::Arpeggio,
            strings: strings.into(),
            ..Default::default()
        }
    }

    pub fn with_override(mut self, string: u8, fret: i8) -> Self {
        self.fret_overrides.retain(|o| o.string != string);
        self.fret_overrides.push(FretOverride { string, fret });
        self
    }

    pub fn fret_override(&self, string: u8) -> Option<i8> {
        self.fret_overrides
            .iter()
            .find(|o| o.string == string)
            .map(|o| o.fret)
    }
}

/// A step-grid playing pattern (strums and arpeggios)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuitarPattern {
    pub id: PatternId,
    pub name: String,
    #[serde(default)]
    pub resolution: NoteResolution,
    pub steps: Vec<Step>,
}

impl GuitarPattern {
    pub fn new(id: PatternId, name: impl Into<String>, resolution: NoteResolution) -> Self {
        Self {
            id,
            name: name.into(),
            resolution,
            steps: Vec::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Length of one pass through the grid at its own resolution
    pub fn natural_length_beats(&self) -> f64 {
        self.steps.len() as f64 / self.resolution.steps_per_beat() as f64
    }
}
