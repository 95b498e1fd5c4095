//! Resource library referenced by arrangement segments

use serde::{Deserialize, Serialize};

use crate::drum::{DrumPattern, DrumPatternId};
use crate::error::{ChordflowError, Result};
use crate::melody::{MelodicSegment, MelodicSegmentId};
use crate::pattern::{Chord, ChordId, GuitarPattern, PatternId};

/// Chords, patterns and melodic segments, looked up by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    #[serde(default)]
    pub chords: Vec<Chord>,
    #[serde(default)]
    pub patterns: Vec<GuitarPattern>,
    #[serde(default)]
    pub drum_patterns: Vec<DrumPattern>,
    #[serde(default)]
    pub melodic_segments: Vec<MelodicSegment>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chord(&self, id: ChordId) -> Result<&Chord> {
        self.chords
            .iter()
            .find(|c| c.id == id)
            .ok_or(ChordflowError::ChordNotFound(id.0))
    }

    pub fn pattern(&self, id: PatternId) -> Result<&GuitarPattern> {
        self.patterns
            .iter()
            .find(|p| p.id == id)
            .ok_or(ChordflowError::PatternNotFound(id.0))
    }

    pub fn drum_pattern(&self, id: DrumPatternId) -> Result<&DrumPattern> {
        self.drum_patterns
            .iter()
            .find(|p| p.id == id)
            .ok_or(ChordflowError::DrumPatternNotFound(id.0))
    }

    pub fn melodic_segment(&self, id: MelodicSegmentId) -> Result<&MelodicSegment> {
        self.melodic_segments
            .iter()
            .find(|s| s.id == id)
            .ok_or(ChordflowError::SegmentNotFound(id.0))
    }

    /// Insert or replace a chord with the same id
    pub fn put_chord(&mut self, chord: Chord) {
        match self.chords.iter_mut().find(|c| c.id == chord.id) {
            Some(slot) => *slot = chord,
            None => self.chords.push(chord),
        }
    }

    pub fn put_pattern(&mut self, pattern: GuitarPattern) {
        match self.patterns.iter_mut().find(|p| p.id == pattern.id) {
            Some(slot) => *slot = pattern,
            None => self.patterns.push(pattern),
        }
    }

    pub fn put_drum_pattern(&mut self, pattern: DrumPattern) {
        match self.drum_patterns.iter_mut().find(|p| p.id == pattern.id) {
            Some(slot) => *slot = pattern,
            None => self.drum_patterns.push(pattern),
        }
    }

    pub fn put_melodic_segment(&mut self, segment: MelodicSegment) {
        match self.melodic_segments.iter_mut().find(|s| s.id == segment.id) {
            Some(slot) => *slot = segment,
            None => self.melodic_segments.push(segment),
        }
    }
}
