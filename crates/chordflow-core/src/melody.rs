//! Melodic lyric items and guitar solo notes

use serde::{Deserialize, Serialize};

use crate::theory::scale_degree_to_semitone;

/// Unique identifier for melodic segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MelodicSegmentId(pub u64);

/// Articulation applied to a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Technique {
    #[default]
    Normal,
    Slide,
    Bend,
    Vibrato,
    PullOff,
}

impl Technique {
    /// Techniques that reach forward to the next sounding note
    pub fn takes_target(&self) -> bool {
        matches!(self, Self::Slide | Self::Bend | Self::Vibrato)
    }
}

/// A sung scale-degree note inside a melodic segment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MelodicItem {
    /// Position in ticks from the segment start
    pub position: u32,
    /// Length in ticks; open-ended until the next sounding item when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    /// Scale degree, 0 = rest, 1..=7 major scale
    pub degree: u8,
    #[serde(default)]
    pub octave: i8,
    #[serde(default)]
    pub semitone_offset: i8,
    /// Display-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyric: Option<String>,
    #[serde(default)]
    pub technique: Technique,
}

impl MelodicItem {
    pub fn new(position: u32, degree: u8) -> Self {
        Self {
            position,
            degree,
            ..Default::default()
        }
    }

    pub fn with_duration(mut self, ticks: u32) -> Self {
        self.duration = Some(ticks);
        self
    }

    pub fn with_octave(mut self, octave: i8) -> Self {
        self.octave = octave;
        self
    }

    pub fn with_technique(mut self, technique: Technique) -> Self {
        self.technique = technique;
        self
    }

    pub fn with_lyric(mut self, lyric: impl Into<String>) -> Self {
        self.lyric = Some(lyric.into());
        self
    }

    pub fn is_rest(&self) -> bool {
        scale_degree_to_semitone(self.degree).is_none()
    }

    /// MIDI note relative to `base_note` (the tonic of octave 0 in C) shifted by the key
    pub fn midi_note(&self, base_note: u8, transposition: u8) -> Option<u8> {
        let degree = scale_degree_to_semitone(self.degree)? as i32;
        let note = base_note as i32
            + transposition as i32
            + self.octave as i32 * 12
            + degree
            + self.semitone_offset as i32;
        (0..=127).contains(&note).then_some(note as u8)
    }
}

/// A reusable sung phrase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MelodicSegment {
    pub id: MelodicSegmentId,
    pub name: String,
    /// Subdivision of a beat used by item positions
    #[serde(default = "default_ticks_per_beat")]
    pub ticks_per_beat: u32,
    /// Segment length in ticks
    pub length_ticks: u32,
    pub items: Vec<MelodicItem>,
}

fn default_ticks_per_beat() -> u32 {
    4
}

impl MelodicSegment {
    pub fn new(id: MelodicSegmentId, name: impl Into<String>, ticks_per_beat: u32, length_ticks: u32) -> Self {
        Self {
            id,
            name: name.into(),
            ticks_per_beat,
            length_ticks,
            items: Vec::new(),
        }
    }

    pub fn with_items(mut self, items: Vec<MelodicItem>) -> Self {
        self.items = items;
        self
    }

    pub fn ticks_to_beats(&self, ticks: u32) -> f64 {
        ticks as f64 / self.ticks_per_beat.max(1) as f64
    }

    pub fn length_beats(&self) -> f64 {
        self.ticks_to_beats(self.length_ticks)
    }

    /// Items ordered by position (stable for equal positions)
    pub fn sorted_items(&self) -> Vec<&MelodicItem> {
        let mut items: Vec<&MelodicItem> = self.items.iter().collect();
        items.sort_by_key(|item| item.position);
        items
    }

    /// Lyric sounding at a beat offset inside the segment
    pub fn lyric_at(&self, beat: f64) -> Option<&str> {
        self.sorted_items()
            .into_iter()
            .filter(|item| !item.is_rest() && self.ticks_to_beats(item.position) <= beat)
            .last()
            .and_then(|item| item.lyric.as_deref())
    }
}

/// A single-string solo note on a guitar track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoloNote {
    /// Beat offset from the solo segment start
    pub start_beat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_beats: Option<f64>,
    pub string: u8,
    pub fret: i8,
    #[serde(default)]
    pub technique: Technique,
}

impl SoloNote {
    pub fn new(start_beat: f64, string: u8, fret: i8) -> Self {
        Self {
            start_beat,
            duration_beats: None,
            string,
            fret,
            technique: Technique::Normal,
        }
    }

    pub fn with_duration(mut self, beats: f64) -> Self {
        self.duration_beats = Some(beats);
        self
    }

    pub fn with_technique(mut self, technique: Technique) -> Self {
        self.technique = technique;
        self
    }
}
