//! The arrangement: tempo, key, library and tracks

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::library::Library;
use crate::theory;
use crate::track::{DrumTrack, GuitarSegment, GuitarTrack, LyricTrack, TrackSettings};
use crate::transport::TempoContext;

/// What is sounding at a beat, for display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackLabel {
    pub chord: Option<String>,
    pub word: Option<String>,
}

/// A complete song: one drum track, N guitar tracks and lyric tracks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arrangement {
    pub name: String,
    #[serde(default)]
    pub tempo: TempoContext,
    /// Key used to transpose melodic scale degrees
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default)]
    pub library: Library,
    #[serde(default)]
    pub drum_track: Option<DrumTrack>,
    #[serde(default)]
    pub guitar_tracks: Vec<GuitarTrack>,
    #[serde(default)]
    pub lyric_tracks: Vec<LyricTrack>,
}

fn default_key() -> String {
    "C".to_string()
}

impl Arrangement {
    pub fn new(name: impl Into<String>, tempo: TempoContext) -> Self {
        Self {
            name: name.into(),
            tempo,
            key: default_key(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.tempo.validate()
    }

    pub fn transposition(&self) -> u8 {
        theory::transposition(&self.key)
    }

    fn all_settings(&self) -> impl Iterator<Item = &TrackSettings> {
        self.drum_track
            .iter()
            .map(|t| &t.settings)
            .chain(self.guitar_tracks.iter().map(|t| &t.settings))
            .chain(self.lyric_tracks.iter().map(|t| &t.settings))
    }

    /// Check if any track is soloed
    pub fn has_solo(&self) -> bool {
        self.all_settings().any(|s| s.solo)
    }

    /// Muted tracks are silent; when anything is soloed only soloed tracks play
    pub fn is_audible(&self, settings: &TrackSettings) -> bool {
        !settings.mute && (!self.has_solo() || settings.solo)
    }

    pub fn audible_drum_track(&self) -> Option<&DrumTrack> {
        self.drum_track.as_ref().filter(|t| self.is_audible(&t.settings))
    }

    pub fn audible_guitar_tracks(&self) -> impl Iterator<Item = &GuitarTrack> {
        self.guitar_tracks.iter().filter(|t| self.is_audible(&t.settings))
    }

    pub fn audible_lyric_tracks(&self) -> impl Iterator<Item = &LyricTrack> {
        self.lyric_tracks.iter().filter(|t| self.is_audible(&t.settings))
    }

    /// Total length in beats (end of the last segment)
    pub fn length_beats(&self) -> f64 {
        let guitar = self
            .guitar_tracks
            .iter()
            .flat_map(|t| t.segments.iter())
            .map(|s| s.end_beat());

        let lyric = self
            .lyric_tracks
            .iter()
            .flat_map(|t| t.segments.iter())
            .filter_map(|p| {
                let segment = self.library.melodic_segment(p.segment).ok()?;
                Some(p.start_beat + segment.length_beats())
            });

        let drums = self
            .drum_track
            .iter()
            .flat_map(|t| t.segments.iter())
            .filter_map(|p| {
                let length = match p.duration_beats {
                    Some(beats) => beats,
                    None => self.library.drum_pattern(p.pattern).ok()?.duration_beats(),
                };
                Some(p.start_beat + length.max(0.0))
            });

        guitar.chain(lyric).chain(drums).fold(0.0, f64::max)
    }

    /// Chord name and lyric word sounding at `beat` on the audible tracks
    pub fn label_at(&self, beat: f64) -> PlaybackLabel {
        let chord = self.audible_guitar_tracks().find_map(|track| {
            track.segments.iter().find_map(|segment| {
                let GuitarSegment::Accompaniment(acc) = segment else {
                    return None;
                };
                let local = beat - acc.start_beat;
                if local < 0.0 || local >= acc.length_beats {
                    return None;
                }
                let event = acc
                    .events
                    .iter()
                    .find(|e| local >= e.start_beat && local < e.end_beat())?;
                self.library.chord(event.chord).ok().map(|c| c.name.clone())
            })
        });

        let word = self.audible_lyric_tracks().find_map(|track| {
            track.segments.iter().find_map(|placement| {
                let segment = self.library.melodic_segment(placement.segment).ok()?;
                let local = beat - placement.start_beat;
                if local < 0.0 || local >= segment.length_beats() {
                    return None;
                }
                segment.lyric_at(local).map(str::to_string)
            })
        });

        PlaybackLabel { chord, word }
    }
}
