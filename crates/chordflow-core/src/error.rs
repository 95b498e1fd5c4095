//! Error types for chordflow

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChordflowError {
    #[error("Chord not found: {0}")]
    ChordNotFound(u64),
    #[error("Guitar pattern not found: {0}")]
    PatternNotFound(u64),
    #[error("Drum pattern not found: {0}")]
    DrumPatternNotFound(u64),
    #[error("Melodic segment not found: {0}")]
    SegmentNotFound(u64),
    #[error("Invalid tempo: {0} bpm")]
    InvalidTempo(f64),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ChordflowError>;
