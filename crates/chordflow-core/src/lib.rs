//! chordflow-core: Domain types for the chordflow playback engine

pub mod config;
pub mod drum;
mod error;
pub mod library;
pub mod melody;
pub mod pattern;
pub mod theory;
mod timeline;
pub mod track;
mod transport;

pub use config::{ArpeggioOrder, BendConfig, DynamicsConfig, EngineConfig, StrumDelays, VibratoConfig};
pub use drum::{DrumInstrument, DrumPattern, DrumPatternId};
pub use error::{ChordflowError, Result};
pub use library::Library;
pub use melody::{MelodicItem, MelodicSegment, MelodicSegmentId, SoloNote, Technique};
pub use pattern::{
    Chord, ChordId, Dynamics, FretOverride, GuitarPattern, NoteResolution, PatternId, Step,
    StepKind, StrumDirection, StrumSpeed, STRING_COUNT,
};
pub use timeline::{Arrangement, PlaybackLabel};
pub use track::{
    AccompanimentSegment, ChordEvent, DrumPlacement, DrumTrack, GuitarSegment, GuitarTrack,
    LyricPlacement, LyricTrack, SoloSegment, TrackSettings,
};
pub use transport::{LoopRegion, TempoContext, TimeSignature, Transport, TransportState};
