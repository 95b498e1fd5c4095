//! chordflow-services: scheduling, realization and playback

pub mod articulation;
pub mod drums;
pub mod midi;
pub mod player;
pub mod realizer;
pub mod scheduler;
pub mod voice;

#[cfg(test)]
mod testing;

pub use articulation::{group_actions, Action, ArticulationEngine, PhraseRequest, PitchedItem};
pub use drums::{DrumRequest, DrumSequencer};
pub use midi::{panic_messages, LogSink, MemorySink, MidiMessage, MidiSink, TimedMessage};
pub use player::{ArrangementPlayer, PlayerError, PlayerEvent, PlayerStatus, SegmentRef};
pub use realizer::{adaptive_velocity, scaled_velocity, PatternRealizer, PatternRequest};
pub use scheduler::{
    EventHandle, EventScheduler, NoteHandles, NoteScheduler, PlaybackScheduler, ScheduledAction, SchedulerError,
};
pub use voice::{SoundingNote, VoiceId, VoiceTracker};
