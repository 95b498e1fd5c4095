//! Monophonic voice bookkeeping
//!
//! A voice is one guitar string (or the melody lane of a channel). It may hold
//! at most one tracked note; starting a new note on a busy voice cuts the old
//! one off first.

use std::collections::HashMap;

use tracing::trace;

use crate::scheduler::EventHandle;

/// Lane used for single-line melody voices
pub const MELODY_LANE: u8 = u8::MAX;

/// Identifies a monophonic voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceId {
    pub channel: u8,
    pub lane: u8,
}

impl VoiceId {
    /// One voice per guitar string on a channel
    pub fn string(channel: u8, string: u8) -> Self {
        Self {
            channel,
            lane: string,
        }
    }

    /// The single melody voice of a channel
    pub fn melody(channel: u8) -> Self {
        Self {
            channel,
            lane: MELODY_LANE,
        }
    }
}

/// The note a voice is currently holding and the handle of its pending note-off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundingNote {
    pub note: u8,
    pub channel: u8,
    pub off: EventHandle,
}

/// What the tracker needs from its owner to cut a note short
pub trait VoiceControl {
    /// Cancel a pending event; false when it already fired or never existed
    fn cancel(&mut self, handle: EventHandle) -> bool;
    /// Emit a note-off immediately
    fn note_off_now(&mut self, note: u8, channel: u8);
}

#[derive(Debug, Default)]
pub struct VoiceTracker {
    voices: HashMap<VoiceId, SoundingNote>,
}

impl VoiceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new note on `voice`, silencing whatever it was holding.
    ///
    /// Returns the displaced note, if any.
    pub fn start_note(
        &mut self,
        control: &mut impl VoiceControl,
        voice: VoiceId,
        note: u8,
        channel: u8,
        off: EventHandle,
    ) -> Option<SoundingNote> {
        let previous = self.cut(control, voice);
        self.voices.insert(voice, SoundingNote { note, channel, off });
        previous
    }

    /// Cancel the pending off, send the note-off now and free the voice
    pub fn silence_voice(&mut self, control: &mut impl VoiceControl, voice: VoiceId) -> bool {
        self.cut(control, voice).is_some()
    }

    fn cut(&mut self, control: &mut impl VoiceControl, voice: VoiceId) -> Option<SoundingNote> {
        let previous = self.voices.remove(&voice)?;
        control.cancel(previous.off);
        control.note_off_now(previous.note, previous.channel);
        trace!(?voice, note = previous.note, "Voice cut");
        Some(previous)
    }

    /// The scheduled note-off `off` fired; free the voice if it still belongs to that note
    pub fn release(&mut self, voice: VoiceId, off: EventHandle) -> bool {
        match self.voices.get(&voice) {
            Some(sounding) if sounding.off == off => {
                self.voices.remove(&voice);
                true
            }
            _ => false,
        }
    }

    /// Forget every voice without sending MIDI (used after a panic)
    pub fn reset(&mut self) {
        self.voices.clear();
    }

    pub fn sounding(&self, voice: VoiceId) -> Option<&SoundingNote> {
        self.voices.get(&voice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VoiceId, &SoundingNote)> {
        self.voices.iter()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}
