//! Deterministic scheduler double for realizer and player tests

use std::sync::Mutex;
use std::time::Instant;

use crate::midi::MidiMessage;
use crate::scheduler::{EventHandle, EventScheduler, PlaybackScheduler, ScheduledAction};
use crate::voice::VoiceId;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordedEvent {
    pub handle: EventHandle,
    pub at: Instant,
    pub action: ScheduledAction,
    pub cancelled: bool,
}

#[derive(Default)]
struct Recorded {
    events: Vec<RecordedEvent>,
    sent: Vec<MidiMessage>,
    panics: usize,
}

/// Records everything instead of firing it; `now()` is frozen at construction
pub(crate) struct RecordingScheduler {
    origin: Instant,
    inner: Mutex<Recorded>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            inner: Mutex::new(Recorded::default()),
        }
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }

    /// Seconds from `origin`, negative for earlier instants
    pub fn secs(&self, at: Instant) -> f64 {
        if at >= self.origin {
            at.duration_since(self.origin).as_secs_f64()
        } else {
            -self.origin.duration_since(at).as_secs_f64()
        }
    }

    /// Live (not cancelled) events in scheduling order
    pub fn live(&self) -> Vec<RecordedEvent> {
        self.inner
            .lock()
            .map(|r| r.events.iter().filter(|e| !e.cancelled).copied().collect())
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<RecordedEvent> {
        self.inner.lock().map(|r| r.events.clone()).unwrap_or_default()
    }

    /// (secs, note, velocity, channel) for every live note-on, sorted by time
    pub fn note_ons(&self) -> Vec<(f64, u8, u8, u8)> {
        let mut ons: Vec<(f64, u8, u8, u8)> = self
            .live()
            .iter()
            .filter_map(|e| match e.action {
                ScheduledAction::VoicedNoteOn { note, velocity, channel, .. }
                | ScheduledAction::Midi(MidiMessage::NoteOn { note, velocity, channel }) => {
                    Some((self.secs(e.at), note, velocity, channel))
                }
                _ => None,
            })
            .collect();
        ons.sort_by(|a, b| a.0.total_cmp(&b.0));
        ons
    }

    /// (secs, note, channel) for every live note-off, sorted by time
    pub fn note_offs(&self) -> Vec<(f64, u8, u8)> {
        let mut offs: Vec<(f64, u8, u8)> = self
            .live()
            .iter()
            .filter_map(|e| match e.action {
                ScheduledAction::VoicedNoteOff { note, channel, .. }
                | ScheduledAction::Midi(MidiMessage::NoteOff { note, channel }) => {
                    Some((self.secs(e.at), note, channel))
                }
                _ => None,
            })
            .collect();
        offs.sort_by(|a, b| a.0.total_cmp(&b.0));
        offs
    }

    /// (secs, value, channel) for every live pitch bend, sorted by time
    pub fn pitch_bends(&self) -> Vec<(f64, u16, u8)> {
        let mut bends: Vec<(f64, u16, u8)> = self
            .live()
            .iter()
            .filter_map(|e| match e.action {
                ScheduledAction::Midi(MidiMessage::PitchBend { value, channel }) => {
                    Some((self.secs(e.at), value, channel))
                }
                _ => None,
            })
            .collect();
        bends.sort_by(|a, b| a.0.total_cmp(&b.0));
        bends
    }

    pub fn silences(&self) -> Vec<(f64, VoiceId)> {
        self.live()
            .iter()
            .filter_map(|e| match e.action {
                ScheduledAction::SilenceVoice(voice) => Some((self.secs(e.at), voice)),
                _ => None,
            })
            .collect()
    }

    pub fn sent(&self) -> Vec<MidiMessage> {
        self.inner.lock().map(|r| r.sent.clone()).unwrap_or_default()
    }

    pub fn panics(&self) -> usize {
        self.inner.lock().map(|r| r.panics).unwrap_or_default()
    }
}

impl EventScheduler for RecordingScheduler {
    fn now(&self) -> Instant {
        self.origin
    }

    fn schedule(&self, at: Instant, action: ScheduledAction) -> EventHandle {
        let Ok(mut inner) = self.inner.lock() else {
            return EventHandle::DEAD;
        };
        let handle = EventHandle(inner.events.len() as u64 + 1);
        inner.events.push(RecordedEvent {
            handle,
            at,
            action,
            cancelled: false,
        });
        handle
    }

    fn cancel(&self, handle: EventHandle) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        match inner
            .events
            .iter_mut()
            .find(|e| e.handle == handle && !e.cancelled)
        {
            Some(event) => {
                event.cancelled = true;
                true
            }
            None => false,
        }
    }
}

impl PlaybackScheduler for RecordingScheduler {
    fn send_now(&self, message: MidiMessage) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.sent.push(message);
        }
    }

    fn cancel_all(&self) -> usize {
        let Ok(mut inner) = self.inner.lock() else {
            return 0;
        };
        let mut count = 0;
        for event in inner.events.iter_mut().filter(|e| !e.cancelled) {
            event.cancelled = true;
            count += 1;
        }
        count
    }

    fn panic(&self) {
        self.cancel_all();
        if let Ok(mut inner) = self.inner.lock() {
            inner.panics += 1;
        }
    }

    fn pending_count(&self) -> usize {
        self.live().len()
    }
}
