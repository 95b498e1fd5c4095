//! Timed MIDI event scheduling
//!
//! Realizers talk to the [`EventScheduler`] trait; [`NoteScheduler`] is the
//! real-time implementation, a single dispatcher thread draining a deadline
//! heap. All state (pending events, voice map, sink) lives behind one mutex and
//! events are emitted while holding it, so a cancel that returns `true` always
//! wins against the dispatcher.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, trace};

use crate::midi::{panic_messages, MidiMessage, MidiSink};
use crate::voice::{VoiceControl, VoiceId, VoiceTracker};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Failed to spawn dispatcher thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Cancellation token for a scheduled event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle(pub u64);

impl EventHandle {
    /// Handle that never refers to a live event
    pub const DEAD: Self = Self(0);

    pub fn is_dead(&self) -> bool {
        *self == Self::DEAD
    }
}

/// Handles of a scheduled note-on/note-off pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteHandles {
    pub on: EventHandle,
    pub off: EventHandle,
}

/// What happens when an event fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledAction {
    /// Emit a raw message
    Midi(MidiMessage),
    /// Start a note on a monophonic voice, cutting off whatever the voice holds.
    /// Skipped when `off` is no longer pending.
    VoicedNoteOn {
        voice: VoiceId,
        note: u8,
        velocity: u8,
        channel: u8,
        off: EventHandle,
    },
    /// End a voiced note and free its voice
    VoicedNoteOff { voice: VoiceId, note: u8, channel: u8 },
    /// Cut off whatever the voice is holding
    SilenceVoice(VoiceId),
}

impl ScheduledAction {
    /// Whether firing this action starts a sound
    pub fn is_onset(&self) -> bool {
        matches!(
            self,
            Self::VoicedNoteOn { .. } | Self::Midi(MidiMessage::NoteOn { .. })
        )
    }
}

/// `base` shifted by a possibly negative number of seconds
pub fn offset_instant(base: Instant, secs: f64) -> Instant {
    if !secs.is_finite() {
        return base;
    }
    let magnitude = Duration::try_from_secs_f64(secs.abs()).unwrap_or(Duration::ZERO);
    if secs >= 0.0 {
        base.checked_add(magnitude).unwrap_or(base)
    } else {
        base.checked_sub(magnitude).unwrap_or(base)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Arms future MIDI events
pub trait EventScheduler {
    fn now(&self) -> Instant;

    /// Arm `action` for `at`. Times in the past fire as soon as possible.
    fn schedule(&self, at: Instant, action: ScheduledAction) -> EventHandle;

    /// Best-effort cancel; false if the event already fired or was cancelled
    fn cancel(&self, handle: EventHandle) -> bool;

    fn schedule_note_on(&self, note: u8, velocity: u8, channel: u8, at: Instant) -> EventHandle {
        self.schedule(at, ScheduledAction::Midi(MidiMessage::note_on(note, velocity, channel)))
    }

    fn schedule_note_off(&self, note: u8, channel: u8, at: Instant) -> EventHandle {
        self.schedule(at, ScheduledAction::Midi(MidiMessage::note_off(note, channel)))
    }

    fn schedule_pitch_bend(&self, value: u16, channel: u8, at: Instant) -> EventHandle {
        self.schedule(at, ScheduledAction::Midi(MidiMessage::pitch_bend(value, channel)))
    }

    /// Arm a note on a monophonic voice. The off is armed first so the on can
    /// hand its handle to the voice tracker when it fires.
    fn schedule_voiced_note(
        &self,
        voice: VoiceId,
        note: u8,
        velocity: u8,
        channel: u8,
        on_at: Instant,
        off_at: Instant,
    ) -> NoteHandles {
        let off = self.schedule(off_at, ScheduledAction::VoicedNoteOff { voice, note, channel });
        let on = self.schedule(
            on_at,
            ScheduledAction::VoicedNoteOn {
                voice,
                note,
                velocity,
                channel,
                off,
            },
        );
        NoteHandles { on, off }
    }

    fn schedule_silence(&self, voice: VoiceId, at: Instant) -> EventHandle {
        self.schedule(at, ScheduledAction::SilenceVoice(voice))
    }
}

/// A scheduler that can also be driven by transport commands
pub trait PlaybackScheduler: EventScheduler + Send + Sync {
    /// Emit immediately, bypassing the queue
    fn send_now(&self, message: MidiMessage);

    fn send_note_on(&self, note: u8, velocity: u8, channel: u8) {
        self.send_now(MidiMessage::note_on(note, velocity, channel));
    }

    fn send_note_off(&self, note: u8, channel: u8) {
        self.send_now(MidiMessage::note_off(note, channel));
    }

    /// Cancel every pending event and end every tracked note; returns the number cancelled
    fn cancel_all(&self) -> usize;

    /// `cancel_all` plus all-notes-off on every channel. Safe to call at any time, any number of times.
    fn panic(&self);

    fn pending_count(&self) -> usize;
}

// ============================================================================
// NoteScheduler
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueEntry {
    at: Instant,
    seq: u64,
    handle: EventHandle,
}

enum Due {
    Fire(EventHandle, ScheduledAction),
    At(Instant),
    Idle,
}

struct Queue {
    pending: HashMap<EventHandle, ScheduledAction>,
    heap: BinaryHeap<Reverse<QueueEntry>>,
    sink: Box<dyn MidiSink>,
    next_id: u64,
}

impl Queue {
    fn push(&mut self, at: Instant, action: ScheduledAction) -> EventHandle {
        self.next_id += 1;
        let handle = EventHandle(self.next_id);
        self.pending.insert(handle, action);
        self.heap.push(Reverse(QueueEntry {
            at,
            seq: self.next_id,
            handle,
        }));
        handle
    }

    /// Pop the next due event, skipping cancelled heap entries
    fn next_due(&mut self, now: Instant) -> Due {
        while let Some(Reverse(entry)) = self.heap.peek().copied() {
            if !self.pending.contains_key(&entry.handle) {
                self.heap.pop();
                continue;
            }
            if entry.at > now {
                return Due::At(entry.at);
            }
            self.heap.pop();
            if let Some(action) = self.pending.remove(&entry.handle) {
                return Due::Fire(entry.handle, action);
            }
        }
        Due::Idle
    }

    fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        self.heap.clear();
        count
    }
}

impl VoiceControl for Queue {
    fn cancel(&mut self, handle: EventHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    fn note_off_now(&mut self, note: u8, channel: u8) {
        self.sink.send(MidiMessage::note_off(note, channel));
    }
}

struct State {
    queue: Queue,
    voices: VoiceTracker,
    running: bool,
}

impl State {
    fn fire(&mut self, handle: EventHandle, action: ScheduledAction) {
        match action {
            ScheduledAction::Midi(message) => self.queue.sink.send(message),
            ScheduledAction::VoicedNoteOn {
                voice,
                note,
                velocity,
                channel,
                off,
            } => {
                if !self.queue.pending.contains_key(&off) {
                    trace!(?voice, note, "Skipping note-on whose note-off is gone");
                    return;
                }
                self.voices
                    .start_note(&mut self.queue, voice, note, channel, off);
                self.queue
                    .sink
                    .send(MidiMessage::note_on(note, velocity, channel));
            }
            ScheduledAction::VoicedNoteOff {
                voice,
                note,
                channel,
            } => {
                self.voices.release(voice, handle);
                self.queue.sink.send(MidiMessage::note_off(note, channel));
            }
            ScheduledAction::SilenceVoice(voice) => {
                self.voices.silence_voice(&mut self.queue, voice);
            }
        }
    }

    /// Drop every pending event and end every note the voices still hold
    fn cancel_all(&mut self) -> usize {
        let State { queue, voices, .. } = self;
        let cancelled = queue.clear();
        for (_, sounding) in voices.iter() {
            queue
                .sink
                .send(MidiMessage::note_off(sounding.note, sounding.channel));
        }
        voices.reset();
        cancelled
    }
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Real-time scheduler backed by a dispatcher thread
pub struct NoteScheduler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl NoteScheduler {
    pub fn new(sink: impl MidiSink + 'static) -> Result<Self, SchedulerError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: Queue {
                    pending: HashMap::new(),
                    heap: BinaryHeap::new(),
                    sink: Box::new(sink),
                    next_id: 0,
                },
                voices: VoiceTracker::new(),
                running: true,
            }),
            wake: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("chordflow-scheduler".into())
            .spawn(move || Self::run(&worker_shared))?;

        debug!("Note scheduler started");
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    fn run(shared: &Shared) {
        let mut state = shared.lock();
        while state.running {
            let now = Instant::now();
            match state.queue.next_due(now) {
                Due::Fire(handle, action) => state.fire(handle, action),
                Due::At(at) => {
                    state = shared
                        .wake
                        .wait_timeout(state, at.saturating_duration_since(now))
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                Due::Idle => {
                    state = shared
                        .wake
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Number of voices currently holding a note
    pub fn sounding_voices(&self) -> usize {
        self.shared.lock().voices.len()
    }
}

impl EventScheduler for NoteScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&self, at: Instant, action: ScheduledAction) -> EventHandle {
        let handle = self.shared.lock().queue.push(at, action);
        self.shared.wake.notify_one();
        trace!(handle = handle.0, ?action, "Scheduled");
        handle
    }

    fn cancel(&self, handle: EventHandle) -> bool {
        self.shared.lock().queue.cancel(handle)
    }
}

impl PlaybackScheduler for NoteScheduler {
    fn send_now(&self, message: MidiMessage) {
        self.shared.lock().queue.sink.send(message);
    }

    fn cancel_all(&self) -> usize {
        let cancelled = self.shared.lock().cancel_all();
        self.shared.wake.notify_all();
        debug!(cancelled, "Cancelled all pending events");
        cancelled
    }

    fn panic(&self) {
        let mut state = self.shared.lock();
        let cancelled = state.cancel_all();
        for message in panic_messages() {
            state.queue.sink.send(message);
        }
        drop(state);
        self.shared.wake.notify_all();
        info!(cancelled, "MIDI panic");
    }

    fn pending_count(&self) -> usize {
        self.shared.lock().queue.pending.len()
    }
}

impl Drop for NoteScheduler {
    fn drop(&mut self) {
        self.panic();
        self.shared.lock().running = false;
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
