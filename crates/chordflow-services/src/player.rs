//! Arrangement player: transport state machine over a scheduler
//!
//! Every transport transition silences the scheduler before arming the next
//! pass, so events from an older session can never fire into a newer one.
//! Lock order: session, then scheduler.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chordflow_core::{
    AccompanimentSegment, Arrangement, Chord, ChordflowError, DrumTrack, EngineConfig, GuitarPattern,
    GuitarSegment, GuitarTrack, LoopRegion, LyricPlacement, LyricTrack, PlaybackLabel, SoloSegment,
    TempoContext, Transport, TransportState,
};
use crossbeam_channel::{bounded, select, tick, unbounded, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::articulation::{ArticulationEngine, PhraseRequest, PitchedItem};
use crate::drums::{DrumRequest, DrumSequencer};
use crate::realizer::{scaled_velocity, PatternRealizer, PatternRequest};
use crate::scheduler::{offset_instant, EventHandle, EventScheduler, PlaybackScheduler, ScheduledAction};

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Core(#[from] ChordflowError),
    #[error("Failed to spawn position ticker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Change notifications for observers
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChanged(TransportState),
    Position(f64),
    Label(PlaybackLabel),
    /// Playback reached the end of the arrangement
    Finished,
}

/// Snapshot of the transport
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerStatus {
    pub state: TransportState,
    pub position_beats: f64,
    pub bpm: f64,
    pub loop_region: Option<LoopRegion>,
    pub length_beats: f64,
    /// Position as `MM:SS.ss`
    pub time: String,
    /// Position as 1-based `bar.beat`
    pub bars: String,
    pub label: PlaybackLabel,
}

/// A single segment of the loaded arrangement, for previews
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRef {
    Guitar { track: usize, segment: usize },
    Lyric { track: usize, placement: usize },
    Drum { placement: usize },
}

// ============================================================================
// Rendering
// ============================================================================

/// Maps arrangement beats onto wall-clock instants
#[derive(Debug, Clone, Copy)]
struct Timebase {
    anchor: Instant,
    anchor_beat: f64,
    tempo: TempoContext,
}

impl Timebase {
    fn at(&self, beat: f64) -> Instant {
        offset_instant(self.anchor, self.tempo.beats_to_secs(beat - self.anchor_beat))
    }
}

/// Slack for float error at window edges
const WINDOW_SLACK_SECS: f64 = 0.001;

/// Drops onsets outside `[start, end)` so a pass started mid-arrangement or
/// inside a loop only arms what should be heard
struct PlaybackWindow<'a, S: ?Sized> {
    inner: &'a S,
    start: Instant,
    end: Option<Instant>,
}

impl<S: EventScheduler + ?Sized> EventScheduler for PlaybackWindow<'_, S> {
    fn now(&self) -> Instant {
        self.inner.now()
    }

    fn schedule(&self, at: Instant, action: ScheduledAction) -> EventHandle {
        let before = at < self.start;
        let after = action.is_onset() && self.end.is_some_and(|end| at >= end);
        if before || after {
            if let ScheduledAction::VoicedNoteOn { off, .. } = action {
                self.inner.cancel(off);
            }
            return EventHandle::DEAD;
        }
        self.inner.schedule(at, action)
    }

    fn cancel(&self, handle: EventHandle) -> bool {
        !handle.is_dead() && self.inner.cancel(handle)
    }
}

struct Renderer<'a, S: ?Sized> {
    scheduler: &'a S,
    config: &'a EngineConfig,
    arrangement: &'a Arrangement,
    time: Timebase,
}

impl<S: EventScheduler + ?Sized> Renderer<'_, S> {
    /// Arm every audible segment that overlaps `[from, until)`
    fn render(&self, from: f64, until: f64) -> usize {
        let arrangement = self.arrangement;
        let mut notes = 0;

        for track in arrangement.audible_guitar_tracks() {
            for segment in &track.segments {
                notes += self.guitar_segment(track, segment, from, until);
            }
        }
        for track in arrangement.audible_lyric_tracks() {
            for placement in &track.segments {
                notes += self.lyric(track, placement, from, until);
            }
        }
        if let Some(track) = arrangement.audible_drum_track() {
            for index in 0..track.segments.len() {
                notes += self.drum_placement(track, index, from, until);
            }
        }
        notes
    }

    fn guitar_segment(&self, track: &GuitarTrack, segment: &GuitarSegment, from: f64, until: f64) -> usize {
        if segment.end_beat() <= from || segment.start_beat() >= until {
            return 0;
        }
        match segment {
            GuitarSegment::Accompaniment(acc) => self.accompaniment(track, acc, from, until),
            GuitarSegment::Solo(solo) => self.solo(track, solo),
        }
    }

    fn accompaniment(&self, track: &GuitarTrack, segment: &AccompanimentSegment, from: f64, until: f64) -> usize {
        let library = &self.arrangement.library;
        let realizer = PatternRealizer::new(self.config);
        let mut notes = 0;

        for event in &segment.events {
            let start = segment.start_beat + event.start_beat;
            if !(event.duration_beats > 0.0) || start + event.duration_beats <= from || start >= until {
                continue;
            }
            let (chord, pattern) = match (library.chord(event.chord), library.pattern(event.pattern)) {
                (Ok(chord), Ok(pattern)) => (chord, pattern),
                (Err(err), _) | (_, Err(err)) => {
                    warn!(%err, track = %track.settings.name, segment = %segment.name, "Skipping chord event");
                    continue;
                }
            };
            notes += realizer.realize(
                self.scheduler,
                &PatternRequest {
                    chord,
                    pattern,
                    start: self.time.at(start),
                    total_secs: self.time.tempo.beats_to_secs(event.duration_beats),
                    velocity_multiplier: self.config.dynamics.multiplier(event.dynamics) * track.settings.volume(),
                    channel: track.settings.channel(),
                    transposition: track.capo,
                },
            );
        }
        notes
    }

    fn solo(&self, track: &GuitarTrack, segment: &SoloSegment) -> usize {
        let items = PitchedItem::from_solo(&segment.notes, &self.config.tuning, track.capo);
        ArticulationEngine::new(self.config).render(
            self.scheduler,
            &PhraseRequest {
                items: &items,
                start: self.time.at(segment.start_beat),
                length_beats: segment.length_beats,
                tempo: &self.time.tempo,
                channel: track.settings.channel(),
                velocity_multiplier: track.settings.volume(),
            },
        )
    }

    fn lyric(&self, track: &LyricTrack, placement: &LyricPlacement, from: f64, until: f64) -> usize {
        let segment = match self.arrangement.library.melodic_segment(placement.segment) {
            Ok(segment) => segment,
            Err(err) => {
                warn!(%err, track = %track.settings.name, "Skipping lyric segment");
                return 0;
            }
        };
        let length = segment.length_beats();
        if placement.start_beat + length <= from || placement.start_beat >= until {
            return 0;
        }

        let items = PitchedItem::from_melodic(segment, self.config.melody_base_note, self.arrangement.transposition());
        ArticulationEngine::new(self.config).render(
            self.scheduler,
            &PhraseRequest {
                items: &items,
                start: self.time.at(placement.start_beat),
                length_beats: length,
                tempo: &self.time.tempo,
                channel: track.settings.channel(),
                velocity_multiplier: track.settings.volume(),
            },
        )
    }

    /// A drum placement loops until its own duration or the next placement, whichever comes first
    fn drum_placement(&self, track: &DrumTrack, index: usize, from: f64, until: f64) -> usize {
        let sorted = track.sorted_segments();
        let Some(placement) = sorted.get(index) else {
            return 0;
        };
        let next_start = sorted.get(index + 1).map(|next| next.start_beat);
        let start = placement.start_beat;
        let end = match (placement.duration_beats, next_start) {
            (Some(duration), Some(next)) => (start + duration).min(next),
            (Some(duration), None) => start + duration,
            (None, Some(next)) => next,
            (None, None) => self.arrangement.length_beats(),
        };
        if end <= start || end <= from || start >= until {
            return 0;
        }

        let pattern = match self.arrangement.library.drum_pattern(placement.pattern) {
            Ok(pattern) => pattern,
            Err(err) => {
                warn!(%err, "Skipping drum placement");
                return 0;
            }
        };
        DrumSequencer::new(self.config).sequence(
            self.scheduler,
            &DrumRequest {
                pattern,
                start: self.time.at(start),
                loop_beats: end - start,
                tempo: &self.time.tempo,
                // The drum track's own channel is not used
                channel: self.config.drum_channel,
                velocity: scaled_velocity(self.config.base_velocity, track.settings.volume()),
            },
        )
    }
}

// ============================================================================
// Player
// ============================================================================

struct Session {
    arrangement: Option<Arc<Arrangement>>,
    transport: Transport,
    tempo: TempoContext,
    /// Wall-clock instant at which playback stood at `anchor_beat`
    anchor: Instant,
    anchor_beat: f64,
    label: PlaybackLabel,
}

struct PlayerShared<S> {
    scheduler: S,
    config: EngineConfig,
    session: Mutex<Session>,
    observers: Mutex<Vec<Sender<PlayerEvent>>>,
}

impl<S: PlaybackScheduler> PlayerShared<S> {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PlayerEvent) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    fn set_state(&self, session: &mut Session, state: TransportState) {
        match state {
            TransportState::Playing => session.transport.play(),
            TransportState::Paused => session.transport.pause(),
            TransportState::Idle => session.transport.stop(),
        }
        self.emit(PlayerEvent::StateChanged(state));
    }

    /// Position implied by the wall clock, for a playing session
    fn clock_position(session: &Session, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(session.anchor).as_secs_f64();
        session.anchor_beat + session.tempo.secs_to_beats(elapsed)
    }

    /// Anchor the clock at `from` and arm everything audible from there
    fn start_pass(&self, session: &mut Session, from: f64) -> usize {
        let from = from.max(0.0);
        session.anchor = self.scheduler.now();
        session.anchor_beat = from;
        session.transport.set_position(from);

        let Some(arrangement) = session.arrangement.clone() else {
            return 0;
        };
        let time = Timebase {
            anchor: session.anchor,
            anchor_beat: from,
            tempo: session.tempo,
        };
        let loop_end = session.transport.active_loop().map(|region| region.end_beat);
        let window = PlaybackWindow {
            inner: &self.scheduler,
            start: offset_instant(time.anchor, -WINDOW_SLACK_SECS),
            end: loop_end.map(|end| offset_instant(time.at(end), -WINDOW_SLACK_SECS)),
        };
        let renderer = Renderer {
            scheduler: &window,
            config: &self.config,
            arrangement: &arrangement,
            time,
        };
        let notes = renderer.render(from, loop_end.unwrap_or(f64::INFINITY));
        debug!(from_beat = from, notes, "Scheduling pass armed");
        notes
    }

    fn play(&self, from: f64) {
        let mut session = self.lock();
        if session.arrangement.is_none() {
            warn!("Play requested with no arrangement loaded");
            return;
        }
        // Previews leave the transport idle with notes still armed
        self.scheduler.panic();
        let notes = self.start_pass(&mut session, from);
        self.set_state(&mut session, TransportState::Playing);
        info!(from_beat = from, bpm = session.tempo.bpm, notes, "Playback started");
    }

    fn pause(&self) {
        let mut session = self.lock();
        if !session.transport.is_playing() {
            return;
        }
        let position = Self::clock_position(&session, self.scheduler.now());
        self.scheduler.panic();
        session.transport.set_position(position);
        self.set_state(&mut session, TransportState::Paused);
        info!(position, "Playback paused");
    }

    fn resume(&self) {
        let mut session = self.lock();
        if !session.transport.is_paused() {
            return;
        }
        let position = session.transport.position_beats;
        self.start_pass(&mut session, position);
        self.set_state(&mut session, TransportState::Playing);
        info!(position, "Playback resumed");
    }

    fn stop(&self) {
        let mut session = self.lock();
        self.scheduler.panic();
        session.label = PlaybackLabel::default();
        self.set_state(&mut session, TransportState::Idle);
        info!("Playback stopped");
    }

    fn seek_to(&self, beat: f64) {
        let mut session = self.lock();
        let beat = if beat.is_finite() { beat.max(0.0) } else { 0.0 };
        if session.transport.is_playing() {
            self.scheduler.panic();
            self.start_pass(&mut session, beat);
        } else {
            session.transport.set_position(beat);
        }
        self.emit(PlayerEvent::Position(beat));
        info!(beat, "Seek");
    }

    /// Re-arm from the current position after a change that alters what a pass schedules
    fn rearm(&self, session: &mut Session) {
        if session.transport.is_playing() {
            let position = Self::clock_position(session, self.scheduler.now());
            self.scheduler.panic();
            self.start_pass(session, position);
        }
    }

    fn set_loop(&self, start: f64, end: f64) -> bool {
        let mut session = self.lock();
        if !session.transport.set_loop(start, end) {
            warn!(start, end, "Ignoring empty loop region");
            return false;
        }
        self.rearm(&mut session);
        info!(start, end, "Loop set");
        true
    }

    fn clear_loop(&self) {
        let mut session = self.lock();
        session.transport.clear_loop();
        self.rearm(&mut session);
        info!("Loop cleared");
    }

    fn set_tempo(&self, bpm: f64) -> Result<(), PlayerError> {
        let tempo = TempoContext {
            bpm,
            ..self.lock().tempo
        };
        tempo.validate()?;

        let mut session = self.lock();
        let position = if session.transport.is_playing() {
            Some(Self::clock_position(&session, self.scheduler.now()))
        } else {
            None
        };
        session.tempo = tempo;
        if let Some(position) = position {
            self.scheduler.panic();
            self.start_pass(&mut session, position);
        }
        info!(bpm, "Tempo changed");
        Ok(())
    }

    fn panic(&self) {
        let mut session = self.lock();
        if session.transport.is_playing() {
            let position = Self::clock_position(&session, self.scheduler.now());
            session.transport.set_position(position);
            self.scheduler.panic();
            self.set_state(&mut session, TransportState::Paused);
        } else {
            self.scheduler.panic();
        }
        info!("Panic");
    }

    /// Advance the position from the clock; handles loop wrap and end of arrangement
    fn update_position(&self, now: Instant) {
        let mut session = self.lock();
        if !session.transport.is_playing() {
            return;
        }
        let Some(arrangement) = session.arrangement.clone() else {
            return;
        };

        let position = Self::clock_position(&session, now);
        if let Some(loop_start) = session.transport.loop_wrap(position) {
            self.scheduler.panic();
            self.start_pass(&mut session, loop_start);
            self.emit(PlayerEvent::Position(loop_start));
            debug!(loop_start, "Loop wrapped");
            return;
        }

        if position >= arrangement.length_beats() {
            self.scheduler.panic();
            session.label = PlaybackLabel::default();
            self.set_state(&mut session, TransportState::Idle);
            self.emit(PlayerEvent::Finished);
            info!("Reached end of arrangement");
            return;
        }

        session.transport.set_position(position);
        self.emit(PlayerEvent::Position(position));

        let label = arrangement.label_at(position);
        if label != session.label {
            session.label = label.clone();
            self.emit(PlayerEvent::Label(label));
        }
    }
}

struct Ticker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Plays a loaded arrangement through a [`PlaybackScheduler`]
pub struct ArrangementPlayer<S: PlaybackScheduler + 'static> {
    shared: Arc<PlayerShared<S>>,
    ticker: Option<Ticker>,
}

impl<S: PlaybackScheduler + 'static> ArrangementPlayer<S> {
    pub fn new(scheduler: S, config: EngineConfig) -> Self {
        let anchor = scheduler.now();
        Self {
            shared: Arc::new(PlayerShared {
                scheduler,
                config,
                session: Mutex::new(Session {
                    arrangement: None,
                    transport: Transport::new(),
                    tempo: TempoContext::default(),
                    anchor,
                    anchor_beat: 0.0,
                    label: PlaybackLabel::default(),
                }),
                observers: Mutex::new(Vec::new()),
            }),
            ticker: None,
        }
    }

    pub fn scheduler(&self) -> &S {
        &self.shared.scheduler
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Replace the arrangement; stops playback first
    pub fn load(&self, arrangement: Arrangement) -> Result<(), PlayerError> {
        arrangement.validate()?;
        self.shared.stop();
        let mut session = self.shared.lock();
        info!(
            name = %arrangement.name,
            bpm = arrangement.tempo.bpm,
            length_beats = arrangement.length_beats(),
            "Arrangement loaded"
        );
        session.tempo = arrangement.tempo;
        session.transport.set_position(0.0);
        session.arrangement = Some(Arc::new(arrangement));
        Ok(())
    }

    /// Start from `from_beat`; restarts if already playing
    pub fn play(&self, from_beat: f64) {
        self.shared.play(from_beat);
    }

    pub fn pause(&self) {
        self.shared.pause();
    }

    pub fn resume(&self) {
        self.shared.resume();
    }

    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn seek_to(&self, beat: f64) {
        self.shared.seek_to(beat);
    }

    pub fn set_loop(&self, start_beat: f64, end_beat: f64) -> bool {
        self.shared.set_loop(start_beat, end_beat)
    }

    pub fn clear_loop(&self) {
        self.shared.clear_loop();
    }

    pub fn set_tempo(&self, bpm: f64) -> Result<(), PlayerError> {
        self.shared.set_tempo(bpm)
    }

    /// Silence everything now; a playing transport becomes paused
    pub fn panic(&self) {
        self.shared.panic();
    }

    pub fn update_position(&self, now: Instant) {
        self.shared.update_position(now);
    }

    pub fn status(&self) -> PlayerStatus {
        let session = self.shared.lock();
        PlayerStatus {
            state: session.transport.state,
            position_beats: session.transport.position_beats,
            bpm: session.tempo.bpm,
            loop_region: session.transport.active_loop(),
            length_beats: session
                .arrangement
                .as_ref()
                .map(|a| a.length_beats())
                .unwrap_or(0.0),
            time: session.transport.format_time(&session.tempo),
            bars: session.transport.format_bars(&session.tempo),
            label: session.label.clone(),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.lock().transport.is_playing()
    }

    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = unbounded();
        if let Ok(mut observers) = self.shared.observers.lock() {
            observers.push(tx);
        }
        rx
    }

    /// Play one pass of `pattern` over `chord` right now on the preview channel
    pub fn preview_pattern(&self, chord: &Chord, pattern: &GuitarPattern) -> usize {
        self.shared.stop();
        let session = self.shared.lock();
        let config = &self.shared.config;
        let total_secs = session.tempo.beats_to_secs(pattern.natural_length_beats());
        PatternRealizer::new(config).realize(
            &self.shared.scheduler,
            &PatternRequest {
                chord,
                pattern,
                start: self.shared.scheduler.now(),
                total_secs,
                velocity_multiplier: 1.0,
                channel: config.preview_channel,
                transposition: 0,
            },
        )
    }

    /// Play a single segment of the loaded arrangement right now
    pub fn preview_segment(&self, segment: SegmentRef) -> usize {
        self.shared.stop();
        let session = self.shared.lock();
        let Some(arrangement) = session.arrangement.clone() else {
            warn!("Preview requested with no arrangement loaded");
            return 0;
        };

        let start_beat = match segment {
            SegmentRef::Guitar { track, segment } => arrangement
                .guitar_tracks
                .get(track)
                .and_then(|t| t.segments.get(segment))
                .map(|s| s.start_beat()),
            SegmentRef::Lyric { track, placement } => arrangement
                .lyric_tracks
                .get(track)
                .and_then(|t| t.segments.get(placement))
                .map(|p| p.start_beat),
            SegmentRef::Drum { placement } => arrangement
                .drum_track
                .as_ref()
                .and_then(|t| t.sorted_segments().get(placement).map(|p| p.start_beat)),
        };
        let Some(start_beat) = start_beat else {
            warn!(?segment, "Preview segment not found");
            return 0;
        };

        let renderer = Renderer {
            scheduler: &self.shared.scheduler,
            config: &self.shared.config,
            arrangement: &arrangement,
            time: Timebase {
                anchor: self.shared.scheduler.now(),
                anchor_beat: start_beat,
                tempo: session.tempo,
            },
        };
        let notes = match segment {
            SegmentRef::Guitar { track, segment } => {
                let track = &arrangement.guitar_tracks[track];
                renderer.guitar_segment(track, &track.segments[segment], start_beat, f64::INFINITY)
            }
            SegmentRef::Lyric { track, placement } => {
                let track = &arrangement.lyric_tracks[track];
                renderer.lyric(track, &track.segments[placement], start_beat, f64::INFINITY)
            }
            SegmentRef::Drum { placement } => match arrangement.drum_track.as_ref() {
                Some(track) => renderer.drum_placement(track, placement, start_beat, f64::INFINITY),
                None => 0,
            },
        };
        info!(?segment, notes, "Previewing segment");
        notes
    }

    /// Drive `update_position` from a background thread every `tick_interval_ms`
    pub fn spawn_ticker(&mut self) -> Result<(), PlayerError> {
        if self.ticker.is_some() {
            return Ok(());
        }
        let shared = self.shared.clone();
        let ticks = tick(Duration::from_millis(self.shared.config.tick_interval_ms.max(1)));
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("chordflow-ticker".into())
            .spawn(move || loop {
                select! {
                    recv(ticks) -> _ => shared.update_position(shared.scheduler.now()),
                    recv(stop_rx) -> _ => break,
                }
            })?;

        self.ticker = Some(Ticker { stop: stop_tx, handle });
        debug!("Position ticker started");
        Ok(())
    }
}

impl<S: PlaybackScheduler + 'static> Drop for ArrangementPlayer<S> {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.stop.send(());
            let _ = ticker.handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chordflow_core::drum::{KICK, SNARE};
    use chordflow_core::{
        ChordEvent, ChordId, DrumInstrument, DrumPattern, DrumPatternId, DrumPlacement, MelodicItem,
        MelodicSegment, MelodicSegmentId, NoteResolution, PatternId, Step, StrumDirection, StrumSpeed,
        TrackSettings,
    };

    use crate::midi::MemorySink;
    use crate::scheduler::NoteScheduler;
    use crate::testing::RecordingScheduler;
    use chordflow_core::{SoloNote, Technique};

    /// 120 bpm: one beat is half a second
    fn arrangement() -> Arrangement {
        let mut arr = Arrangement::new("Test", TempoContext::default());
        arr.library.put_chord(Chord::new(ChordId(1), "G", [3, 0, 0, 0, 2, 3]));
        arr.library.put_chord(Chord::new(ChordId(2), "C", [0, 1, 0, 2, 3, -1]));
        // One downstroke per beat
        arr.library.put_pattern(
            GuitarPattern::new(PatternId(1), "Quarters", NoteResolution::Eighth)
                .with_steps(vec![Step::strum(vec![0, 1, 2], StrumDirection::Down, StrumSpeed::Fast)]),
        );

        let mut gtr = GuitarTrack::new(TrackSettings::new("Gtr", 0));
        let events = (0..16)
            .map(|beat| ChordEvent::new(ChordId(1 + (beat / 4) % 2), PatternId(1), beat as f64, 1.0))
            .collect();
        gtr.add_segment(GuitarSegment::Accompaniment(AccompanimentSegment {
            name: "Verse".into(),
            start_beat: 0.0,
            length_beats: 16.0,
            events,
        }));
        arr.guitar_tracks.push(gtr);
        arr
    }

    fn player(arr: Arrangement) -> ArrangementPlayer<RecordingScheduler> {
        let player = ArrangementPlayer::new(RecordingScheduler::new(), EngineConfig::default());
        player.load(arr).unwrap();
        player
    }

    fn secs(player: &ArrangementPlayer<RecordingScheduler>, beats: f64) -> Instant {
        offset_instant(player.scheduler().origin(), beats * 0.5)
    }

    #[test]
    fn test_play_arms_every_event() {
        let player = player(arrangement());
        player.play(0.0);
        assert!(player.is_playing());
        // 16 strums of 3 strings
        assert_eq!(player.scheduler().note_ons().len(), 48);
        assert_eq!(player.status().length_beats, 16.0);
    }

    #[test]
    fn test_play_while_playing_restarts() {
        let player = player(arrangement());
        player.play(0.0);
        let panics = player.scheduler().panics();
        player.play(0.0);
        assert_eq!(player.scheduler().panics(), panics + 1);
        assert_eq!(player.scheduler().note_ons().len(), 48);
    }

    #[test]
    fn test_play_from_mid_arrangement_skips_earlier_onsets() {
        let player = player(arrangement());
        player.play(10.0);
        let ons = player.scheduler().note_ons();
        assert_eq!(ons.len(), 6 * 3);
        assert!(ons.iter().all(|o| o.0 >= -1e-9));
    }

    #[test]
    fn test_loop_wraparound() {
        let player = player(arrangement());
        assert!(player.set_loop(0.0, 8.0));
        player.play(0.0);

        // Nothing at or past beat 8 (4 s) is armed
        let first_pass = player.scheduler().note_ons();
        assert_eq!(first_pass.len(), 8 * 3);
        assert!(first_pass.iter().all(|o| o.0 < 4.0));
        let armed = player.scheduler().all().len();
        let panics = player.scheduler().panics();

        player.update_position(secs(&player, 8.0));
        let status = player.status();
        assert_eq!(status.position_beats, 0.0);
        assert_eq!(status.state, TransportState::Playing);
        assert_eq!(player.scheduler().panics(), panics + 1);

        // Everything from the first pass is cancelled, a fresh pass is armed
        let all = player.scheduler().all();
        assert!(all[..armed].iter().all(|e| e.cancelled));
        assert_eq!(player.scheduler().note_ons().len(), 8 * 3);
    }

    #[test]
    fn test_position_updates_and_labels() {
        let player = player(arrangement());
        let events = player.subscribe();
        player.play(0.0);

        player.update_position(secs(&player, 5.0));
        let status = player.status();
        assert!((status.position_beats - 5.0).abs() < 1e-6);
        assert_eq!(status.label.chord.as_deref(), Some("C"));

        let received: Vec<PlayerEvent> = events.try_iter().collect();
        assert_eq!(received[0], PlayerEvent::StateChanged(TransportState::Playing));
        assert!(received.iter().any(|e| matches!(e, PlayerEvent::Position(_))));
        assert!(received.iter().any(|e| matches!(e, PlayerEvent::Label(l) if l.chord.as_deref() == Some("C"))));
    }

    #[test]
    fn test_auto_stop_at_end() {
        let player = player(arrangement());
        let events = player.subscribe();
        player.play(0.0);
        player.update_position(secs(&player, 16.0));

        let status = player.status();
        assert_eq!(status.state, TransportState::Idle);
        assert_eq!(status.position_beats, 0.0);
        assert_eq!(player.scheduler().pending_count(), 0);
        assert!(events.try_iter().any(|e| e == PlayerEvent::Finished));
    }

    #[test]
    fn test_pause_resume() {
        let player = player(arrangement());
        player.play(0.0);
        // The recording clock is frozen, so pause lands on the play position
        player.seek_to(6.0);
        player.pause();
        assert_eq!(player.status().state, TransportState::Paused);
        assert_eq!(player.scheduler().pending_count(), 0);

        player.resume();
        assert!(player.is_playing());
        assert_eq!(player.status().position_beats, 6.0);
        assert_eq!(player.scheduler().note_ons().len(), 10 * 3);
    }

    #[test]
    fn test_stop_resets_and_panic_is_idempotent() {
        let player = player(arrangement());
        player.play(4.0);
        player.stop();
        assert_eq!(player.status().position_beats, 0.0);
        assert_eq!(player.status().state, TransportState::Idle);

        for _ in 0..3 {
            player.panic();
        }
        assert_eq!(player.scheduler().pending_count(), 0);
        assert_eq!(player.status().state, TransportState::Idle);
    }

    #[test]
    fn test_panic_pauses_playback() {
        let player = player(arrangement());
        player.play(2.0);
        player.panic();
        let status = player.status();
        assert_eq!(status.state, TransportState::Paused);
        assert_eq!(status.position_beats, 2.0);
        assert_eq!(player.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_missing_chord_skips_only_its_segment() {
        let mut arr = arrangement();
        arr.guitar_tracks[0].segments.insert(
            0,
            GuitarSegment::Accompaniment(AccompanimentSegment {
                name: "Broken".into(),
                start_beat: 16.0,
                length_beats: 4.0,
                events: vec![ChordEvent::new(ChordId(99), PatternId(1), 0.0, 4.0)],
            }),
        );
        let player = player(arr);
        player.play(0.0);

        let ons = player.scheduler().note_ons();
        assert_eq!(ons.len(), 48);
        assert!(ons.iter().all(|o| o.0 < 8.0));
    }

    #[test]
    fn test_muted_and_soloed_tracks() {
        let mut arr = arrangement();
        arr.guitar_tracks[0].settings.mute = true;
        let player = player(arr.clone());
        player.play(0.0);
        assert!(player.scheduler().note_ons().is_empty());

        arr.guitar_tracks[0].settings.mute = false;
        let mut second = GuitarTrack::new(TrackSettings::new("Lead", 2));
        second.settings.solo = true;
        arr.guitar_tracks.push(second);
        let player = self::player(arr);
        player.play(0.0);
        assert!(player.scheduler().note_ons().is_empty());
    }

    #[test]
    fn test_drum_placements_stop_at_next_placement() {
        let mut arr = Arrangement::new("Drums", TempoContext::default());
        arr.library.put_drum_pattern(
            DrumPattern::new(DrumPatternId(1), "Kick", 4, NoteResolution::Sixteenth)
                .with_hits(DrumInstrument::new("Kick", KICK), &[0]),
        );
        arr.library.put_drum_pattern(
            DrumPattern::new(DrumPatternId(2), "Snare", 4, NoteResolution::Sixteenth)
                .with_hits(DrumInstrument::new("Snare", SNARE), &[0]),
        );
        // Drums go to the configured drum channel whatever the track says
        let mut drums = DrumTrack::new(TrackSettings::new("Drums", 3));
        drums.segments.push(DrumPlacement { pattern: DrumPatternId(2), start_beat: 2.0, duration_beats: Some(2.0) });
        drums.segments.push(DrumPlacement { pattern: DrumPatternId(1), start_beat: 0.0, duration_beats: None });
        arr.drum_track = Some(drums);

        let player = player(arr);
        player.play(0.0);
        let ons = player.scheduler().note_ons();
        let kicks: Vec<f64> = ons.iter().filter(|o| o.1 == KICK).map(|o| o.0).collect();
        let snares: Vec<f64> = ons.iter().filter(|o| o.1 == SNARE).map(|o| o.0).collect();
        // Kick loops on beats 0 and 1, snare on beats 2 and 3
        assert_eq!(kicks.len(), 2);
        assert_eq!(snares.len(), 2);
        assert!((snares[0] - 1.0).abs() < 1e-6);
        assert!(ons.iter().all(|o| o.3 == 9));
    }

    #[test]
    fn test_lyric_track_in_key() {
        let mut arr = Arrangement::new("Song", TempoContext::default());
        arr.key = "D".into();
        arr.library.put_melodic_segment(
            MelodicSegment::new(MelodicSegmentId(1), "Line", 4, 8)
                .with_items(vec![MelodicItem::new(0, 1).with_lyric("la"), MelodicItem::new(4, 3).with_lyric("di")]),
        );
        let mut vox = LyricTrack::new(TrackSettings::new("Vox", 3));
        vox.segments.push(LyricPlacement { segment: MelodicSegmentId(1), start_beat: 1.0 });
        vox.segments.push(LyricPlacement { segment: MelodicSegmentId(42), start_beat: 4.0 });
        arr.lyric_tracks.push(vox);

        let player = player(arr);
        player.play(0.0);
        let ons = player.scheduler().note_ons();
        assert_eq!(ons.iter().map(|o| o.1).collect::<Vec<_>>(), vec![62, 66]);
        assert!((ons[0].0 - 0.5).abs() < 1e-6);
        assert!(ons.iter().all(|o| o.3 == 3));
    }

    #[test]
    fn test_set_tempo() {
        let player = player(arrangement());
        assert!(player.set_tempo(0.0).is_err());
        player.set_tempo(60.0).unwrap();
        player.play(0.0);
        let ons = player.scheduler().note_ons();
        // Beat 1 now lands at 1 s
        assert!(ons.iter().any(|o| (o.0 - 1.0).abs() < 1e-6));
        assert_eq!(player.status().bpm, 60.0);
    }

    #[test]
    fn test_previews() {
        let arr = arrangement();
        let chord = arr.library.chord(ChordId(2)).unwrap().clone();
        let pattern = arr.library.pattern(PatternId(1)).unwrap().clone();
        let player = player(arr);

        assert_eq!(player.preview_pattern(&chord, &pattern), 3);
        assert!(player.scheduler().note_ons().iter().all(|o| o.3 == 0));

        player.play(0.0);
        let notes = player.preview_segment(SegmentRef::Guitar { track: 0, segment: 0 });
        assert_eq!(notes, 48);
        assert!(!player.is_playing());
        assert_eq!(player.preview_segment(SegmentRef::Lyric { track: 3, placement: 0 }), 0);
    }

    #[test]
    fn test_play_after_preview_drops_preview_notes() {
        let arr = arrangement();
        let chord = arr.library.chord(ChordId(1)).unwrap().clone();
        let pattern = GuitarPattern::new(PatternId(9), "Eights", NoteResolution::Eighth).with_steps(
            (0..8)
                .map(|_| Step::strum(vec![0, 1, 2], StrumDirection::Down, StrumSpeed::Fast))
                .collect(),
        );

        let empty = player(Arrangement::new("Empty", TempoContext::default()));
        assert_eq!(empty.preview_pattern(&chord, &pattern), 24);
        assert!(empty.scheduler().pending_count() > 0);
        empty.play(0.0);
        assert_eq!(empty.scheduler().pending_count(), 0);

        let player = player(arr);
        player.preview_pattern(&chord, &pattern);
        player.play(0.0);
        assert_eq!(player.scheduler().note_ons().len(), 48);
    }

    #[test]
    fn test_solo_segment() {
        let mut arr = Arrangement::new("Solo", TempoContext::default());
        let mut lead = GuitarTrack::new(TrackSettings::new("Lead", 4));
        lead.capo = 2;
        lead.add_segment(GuitarSegment::Solo(SoloSegment {
            name: "Fill".into(),
            start_beat: 4.0,
            length_beats: 4.0,
            notes: vec![
                SoloNote::new(0.0, 1, 5).with_technique(Technique::Bend),
                SoloNote::new(1.0, 1, 7),
                SoloNote::new(2.0, 0, 3),
            ],
        }));
        arr.guitar_tracks.push(lead);

        let player = player(arr);
        player.play(0.0);

        // B string fret 5 and high E fret 3, both up two for the capo; the bend swallows fret 7
        let ons = player.scheduler().note_ons();
        assert_eq!(ons.iter().map(|o| o.1).collect::<Vec<_>>(), vec![66, 69]);
        assert!((ons[0].0 - 2.0).abs() < 1e-6);
        assert!((ons[1].0 - 3.0).abs() < 1e-6);
        assert!(ons.iter().all(|o| o.3 == 4 && o.2 == 100));

        let bends = player.scheduler().pitch_bends();
        assert!(bends.iter().all(|b| b.2 == 4));
        assert_eq!(bends.iter().map(|b| b.1).max(), Some(16383));
        assert_eq!(bends.last().map(|b| b.1), Some(8192));
    }

    #[test]
    fn test_status_formats_position() {
        let player = player(arrangement());
        player.seek_to(9.0);
        let status = player.status();
        assert_eq!(status.bars, "3.2");
        assert_eq!(status.time, "00:04.50");
    }

    #[test]
    fn test_ticker_reports_position_then_finishes() {
        let mut player = ArrangementPlayer::new(NoteScheduler::new(MemorySink::new()).unwrap(), EngineConfig::default());
        player.load(arrangement()).unwrap();
        // 16 beats in one second
        player.set_tempo(960.0).unwrap();
        let events = player.subscribe();
        player.spawn_ticker().unwrap();
        player.play(0.0);

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut positions = 0;
        let mut finished = false;
        while !finished && Instant::now() < deadline {
            match events.recv_timeout(Duration::from_millis(100)) {
                Ok(PlayerEvent::Position(_)) => positions += 1,
                Ok(PlayerEvent::Finished) => finished = true,
                _ => {}
            }
        }
        assert!(finished);
        assert!(positions > 0);
        assert_eq!(player.status().state, TransportState::Idle);
        assert_eq!(player.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_play_without_arrangement_is_ignored() {
        let player = ArrangementPlayer::new(RecordingScheduler::new(), EngineConfig::default());
        player.play(0.0);
        assert!(!player.is_playing());
        assert!(player.scheduler().all().is_empty());
    }
}
