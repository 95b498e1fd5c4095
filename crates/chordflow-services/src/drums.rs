//! Drum sequencer: loops a step grid over a span of beats

use std::time::Instant;

use chordflow_core::{DrumPattern, EngineConfig, TempoContext};
use tracing::trace;

use crate::scheduler::{offset_instant, EventScheduler};

#[derive(Debug, Clone, Copy)]
pub struct DrumRequest<'a> {
    pub pattern: &'a DrumPattern,
    pub start: Instant,
    /// Span to fill; the grid repeats until it is covered
    pub loop_beats: f64,
    pub tempo: &'a TempoContext,
    pub channel: u8,
    pub velocity: u8,
}

pub struct DrumSequencer<'a> {
    config: &'a EngineConfig,
}

impl<'a> DrumSequencer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Schedule a short note for every hit in the span; returns the hit count
    pub fn sequence<S: EventScheduler + ?Sized>(&self, scheduler: &S, request: &DrumRequest<'_>) -> usize {
        let pattern = request.pattern;
        let pattern_beats = pattern.duration_beats();
        if !(pattern_beats > 0.0) || !(request.loop_beats > 0.0) {
            return 0;
        }

        let repeats = (request.loop_beats / pattern_beats).ceil() as usize;
        let step_beats = pattern.step_beats();
        let hit_secs = self.config.drum_hit_secs();
        let mut hits = 0;

        'repeats: for repeat in 0..repeats {
            for step in 0..pattern.length {
                let offset = repeat as f64 * pattern_beats + step as f64 * step_beats;
                if offset >= request.loop_beats {
                    break 'repeats;
                }
                let on_secs = request.tempo.beats_to_secs(offset);
                let on = offset_instant(request.start, on_secs);
                let off = offset_instant(request.start, on_secs + hit_secs);
                for note in pattern.hits_at(step) {
                    scheduler.schedule_note_on(note, request.velocity, request.channel, on);
                    scheduler.schedule_note_off(note, request.channel, off);
                    hits += 1;
                }
            }
        }

        trace!(pattern = %pattern.name, repeats, hits, "Drum pattern sequenced");
        hits
    }
}
