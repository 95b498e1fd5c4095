//! Melodic articulation engine
//!
//! Renders a monophonic line (sung melodic items or guitar solo notes) with
//! slide, bend, vibrato and pull-off techniques. Works in two passes: items are
//! first grouped into actions (a slide/bend/vibrato swallows the next sounding
//! item as its target), then each action is emitted as notes and pitch bend.

use std::f64::consts::TAU;
use std::time::Instant;

use chordflow_core::theory::{fret_to_midi, lerp_bend, pitch_bend_value, PITCH_BEND_CENTER};
use chordflow_core::{EngineConfig, MelodicSegment, SoloNote, TempoContext, Technique};
use tracing::trace;

use crate::realizer::scaled_velocity;
use crate::scheduler::{offset_instant, EventScheduler};
use crate::voice::VoiceId;

/// A line item with its pitch resolved, positions in beats from the phrase start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchedItem {
    pub start_beat: f64,
    /// Explicit end; open-ended items last until the next sounding item
    pub end_beat: Option<f64>,
    /// `None` is a rest
    pub note: Option<u8>,
    pub technique: Technique,
}

impl PitchedItem {
    /// Resolve a melodic segment's scale degrees in the given key
    pub fn from_melodic(segment: &MelodicSegment, base_note: u8, transposition: u8) -> Vec<Self> {
        segment
            .sorted_items()
            .into_iter()
            .map(|item| {
                let start_beat = segment.ticks_to_beats(item.position);
                Self {
                    start_beat,
                    end_beat: item
                        .duration
                        .map(|ticks| start_beat + segment.ticks_to_beats(ticks)),
                    note: item.midi_note(base_note, transposition),
                    technique: item.technique,
                }
            })
            .collect()
    }

    /// Resolve solo notes against a tuning and capo
    pub fn from_solo(notes: &[SoloNote], tuning: &[u8], capo: u8) -> Vec<Self> {
        let mut items: Vec<Self> = notes
            .iter()
            .map(|n| Self {
                start_beat: n.start_beat,
                end_beat: n.duration_beats.map(|d| n.start_beat + d),
                note: fret_to_midi(tuning, n.string as usize, n.fret, capo),
                technique: n.technique,
            })
            .collect();
        items.sort_by(|a, b| a.start_beat.total_cmp(&b.start_beat));
        items
    }
}

/// Grouped action over item indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Play(usize),
    Slide { from: usize, to: usize },
    Bend { from: usize, to: usize },
    Vibrato { from: usize, to: usize },
}

/// First pass: pair target-taking techniques with the next sounding item.
///
/// `items` must be in start order. Rests produce no action.
pub fn group_actions(items: &[PitchedItem]) -> Vec<Action> {
    let sounding: Vec<usize> = (0..items.len()).filter(|&i| items[i].note.is_some()).collect();
    let mut consumed = vec![false; items.len()];
    let mut actions = Vec::with_capacity(sounding.len());

    for (pos, &index) in sounding.iter().enumerate() {
        if consumed[index] {
            continue;
        }
        let technique = items[index].technique;
        let target = if technique.takes_target() {
            sounding[pos + 1..].iter().copied().find(|&j| !consumed[j])
        } else {
            None
        };

        let action = match (technique, target) {
            (Technique::Slide, Some(to)) => Action::Slide { from: index, to },
            (Technique::Bend, Some(to)) => Action::Bend { from: index, to },
            (Technique::Vibrato, Some(to)) => Action::Vibrato { from: index, to },
            _ => Action::Play(index),
        };
        if let Some(to) = target {
            consumed[to] = true;
        }
        actions.push(action);
    }
    actions
}

/// One phrase to render
#[derive(Debug, Clone, Copy)]
pub struct PhraseRequest<'a> {
    pub items: &'a [PitchedItem],
    pub start: Instant,
    /// Phrase length; the last open-ended item stops here
    pub length_beats: f64,
    pub tempo: &'a TempoContext,
    pub channel: u8,
    /// Track volume
    pub velocity_multiplier: f64,
}

impl PhraseRequest<'_> {
    fn at(&self, beat: f64) -> Instant {
        offset_instant(self.start, self.tempo.beats_to_secs(beat))
    }

    /// Where item `index` stops sounding
    fn off_beat(&self, index: usize) -> f64 {
        let item = &self.items[index];
        if let Some(end) = item.end_beat {
            return end;
        }
        self.items[index + 1..]
            .iter()
            .find(|next| next.note.is_some())
            .map(|next| next.start_beat)
            .unwrap_or(self.length_beats)
    }
}

pub struct ArticulationEngine<'a> {
    config: &'a EngineConfig,
}

impl<'a> ArticulationEngine<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Render the phrase; returns how many notes were plucked
    pub fn render<S: EventScheduler + ?Sized>(&self, scheduler: &S, request: &PhraseRequest<'_>) -> usize {
        let mut plucked = 0;
        for action in group_actions(request.items) {
            plucked += match action {
                Action::Play(index) => self.play(scheduler, request, index),
                Action::Slide { from, to } => self.slide(scheduler, request, from, to),
                Action::Bend { from, to } => self.bend(scheduler, request, from, to),
                Action::Vibrato { from, to } => self.vibrato(scheduler, request, from, to),
            };
        }
        trace!(channel = request.channel, plucked, "Phrase rendered");
        plucked
    }

    fn velocity(&self, request: &PhraseRequest<'_>, technique: Technique) -> u8 {
        let base = scaled_velocity(self.config.base_velocity, request.velocity_multiplier);
        match technique {
            Technique::PullOff => scaled_velocity(base, self.config.pull_off_velocity_factor),
            _ => base,
        }
    }

    /// Voiced note over `[on_beat, off_beat)`; zero if the span is empty
    fn pluck<S: EventScheduler + ?Sized>(
        &self,
        scheduler: &S,
        request: &PhraseRequest<'_>,
        note: u8,
        velocity: u8,
        on_beat: f64,
        off_beat: f64,
    ) -> usize {
        if !(off_beat > on_beat) {
            return 0;
        }
        scheduler.schedule_voiced_note(
            VoiceId::melody(request.channel),
            note,
            velocity,
            request.channel,
            request.at(on_beat),
            request.at(off_beat),
        );
        1
    }

    fn play<S: EventScheduler + ?Sized>(&self, scheduler: &S, request: &PhraseRequest<'_>, index: usize) -> usize {
        let item = &request.items[index];
        let Some(note) = item.note else {
            return 0;
        };
        let velocity = self.velocity(request, item.technique);
        self.pluck(scheduler, request, note, velocity, item.start_beat, request.off_beat(index))
    }

    /// Linear bend ramp sampled at the configured rate, both endpoints included
    fn ramp<S: EventScheduler + ?Sized>(
        &self,
        scheduler: &S,
        request: &PhraseRequest<'_>,
        from_value: u16,
        to_value: u16,
        start_beat: f64,
        end_beat: f64,
    ) {
        let span_beats = end_beat - start_beat;
        let span_secs = request.tempo.beats_to_secs(span_beats);
        if !(span_secs > 0.0) {
            scheduler.schedule_pitch_bend(to_value, request.channel, request.at(start_beat));
            return;
        }
        let steps = ((span_secs * self.config.bend.steps_per_sec).ceil() as usize).max(1);
        for k in 0..=steps {
            let t = k as f64 / steps as f64;
            let value = lerp_bend(from_value, to_value, t);
            // The last sample lands on the same instant as anything else timed at `end_beat`
            let beat = if k == steps { end_beat } else { start_beat + span_beats * t };
            scheduler.schedule_pitch_bend(value, request.channel, request.at(beat));
        }
    }

    fn reset_bend<S: EventScheduler + ?Sized>(&self, scheduler: &S, request: &PhraseRequest<'_>, after_beat: f64) {
        let at = offset_instant(request.at(after_beat), self.config.bend.reset_delay_secs());
        scheduler.schedule_pitch_bend(PITCH_BEND_CENTER, request.channel, at);
    }

    /// Slide within the bend range: one sustained note glides to the target.
    /// Beyond the range: the glide stops at the range limit and the target is plucked.
    fn slide<S: EventScheduler + ?Sized>(
        &self,
        scheduler: &S,
        request: &PhraseRequest<'_>,
        from: usize,
        to: usize,
    ) -> usize {
        let source = &request.items[from];
        let target = &request.items[to];
        let (Some(from_note), Some(to_note)) = (source.note, target.note) else {
            return self.play(scheduler, request, from);
        };

        let on_beat = source.start_beat;
        let target_beat = target.start_beat;
        let end_beat = request.off_beat(to);
        if !(target_beat > on_beat) {
            return self.play(scheduler, request, from) + self.play(scheduler, request, to);
        }

        let range = self.config.bend.range_semitones;
        let delta = to_note as f64 - from_note as f64;
        let in_range = delta.abs() <= range;
        let velocity = self.velocity(request, source.technique);

        let mut plucked = if in_range {
            self.pluck(scheduler, request, from_note, velocity, on_beat, end_beat)
        } else {
            self.pluck(scheduler, request, from_note, velocity, on_beat, target_beat)
        };

        let hold = ((target_beat - on_beat) / 2.0).min(self.config.bend.slide_delay_max_beats.max(0.0));
        let bend_target = pitch_bend_value(delta, range);
        self.ramp(scheduler, request, PITCH_BEND_CENTER, bend_target, on_beat + hold, target_beat);

        if !in_range {
            scheduler.schedule_pitch_bend(PITCH_BEND_CENTER, request.channel, request.at(target_beat));
            plucked += self.pluck(scheduler, request, to_note, velocity, target_beat, end_beat);
        }

        self.reset_bend(scheduler, request, end_beat);
        trace!(from_note, to_note, in_range, "Slide");
        plucked
    }

    /// Bend and release over the source-to-target span
    fn bend<S: EventScheduler + ?Sized>(
        &self,
        scheduler: &S,
        request: &PhraseRequest<'_>,
        from: usize,
        to: usize,
    ) -> usize {
        let source = &request.items[from];
        let (Some(from_note), Some(to_note)) = (source.note, request.items[to].note) else {
            return self.play(scheduler, request, from);
        };

        let on_beat = source.start_beat;
        let off_beat = request.off_beat(to);
        let velocity = self.velocity(request, source.technique);
        let plucked = self.pluck(scheduler, request, from_note, velocity, on_beat, off_beat);
        if plucked == 0 {
            return 0;
        }

        let bend = &self.config.bend;
        let mut semitones = to_note as f64 - from_note as f64;
        if semitones == 0.0 {
            semitones = bend.default_semitones;
        }
        let peak = pitch_bend_value(semitones, bend.range_semitones);

        let span = off_beat - on_beat;
        let [pre_hold, attack, peak_hold, release] = bend.phases();
        let up_start = on_beat + pre_hold * span;
        let up_end = up_start + attack * span;
        let down_start = up_end + peak_hold * span;
        let down_end = down_start + release * span;

        scheduler.schedule_pitch_bend(PITCH_BEND_CENTER, request.channel, request.at(on_beat));
        self.ramp(scheduler, request, PITCH_BEND_CENTER, peak, up_start, up_end);
        self.ramp(scheduler, request, peak, PITCH_BEND_CENTER, down_start, down_end);
        self.reset_bend(scheduler, request, off_beat);
        trace!(from_note, semitones, "Bend");
        plucked
    }

    /// Held source note with a sinusoidal wobble
    fn vibrato<S: EventScheduler + ?Sized>(
        &self,
        scheduler: &S,
        request: &PhraseRequest<'_>,
        from: usize,
        to: usize,
    ) -> usize {
        let source = &request.items[from];
        let Some(note) = source.note else {
            return 0;
        };

        let on_beat = source.start_beat;
        let off_beat = request.off_beat(to);
        let velocity = self.velocity(request, source.technique);
        let plucked = self.pluck(scheduler, request, note, velocity, on_beat, off_beat);

        let vibrato = &self.config.vibrato;
        if plucked == 0 || off_beat - on_beat <= vibrato.min_length_beats {
            return plucked;
        }

        let interval = 1.0 / (vibrato.rate_hz * vibrato.samples_per_cycle.max(1) as f64);
        let span_secs = request.tempo.beats_to_secs(off_beat - on_beat);
        if !(interval > 0.0) || !interval.is_finite() {
            return plucked;
        }
        let samples = (span_secs / interval).floor() as usize;
        let start = request.at(on_beat);
        for k in 0..samples {
            let secs = k as f64 * interval;
            let semitones = vibrato.depth_semitones * (TAU * vibrato.rate_hz * secs).sin();
            let value = pitch_bend_value(semitones, self.config.bend.range_semitones);
            scheduler.schedule_pitch_bend(value, request.channel, offset_instant(start, secs));
        }
        self.reset_bend(scheduler, request, off_beat);
        trace!(note, samples, "Vibrato");
        plucked
    }
}
