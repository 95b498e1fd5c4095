//! Pattern realizer: turns a chord played with a strum/arpeggio pattern into voiced notes

use std::time::Instant;

use chordflow_core::theory::fret_to_midi;
use chordflow_core::{ArpeggioOrder, Chord, EngineConfig, GuitarPattern, StepKind, StrumDirection, STRING_COUNT};
use tracing::trace;

use crate::scheduler::{offset_instant, EventScheduler};
use crate::voice::VoiceId;

/// `base * multiplier`, rounded into the MIDI velocity range
pub fn scaled_velocity(base: u8, multiplier: f64) -> u8 {
    let scaled = base as f64 * multiplier;
    if !scaled.is_finite() {
        return base.clamp(1, 127);
    }
    scaled.clamp(1.0, 127.0).round() as u8
}

/// Velocity for a chord of `note_count` simultaneous notes: `base * factor / sqrt(n)`.
///
/// Single notes keep the base velocity.
pub fn adaptive_velocity(base: u8, note_count: usize, factor: f64) -> u8 {
    if note_count <= 1 {
        return base;
    }
    let scaled = base as f64 * factor / (note_count as f64).sqrt();
    if !scaled.is_finite() {
        return base.clamp(1, 127);
    }
    scaled.round().clamp(1.0, 127.0) as u8
}

/// One chord event to realize
#[derive(Debug, Clone, Copy)]
pub struct PatternRequest<'a> {
    pub chord: &'a Chord,
    pub pattern: &'a GuitarPattern,
    pub start: Instant,
    /// Length of the whole chord event; every step divides it evenly
    pub total_secs: f64,
    /// Dynamics times track volume
    pub velocity_multiplier: f64,
    pub channel: u8,
    /// Capo, in semitones
    pub transposition: u8,
}

pub struct PatternRealizer<'a> {
    config: &'a EngineConfig,
}

impl<'a> PatternRealizer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Schedule every note of the request; returns how many notes were armed
    pub fn realize<S: EventScheduler + ?Sized>(&self, scheduler: &S, request: &PatternRequest<'_>) -> usize {
        let step_count = request.pattern.step_count();
        if step_count == 0 || !(request.total_secs > 0.0) {
            return 0;
        }

        // Strings the new chord mutes stop ringing when it starts
        for string in 0..STRING_COUNT {
            if request.chord.is_muted(string) {
                scheduler.schedule_silence(VoiceId::string(request.channel, string as u8), request.start);
            }
        }

        let step_secs = request.total_secs / step_count as f64;
        let base_velocity = scaled_velocity(self.config.base_velocity, request.velocity_multiplier);
        let mut scheduled = 0;

        for (index, step) in request.pattern.steps.iter().enumerate() {
            if step.kind == StepKind::Rest {
                continue;
            }

            let mut notes = self.resolve_step(request, step);
            if notes.is_empty() {
                continue;
            }

            let step_start = index as f64 * step_secs;
            let count = notes.len();

            match step.kind {
                StepKind::Rest => {}
                StepKind::Arpeggio => {
                    match self.config.arpeggio_order {
                        ArpeggioOrder::BassFirst => notes.sort_by(|a, b| b.0.cmp(&a.0)),
                        ArpeggioOrder::TrebleFirst => notes.sort_by(|a, b| a.0.cmp(&b.0)),
                    }
                    let slice = step_secs / count as f64;
                    for (i, (string, note)) in notes.into_iter().enumerate() {
                        let on = step_start + i as f64 * slice;
                        self.schedule_note(scheduler, request, string, note, base_velocity, on);
                        scheduled += 1;
                    }
                }
                StepKind::Strum => {
                    match step.direction {
                        StrumDirection::Down => notes.sort_by(|a, b| b.0.cmp(&a.0)),
                        StrumDirection::Up => notes.sort_by(|a, b| a.0.cmp(&b.0)),
                    }
                    let delay = self.config.strum_delays.secs(step.speed);
                    let velocity =
                        adaptive_velocity(base_velocity, count, self.config.adaptive_velocity_factor);
                    for (i, (string, note)) in notes.into_iter().enumerate() {
                        let on = step_start + i as f64 * delay;
                        self.schedule_note(scheduler, request, string, note, velocity, on);
                        scheduled += 1;
                    }
                }
            }
        }

        trace!(chord = %request.chord.name, pattern = %request.pattern.name, scheduled, "Pattern realized");
        scheduled
    }

    /// (string, note) for each active string that produces a note
    fn resolve_step(&self, request: &PatternRequest<'_>, step: &chordflow_core::Step) -> Vec<(u8, u8)> {
        let mut notes: Vec<(u8, u8)> = Vec::with_capacity(step.strings.len());
        for &string in &step.strings {
            if string as usize >= STRING_COUNT || notes.iter().any(|(s, _)| *s == string) {
                continue;
            }
            let fret = match step.fret_override(string) {
                Some(fret) => fret,
                None => match request.chord.fret(string as usize) {
                    Some(fret) => fret,
                    None => continue,
                },
            };
            if let Some(note) = fret_to_midi(&self.config.tuning, string as usize, fret, request.transposition) {
                notes.push((string, note));
            }
        }
        notes
    }

    fn schedule_note<S: EventScheduler + ?Sized>(
        &self,
        scheduler: &S,
        request: &PatternRequest<'_>,
        string: u8,
        note: u8,
        velocity: u8,
        on_secs: f64,
    ) {
        let on = offset_instant(request.start, on_secs);
        let off = offset_instant(request.start, on_secs + request.total_secs);
        scheduler.schedule_voiced_note(
            VoiceId::string(request.channel, string),
            note,
            velocity,
            request.channel,
            on,
            off,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chordflow_core::{ChordId, NoteResolution, PatternId, Step, StrumSpeed};

    use crate::testing::RecordingScheduler;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn c_major() -> Chord {
        Chord::new(ChordId(1), "C", [0, 1, 0, 2, 3, -1])
    }

    fn request<'a>(chord: &'a Chord, pattern: &'a GuitarPattern, start: Instant, total_secs: f64) -> PatternRequest<'a> {
        PatternRequest {
            chord,
            pattern,
            start,
            total_secs,
            velocity_multiplier: 1.0,
            channel: 0,
            transposition: 0,
        }
    }

    #[test]
    fn test_velocity_helpers() {
        assert_eq!(adaptive_velocity(100, 4, 1.2), 60);
        assert_eq!(adaptive_velocity(100, 1, 1.2), 100);
        assert_eq!(adaptive_velocity(100, 0, 1.2), 100);
        assert_eq!(adaptive_velocity(127, 2, 1.2), 108);
        assert_eq!(scaled_velocity(100, 1.2), 120);
        assert_eq!(scaled_velocity(100, 2.0), 127);
        assert_eq!(scaled_velocity(100, 0.0), 1);
        assert_eq!(scaled_velocity(100, 0.7), 70);
    }

    #[test]
    fn test_down_strum_order_and_timing() {
        let config = EngineConfig::default();
        let scheduler = RecordingScheduler::new();
        let chord = c_major();
        let pattern = GuitarPattern::new(PatternId(1), "Down", NoteResolution::Eighth)
            .with_steps(vec![Step::strum(vec![0, 2, 4], StrumDirection::Down, StrumSpeed::Medium)]);

        let n = PatternRealizer::new(&config).realize(&scheduler, &request(&chord, &pattern, scheduler.origin(), 2.0));
        assert_eq!(n, 3);

        let ons = scheduler.note_ons();
        // string 4 fret 3 = 48, string 2 open = 55, string 0 open = 64
        let notes: Vec<u8> = ons.iter().map(|o| o.1).collect();
        assert_eq!(notes, vec![48, 55, 64]);
        assert!(approx(ons[0].0, 0.0));
        assert!(approx(ons[1].0, 0.025));
        assert!(approx(ons[2].0, 0.050));
        // Three strings: round(100 * 1.2 / sqrt(3)) = 69
        assert!(ons.iter().all(|o| o.2 == 69));
    }

    #[test]
    fn test_up_strum_reverses() {
        let config = EngineConfig::default();
        let scheduler = RecordingScheduler::new();
        let chord = c_major();
        let pattern = GuitarPattern::new(PatternId(1), "Up", NoteResolution::Eighth)
            .with_steps(vec![Step::strum(vec![4, 0, 2], StrumDirection::Up, StrumSpeed::Fast)]);

        PatternRealizer::new(&config).realize(&scheduler, &request(&chord, &pattern, scheduler.origin(), 1.0));
        let ons = scheduler.note_ons();
        let notes: Vec<u8> = ons.iter().map(|o| o.1).collect();
        assert_eq!(notes, vec![64, 55, 48]);
        assert!(approx(ons[1].0 - ons[0].0, 0.010));
    }

    #[test]
    fn test_strum_velocity_for_four_strings() {
        let config = EngineConfig::default();
        let scheduler = RecordingScheduler::new();
        let chord = c_major();
        let pattern = GuitarPattern::new(PatternId(1), "Four", NoteResolution::Eighth)
            .with_steps(vec![Step::strum(vec![0, 1, 2, 3], StrumDirection::Down, StrumSpeed::Fast)]);

        PatternRealizer::new(&config).realize(&scheduler, &request(&chord, &pattern, scheduler.origin(), 1.0));
        assert!(scheduler.note_ons().iter().all(|o| o.2 == 60));
    }

    #[test]
    fn test_arpeggio_even_division() {
        let config = EngineConfig::default();
        let scheduler = RecordingScheduler::new();
        let chord = c_major();
        let pattern = GuitarPattern::new(PatternId(1), "Pick", NoteResolution::Eighth).with_steps(vec![
            Step::arpeggio(vec![0, 1, 2, 3]),
            Step::rest(),
            Step::rest(),
            Step::rest(),
        ]);

        // Four steps over 2 s: D = 0.5 s, k = 4
        PatternRealizer::new(&config).realize(&scheduler, &request(&chord, &pattern, scheduler.origin(), 2.0));
        let ons = scheduler.note_ons();
        assert_eq!(ons.len(), 4);
        for (i, on) in ons.iter().enumerate() {
            assert!(approx(on.0, i as f64 * 0.125));
            assert_eq!(on.2, 100);
        }
        // Bass first: D string (fret 2 = 52) leads, high E (64) last
        let notes: Vec<u8> = ons.iter().map(|o| o.1).collect();
        assert_eq!(notes, vec![52, 55, 60, 64]);

        // Every note sustains for the whole event
        let offs = scheduler.note_offs();
        assert!(approx(offs[0].0, 2.0));
        assert!(approx(offs[3].0, 2.375));
    }

    #[test]
    fn test_treble_first_arpeggio() {
        let config = EngineConfig {
            arpeggio_order: ArpeggioOrder::TrebleFirst,
            ..Default::default()
        };
        let scheduler = RecordingScheduler::new();
        let chord = c_major();
        let pattern = GuitarPattern::new(PatternId(1), "Pick", NoteResolution::Eighth)
            .with_steps(vec![Step::arpeggio(vec![3, 0])]);

        PatternRealizer::new(&config).realize(&scheduler, &request(&chord, &pattern, scheduler.origin(), 1.0));
        let notes: Vec<u8> = scheduler.note_ons().iter().map(|o| o.1).collect();
        assert_eq!(notes, vec![64, 52]);
    }

    #[test]
    fn test_muted_strings_are_silenced_and_skipped() {
        let config = EngineConfig::default();
        let scheduler = RecordingScheduler::new();
        let chord = c_major();
        let pattern = GuitarPattern::new(PatternId(1), "All", NoteResolution::Eighth)
            .with_steps(vec![Step::strum(vec![0, 1, 2, 3, 4, 5], StrumDirection::Down, StrumSpeed::Fast)]);

        let n = PatternRealizer::new(&config).realize(&scheduler, &request(&chord, &pattern, scheduler.origin(), 1.0));
        assert_eq!(n, 5);
        let silences = scheduler.silences();
        assert_eq!(silences, vec![(0.0, VoiceId::string(0, 5))]);
    }

    #[test]
    fn test_fret_override_and_capo() {
        let config = EngineConfig::default();
        let scheduler = RecordingScheduler::new();
        let chord = c_major();
        let pattern = GuitarPattern::new(PatternId(1), "Bass", NoteResolution::Eighth)
            .with_steps(vec![Step::arpeggio(vec![5]).with_override(5, 3)]);

        let mut req = request(&chord, &pattern, scheduler.origin(), 1.0);
        req.transposition = 2;
        PatternRealizer::new(&config).realize(&scheduler, &req);
        let notes: Vec<u8> = scheduler.note_ons().iter().map(|o| o.1).collect();
        assert_eq!(notes, vec![45]);
    }

    #[test]
    fn test_degenerate_inputs() {
        let config = EngineConfig::default();
        let scheduler = RecordingScheduler::new();
        let chord = c_major();
        let empty = GuitarPattern::new(PatternId(1), "Empty", NoteResolution::Eighth);
        let realizer = PatternRealizer::new(&config);

        assert_eq!(realizer.realize(&scheduler, &request(&chord, &empty, scheduler.origin(), 1.0)), 0);

        let pattern = GuitarPattern::new(PatternId(2), "One", NoteResolution::Eighth)
            .with_steps(vec![Step::strum(vec![0], StrumDirection::Down, StrumSpeed::Fast)]);
        assert_eq!(realizer.realize(&scheduler, &request(&chord, &pattern, scheduler.origin(), 0.0)), 0);
        assert!(scheduler.all().is_empty());
    }
}
