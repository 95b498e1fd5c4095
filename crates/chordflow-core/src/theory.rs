//! Music theory helpers (tuning, key transposition, scale degrees, pitch bend math)

// ============================================================================
// Tuning and keys
// ============================================================================

/// Standard guitar tuning, indexed by string: 0 = high E (string 1) .. 5 = low E (string 6)
pub const STANDARD_TUNING: [u8; 6] = [64, 59, 55, 50, 45, 40];

/// Semitone offsets of the major scale degrees 1..=7
pub const MAJOR_SCALE: [u8; 7] = [0, 2, 4, 5, 7, 9, 11];

/// Semitone offset of a key's tonic from C.
///
/// Accepts `C`, `F#`, `Bb`, `Am`, `Ebmaj` and similar; anything after the
/// accidental is ignored. Unknown keys map to 0.
///
/// # Example
/// ```
/// use chordflow_core::theory::transposition;
/// assert_eq!(transposition("G"), 7);
/// assert_eq!(transposition("Bb"), 10);
/// assert_eq!(transposition("nonsense"), 0);
/// ```
pub fn transposition(key: &str) -> u8 {
    let mut chars = key.trim().chars();

    let base: i32 = match chars.next().map(|c| c.to_ascii_uppercase()) {
        Some('C') => 0,
        Some('D') => 2,
        Some('E') => 4,
        Some('F') => 5,
        Some('G') => 7,
        Some('A') => 9,
        Some('B') => 11,
        _ => return 0,
    };

    let accidental = match chars.next() {
        Some('#') | Some('♯') => 1,
        Some('b') | Some('♭') => -1,
        _ => 0,
    };

    (base + accidental).rem_euclid(12) as u8
}

/// Major-scale semitone offset for a scale degree.
///
/// Degree 0 is a rest; degrees outside 1..=7 produce no note.
pub fn scale_degree_to_semitone(degree: u8) -> Option<u8> {
    match degree {
        1..=7 => Some(MAJOR_SCALE[degree as usize - 1]),
        _ => None,
    }
}

/// MIDI note for a fretted string.
///
/// Returns `None` for muted strings (fret < 0), unknown strings, or notes
/// outside the MIDI range.
pub fn fret_to_midi(tuning: &[u8], string: usize, fret: i8, transposition: u8) -> Option<u8> {
    if fret < 0 {
        return None;
    }
    let open = *tuning.get(string)?;
    let note = open as i32 + fret as i32 + transposition as i32;
    (0..=127).contains(&note).then_some(note as u8)
}

// ============================================================================
// Pitch bend
// ============================================================================

/// Pitch wheel at rest
pub const PITCH_BEND_CENTER: u16 = 8192;

/// Largest 14-bit pitch bend value
pub const PITCH_BEND_MAX: u16 = 16383;

/// Clamp a semitone delta to the configured bend range (symmetric, in semitones).
pub fn clamp_semitones(semitones: f64, range: f64) -> f64 {
    if range <= 0.0 {
        return 0.0;
    }
    semitones.clamp(-range, range)
}

/// Raw 14-bit pitch bend value for a semitone delta.
///
/// The delta is clamped to `range` first, and the result is clamped to
/// `[0, 16383]` so that a full upward bend lands on 16383 rather than 16384.
pub fn pitch_bend_value(semitones: f64, range: f64) -> u16 {
    if range <= 0.0 {
        return PITCH_BEND_CENTER;
    }
    let clamped = clamp_semitones(semitones, range);
    let raw = PITCH_BEND_CENTER as f64 + (clamped / range) * PITCH_BEND_CENTER as f64;
    raw.round().clamp(0.0, PITCH_BEND_MAX as f64) as u16
}

/// Linear interpolation, `t` clamped to [0, 1]
pub fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t.clamp(0.0, 1.0)
}

/// Interpolate between two pitch bend values
pub fn lerp_bend(from: u16, to: u16, t: f64) -> u16 {
    lerp(from as f64, to as f64, t)
        .round()
        .clamp(0.0, PITCH_BEND_MAX as f64) as u16
}
