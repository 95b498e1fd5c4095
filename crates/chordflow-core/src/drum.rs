//! Drum step patterns

use serde::{Deserialize, Serialize};

use crate::pattern::NoteResolution;

/// GM drum map notes
pub const KICK: u8 = 36;
pub const RIM_SHOT: u8 = 37;
pub const SNARE: u8 = 38;
pub const CLAP: u8 = 39;
pub const CLOSED_HAT: u8 = 42;
pub const LOW_TOM: u8 = 43;
pub const PEDAL_HAT: u8 = 44;
pub const MID_TOM: u8 = 45;
pub const OPEN_HAT: u8 = 46;
pub const HIGH_TOM: u8 = 47;
pub const CRASH: u8 = 49;
pub const RIDE: u8 = 51;
pub const TAMBOURINE: u8 = 54;
pub const COWBELL: u8 = 56;
pub const SHAKER: u8 = 70;

/// Unique identifier for drum patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DrumPatternId(pub u64);

/// A row of the drum grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrumInstrument {
    pub name: String,
    pub note: u8,
}

impl DrumInstrument {
    pub fn new(name: impl Into<String>, note: u8) -> Self {
        Self {
            name: name.into(),
            note,
        }
    }
}

/// Fixed-length percussion grid, `grid[instrument][step]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrumPattern {
    pub id: DrumPatternId,
    pub name: String,
    /// Step count
    pub length: usize,
    #[serde(default = "default_drum_resolution")]
    pub resolution: NoteResolution,
    pub instruments: Vec<DrumInstrument>,
    pub grid: Vec<Vec<bool>>,
}

fn default_drum_resolution() -> NoteResolution {
    NoteResolution::Sixteenth
}

impl DrumPattern {
    pub fn new(id: DrumPatternId, name: impl Into<String>, length: usize, resolution: NoteResolution) -> Self {
        Self {
            id,
            name: name.into(),
            length,
            resolution,
            instruments: Vec::new(),
            grid: Vec::new(),
        }
    }

    /// Add an instrument row; returns its index
    pub fn add_instrument(&mut self, instrument: DrumInstrument) -> usize {
        self.instruments.push(instrument);
        self.grid.push(vec![false; self.length]);
        self.instruments.len() - 1
    }

    /// Add an instrument with hits on the given steps
    pub fn with_hits(mut self, instrument: DrumInstrument, steps: &[usize]) -> Self {
        let row = self.add_instrument(instrument);
        for &step in steps {
            self.set_hit(row, step, true);
        }
        self
    }

    /// Whether a cell is a hit; missing rows or short rows read as rests
    pub fn hit(&self, instrument: usize, step: usize) -> bool {
        step < self.length
            && self
                .grid
                .get(instrument)
                .and_then(|row| row.get(step))
                .copied()
                .unwrap_or(false)
    }

    pub fn set_hit(&mut self, instrument: usize, step: usize, on: bool) {
        if step >= self.length {
            return;
        }
        let Some(row) = self.grid.get_mut(instrument) else {
            return;
        };
        if row.len() < self.length {
            row.resize(self.length, false);
        }
        row[step] = on;
    }

    pub fn steps_per_beat(&self) -> u32 {
        self.resolution.steps_per_beat()
    }

    pub fn step_beats(&self) -> f64 {
        1.0 / self.steps_per_beat() as f64
    }

    /// Length of one pass through the grid
    pub fn duration_beats(&self) -> f64 {
        self.length as f64 / self.steps_per_beat() as f64
    }

    /// Notes struck on a step, in instrument order
    pub fn hits_at(&self, step: usize) -> impl Iterator<Item = u8> + '_ {
        self.instruments
            .iter()
            .enumerate()
            .filter(move |(row, _)| self.hit(*row, step))
            .map(|(_, inst)| inst.note)
    }
}
