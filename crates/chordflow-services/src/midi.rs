//! MIDI message model and output sinks

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chordflow_core::theory::PITCH_BEND_CENTER;
use tracing::debug;

/// All Notes Off
pub const CC_ALL_NOTES_OFF: u8 = 123;
/// Reset All Controllers
pub const CC_RESET_CONTROLLERS: u8 = 121;

/// Channel voice messages produced by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { note: u8, velocity: u8, channel: u8 },
    NoteOff { note: u8, channel: u8 },
    /// 14-bit value, 8192 = centre
    PitchBend { value: u16, channel: u8 },
    ControlChange { controller: u8, value: u8, channel: u8 },
}

impl MidiMessage {
    pub fn note_on(note: u8, velocity: u8, channel: u8) -> Self {
        Self::NoteOn {
            note: note.min(127),
            velocity: velocity.clamp(1, 127),
            channel: channel.min(15),
        }
    }

    pub fn note_off(note: u8, channel: u8) -> Self {
        Self::NoteOff {
            note: note.min(127),
            channel: channel.min(15),
        }
    }

    pub fn pitch_bend(value: u16, channel: u8) -> Self {
        Self::PitchBend {
            value: value.min(0x3FFF),
            channel: channel.min(15),
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::PitchBend { channel, .. }
            | Self::ControlChange { channel, .. } => channel,
        }
    }

    /// Raw wire bytes (status, data1, data2)
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            Self::NoteOn { note, velocity, channel } => {
                [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            Self::NoteOff { note, channel } => [0x80 | (channel & 0x0F), note & 0x7F, 0],
            Self::PitchBend { value, channel } => {
                let value = value.min(0x3FFF);
                [
                    0xE0 | (channel & 0x0F),
                    (value & 0x7F) as u8,
                    ((value >> 7) & 0x7F) as u8,
                ]
            }
            Self::ControlChange { controller, value, channel } => {
                [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F]
            }
        }
    }
}

/// Messages that silence every channel: all notes off, reset controllers, centred wheel
pub fn panic_messages() -> Vec<MidiMessage> {
    (0..16u8)
        .flat_map(|channel| {
            [
                MidiMessage::ControlChange {
                    controller: CC_ALL_NOTES_OFF,
                    value: 0,
                    channel,
                },
                MidiMessage::ControlChange {
                    controller: CC_RESET_CONTROLLERS,
                    value: 0,
                    channel,
                },
                MidiMessage::pitch_bend(PITCH_BEND_CENTER, channel),
            ]
        })
        .collect()
}

/// Destination for emitted MIDI (device port, log, test buffer)
pub trait MidiSink: Send {
    fn send(&mut self, message: MidiMessage);
}

impl MidiSink for Box<dyn MidiSink> {
    fn send(&mut self, message: MidiMessage) {
        (**self).send(message);
    }
}

/// Writes every message to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl MidiSink for LogSink {
    fn send(&mut self, message: MidiMessage) {
        debug!(?message, "MIDI out");
    }
}

/// A message with the instant it left the engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedMessage {
    pub at: Instant,
    pub message: MidiMessage,
}

/// Collects messages in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<TimedMessage>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<TimedMessage> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }
}

impl MidiSink for MemorySink {
    fn send(&mut self, message: MidiMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(TimedMessage {
                at: Instant::now(),
                message,
            });
        }
    }
}
