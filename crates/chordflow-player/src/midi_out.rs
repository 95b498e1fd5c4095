//! Hardware MIDI output through midir

use anyhow::anyhow;
use chordflow_services::{MidiMessage, MidiSink};
use midir::{MidiOutput, MidiOutputConnection};
use tracing::{info, warn};

const CLIENT_NAME: &str = "chordflow";

pub(crate) fn list_ports() -> anyhow::Result<Vec<String>> {
    let output = MidiOutput::new(CLIENT_NAME).map_err(|e| anyhow!("MIDI init failed: {e}"))?;
    Ok(output
        .ports()
        .iter()
        .filter_map(|port| output.port_name(port).ok())
        .collect())
}

pub(crate) struct MidirSink {
    connection: MidiOutputConnection,
    port: String,
}

impl MidirSink {
    /// Connect to the first port whose name contains `wanted`, or the first port at all
    pub(crate) fn connect(wanted: Option<&str>) -> anyhow::Result<Self> {
        let output = MidiOutput::new(CLIENT_NAME).map_err(|e| anyhow!("MIDI init failed: {e}"))?;
        let ports = output.ports();
        let port = match wanted {
            Some(wanted) => ports
                .iter()
                .find(|p| output.port_name(p).is_ok_and(|name| name.contains(wanted))),
            None => ports.first(),
        }
        .ok_or_else(|| anyhow!("No MIDI output port matching {:?}", wanted.unwrap_or("any")))?;

        let name = output.port_name(port).unwrap_or_else(|_| "unknown".into());
        let connection = output
            .connect(port, "chordflow-out")
            .map_err(|e| anyhow!("Failed to connect to {name}: {e}"))?;
        info!(port = %name, "MIDI output connected");
        Ok(Self { connection, port: name })
    }
}

impl MidiSink for MidirSink {
    fn send(&mut self, message: MidiMessage) {
        if let Err(err) = self.connection.send(&message.to_bytes()) {
            warn!(%err, port = %self.port, ?message, "MIDI send failed");
        }
    }
}
