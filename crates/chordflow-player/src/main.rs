//! chordflow: play an arrangement file as MIDI

mod config;
#[cfg(feature = "midi-out")]
mod midi_out;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use chordflow_core::{Arrangement, TransportState};
use chordflow_services::{ArrangementPlayer, MidiSink, NoteScheduler, PlayerEvent};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "chordflow")]
#[command(version)]
#[command(about = "Play guitar, drum and vocal arrangements as MIDI", long_about = None)]
struct Args {
    /// Arrangement JSON file
    #[arg(required_unless_present = "list_ports")]
    arrangement: Option<PathBuf>,

    /// Config file (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start position in beats
    #[arg(long, default_value_t = 0.0)]
    from: f64,

    /// Loop region in beats, as START:END
    #[arg(long = "loop", value_parser = parse_loop)]
    loop_region: Option<(f64, f64)>,

    /// Override the arrangement tempo
    #[arg(long)]
    bpm: Option<f64>,

    /// MIDI output port (substring of its name)
    #[arg(short, long)]
    port: Option<String>,

    /// List MIDI output ports
    #[arg(short = 'L', long)]
    list_ports: bool,

    /// Stop after this many seconds
    #[arg(long)]
    max_seconds: Option<f64>,
}

fn parse_loop(s: &str) -> Result<(f64, f64), String> {
    let (start, end) = s
        .split_once(':')
        .ok_or_else(|| format!("expected START:END, got {s:?}"))?;
    let start: f64 = start.trim().parse().map_err(|e| format!("bad loop start: {e}"))?;
    let end: f64 = end.trim().parse().map_err(|e| format!("bad loop end: {e}"))?;
    if !(end > start) || start < 0.0 {
        return Err(format!("loop end must be after a non-negative start, got {s:?}"));
    }
    Ok((start, end))
}

#[cfg(feature = "midi-out")]
fn open_sink(port: Option<&str>) -> anyhow::Result<Box<dyn MidiSink>> {
    Ok(Box::new(midi_out::MidirSink::connect(port)?))
}

#[cfg(not(feature = "midi-out"))]
fn open_sink(port: Option<&str>) -> anyhow::Result<Box<dyn MidiSink>> {
    if let Some(port) = port {
        warn!(port, "Built without midi-out, logging MIDI instead");
    }
    Ok(Box::new(chordflow_services::LogSink))
}

#[cfg(feature = "midi-out")]
fn list_ports() -> anyhow::Result<()> {
    for name in midi_out::list_ports()? {
        println!("{name}");
    }
    Ok(())
}

#[cfg(not(feature = "midi-out"))]
fn list_ports() -> anyhow::Result<()> {
    bail!("Built without midi-out; rebuild with --features midi-out")
}

fn load_arrangement(path: &Path) -> anyhow::Result<Arrangement> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid arrangement {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("chordflow=debug".parse()?))
        .init();

    let args = Args::parse();
    if args.list_ports {
        return list_ports();
    }
    let Some(path) = args.arrangement.as_ref() else {
        bail!("No arrangement given");
    };

    let config = config::load_config(args.config.as_deref())?;
    let arrangement = load_arrangement(path)?;
    let sink = open_sink(args.port.as_deref().or(config.output.port.as_deref()))?;

    let mut player = ArrangementPlayer::new(NoteScheduler::new(sink)?, config.engine);
    player.load(arrangement)?;
    if let Some(bpm) = args.bpm {
        player.set_tempo(bpm)?;
    }
    if let Some((start, end)) = args.loop_region {
        player.set_loop(start, end);
    }

    let events = player.subscribe();
    player.spawn_ticker()?;
    player.play(args.from);

    let deadline = args
        .max_seconds
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .map(|limit| Instant::now() + limit);

    loop {
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(PlayerEvent::Label(label)) => {
                let status = player.status();
                info!(
                    bar = %status.bars,
                    time = %status.time,
                    chord = label.chord.as_deref().unwrap_or("-"),
                    word = label.word.as_deref().unwrap_or("-"),
                    "Now playing"
                );
            }
            Ok(PlayerEvent::Finished | PlayerEvent::StateChanged(TransportState::Idle)) => break,
            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            info!("Time limit reached");
            break;
        }
    }

    player.stop();
    info!("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chordflow_services::{MemorySink, PlaybackScheduler};

    const CAMPFIRE: &str = include_str!("../demos/campfire.json");

    #[test]
    fn test_parse_loop() {
        assert_eq!(parse_loop("0:8"), Ok((0.0, 8.0)));
        assert_eq!(parse_loop(" 4.5 : 12 "), Ok((4.5, 12.0)));
        assert!(parse_loop("8:4").is_err());
        assert!(parse_loop("8").is_err());
        assert!(parse_loop("a:b").is_err());
    }

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["chordflow", "song.json", "--loop", "0:8", "--from", "2"]).unwrap();
        assert_eq!(args.loop_region, Some((0.0, 8.0)));
        assert_eq!(args.from, 2.0);
        assert!(Args::try_parse_from(["chordflow"]).is_err());
        assert!(Args::try_parse_from(["chordflow", "-L"]).is_ok());
    }

    #[test]
    fn test_demo_arrangement() {
        let arrangement: Arrangement = serde_json::from_str(CAMPFIRE).unwrap();
        arrangement.validate().unwrap();
        assert_eq!(arrangement.length_beats(), 24.0);
        assert_eq!(arrangement.transposition(), 7);

        let label = arrangement.label_at(4.5);
        assert_eq!(label.chord.as_deref(), Some("G"));
        assert_eq!(label.word.as_deref(), Some("Down"));
        assert_eq!(arrangement.label_at(13.6).word.as_deref(), Some("the"));
    }

    #[test]
    fn test_demo_plays() {
        let arrangement: Arrangement = serde_json::from_str(CAMPFIRE).unwrap();
        let sink = MemorySink::new();
        let player = ArrangementPlayer::new(NoteScheduler::new(sink.clone()).unwrap(), Default::default());
        player.load(arrangement).unwrap();
        player.play(0.0);
        assert!(player.is_playing());
        assert!(player.scheduler().pending_count() > 100);

        player.stop();
        assert_eq!(player.scheduler().pending_count(), 0);
        assert_eq!(player.status().state, TransportState::Idle);
    }
}
