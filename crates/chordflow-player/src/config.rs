use std::path::{Path, PathBuf};

use anyhow::Context;
use chordflow_core::EngineConfig;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub(crate) struct PlayerConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub(crate) struct OutputConfig {
    /// Substring of the MIDI output port name
    #[serde(default)]
    pub port: Option<String>,
}

pub(crate) fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chordflow")
        .join("config.toml")
}

/// An explicit path must exist and parse; the default location silently falls back to defaults
pub(crate) fn load_config(explicit: Option<&Path>) -> anyhow::Result<PlayerConfig> {
    let config: PlayerConfig = match explicit {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => std::fs::read_to_string(config_path())
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default(),
    };
    config.engine.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config() {
        let config: PlayerConfig = toml::from_str(
            r#"
            [engine]
            baseVelocity = 90
            drumChannel = 10

            [engine.strumDelays]
            slowMs = 80.0

            [output]
            port = "IAC"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.base_velocity, 90);
        assert_eq!(config.engine.drum_channel, 10);
        assert_eq!(config.engine.strum_delays.slow_ms, 80.0);
        assert_eq!(config.engine.strum_delays.fast_ms, 10.0);
        assert_eq!(config.output.port.as_deref(), Some("IAC"));
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: PlayerConfig = toml::from_str("").unwrap();
        assert_eq!(config, PlayerConfig::default());
    }

    #[test]
    fn test_missing_explicit_path_errors() {
        assert!(load_config(Some(Path::new("/nonexistent/chordflow.toml"))).is_err());
    }

    #[test]
    fn test_config_path_location() {
        assert!(config_path().ends_with("chordflow/config.toml"));
    }
}
