//! Bootstrap configuration loading and path resolution
//!
//! The appliance reads one TOML file at start-up. There is no runtime
//! configuration store; a restart picks up changes.
//!
//! # Path resolution priority
//!
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. `<config dir>/trigdeck/config.toml`, then `/etc/trigdeck/config.toml`
//! 4. Built-in defaults (no inputs, shared pool)

use crate::protocol::PlayMode;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "TRIGDECK_CONFIG";

/// Number of playback engines in the pool
pub const DEFAULT_CHANNELS: usize = 10;

/// Upper bound for an input's nominal volume (linear gain)
pub const MAX_INPUT_VOLUME: f32 = 5.0;

/// Electrical polarity of an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    ActiveLow,
    ActiveHigh,
}

/// How level changes arm playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerMode {
    #[default]
    Edge,
    Level,
}

/// Behaviour on deassertion (level mode) or re-trigger while playing (edge mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeassertPolicy {
    #[default]
    Restart,
    Pause,
    Stop,
}

/// Engine pool addressing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolMode {
    /// First-fit allocation, inputs share the engines
    #[default]
    Shared,
    /// Fixed 1:1 channel → engine mapping, driven by the host protocol
    Indexed,
}

/// Static configuration of one trigger input
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Pin number (also the input index)
    pub pin: u8,

    /// Clip to play, relative to the media root
    pub file: String,

    #[serde(default)]
    pub polarity: Polarity,

    #[serde(default)]
    pub trigger: TriggerMode,

    #[serde(default)]
    pub deassert: DeassertPolicy,

    #[serde(default)]
    pub mode: PlayMode,

    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Debounce window in milliseconds (0 disables debouncing)
    #[serde(default)]
    pub debounce_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Simulated hardware parameters (used when no real hardware is attached)
#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    /// Time for the simulated output stage to ramp volume to a new target
    #[serde(default = "default_ramp_ms")]
    pub ramp_ms: u64,

    /// Length of a simulated clip played in normal mode
    #[serde(default = "default_clip_ms")]
    pub clip_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ramp_ms: default_ramp_ms(),
            clip_ms: default_clip_ms(),
        }
    }
}

/// Complete device configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Poll loop period in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Number of playback engines
    #[serde(default = "default_channels")]
    pub channels: usize,

    #[serde(default)]
    pub pool_mode: PoolMode,

    /// Directory clip paths are resolved against
    #[serde(default)]
    pub media_root: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub inputs: Vec<InputConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            channels: default_channels(),
            pool_mode: PoolMode::default(),
            media_root: None,
            logging: LoggingConfig::default(),
            simulation: SimulationConfig::default(),
            inputs: Vec::new(),
        }
    }
}

fn default_volume() -> f32 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ramp_ms() -> u64 {
    30
}

fn default_clip_ms() -> u64 {
    5_000
}

fn default_tick_ms() -> u64 {
    1
}

fn default_channels() -> usize {
    DEFAULT_CHANNELS
}

impl DeviceConfig {
    /// Parse and validate a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DeviceConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!(
            "Loaded configuration from {} ({} inputs, {} channels, {:?} pool)",
            path.display(),
            config.inputs.len(),
            config.channels,
            config.pool_mode
        );
        Ok(config)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 || self.channels > u8::MAX as usize {
            return Err(Error::Config(format!(
                "channels must be within 1..=255, got {}",
                self.channels
            )));
        }

        let mut pins = HashSet::new();
        for input in &self.inputs {
            if !pins.insert(input.pin) {
                return Err(Error::Config(format!("pin {} configured twice", input.pin)));
            }
            if input.file.is_empty() {
                return Err(Error::Config(format!("pin {} has no file", input.pin)));
            }
            if !(0.0..=MAX_INPUT_VOLUME).contains(&input.volume) {
                return Err(Error::Config(format!(
                    "pin {} volume {} outside 0.0..={}",
                    input.pin, input.volume, MAX_INPUT_VOLUME
                )));
            }
        }

        if self.pool_mode == PoolMode::Indexed && !self.inputs.is_empty() {
            return Err(Error::Config(
                "inputs require pool_mode = \"shared\"".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve a clip path against the media root
    pub fn resolve_media_path(&self, file: &str) -> PathBuf {
        match &self.media_root {
            Some(root) => root.join(file),
            None => PathBuf::from(file),
        }
    }
}

/// Resolve the configuration file path
///
/// Returns `None` when no file is named and none exists in the standard
/// locations; callers then fall back to [`DeviceConfig::default`].
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Standard locations
    let user_config = dirs::config_dir().map(|d| d.join("trigdeck").join("config.toml"));
    let system_config = PathBuf::from("/etc/trigdeck/config.toml");

    for candidate in user_config.into_iter().chain(std::iter::once(system_config)) {
        if candidate.exists() {
            return Some(candidate);
        }
        debug!("No configuration at {}", candidate.display());
    }

    None
}

/// Load the configuration following the resolution priority
pub fn load_config(cli_arg: Option<&Path>) -> Result<DeviceConfig> {
    load_resolved(resolve_config_path(cli_arg, CONFIG_ENV_VAR))
}

fn load_resolved(path: Option<PathBuf>) -> Result<DeviceConfig> {
    match path {
        Some(path) => DeviceConfig::load(&path),
        None => {
            info!("No configuration file found, using built-in defaults");
            Ok(DeviceConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
tick_ms = 2
media_root = "/srv/clips"

[logging]
level = "debug"

[[inputs]]
pin = 1
file = "1.wav"
trigger = "edge"
deassert = "restart"
debounce_ms = 20

[[inputs]]
pin = 2
file = "rain.wav"
polarity = "active_high"
trigger = "level"
deassert = "pause"
mode = "loop"
volume = 0.5
"#;

    #[test]
    fn test_parse_sample() {
        let config = DeviceConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.tick_ms, 2);
        assert_eq!(config.channels, DEFAULT_CHANNELS);
        assert_eq!(config.pool_mode, PoolMode::Shared);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.inputs.len(), 2);

        let first = &config.inputs[0];
        assert_eq!(first.polarity, Polarity::ActiveLow);
        assert_eq!(first.trigger, TriggerMode::Edge);
        assert_eq!(first.mode, PlayMode::Normal);
        assert_eq!(first.volume, 1.0);
        assert_eq!(first.debounce_ms, 20);

        let second = &config.inputs[1];
        assert_eq!(second.polarity, Polarity::ActiveHigh);
        assert_eq!(second.trigger, TriggerMode::Level);
        assert_eq!(second.deassert, DeassertPolicy::Pause);
        assert_eq!(second.mode, PlayMode::Loop);
        assert_eq!(second.volume, 0.5);
    }

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::from_toml_str("").unwrap();
        assert_eq!(config.tick_ms, 1);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.simulation.ramp_ms, 30);
        assert!(config.inputs.is_empty());
    }

    #[test]
    fn test_duplicate_pin_rejected() {
        let text = r#"
[[inputs]]
pin = 4
file = "a.wav"

[[inputs]]
pin = 4
file = "b.wav"
"#;
        let err = DeviceConfig::from_toml_str(text).unwrap_err();
        assert!(err.to_string().contains("pin 4 configured twice"));
    }

    #[test]
    fn test_volume_range_checked() {
        let text = r#"
[[inputs]]
pin = 1
file = "a.wav"
volume = 7.5
"#;
        assert!(DeviceConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn test_indexed_pool_rejects_inputs() {
        let text = r#"
pool_mode = "indexed"

[[inputs]]
pin = 1
file = "a.wav"
"#;
        assert!(DeviceConfig::from_toml_str(text).is_err());
    }

    #[test]
    fn test_unknown_enum_value_is_parse_error() {
        let text = r#"
[[inputs]]
pin = 1
file = "a.wav"
trigger = "pulse"
"#;
        assert!(matches!(
            DeviceConfig::from_toml_str(text),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_resolve_media_path() {
        let mut config = DeviceConfig::default();
        assert_eq!(config.resolve_media_path("1.wav"), PathBuf::from("1.wav"));
        config.media_root = Some(PathBuf::from("/srv/clips"));
        assert_eq!(
            config.resolve_media_path("1.wav"),
            PathBuf::from("/srv/clips/1.wav")
        );
    }

    #[test]
    fn test_cli_argument_wins() {
        let path = resolve_config_path(Some(Path::new("/tmp/explicit.toml")), "TRIGDECK_TEST_UNSET");
        assert_eq!(path, Some(PathBuf::from("/tmp/explicit.toml")));
    }

    /// Uses `#[serial]` because these tests share `TRIGDECK_CONFIG`.
    #[test]
    #[serial_test::serial]
    fn test_env_var_used_without_cli_argument() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        std::env::set_var(CONFIG_ENV_VAR, file.path());

        let path = resolve_config_path(None, CONFIG_ENV_VAR);
        let config = load_config(None);
        std::env::remove_var(CONFIG_ENV_VAR);

        assert_eq!(path, Some(file.path().to_path_buf()));
        assert_eq!(config.unwrap().inputs.len(), 2);
    }

    #[test]
    #[serial_test::serial]
    fn test_cli_argument_beats_env_var() {
        std::env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");
        let path = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")), CONFIG_ENV_VAR);
        std::env::remove_var(CONFIG_ENV_VAR);

        assert_eq!(path, Some(PathBuf::from("/tmp/from-cli.toml")));
    }

    #[test]
    #[serial_test::serial]
    fn test_empty_env_var_falls_through() {
        std::env::set_var(CONFIG_ENV_VAR, "");
        let path = resolve_config_path(None, CONFIG_ENV_VAR);
        std::env::remove_var(CONFIG_ENV_VAR);

        // Only an existing standard location may be picked up
        if let Some(path) = path {
            assert!(path.ends_with("trigdeck/config.toml"));
            assert!(path.exists());
        }
    }

    #[test]
    fn test_no_config_file_uses_defaults() {
        let config = load_resolved(None).unwrap();
        let defaults = DeviceConfig::default();

        assert_eq!(config.tick_ms, defaults.tick_ms);
        assert!(config.inputs.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = DeviceConfig::load(file.path()).unwrap();
        assert_eq!(config.inputs.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = DeviceConfig::load(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
