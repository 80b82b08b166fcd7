//! Configuration loading from TOML files
//!
//! Config file is selected via the --config command line argument;
//! a missing or invalid file falls back to built-in defaults with a
//! warning. Per-device sections carry the transit-related knobs the
//! coordinator consumes: whether the device performs mechanical
//! (sensor-skipping) ejects and its ball-missing windows per source
//! device.

use crate::domain::types::DeviceId;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Ball-missing window applied when a device names no explicit value
const DEFAULT_BALL_MISSING_TIMEOUT_MS: u64 = 20_000;

fn default_transit_timeout_ms() -> u64 {
    5000
}

fn default_machine_name() -> String {
    "pinball".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MachineToml {
    #[serde(default = "default_machine_name")]
    pub name: String,
}

impl Default for MachineToml {
    fn default() -> Self {
        Self { name: default_machine_name() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceToml {
    pub name: String,
    /// Device may eject balls on mechanical timing alone, bypassing its
    /// primary detector
    #[serde(default)]
    pub mechanical_eject: bool,
    /// Default transit window armed when this device expects a ball
    #[serde(default = "default_transit_timeout_ms")]
    pub transit_timeout_ms: u64,
    /// Ball-missing window per target device, applied after external
    /// confirmation
    #[serde(default)]
    pub ball_missing_timeouts: HashMap<String, u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub machine: MachineToml,
    #[serde(default)]
    pub devices: Vec<DeviceToml>,
}

/// Per-device configuration consumed by the transit core
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    name: DeviceId,
    mechanical_eject: bool,
    transit_timeout: Duration,
    ball_missing_timeouts: HashMap<DeviceId, Duration>,
}

impl DeviceConfig {
    pub fn name(&self) -> &DeviceId {
        &self.name
    }

    pub fn mechanical_eject(&self) -> bool {
        self.mechanical_eject
    }

    pub fn transit_timeout(&self) -> Duration {
        self.transit_timeout
    }

    /// Ball-missing window for a transit toward `target`
    pub fn ball_missing_timeout(&self, target: &DeviceId) -> Duration {
        self.ball_missing_timeouts
            .get(target)
            .copied()
            .unwrap_or(Duration::from_millis(DEFAULT_BALL_MISSING_TIMEOUT_MS))
    }

    fn from_toml(toml: DeviceToml) -> Self {
        let ball_missing_timeouts = toml
            .ball_missing_timeouts
            .into_iter()
            .map(|(target, ms)| (DeviceId::new(target), Duration::from_millis(ms)))
            .collect();
        Self {
            name: DeviceId::new(toml.name),
            mechanical_eject: toml.mechanical_eject,
            transit_timeout: Duration::from_millis(toml.transit_timeout_ms),
            ball_missing_timeouts,
        }
    }
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    machine_name: String,
    devices: HashMap<DeviceId, DeviceConfig>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let devices = vec![
            DeviceToml {
                name: "trough".to_string(),
                mechanical_eject: false,
                transit_timeout_ms: default_transit_timeout_ms(),
                ball_missing_timeouts: HashMap::from([("playfield".to_string(), 6000)]),
            },
            DeviceToml {
                name: "plunger_lane".to_string(),
                mechanical_eject: true,
                transit_timeout_ms: default_transit_timeout_ms(),
                ball_missing_timeouts: HashMap::from([("playfield".to_string(), 6000)]),
            },
            DeviceToml {
                name: "playfield".to_string(),
                mechanical_eject: false,
                transit_timeout_ms: default_transit_timeout_ms(),
                ball_missing_timeouts: HashMap::new(),
            },
        ];
        Self {
            machine_name: default_machine_name(),
            devices: devices
                .into_iter()
                .map(DeviceConfig::from_toml)
                .map(|d| (d.name().clone(), d))
                .collect(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            machine_name: toml_config.machine.name,
            devices: toml_config
                .devices
                .into_iter()
                .map(DeviceConfig::from_toml)
                .map(|d| (d.name().clone(), d))
                .collect(),
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to
    /// defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn device(&self, name: &DeviceId) -> Option<&DeviceConfig> {
        self.devices.get(name)
    }

    pub fn device_names(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices.keys()
    }

    /// Transit window armed by `target` when expecting a ball; falls
    /// back to the built-in default for unknown devices
    pub fn transit_timeout(&self, target: &DeviceId) -> Duration {
        self.device(target)
            .map(DeviceConfig::transit_timeout)
            .unwrap_or(Duration::from_millis(default_transit_timeout_ms()))
    }

    /// Ball-missing window for a transit from `source` toward `target`
    pub fn ball_missing_timeout(&self, source: &DeviceId, target: &DeviceId) -> Duration {
        self.device(source)
            .map(|d| d.ball_missing_timeout(target))
            .unwrap_or(Duration::from_millis(DEFAULT_BALL_MISSING_TIMEOUT_MS))
    }
}
