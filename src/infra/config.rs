//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! A missing or unreadable file falls back to built-in defaults.

use crate::domain::types::{Channel, GateId};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "parking".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { path: default_registry_path() }
    }
}

fn default_registry_path() -> String {
    "parking_database.db".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    #[serde(default = "default_plate_pattern")]
    pub plate_pattern: String,
    #[serde(default = "default_camera_channel")]
    pub camera_channel: Channel,
    #[serde(default = "default_tag_channel")]
    pub tag_channel: Channel,
    #[serde(default = "default_poll_interval_ms")]
    pub plate_poll_interval_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub tag_poll_interval_ms: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            plate_pattern: default_plate_pattern(),
            camera_channel: default_camera_channel(),
            tag_channel: default_tag_channel(),
            plate_poll_interval_ms: default_poll_interval_ms(),
            tag_poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// One letter followed by exactly three digits
pub const DEFAULT_PLATE_PATTERN: &str = "^[A-Z][0-9]{3}$";

fn default_plate_pattern() -> String {
    DEFAULT_PLATE_PATTERN.to_string()
}

fn default_camera_channel() -> Channel {
    Channel::Entry
}

fn default_tag_channel() -> Channel {
    Channel::Exit
}

fn default_poll_interval_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorsConfig {
    #[serde(default = "default_sensor_pins")]
    pub pins: Vec<u8>,
    #[serde(default = "default_sensor_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self { pins: default_sensor_pins(), poll_interval_ms: default_sensor_poll_interval_ms() }
    }
}

fn default_sensor_pins() -> Vec<u8> {
    vec![1, 7, 26, 19, 13, 6, 5, 0, 15, 18]
}

fn default_sensor_poll_interval_ms() -> u64 {
    200
}

/// Actuator wiring and position constants for one gate
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GateSettings {
    pub id: GateId,
    pub pin: u8,
    pub open_position: u32,
    pub closed_position: u32,
}

impl GateSettings {
    fn default_entry() -> Self {
        Self { id: GateId::new("entry"), pin: 20, open_position: 1750, closed_position: 750 }
    }

    fn default_exit() -> Self {
        Self { id: GateId::new("exit"), pin: 21, open_position: 700, closed_position: 1700 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatesConfig {
    #[serde(default = "default_dwell_secs")]
    pub dwell_secs: u64,
    #[serde(default = "GateSettings::default_entry")]
    pub entry: GateSettings,
    #[serde(default = "GateSettings::default_exit")]
    pub exit: GateSettings,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            dwell_secs: default_dwell_secs(),
            entry: GateSettings::default_entry(),
            exit: GateSettings::default_exit(),
        }
    }
}

fn default_dwell_secs() -> u64 {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_display_cols")]
    pub cols: usize,
    #[serde(default = "default_display_rows")]
    pub rows: usize,
    #[serde(default = "default_message_hold_ms")]
    pub message_hold_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            cols: default_display_cols(),
            rows: default_display_rows(),
            message_hold_ms: default_message_hold_ms(),
        }
    }
}

fn default_display_cols() -> usize {
    16
}

fn default_display_rows() -> usize {
    2
}

fn default_message_hold_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// File path for the access audit trail (JSONL format)
    #[serde(default = "default_audit_file")]
    pub file: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { enabled: default_audit_enabled(), file: default_audit_file() }
    }
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_file() -> String {
    "access.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub gates: GatesConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    registry_path: String,
    plate_pattern: String,
    camera_channel: Channel,
    tag_channel: Channel,
    plate_poll_interval_ms: u64,
    tag_poll_interval_ms: u64,
    sensor_pins: Vec<u8>,
    sensor_poll_interval_ms: u64,
    gate_dwell_secs: u64,
    entry_gate: GateSettings,
    exit_gate: GateSettings,
    display_cols: usize,
    display_rows: usize,
    message_hold_ms: u64,
    audit_enabled: bool,
    audit_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            site_id: toml_config.site.id,
            registry_path: toml_config.registry.path,
            plate_pattern: toml_config.recognition.plate_pattern,
            camera_channel: toml_config.recognition.camera_channel,
            tag_channel: toml_config.recognition.tag_channel,
            plate_poll_interval_ms: toml_config.recognition.plate_poll_interval_ms,
            tag_poll_interval_ms: toml_config.recognition.tag_poll_interval_ms,
            sensor_pins: toml_config.sensors.pins,
            sensor_poll_interval_ms: toml_config.sensors.poll_interval_ms,
            gate_dwell_secs: toml_config.gates.dwell_secs,
            entry_gate: toml_config.gates.entry,
            exit_gate: toml_config.gates.exit,
            display_cols: toml_config.display.cols,
            display_rows: toml_config.display.rows,
            message_hold_ms: toml_config.display.message_hold_ms,
            audit_enabled: toml_config.audit.enabled,
            audit_file: toml_config.audit.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Config path used when no --config argument is given
    pub fn default_path() -> String {
        env::var("CONFIG_FILE").unwrap_or_else(|_| "config/dev.toml".to_string())
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Gate settings for the gate tied to a channel
    pub fn gate_for(&self, channel: Channel) -> &GateSettings {
        match channel {
            Channel::Entry => &self.entry_gate,
            Channel::Exit => &self.exit_gate,
        }
    }

    /// All configured gates, deduplicated by id
    pub fn gates(&self) -> Vec<GateSettings> {
        let mut gates = vec![self.entry_gate.clone()];
        if self.exit_gate.id != self.entry_gate.id {
            gates.push(self.exit_gate.clone());
        }
        gates
    }

    // Getters for all config fields
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn registry_path(&self) -> &str {
        &self.registry_path
    }

    pub fn plate_pattern(&self) -> &str {
        &self.plate_pattern
    }

    pub fn camera_channel(&self) -> Channel {
        self.camera_channel
    }

    pub fn tag_channel(&self) -> Channel {
        self.tag_channel
    }

    pub fn plate_poll_interval_ms(&self) -> u64 {
        self.plate_poll_interval_ms
    }

    pub fn tag_poll_interval_ms(&self) -> u64 {
        self.tag_poll_interval_ms
    }

    pub fn sensor_pins(&self) -> &[u8] {
        &self.sensor_pins
    }

    pub fn sensor_poll_interval_ms(&self) -> u64 {
        self.sensor_poll_interval_ms
    }

    pub fn gate_dwell_secs(&self) -> u64 {
        self.gate_dwell_secs
    }

    pub fn display_cols(&self) -> usize {
        self.display_cols
    }

    pub fn display_rows(&self) -> usize {
        self.display_rows
    }

    pub fn message_hold_ms(&self) -> u64 {
        self.message_hold_ms
    }

    pub fn audit_enabled(&self) -> bool {
        self.audit_enabled
    }

    pub fn audit_file(&self) -> &str {
        &self.audit_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the gate dwell
    pub fn with_gate_dwell_secs(mut self, secs: u64) -> Self {
        self.gate_dwell_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.registry_path(), "parking_database.db");
        assert_eq!(config.plate_pattern(), "^[A-Z][0-9]{3}$");
        assert_eq!(config.camera_channel(), Channel::Entry);
        assert_eq!(config.tag_channel(), Channel::Exit);
        assert_eq!(config.gate_dwell_secs(), 4);
        assert_eq!(config.sensor_pins().len(), 10);
        assert_eq!(config.sensor_poll_interval_ms(), 200);
        assert_eq!(config.display_cols(), 16);
    }

    #[test]
    fn test_default_gate_positions() {
        let config = Config::default();
        let entry = config.gate_for(Channel::Entry);
        assert_eq!(entry.id, GateId::new("entry"));
        assert_eq!((entry.open_position, entry.closed_position), (1750, 750));
        let exit = config.gate_for(Channel::Exit);
        assert_eq!((exit.open_position, exit.closed_position), (700, 1700));
        assert_eq!(config.gates().len(), 2);
    }

    #[test]
    fn test_shared_gate_listed_once() {
        let mut toml_config = TomlConfig::default();
        toml_config.gates.exit.id = GateId::new("entry");
        let config = Config::from_toml(toml_config, "test".to_string());
        assert_eq!(config.gates().len(), 1);
    }
}
