//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field is optional; missing values fall back to the
//! defaults below.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{GroundLinkError, Result};
use crate::link::arming::ArmingTiming;
use crate::link::session::{LinkConfig, LinkTiming, Phrase};
use crate::wire::protocol::{Direction, Mode};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub link: LinkSettings,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub secondary: SecondaryConfig,
    #[serde(default)]
    pub testing: TestingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Optional second radio module, disabled while the primary is in testing
#[derive(Debug, Deserialize, Clone)]
pub struct SecondaryConfig {
    /// Empty runs without a secondary link
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default)]
    pub link: LinkSettings,
}

/// Radio link settings pushed to the module
#[derive(Debug, Deserialize, Clone)]
pub struct LinkSettings {
    #[serde(default)]
    pub direction: Direction,

    #[serde(default)]
    pub mode: Mode,

    #[serde(default)]
    pub tx_power: u8,

    /// Empty keeps the link disabled
    #[serde(default)]
    pub link_phrase: String,

    /// Empty disables the arming passcode
    #[serde(default)]
    pub testing_phrase: String,
}

/// Tick rate and link command delays
#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: u32,

    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,

    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_mode_revert_ms")]
    pub mode_revert_ms: u64,

    #[serde(default = "default_trigger_release_ms")]
    pub trigger_release_ms: u64,
}

/// Arming protocol windows
#[derive(Debug, Deserialize, Clone)]
pub struct TestingConfig {
    #[serde(default = "default_freshness_ms")]
    pub freshness_ms: u64,

    #[serde(default = "default_sample_freshness_ms")]
    pub sample_freshness_ms: u64,

    #[serde(default = "default_arm_debounce")]
    pub arm_debounce: u32,

    #[serde(default = "default_arm_timeout_ms")]
    pub arm_timeout_ms: u64,

    #[serde(default = "default_armed_liveness_ms")]
    pub armed_liveness_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rotated log files; console only when empty
    #[serde(default)]
    pub directory: String,

    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115_200 }

fn default_tick_rate_hz() -> u32 { 100 }
fn default_step_delay_ms() -> u64 { 100 }
fn default_settle_ms() -> u64 { 50 }
fn default_mode_revert_ms() -> u64 { 1000 }
fn default_trigger_release_ms() -> u64 { 1000 }

fn default_freshness_ms() -> u64 { 1000 }
fn default_sample_freshness_ms() -> u64 { 200 }
fn default_arm_debounce() -> u32 { 6 }
fn default_arm_timeout_ms() -> u64 { 10_000 }
fn default_armed_liveness_ms() -> u64 { 1000 }

fn default_log_level() -> String { "info".to_string() }
fn default_report_interval_ms() -> u64 { 1000 }

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            link: LinkSettings::default(),
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            direction: Direction::default(),
            mode: Mode::default(),
            tx_power: 0,
            link_phrase: String::new(),
            testing_phrase: String::new(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate_hz(),
            step_delay_ms: default_step_delay_ms(),
            settle_ms: default_settle_ms(),
            mode_revert_ms: default_mode_revert_ms(),
            trigger_release_ms: default_trigger_release_ms(),
        }
    }
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            freshness_ms: default_freshness_ms(),
            sample_freshness_ms: default_sample_freshness_ms(),
            arm_debounce: default_arm_debounce(),
            arm_timeout_ms: default_arm_timeout_ms(),
            armed_liveness_ms: default_armed_liveness_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            report_interval_ms: default_report_interval_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ground_link::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return invalid("serial port cannot be empty");
        }

        if self.serial.baud_rate == 0 {
            return invalid("baud_rate must be greater than 0");
        }

        // Phrases are sent zero padded to 8 bytes
        Phrase::new(&self.link.link_phrase)?;
        Phrase::new(&self.link.testing_phrase)?;

        if self.has_secondary() {
            if self.secondary.port == self.serial.port {
                return invalid("secondary port must differ from the primary port");
            }

            if self.secondary.baud_rate == 0 {
                return invalid("secondary baud_rate must be greater than 0");
            }

            Phrase::new(&self.secondary.link.link_phrase)?;
            Phrase::new(&self.secondary.link.testing_phrase)?;
        }

        if self.timing.tick_rate_hz == 0 || self.timing.tick_rate_hz > 1000 {
            return invalid("tick_rate_hz must be between 1 and 1000");
        }

        if self.timing.step_delay_ms == 0 || self.timing.step_delay_ms > 10000 {
            return invalid("step_delay_ms must be between 1 and 10000");
        }

        if self.timing.settle_ms > 10000 {
            return invalid("settle_ms must be at most 10000");
        }

        if self.timing.mode_revert_ms > 60000 {
            return invalid("mode_revert_ms must be at most 60000");
        }

        if self.timing.trigger_release_ms == 0 || self.timing.trigger_release_ms > 60000 {
            return invalid("trigger_release_ms must be between 1 and 60000");
        }

        if self.testing.freshness_ms == 0 {
            return invalid("freshness_ms must be greater than 0");
        }

        if self.testing.sample_freshness_ms == 0
            || self.testing.sample_freshness_ms > self.testing.freshness_ms
        {
            return invalid("sample_freshness_ms must be between 1 and freshness_ms");
        }

        if self.testing.arm_debounce == 0 {
            return invalid("arm_debounce must be greater than 0");
        }

        if self.testing.arm_timeout_ms == 0 || self.testing.arm_timeout_ms > 600_000 {
            return invalid("arm_timeout_ms must be between 1 and 600000");
        }

        // Once armed the remote must report more often than it had to while arming
        if self.testing.armed_liveness_ms == 0
            || self.testing.armed_liveness_ms >= self.testing.arm_timeout_ms
        {
            return invalid("armed_liveness_ms must be greater than 0 and less than arm_timeout_ms");
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return invalid("logging level must be one of trace, debug, info, warn, error");
        }

        if self.logging.report_interval_ms == 0 || self.logging.report_interval_ms > 60000 {
            return invalid("report_interval_ms must be between 1 and 60000");
        }

        Ok(())
    }

    /// Link settings for a [`crate::link::LinkSession`]
    ///
    /// # Errors
    ///
    /// Returns error if a phrase is longer than 8 bytes
    pub fn link_config(&self) -> Result<LinkConfig> {
        settings_to_link(&self.link)
    }

    /// Link settings for the secondary module, if one is configured
    pub fn secondary_link_config(&self) -> Result<Option<LinkConfig>> {
        if !self.has_secondary() {
            return Ok(None);
        }
        settings_to_link(&self.secondary.link).map(Some)
    }

    pub fn has_secondary(&self) -> bool {
        !self.secondary.port.is_empty()
    }

    pub fn link_timing(&self) -> LinkTiming {
        LinkTiming {
            step_delay_ms: self.timing.step_delay_ms,
            settle_ms: self.timing.settle_ms,
            mode_revert_ms: self.timing.mode_revert_ms,
            trigger_release_ms: self.timing.trigger_release_ms,
        }
    }

    pub fn arming_timing(&self) -> ArmingTiming {
        ArmingTiming {
            freshness_ms: self.testing.freshness_ms,
            sample_freshness_ms: self.testing.sample_freshness_ms,
            arm_debounce: self.testing.arm_debounce,
            arm_timeout_ms: self.testing.arm_timeout_ms,
            armed_liveness_ms: self.testing.armed_liveness_ms,
        }
    }

    /// Tick period derived from `tick_rate_hz`
    pub fn tick_period_ms(&self) -> u64 {
        (1000 / self.timing.tick_rate_hz.max(1)).max(1) as u64
    }
}

fn settings_to_link(settings: &LinkSettings) -> Result<LinkConfig> {
    Ok(LinkConfig {
        direction: settings.direction,
        mode: settings.mode,
        tx_power: settings.tx_power,
        link_phrase: Phrase::new(&settings.link_phrase)?,
        testing_phrase: Phrase::new(&settings.testing_phrase)?,
    })
}

fn invalid(message: &str) -> Result<()> {
    Err(GroundLinkError::Config(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.timing.tick_rate_hz, 100);
        assert_eq!(config.tick_period_ms(), 10);
    }

    #[test]
    fn test_defaults_match_session_defaults() {
        let config = Config::default();
        assert_eq!(config.link_timing(), LinkTiming::default());
        assert_eq!(config.arming_timing(), ArmingTiming::default());
        assert_eq!(config.link_config().unwrap(), LinkConfig::default());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyUSB1"

[link]
direction = "transmitter"
mode = "bidirectional"
tx_power = 3
link_phrase = "rocket"
testing_phrase = "boom"

[testing]
arm_debounce = 4
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.testing.arm_debounce, 4);
        assert_eq!(config.testing.arm_timeout_ms, 10_000);

        let link = config.link_config().unwrap();
        assert_eq!(link.direction, Direction::Transmitter);
        assert_eq!(link.mode, Mode::Bidirectional);
        assert_eq!(link.tx_power, 3);
        assert_eq!(link.link_phrase, Phrase::new("rocket").unwrap());
    }

    #[test]
    fn test_secondary_link_from_file() {
        let toml_content = r#"
[secondary]
port = "/dev/ttyUSB1"

[secondary.link]
direction = "transmitter"
link_phrase = "backup"
"#;

        let config = Config::from_toml(toml_content).unwrap();
        assert!(config.has_secondary());
        assert_eq!(config.secondary.baud_rate, 115_200);

        let link = config.secondary_link_config().unwrap().unwrap();
        assert_eq!(link.direction, Direction::Transmitter);
        assert_eq!(link.link_phrase, Phrase::new("backup").unwrap());
    }

    #[test]
    fn test_no_secondary_by_default() {
        let config = Config::default();
        assert!(!config.has_secondary());
        assert_eq!(config.secondary_link_config().unwrap(), None);
    }

    #[test]
    fn test_secondary_on_primary_port() {
        let mut config = Config::default();
        config.secondary.port = config.serial.port.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secondary_phrase_too_long() {
        let mut config = Config::default();
        config.secondary.port = "/dev/ttyUSB1".to_string();
        config.secondary.link.link_phrase = "ninechars".to_string();
        assert!(config.validate().is_err());

        // Ignored without a secondary port
        config.secondary.port = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert!(config.link.link_phrase.is_empty());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/ground-link.toml");
        assert!(matches!(result, Err(GroundLinkError::Io(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_toml("[serial\nport = ");
        assert!(matches!(result, Err(GroundLinkError::ConfigParse(_))));
    }

    #[test]
    fn test_unknown_direction() {
        let result = Config::from_toml("[link]\ndirection = \"sideways\"\n");
        assert!(matches!(result, Err(GroundLinkError::ConfigParse(_))));
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = Config::default();
        config.serial.port = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_baud_rate_zero() {
        let mut config = Config::default();
        config.serial.baud_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_link_phrase_too_long() {
        let mut config = Config::default();
        config.link.link_phrase = "ninechars".to_string();
        assert!(matches!(config.validate(), Err(GroundLinkError::Config(_))));
        assert!(config.link_config().is_err());
    }

    #[test]
    fn test_testing_phrase_max_length() {
        let mut config = Config::default();
        config.link.testing_phrase = "eightchr".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tick_rate_zero() {
        let mut config = Config::default();
        config.timing.tick_rate_hz = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_rate_too_high() {
        let mut config = Config::default();
        config.timing.tick_rate_hz = 5000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_step_delay_zero() {
        let mut config = Config::default();
        config.timing.step_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trigger_release_zero() {
        let mut config = Config::default();
        config.timing.trigger_release_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_freshness_above_freshness() {
        let mut config = Config::default();
        config.testing.sample_freshness_ms = 2000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_arm_debounce_zero() {
        let mut config = Config::default();
        config.testing.arm_debounce = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_armed_liveness_not_below_arm_timeout() {
        let mut config = Config::default();
        config.testing.armed_liveness_ms = config.testing.arm_timeout_ms;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_case_insensitive() {
        let mut config = Config::default();
        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_report_interval_zero() {
        let mut config = Config::default();
        config.logging.report_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_arming_timing_from_config() {
        let mut config = Config::default();
        config.testing.arm_debounce = 3;
        config.testing.arm_timeout_ms = 5000;
        let timing = config.arming_timing();
        assert_eq!(timing.arm_debounce, 3);
        assert_eq!(timing.arm_timeout_ms, 5000);
    }
}
