//! Record/database configuration loading.
//!
//! The static database is described in TOML and deserialized into
//! [`DatabaseConfig`] before the engine starts; a validation pass
//! rejects unresolvable links and inconsistent scan settings. All
//! threshold, deadband, hysteresis, and link fields are populated here
//! before first processing.
//!
//! # TOML Example
//!
//! ```toml
//! [[records]]
//! name = "temp:inlet"
//! device = "soft_channel"
//! scan = "periodic"
//! period_s = 0.5
//! hihi = { threshold = 100.0, severity = "major" }
//! high = { threshold = 90.0, severity = "minor" }
//! hyst = 5.0
//! mdel = 0.5
//! flnk = "temp:inlet:calc"
//! ```

use crate::alarm::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parsing failed.
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    /// Semantic validation failed.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Transfer direction of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Value is read from the device into the record.
    #[default]
    Input,
    /// Value is written from the record to the device.
    Output,
}

/// Scan mechanism for one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Processed only when triggered (forward link, callback, put).
    #[default]
    Passive,
    /// Processed at a fixed period by a scan thread.
    Periodic,
    /// Processed when the device signals an interrupt.
    IoInterrupt,
}

/// Simulation mode selector (SIMM).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimMode {
    /// Real device I/O.
    #[default]
    No,
    /// Redirect I/O through the simulation source, engineering units.
    Yes,
    /// Redirect I/O through the simulation source into the raw value.
    Raw,
}

/// Change-detection strategy used by the monitor publisher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorPolicy {
    /// Scalar deadband comparison against the last published value.
    #[default]
    Deadband,
    /// Hash the array payload; publish only when the hash changes.
    ContentHash,
}

/// Raw→engineering conversion applied after a device read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conversion {
    /// Raw value used as-is.
    #[default]
    None,
    /// `value = raw * eslo + eoff`, slope computed by device support.
    Linear,
    /// `value = raw * eslo + eoff`, slope taken from configuration.
    Slope,
}

/// Callback priority for deferred processing, ordered low to high.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// One alarm band: threshold plus the severity it raises.
///
/// A band with `NoAlarm` severity is disabled regardless of threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AlarmBand {
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub severity: Severity,
}

fn default_invalid() -> Severity {
    Severity::Invalid
}

fn default_eslo() -> f64 {
    1.0
}

fn default_sim_delay() -> f64 {
    -1.0
}

/// Static configuration of one record instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordConfig {
    /// Unique record name.
    pub name: String,

    /// Transfer direction.
    #[serde(default)]
    pub direction: Direction,

    /// Name of the registered device support to bind.
    pub device: String,

    /// Scan mechanism.
    #[serde(default)]
    pub scan: ScanMode,

    /// Scan period in seconds (periodic scan only).
    #[serde(default)]
    pub period_s: f64,

    /// Callback priority for deferred processing.
    #[serde(default)]
    pub priority: Priority,

    // ── Alarm configuration ──
    #[serde(default)]
    pub hihi: AlarmBand,
    #[serde(default)]
    pub high: AlarmBand,
    #[serde(default)]
    pub low: AlarmBand,
    #[serde(default)]
    pub lolo: AlarmBand,

    /// Severity of the undefined-value alarm.
    #[serde(default = "default_invalid")]
    pub udf_severity: Severity,

    /// Alarm hysteresis margin around each threshold.
    #[serde(default)]
    pub hyst: f64,

    /// Alarm-level filter time constant in seconds (0 disables).
    #[serde(default)]
    pub aftc: f64,

    // ── Conversion / smoothing ──
    #[serde(default)]
    pub conversion: Conversion,
    #[serde(default = "default_eslo")]
    pub eslo: f64,
    #[serde(default)]
    pub eoff: f64,

    /// Value smoothing coefficient in [0, 1); 0 disables.
    #[serde(default)]
    pub smoo: f64,

    // ── Monitor configuration ──
    #[serde(default)]
    pub monitor: MonitorPolicy,

    /// Monitor deadband; negative always fires.
    #[serde(default)]
    pub mdel: f64,

    /// Archive deadband; negative always fires.
    #[serde(default)]
    pub adel: f64,

    // ── Simulation configuration ──
    #[serde(default)]
    pub simm: SimMode,

    /// Simulation value used when no simulation source record is set.
    #[serde(default)]
    pub sim_value: f64,

    /// Name of the record supplying simulated values.
    #[serde(default)]
    pub sim_source: Option<String>,

    /// Simulation processing delay in seconds; negative is synchronous.
    #[serde(default = "default_sim_delay")]
    pub sim_delay_s: f64,

    /// Severity of the simulation-mode alarm.
    #[serde(default)]
    pub sim_severity: Severity,

    /// Forward link: record processed after this one completes.
    #[serde(default)]
    pub flnk: Option<String>,
}

/// The whole static database: every record instance to construct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub records: Vec<RecordConfig>,
}

impl DatabaseConfig {
    /// Load and parse a TOML database file. Does not validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation: unique names, resolvable links, consistent
    /// scan settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut names: HashSet<&str> = HashSet::new();
        for rc in &self.records {
            if !names.insert(&rc.name) {
                return Err(ConfigError::Validation(format!(
                    "duplicate record name '{}'",
                    rc.name
                )));
            }
        }
        for rc in &self.records {
            // `!(x > 0.0)` also rejects NaN, which `x <= 0.0` lets through.
            if rc.scan == ScanMode::Periodic && !(rc.period_s > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "record '{}': periodic scan requires period_s > 0",
                    rc.name
                )));
            }
            if let Some(target) = &rc.flnk {
                if !names.contains(target.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "record '{}': forward link target '{}' does not exist",
                        rc.name, target
                    )));
                }
            }
            if let Some(source) = &rc.sim_source {
                if source == &rc.name {
                    return Err(ConfigError::Validation(format!(
                        "record '{}': simulation source must be a different record",
                        rc.name
                    )));
                }
                if !names.contains(source.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "record '{}': simulation source '{}' does not exist",
                        rc.name, source
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(text: &str) -> DatabaseConfig {
        toml::from_str(text).expect("parse")
    }

    #[test]
    fn minimal_record_takes_defaults() {
        let cfg = parse(
            r#"
            [[records]]
            name = "pv:a"
            device = "soft_channel"
            "#,
        );
        let rc = &cfg.records[0];
        assert_eq!(rc.direction, Direction::Input);
        assert_eq!(rc.scan, ScanMode::Passive);
        assert_eq!(rc.udf_severity, Severity::Invalid);
        assert_eq!(rc.eslo, 1.0);
        assert_eq!(rc.sim_delay_s, -1.0);
        assert_eq!(rc.simm, SimMode::No);
        assert_eq!(rc.monitor, MonitorPolicy::Deadband);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn full_record_parses() {
        let cfg = parse(
            r#"
            [[records]]
            name = "temp:inlet"
            device = "soft_channel"
            scan = "periodic"
            period_s = 0.5
            hihi = { threshold = 100.0, severity = "major" }
            high = { threshold = 90.0, severity = "minor" }
            hyst = 5.0
            aftc = 2.0
            mdel = 0.5
            simm = "yes"
            sim_delay_s = 0.1
            sim_severity = "minor"
            flnk = "temp:calc"

            [[records]]
            name = "temp:calc"
            device = "soft_channel"
            "#,
        );
        assert!(cfg.validate().is_ok());
        let rc = &cfg.records[0];
        assert_eq!(rc.hihi.threshold, 100.0);
        assert_eq!(rc.hihi.severity, Severity::Major);
        assert_eq!(rc.simm, SimMode::Yes);
        assert_eq!(rc.flnk.as_deref(), Some("temp:calc"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let cfg = parse(
            r#"
            [[records]]
            name = "pv:a"
            device = "d"
            [[records]]
            name = "pv:a"
            device = "d"
            "#,
        );
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn dangling_forward_link_rejected() {
        let cfg = parse(
            r#"
            [[records]]
            name = "pv:a"
            device = "d"
            flnk = "pv:missing"
            "#,
        );
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn self_referential_sim_source_rejected() {
        let cfg = parse(
            r#"
            [[records]]
            name = "pv:a"
            device = "d"
            sim_source = "pv:a"
            "#,
        );
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn nan_period_rejected() {
        let cfg = parse(
            r#"
            [[records]]
            name = "pv:a"
            device = "d"
            scan = "periodic"
            period_s = nan
            "#,
        );
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn periodic_without_period_rejected() {
        let cfg = parse(
            r#"
            [[records]]
            name = "pv:a"
            device = "d"
            scan = "periodic"
            "#,
        );
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "[[records]]\nname = \"pv:a\"\ndevice = \"soft_channel\""
        )
        .expect("write");
        let cfg = DatabaseConfig::load(file.path()).expect("load");
        assert_eq!(cfg.records.len(), 1);
    }

    #[test]
    fn load_missing_file_errors() {
        let err = DatabaseConfig::load(Path::new("/nonexistent/db.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
