//=========================================================================
// Framework Configuration
//=========================================================================
//
// Diagnostics and bootstrap switches shared by every scope.
//
// The config is registered as a service in the project scope, so scene
// scopes and connectors resolve it through parent delegation.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::path::Path;

use log::{Level, LevelFilter};
use serde::{Deserialize, Serialize};

//=== Internal Dependencies ===============================================

use crate::error::ConfigError;

//=== LogLevel ============================================================

/// Minimum severity for the optional framework diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

//=== FrameworkConfig =====================================================

/// Framework-wide switches, loadable from TOML.
///
/// # Example
///
/// ```toml
/// min_level = "debug"
/// log_connector_execute = true
/// log_tick_calls = true
/// log_ticks_only_for = "Hero"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Master switch for the optional diagnostics below.
    pub enable_logs: bool,

    /// Diagnostics above this level are suppressed.
    pub min_level: LogLevel,

    /// Log scope bootstrap (project context, scene execute/unload).
    pub log_boot_sequence: bool,

    /// Log every connector `execute`.
    pub log_connector_execute: bool,

    /// Log every node phase call (bind, construct, init...).
    pub log_node_phases: bool,

    /// Log every per-frame connector dispatch.
    pub log_tick_calls: bool,

    /// Restricts tick logging to connectors with this name.
    pub log_ticks_only_for: Option<String>,

    /// Register active connectors that were not declared static when a
    /// scene executes.
    pub auto_register_unbaked_connectors: bool,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            enable_logs: true,
            min_level: LogLevel::Warn,
            log_boot_sequence: false,
            log_connector_execute: false,
            log_node_phases: false,
            log_tick_calls: false,
            log_ticks_only_for: None,
            auto_register_unbaked_connectors: true,
        }
    }
}

impl FrameworkConfig {
    //--- Loading ----------------------------------------------------------

    /// Parses a config from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reads and parses a TOML config file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    //--- Gates ------------------------------------------------------------

    pub fn allows(&self, level: Level) -> bool {
        self.enable_logs && level <= self.min_level.to_level_filter()
    }

    pub fn should_log_boot(&self) -> bool {
        self.log_boot_sequence && self.allows(Level::Info)
    }

    pub fn should_log_connector_execute(&self) -> bool {
        self.log_connector_execute && self.allows(Level::Info)
    }

    pub fn should_log_node_phases(&self) -> bool {
        self.log_node_phases && self.allows(Level::Debug)
    }

    /// Whether a dispatch on the named connector should be traced.
    pub fn should_log_tick(&self, connector_name: &str) -> bool {
        if !self.log_tick_calls || !self.allows(Level::Trace) {
            return false;
        }

        match self.log_ticks_only_for.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(filter) => filter == connector_name,
        }
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_diagnostics_quiet() {
        let config = FrameworkConfig::default();
        assert!(config.enable_logs);
        assert!(config.auto_register_unbaked_connectors);
        assert!(!config.should_log_boot());
        assert!(!config.should_log_tick("Hero"));
        assert!(config.allows(Level::Warn));
        assert!(!config.allows(Level::Info));
    }

    #[test]
    fn parses_partial_toml() {
        let config = FrameworkConfig::from_toml_str(
            r#"
            min_level = "trace"
            log_tick_calls = true
            log_ticks_only_for = "Hero"
            auto_register_unbaked_connectors = false
            "#,
        )
        .unwrap();

        assert_eq!(config.min_level, LogLevel::Trace);
        assert!(!config.auto_register_unbaked_connectors);
        assert!(config.should_log_tick("Hero"));
        assert!(!config.should_log_tick("Enemy"));
        assert!(!config.log_node_phases);
    }

    #[test]
    fn empty_tick_filter_matches_everything() {
        let config = FrameworkConfig {
            min_level: LogLevel::Trace,
            log_tick_calls: true,
            log_ticks_only_for: Some("  ".to_string()),
            ..FrameworkConfig::default()
        };
        assert!(config.should_log_tick("Anything"));
    }

    #[test]
    fn master_switch_disables_every_gate() {
        let config = FrameworkConfig {
            enable_logs: false,
            min_level: LogLevel::Trace,
            log_boot_sequence: true,
            log_node_phases: true,
            ..FrameworkConfig::default()
        };
        assert!(!config.should_log_boot());
        assert!(!config.should_log_node_phases());
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = FrameworkConfig::from_toml_str("min_level = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = FrameworkConfig::load_from_file("definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
