//! Configuration loading and typed config structures for the Lightcone simulation.
//!
//! The canonical configuration lives in `lightcone-config.yaml` at the
//! project root. Every field has a default, so an empty file (or no file)
//! yields a runnable configuration. Loading always validates.

use std::path::Path;

use lightcone_types::UniverseSettings;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
///
/// Mirrors the structure of `lightcone-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Grid, light speed, grouping, and retention parameters.
    #[serde(default)]
    pub universe: UniverseSettings,

    /// Run length, seeding, and population.
    #[serde(default)]
    pub run: RunConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load and validate configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let u = &self.universe;
        for (field, dim) in [
            ("universe.x_dim", u.x_dim),
            ("universe.y_dim", u.y_dim),
            ("universe.z_dim", u.z_dim),
        ] {
            if dim <= 0 {
                return Err(invalid(field, format!("must be positive, got {dim}")));
            }
        }
        if !(u.speed_of_light.is_finite() && u.speed_of_light > 0.0) {
            return Err(invalid(
                "universe.speed_of_light",
                format!("must be positive and finite, got {}", u.speed_of_light),
            ));
        }
        if !(u.group_edge_length.is_finite() && u.group_edge_length > 0.0) {
            return Err(invalid(
                "universe.group_edge_length",
                format!("must be positive and finite, got {}", u.group_edge_length),
            ));
        }
        if u.afterimage_duration < 0 {
            return Err(invalid(
                "universe.afterimage_duration",
                format!("must not be negative, got {}", u.afterimage_duration),
            ));
        }
        if u.coordinate_history_length < 0 {
            return Err(invalid(
                "universe.coordinate_history_length",
                format!("must not be negative, got {}", u.coordinate_history_length),
            ));
        }
        if !(0.0..=1.0).contains(&self.run.max_speed) {
            return Err(invalid(
                "run.max_speed",
                format!("must be within 0..=1, got {}", self.run.max_speed),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

/// Run-level configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunConfig {
    /// Number of ticks to simulate.
    #[serde(default = "default_ticks")]
    pub ticks: u32,

    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of agents spawned at start.
    #[serde(default = "default_agent_count")]
    pub agent_count: u32,

    /// Fastest spawn speed, as a fraction of the speed of light.
    #[serde(default = "default_max_speed")]
    pub max_speed: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ticks: default_ticks(),
            seed: default_seed(),
            agent_count: default_agent_count(),
            max_speed: default_max_speed(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error). `RUST_LOG`
    /// overrides it.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

const fn default_ticks() -> u32 {
    32
}

const fn default_seed() -> u64 {
    42
}

const fn default_agent_count() -> u32 {
    12
}

const fn default_max_speed() -> f64 {
    0.5
}

fn default_log_level() -> String {
    "info".to_owned()
}
