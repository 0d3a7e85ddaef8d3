//! Configuration system for softquad

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, SoftquadError};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub exec: ExecConfig,
    pub sampler: SamplerConfig,
    pub compute: ComputeConfig,
    pub debug: DebugConfig,
}

/// Execution machine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Upper bound on ENDLOOP back-edges taken within one run
    pub max_loop_iterations: u32,
    /// Evaluate COLOR-interpolated fragment inputs as constants
    pub flatshade_color: bool,
    /// Emit a trace event for every executed instruction
    pub trace_execution: bool,
}

/// Texture sampler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Anisotropy requested by sampler states is clamped to this value
    pub max_anisotropy_cap: f32,
    pub seamless_cube_default: bool,
}

/// Compute grid dispatch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    /// Upper bound on barrier resume rounds per workgroup
    pub max_barrier_rounds: u32,
}

/// Debug settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
    pub log_to_file: bool,
    pub log_path: PathBuf,
}

/// Logging level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 65536,
            flatshade_color: false,
            trace_execution: false,
        }
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_anisotropy_cap: 16.0,
            seamless_cube_default: false,
        }
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            max_barrier_rounds: 1 << 20,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_to_file: false,
            log_path: PathBuf::from("softquad.log"),
        }
    }
}

impl Config {
    /// Load configuration from file, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Self::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| SoftquadError::Config(e.to_string()))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| SoftquadError::Config(e.to_string()))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("softquad")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.exec.max_loop_iterations, 65536);
        assert!(!config.exec.flatshade_color);
        assert!(!config.exec.trace_execution);
        assert_eq!(config.sampler.max_anisotropy_cap, 16.0);
        assert_eq!(config.debug.log_level, LogLevel::Info);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(
            parsed.exec.max_loop_iterations,
            config.exec.max_loop_iterations
        );
        assert_eq!(
            parsed.compute.max_barrier_rounds,
            config.compute.max_barrier_rounds
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("[exec]\nflatshade_color = true\n").unwrap();
        assert!(parsed.exec.flatshade_color);
        assert_eq!(parsed.exec.max_loop_iterations, 65536);
        assert_eq!(parsed.debug.log_level, LogLevel::Info);
    }
}
