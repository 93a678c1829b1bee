//! Engine configuration
//!
//! Settings come from a JSON file and can be overridden from the environment:
//! - `QUANTA_CONFIG`: path of a JSON config file
//! - `QUANTA_DEFINITIONS`: path of a quantity/unit definition document
//! - `QUANTA_DIAGNOSTICS`: `1`/`true` turns on NaN/Infinity reporting

use crate::{QuantaError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default bound on affine steps applied by a single conversion
pub const DEFAULT_MAX_CONVERSION_STEPS: usize = 10_000;

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Definition document to load instead of the built-in quantities
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definitions_path: Option<PathBuf>,

    /// Synthesize derived quantities for unseen dimensions while parsing
    pub jit_registration: bool,

    /// Upper bound on affine steps per conversion
    pub max_conversion_steps: usize,

    /// Report NaN/Infinity results of quantity arithmetic
    pub diagnostics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            definitions_path: None,
            jit_registration: true,
            max_conversion_steps: DEFAULT_MAX_CONVERSION_STEPS,
            diagnostics: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(text)
            .map_err(|e| QuantaError::Config(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| QuantaError::Config(format!("cannot read '{}': {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// Load from `QUANTA_CONFIG` (if set), then apply environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var("QUANTA_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(path) = env::var("QUANTA_DEFINITIONS") {
            config.definitions_path = Some(PathBuf::from(path));
        }
        if let Ok(flag) = env::var("QUANTA_DIAGNOSTICS") {
            config.diagnostics = parse_flag(&flag)?;
        }

        tracing::debug!(?config, "engine configuration loaded");
        Ok(config)
    }

    pub fn with_definitions(mut self, path: impl Into<PathBuf>) -> Self {
        self.definitions_path = Some(path.into());
        self
    }

    pub fn with_jit_registration(mut self, enabled: bool) -> Self {
        self.jit_registration = enabled;
        self
    }

    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    pub fn with_max_conversion_steps(mut self, steps: usize) -> Self {
        self.max_conversion_steps = steps;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_conversion_steps == 0 {
            return Err(QuantaError::Config(
                "max_conversion_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(QuantaError::Config(format!("invalid boolean flag: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.jit_registration);
        assert!(!config.diagnostics);
        assert_eq!(config.max_conversion_steps, 10_000);
        assert!(config.definitions_path.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{ "diagnostics": true }"#).unwrap();
        assert!(config.diagnostics);
        assert!(config.jit_registration);
        assert_eq!(config.max_conversion_steps, DEFAULT_MAX_CONVERSION_STEPS);
    }

    #[test]
    fn test_rejects_zero_steps() {
        let err = EngineConfig::from_json_str(r#"{ "max_conversion_steps": 0 }"#).unwrap_err();
        assert_eq!(err.code(), crate::codes::CONFIG);
    }

    #[test]
    fn test_rejects_bad_json() {
        assert!(EngineConfig::from_json_str("{ nope").is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE").unwrap());
        assert!(parse_flag("1").unwrap());
        assert!(!parse_flag("off").unwrap());
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_jit_registration(false)
            .with_diagnostics(true)
            .with_max_conversion_steps(5)
            .with_definitions("/tmp/units.json");
        assert!(!config.jit_registration);
        assert!(config.diagnostics);
        assert_eq!(config.max_conversion_steps, 5);
        assert_eq!(config.definitions_path, Some(PathBuf::from("/tmp/units.json")));
    }
}
