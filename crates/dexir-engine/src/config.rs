//! Codec configuration (dexir.toml)
//!
//! Limits the encoder enforces. Every field is optional in the file; missing
//! fields take the format maximum.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Encoder limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Registers per method
    pub max_registers: u32,
    /// Raw instructions per method
    pub max_instructions_per_method: u32,
    /// Registers passed to one invoke
    pub max_invoke_arguments: u32,
    /// String pool entries
    pub max_strings: u32,
    /// Type pool entries
    pub max_types: u32,
    /// Field reference pool entries
    pub max_field_refs: u32,
    /// Method reference pool entries
    pub max_method_refs: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_registers: u16::MAX as u32,
            max_instructions_per_method: u16::MAX as u32,
            max_invoke_arguments: u8::MAX as u32,
            max_strings: u32::MAX,
            max_types: u16::MAX as u32,
            max_field_refs: u16::MAX as u32,
            max_method_refs: u16::MAX as u32,
        }
    }
}

impl CodecConfig {
    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CodecConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check limits against what the image format can express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_registers > u16::MAX as u32 {
            return Err(ConfigError::Invalid(format!(
                "max_registers {} exceeds the register field width ({})",
                self.max_registers,
                u16::MAX
            )));
        }
        if self.max_invoke_arguments > u8::MAX as u32 {
            return Err(ConfigError::Invalid(format!(
                "max_invoke_arguments {} exceeds the argument count width ({})",
                self.max_invoke_arguments,
                u8::MAX
            )));
        }
        let minimums = [
            ("max_registers", self.max_registers),
            ("max_instructions_per_method", self.max_instructions_per_method),
        ];
        for (name, value) in minimums {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}
