//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::env;

/// Switches that change how strictly a lens is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Fail on multi-element arrays in Head instead of keeping the first element
    pub strict_arity: bool,
    /// Validate the input document against the input schema
    pub validate_input: bool,
    /// Validate the output document against the projected schema
    pub validate_output: bool,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads `LENS_STRICT_ARITY`, `LENS_VALIDATE_INPUT` and
    /// `LENS_VALIDATE_OUTPUT`. Unset variables keep the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &'static str| -> Result<bool, ConfigError> {
            match lookup(name) {
                None => Ok(false),
                Some(value) => parse_flag(name, &value),
            }
        };

        Ok(Self {
            strict_arity: flag("LENS_STRICT_ARITY")?,
            validate_input: flag("LENS_VALIDATE_INPUT")?,
            validate_output: flag("LENS_VALIDATE_OUTPUT")?,
        })
    }

    pub fn strict(mut self) -> Self {
        self.strict_arity = true;
        self
    }

    pub fn validated(mut self) -> Self {
        self.validate_input = true;
        self.validate_output = true;
        self
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            name,
            value: value.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {name} value '{value}': expected true or false")]
    InvalidFlag { name: &'static str, value: String },
}
