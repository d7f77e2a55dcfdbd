//! Session settings for window building.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::DisasmError;

/// x86 assembly flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Syntax {
    /// Intel syntax (default)
    #[default]
    Intel,
    /// AT&T syntax
    Att,
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Syntax::Intel => write!(f, "intel"),
            Syntax::Att => write!(f, "att"),
        }
    }
}

impl FromStr for Syntax {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "intel" => Ok(Syntax::Intel),
            "att" | "at&t" => Ok(Syntax::Att),
            _ => Err(format!("Unknown syntax: {}", s)),
        }
    }
}

/// Settings that shape how windows are built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Predict branches by emulating from the live processor state
    pub emulate: bool,
    /// x86 flavour passed to the decoder
    pub syntax: Syntax,
    /// Radius used when the caller does not pass one
    pub context_lines: usize,
    /// Show already-executed instructions above the current one
    pub show_previous: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            emulate: true,
            syntax: Syntax::Intel,
            context_lines: 5,
            show_previous: true,
        }
    }
}

impl Settings {
    /// Parse settings from a JSON document; missing keys take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, DisasmError> {
        let settings: Settings = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DisasmError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    fn validate(&self) -> Result<(), DisasmError> {
        if self.context_lines == 0 {
            return Err(DisasmError::Config(
                "context_lines must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
