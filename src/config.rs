//! Driver configuration.
//!
//! A small TOML-loadable options table for the CLI. Everything here has a
//! sensible default; a config file only needs the keys it changes:
//!
//! ```toml
//! max-errors = 20
//! dump-syntax = true
//! ```

use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CompilerConfig {
    /// Cap on the number of diagnostics echoed to stderr. Collection and
    /// counting always continue past the cap.
    #[serde(default)]
    pub max_errors: Option<usize>,

    /// Print the parsed datums (indented) before the AST dump.
    #[serde(default)]
    pub dump_syntax: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse config: {}", e))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config '{}': {}", path.display(), e))?;
        Self::from_toml(&content)
    }
}
