//! Builder configuration
//!
//! Flags that select which runtime checks and bookkeeping the flow graph
//! builder emits. Configuration files use RON:
//!
//! ```text
//! (
//!     checked_mode: true,
//!     enable_asserts: true,
//!     track_context_levels: true,
//! )
//! ```
//!
//! Missing keys fall back to [`BuilderConfig::default`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

/// Flow graph builder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Check assignability of initializers and return values, and that
    /// conditions are booleans.
    pub checked_mode: bool,
    /// Check covariant parameters in the prologue.
    pub strong_mode: bool,
    /// Emit null checks for parameters annotated as null-checked.
    pub null_checks: bool,
    /// Translate `assert` statements.
    pub enable_asserts: bool,
    /// Guard class and length of instance field stores.
    pub use_field_guards: bool,
    /// Emit write barriers on instance field stores.
    pub emit_store_barriers: bool,
    /// Emit debugger single-step checks.
    pub emit_debug_step_checks: bool,
    /// Record `(deopt_id, context_depth)` pairs.
    pub track_context_levels: bool,
    /// Closures check the passed argument count in their prologue.
    pub check_argument_counts: bool,
    /// First block id handed out by the builder.
    pub first_block_id: usize,
    /// On-stack replacement entry id.
    pub osr_id: Option<usize>,
    /// The graph is built for an inlinee.
    pub inlining: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            checked_mode: false,
            strong_mode: true,
            null_checks: false,
            enable_asserts: false,
            use_field_guards: true,
            emit_store_barriers: false,
            emit_debug_step_checks: false,
            track_context_levels: false,
            check_argument_counts: false,
            first_block_id: 1,
            osr_id: None,
            inlining: false,
        }
    }
}

impl BuilderConfig {
    /// Parse a RON document
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(source)?)
    }

    /// Load from a RON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron_str(&source)
    }

    /// Serialize to pretty RON
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        Ok(ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default(),
        )?)
    }

    /// Save to a RON file
    pub fn save(
        &self,
        path: &Path,
    ) -> Result<(), ConfigError> {
        let content = self.to_ron_string()?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Configuration used when compiling for debugging
    pub fn debug() -> Self {
        Self {
            checked_mode: true,
            enable_asserts: true,
            emit_debug_step_checks: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests;
