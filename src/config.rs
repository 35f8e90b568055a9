//! Configuration file handling.
//!
//! ```toml
//! [vm]
//! call_stack_size = 128
//! trace_execution = false
//!
//! [repl]
//! history = true
//! ```

use elo_engine::{EngineConfig, VmConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cli::Cli;

/// Errors loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Settings for the elo binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Virtual machine settings
    pub vm: VmSettings,

    /// REPL settings
    pub repl: ReplSettings,
}

/// The `[vm]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmSettings {
    /// Maximum call depth
    pub call_stack_size: usize,

    /// Log every executed instruction
    pub trace_execution: bool,
}

impl Default for VmSettings {
    fn default() -> Self {
        let vm = VmConfig::default();
        Self {
            call_stack_size: vm.call_stack_size,
            trace_execution: vm.trace_execution,
        }
    }
}

/// The `[repl]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplSettings {
    /// Keep input history between sessions
    pub history: bool,
}

impl Default for ReplSettings {
    fn default() -> Self {
        Self { history: true }
    }
}

impl Config {
    /// Loads a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Applies command line overrides.
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(size) = cli.stack_size {
            self.vm.call_stack_size = size;
        }
        if cli.trace {
            self.vm.trace_execution = true;
        }
        if cli.no_history {
            self.repl.history = false;
        }
        self
    }

    /// The engine configuration these settings describe.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            vm: VmConfig::default()
                .with_call_stack_size(self.vm.call_stack_size)
                .with_trace_execution(self.vm.trace_execution),
            register_builtins: true,
        }
    }
}
