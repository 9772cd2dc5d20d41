//! Simulator configuration
//!
//! Loaded from a TOML file, then overridden by environment variables:
//!
//! | Variable                | Field                                   |
//! |-------------------------|-----------------------------------------|
//! | `SPICERUN_SIMULATOR`    | `executable` (falls back to `LTSPICE_PATH`) |
//! | `SPICERUN_SCRATCH_DIR`  | `scratch_root`                          |
//! | `SPICERUN_TIMEOUT_SECS` | `timeout_secs`                          |
//!
//! ```toml
//! executable = "/opt/ltspice/ltspice"
//! run_label = "amp"
//! timeout_secs = 120
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default file stem of the netlist, log and result container
pub const DEFAULT_RUN_LABEL: &str = "circuit";

pub const ENV_SIMULATOR: &str = "SPICERUN_SIMULATOR";
pub const ENV_LTSPICE_PATH: &str = "LTSPICE_PATH";
pub const ENV_SCRATCH_DIR: &str = "SPICERUN_SCRATCH_DIR";
pub const ENV_TIMEOUT_SECS: &str = "SPICERUN_TIMEOUT_SECS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Path to the simulator executable
    pub executable: Option<PathBuf>,
    pub run_label: String,
    /// Kill the simulator after this many seconds; unset or 0 waits forever
    pub timeout_secs: Option<u64>,
    /// Parent directory for run workspaces; system temp dir when unset
    pub scratch_root: Option<PathBuf>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            executable: None,
            run_label: DEFAULT_RUN_LABEL.to_string(),
            timeout_secs: None,
            scratch_root: None,
        }
    }
}

impl SimulatorConfig {
    /// Load `path` and apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults with environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup. Empty values are
    /// treated as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(exe) = get(ENV_SIMULATOR).or_else(|| get(ENV_LTSPICE_PATH)) {
            self.executable = Some(PathBuf::from(exe));
        }
        if let Some(dir) = get(ENV_SCRATCH_DIR) {
            self.scratch_root = Some(PathBuf::from(dir));
        }
        if let Some(value) = get(ENV_TIMEOUT_SECS) {
            let secs = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidEnv {
                    var: ENV_TIMEOUT_SECS,
                    value,
                })?;
            self.timeout_secs = Some(secs);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }
}
