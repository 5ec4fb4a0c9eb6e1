//! Solver process configuration.

use std::collections::HashMap;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

/// Property holding the solver executable path.
pub const PATH_KEY: &str = "solver.path";
/// Property holding the whitespace-separated solver arguments.
pub const ARGS_KEY: &str = "solver.args";
/// Property holding the per-call time limit in milliseconds.
pub const TIMEOUT_KEY: &str = "solver.timeout_ms";

/// Solver location relative to the working directory.
pub const DEFAULT_PATH: &str = "lib/z3/build/z3";
/// Read the query from stdin in SMT-LIB 2 mode.
pub const DEFAULT_ARGS: &str = "-smt2 -in";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for `{TIMEOUT_KEY}`")]
    InvalidTimeout {
        value: String,
        #[source]
        source: ParseIntError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    /// Upper bound on one solve call. `None` waits for the solver indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self {
            path: cwd.join(DEFAULT_PATH),
            args: split_args(DEFAULT_ARGS),
            timeout: None,
        }
    }
}

fn split_args(args: &str) -> Vec<String> {
    args.split_whitespace().map(String::from).collect()
}

impl SolverConfig {
    /// Reads the configuration from host properties, falling back to the
    /// defaults for missing keys.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = properties.get(PATH_KEY) {
            config.path = PathBuf::from(path);
        }
        if let Some(args) = properties.get(ARGS_KEY) {
            config.args = split_args(args);
        }
        if let Some(value) = properties.get(TIMEOUT_KEY) {
            let millis = value.trim().parse::<u64>().map_err(|source| ConfigError::InvalidTimeout {
                value: value.clone(),
                source,
            })?;
            config.timeout = Some(Duration::from_millis(millis));
        }
        Ok(config)
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
