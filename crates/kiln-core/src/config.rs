//! Engine configuration for the kiln SDK.
//!
//! [`EngineConfig`] describes how worker processes are launched: which
//! `kiln-engine` binary to run, with which arguments, and how many workers
//! may execute remote calls at the same time.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KilnError, Result};

/// Name of the engine executable searched for in PATH.
pub const ENGINE_EXE: &str = "kiln-engine";

/// Environment variable overriding the engine executable location.
pub const ENGINE_ENV_VAR: &str = "KILN_ENGINE";

/// Default number of concurrently executing remote calls.
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// Default per-worker stderr capture capacity in bytes.
pub const DEFAULT_STDERR_CAPACITY: usize = 10 * 1024;

/// Configuration for launching and pooling engine worker processes.
///
/// All fields have sensible defaults; `EngineConfig::default()` is a working
/// configuration whenever `kiln-engine` is on PATH.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit path to the engine executable. When unset, the executable is
    /// resolved from the `KILN_ENGINE` environment variable, then from PATH.
    #[serde(default)]
    pub engine_path: Option<PathBuf>,

    /// Arguments passed to every worker process.
    #[serde(default = "default_engine_args")]
    pub engine_args: Vec<String>,

    /// Upper bound on simultaneously executing remote calls.
    ///
    /// Clamped to `1..=2 * available parallelism`; zero selects the default.
    #[serde(default)]
    pub max_concurrency: usize,

    /// Per-worker stderr capture capacity in bytes.
    #[serde(default = "default_stderr_capacity")]
    pub stderr_capacity: usize,
}

fn default_engine_args() -> Vec<String> {
    vec!["server".into()]
}

fn default_stderr_capacity() -> usize {
    DEFAULT_STDERR_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_path: None,
            engine_args: default_engine_args(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            stderr_capacity: DEFAULT_STDERR_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with an explicit engine executable.
    pub fn with_engine(path: impl Into<PathBuf>) -> Self {
        Self {
            engine_path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Set the arguments passed to every worker process.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.engine_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the concurrency ceiling (clamped when the pool is built).
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Set the per-worker stderr capture capacity.
    pub fn with_stderr_capacity(mut self, capacity: usize) -> Self {
        self.stderr_capacity = capacity;
        self
    }

    /// The concurrency ceiling after clamping to a sane range.
    ///
    /// Zero (or any value below 1) selects [`DEFAULT_MAX_CONCURRENCY`]; the
    /// upper bound is twice the machine's available parallelism.
    pub fn effective_concurrency(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let requested = if self.max_concurrency == 0 {
            DEFAULT_MAX_CONCURRENCY
        } else {
            self.max_concurrency
        };
        requested.clamp(1, cpus * 2)
    }

    /// Resolve the engine executable to launch.
    ///
    /// Resolution order: explicit [`engine_path`](Self::engine_path), the
    /// `KILN_ENGINE` environment variable, then a PATH lookup for
    /// [`ENGINE_EXE`].
    pub fn resolve_engine(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.engine_path {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(KilnError::EngineNotFound {
                searched: format!("configured path {} does not exist", path.display()),
            });
        }

        if let Ok(path) = std::env::var(ENGINE_ENV_VAR) {
            let path = PathBuf::from(path);
            if path.exists() {
                debug!(path = %path.display(), "engine resolved from {}", ENGINE_ENV_VAR);
                return Ok(path);
            }
            return Err(KilnError::EngineNotFound {
                searched: format!("{ENGINE_ENV_VAR} points at a missing file: {}", path.display()),
            });
        }

        match which::which(ENGINE_EXE) {
            Ok(path) => {
                debug!(path = %path.display(), "engine resolved from PATH");
                Ok(path)
            }
            Err(_) => Err(KilnError::EngineNotFound {
                searched: format!("{ENGINE_EXE} not found in PATH and {ENGINE_ENV_VAR} unset"),
            }),
        }
    }

    /// Validate the configuration without resolving the executable.
    pub fn validate(&self) -> Result<()> {
        if self.stderr_capacity == 0 {
            return Err(KilnError::ConfigValidation {
                message: "stderr_capacity must be at least 1 byte".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.engine_args, vec!["server".to_string()]);
        assert_eq!(config.max_concurrency, DEFAULT_MAX_CONCURRENCY);
        assert_eq!(config.stderr_capacity, DEFAULT_STDERR_CAPACITY);
        config.validate().unwrap();
    }

    #[test]
    fn test_effective_concurrency_clamps_low() {
        let config = EngineConfig::default().with_max_concurrency(0);
        assert!(config.effective_concurrency() >= 1);
    }

    #[test]
    fn test_effective_concurrency_clamps_high() {
        let config = EngineConfig::default().with_max_concurrency(100_000);
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        assert_eq!(config.effective_concurrency(), cpus * 2);
    }

    #[test]
    fn test_resolve_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("fake-engine");
        let mut f = std::fs::File::create(&exe).unwrap();
        f.write_all(b"#!/bin/sh\n").unwrap();

        let config = EngineConfig::with_engine(&exe);
        assert_eq!(config.resolve_engine().unwrap(), exe);
    }

    #[test]
    fn test_resolve_missing_explicit_path() {
        let config = EngineConfig::with_engine("/nonexistent/kiln-engine");
        let err = config.resolve_engine().unwrap_err();
        assert!(matches!(err, KilnError::EngineNotFound { .. }));
    }

    #[test]
    fn test_zero_stderr_capacity_rejected() {
        let config = EngineConfig::default().with_stderr_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = EngineConfig::with_engine("/opt/kiln/bin/kiln-engine")
            .with_max_concurrency(4)
            .with_args(["server", "--quiet"]);
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.engine_path, config.engine_path);
        assert_eq!(back.engine_args, config.engine_args);
        assert_eq!(back.max_concurrency, 4);
    }
}
