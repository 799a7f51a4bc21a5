//! Runtime settings
//!
//! Loaded from YAML, every field defaulted, then overridden from `TAKO_*`
//! environment variables.

use crate::error::TakoError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub imagej: ImageJSettings,
    pub runner: RunnerSettings,
    /// Scratch directory for materialised macros and relative API inputs
    pub work_dir: PathBuf,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageJSettings {
    /// ImageJ/Fiji launcher
    pub executable: PathBuf,
    /// Pass `--headless`
    pub headless: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Concurrent stages inside a parallel group
    pub max_parallel: usize,
    /// Per-stage wall clock limit
    pub stage_timeout_secs: Option<u64>,
    /// Fail a stage whose output file was not written
    pub require_output: bool,
    /// Record blake3 hashes of produced files
    pub hash_outputs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            imagej: ImageJSettings::default(),
            runner: RunnerSettings::default(),
            work_dir: PathBuf::from(".tako"),
            log: LogSettings::default(),
        }
    }
}

impl Default for ImageJSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("ImageJ-linux64"),
            headless: true,
        }
    }
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            stage_timeout_secs: None,
            require_output: true,
            hash_outputs: true,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Settings {
    /// Parse settings from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, TakoError> {
        let settings: Settings =
            serde_yaml::from_str(yaml).map_err(|e| TakoError::ConfigError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TakoError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TakoError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Apply `TAKO_*` overrides from the process environment
    pub fn apply_env(self) -> Result<Self, TakoError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply `TAKO_*` overrides from an arbitrary lookup
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, TakoError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(exe) = lookup("TAKO_IMAGEJ") {
            self.imagej.executable = PathBuf::from(exe);
        }
        if let Some(dir) = lookup("TAKO_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(n) = lookup("TAKO_MAX_PARALLEL") {
            self.runner.max_parallel = n.parse().map_err(|_| {
                TakoError::ConfigError(format!("TAKO_MAX_PARALLEL is not a number: {}", n))
            })?;
        }
        if let Some(secs) = lookup("TAKO_STAGE_TIMEOUT") {
            let secs: u64 = secs.parse().map_err(|_| {
                TakoError::ConfigError(format!("TAKO_STAGE_TIMEOUT is not a number: {}", secs))
            })?;
            self.runner.stage_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(level) = lookup("TAKO_LOG") {
            self.log.level = level;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), TakoError> {
        if self.runner.max_parallel == 0 {
            return Err(TakoError::ConfigError(
                "runner.max_parallel must be at least 1".to_string(),
            ));
        }
        if self.runner.stage_timeout_secs == Some(0) {
            return Err(TakoError::ConfigError(
                "runner.stage_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
