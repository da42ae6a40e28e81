//! Bridge configuration
//!
//! [`BridgeConfig`] holds the options the bridge consumes verbatim: the
//! application file, preload files, the debug shell flag and the collection
//! policy. Options arrive either from CLI flags or as `(key, value)` pairs
//! (for example from a configurator script) through [`BridgeConfig::apply_option`].
//!
//! [`WorkerLayout`] describes how many workers, threads and cooperative cores
//! the host runs, which decides the shape of the slot pool.

use crate::protocol::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File extensions claimed as application files without explicit configuration.
pub const APP_EXTENSIONS: [&str; 2] = [".js", ".ws"];

/// What a collection pass does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcMode {
    /// Cheap step: drop objects kept alive for the current job only.
    #[default]
    Step,
    /// Full collection cycle.
    Full,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Application file whose completion value is the entry point.
    pub app: Option<PathBuf>,
    /// Files evaluated before the application, in order.
    pub preload: Vec<PathBuf>,
    /// Hijack worker 1 with the interactive debug shell.
    pub shell: bool,
    /// Collect after every Nth completed request; 0 collects after every one.
    pub gc_freq: u64,
    pub gc_mode: GcMode,
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app(mut self, app: impl Into<PathBuf>) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn with_preload(mut self, file: impl Into<PathBuf>) -> Self {
        self.preload.push(file.into());
        self
    }

    pub fn with_gc(mut self, freq: u64, mode: GcMode) -> Self {
        self.gc_freq = freq;
        self.gc_mode = mode;
        self
    }

    /// Applies one named option. Returns `Ok(false)` for options that belong
    /// to someone else so callers can forward them.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` when a known option has a malformed value.
    pub fn apply_option(&mut self, key: &str, value: &str) -> Result<bool> {
        match key {
            "js" => self.app = Some(PathBuf::from(value)),
            "js-load" => self.preload.push(PathBuf::from(value)),
            "js-shell" | "jsshell" => self.shell = parse_flag(key, value)?,
            "js-gc-freq" => {
                self.gc_freq = value.trim().parse().map_err(|_| {
                    BridgeError::Config(format!("{} expects a number, got '{}'", key, value))
                })?
            }
            "js-gc-full" => {
                self.gc_mode = if parse_flag(key, value)? {
                    GcMode::Full
                } else {
                    GcMode::Step
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Claims `path` as the application file when it carries one of the
    /// [`APP_EXTENSIONS`].
    pub fn claim_app_file(&mut self, path: &str) -> bool {
        if APP_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            self.app = Some(PathBuf::from(path));
            return true;
        }
        false
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "" | "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BridgeError::Config(format!(
            "{} expects a boolean, got '{}'",
            key, other
        ))),
    }
}

/// Process layout the slot pool is sized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLayout {
    pub workers: u16,
    pub threads: u16,
    pub cores: u16,
    /// Hand callable bodies to the async resume engine instead of draining them.
    pub async_enabled: bool,
}

impl Default for WorkerLayout {
    fn default() -> Self {
        Self {
            workers: 1,
            threads: 1,
            cores: 1,
            async_enabled: false,
        }
    }
}

impl WorkerLayout {
    /// Cooperative cores per interpreter instance. Threaded layouts give each
    /// thread its own instance and a single core.
    pub fn cores_per_instance(&self) -> u16 {
        if self.threads > 1 {
            1
        } else {
            self.cores
        }
    }

    /// Slots per worker (the range of async ids).
    pub fn slots_per_worker(&self) -> u16 {
        if self.threads > 1 {
            self.threads
        } else {
            self.cores
        }
    }

    /// Validates the layout.
    ///
    /// # Errors
    ///
    /// Returns an error string if any dimension is zero. Cores are ignored
    /// when threads are above one.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.workers == 0 || self.threads == 0 || self.cores == 0 {
            return Err("workers, threads and cores must all be at least 1".to_string());
        }
        if self.threads > 1 && self.cores > 1 {
            tracing::debug!(
                "{} threads per worker, ignoring {} cores",
                self.threads, self.cores
            );
        }
        Ok(())
    }
}

/// Receiver of options produced by a configurator script.
pub trait OptionSink {
    fn add_option(&mut self, key: String, value: String);
}

impl OptionSink for Vec<(String, String)> {
    fn add_option(&mut self, key: String, value: String) {
        self.push((key, value));
    }
}
