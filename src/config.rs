//! Harness configuration.
//!
//! A single [`HarnessConfig`] value replaces process-wide toggles: it is built
//! once (defaults, then an optional YAML file, then command-line overrides) and
//! handed to the reconciler, the runner and the reporter.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{HarnessError, Result};

// Color constants for terminal output
pub const RESET: &str = "\x1b[0m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";

pub const DEFAULT_WIDTH: usize = 80;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Credentials used for every control-plane request unless overridden.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Auth {
    pub username: String,
    pub password: String,
}

impl Auth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self::new("Administrator", "asdasd")
    }
}

/// Configuration for cluster acquisition, test execution and reporting.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub use_colors: bool,
    /// Stream phase output directly instead of capturing it.
    pub verbose: bool,
    /// Screen width used to right-align status words; 0 disables alignment.
    pub width: usize,
    /// Produce the reporting skeleton without invoking any phase body.
    pub dry_run: bool,
    pub http_timeout_secs: u64,
    pub cluster_dir: PathBuf,
    pub auth: Auth,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            use_colors: atty::is(atty::Stream::Stdout),
            verbose: false,
            width: DEFAULT_WIDTH,
            dry_run: false,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            cluster_dir: PathBuf::from("cluster_run"),
            auth: Auth::default(),
        }
    }
}

impl HarnessConfig {
    /// Load a YAML config file; absent keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| HarnessError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content).map_err(|e| match e {
            HarnessError::Config { message, .. } => HarnessError::Config {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| HarnessError::Config {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Apply color formatting to text if colors are enabled.
    pub fn colorize(&self, text: &str, color: &str) -> String {
        if self.use_colors {
            format!("{}{}{}", color, text, RESET)
        } else {
            text.to_string()
        }
    }

    /// Plain configuration for tests and captured runs: no colors, no alignment.
    pub fn plain() -> Self {
        Self {
            use_colors: false,
            width: 0,
            ..Self::default()
        }
    }
}
