//! Caller-supplied options and agent invocation details
//!
//! Centralizes everything about how the agent binary is invoked: the
//! platform executable name, the default bundled binary directory, the
//! caller's working-directory override, and argument-list construction for
//! both the supervised `start` invocation and one-shot commands.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Platform executable name of the tunnel agent
#[cfg(windows)]
pub const BIN_NAME: &str = "ngrok.exe";

/// Platform executable name of the tunnel agent
#[cfg(not(windows))]
pub const BIN_NAME: &str = "ngrok";

/// Caller-supplied override mapping the default binary directory to a
/// replacement directory
pub type BinPathResolver = Arc<dyn Fn(PathBuf) -> PathBuf + Send + Sync>;

/// Options for starting the agent or running one-shot commands
///
/// Immutable input: the supervisor only reads it for the duration of one
/// start call. Loadable from a JSON file via [`Options::from_file`]; the
/// `bin_path` override is code-only and never serialized.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Tunnel region (e.g. "us", "eu"), passed as `--region=<value>`
    pub region: Option<String>,

    /// Agent configuration file, passed as `--config=<path>`
    pub config_path: Option<PathBuf>,

    /// Credential for `set_authtoken`
    pub authtoken: Option<String>,

    /// Replaces the default binary directory with a caller-chosen one
    #[serde(skip)]
    pub bin_path: Option<BinPathResolver>,
}

impl Options {
    /// Load options from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read options file {:?}", path))?;
        let options = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid options file {:?}", path))?;
        Ok(options)
    }

    /// Argument list for the supervised `start` invocation
    pub fn start_args(&self) -> Vec<String> {
        let mut args = vec![
            "start".to_string(),
            "--none".to_string(),
            "--log=stdout".to_string(),
        ];
        if let Some(region) = &self.region {
            args.push(format!("--region={}", region));
        }
        if let Some(config) = &self.config_path {
            args.push(format!("--config={}", config.display()));
        }
        args
    }

    /// Argument list for the one-shot `authtoken` invocation
    pub fn authtoken_args(&self, token: &str) -> Vec<String> {
        let mut args = vec!["authtoken".to_string(), token.to_string()];
        if let Some(config) = &self.config_path {
            args.push(format!("--config={}", config.display()));
        }
        args
    }

    /// Resolve the directory the agent is spawned in: the default bundled
    /// binary directory, or whatever the caller's `bin_path` maps it to.
    pub fn working_dir(&self) -> PathBuf {
        let dir = default_bin_dir();
        match &self.bin_path {
            Some(resolve) => resolve(dir),
            None => dir,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("region", &self.region)
            .field("config_path", &self.config_path)
            // Never log the credential itself
            .field("authtoken", &self.authtoken.as_ref().map(|_| "<redacted>"))
            .field("bin_path", &self.bin_path.is_some())
            .finish()
    }
}

impl From<&str> for Options {
    fn from(token: &str) -> Self {
        Options {
            authtoken: Some(token.to_string()),
            ..Default::default()
        }
    }
}

impl From<String> for Options {
    fn from(token: String) -> Self {
        Options {
            authtoken: Some(token),
            ..Default::default()
        }
    }
}

/// Default directory holding the bundled agent binary: `bin/` next to the
/// host executable, falling back to `./bin`.
pub fn default_bin_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bin")
}
