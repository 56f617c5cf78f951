use crate::daemon::pid::DEFAULT_PID_FILE;
use crate::daemon::StreamRedirection;
use crate::error::{BgrunError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Environment variable naming the config file used by the `bgrun` binary
pub const CONFIG_ENV: &str = "BGRUN_CONFIG";

/// Daemon configuration: pid file, stream redirection and payload settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Exclusivity marker holding the daemon's pid
    pub pid_file: PathBuf,

    /// Standard stream destinations after detachment
    #[serde(flatten)]
    pub streams: StreamRedirection,

    /// Print "Starting daemon" / "Stopping daemon" before acting
    #[serde(default = "default_hint")]
    pub hint: bool,

    /// Default tracing level (overridden by `BGRUN_LOG`)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Settings for the heartbeat payload
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

/// Heartbeat payload settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Delay between heartbeat lines (in milliseconds)
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Stop after this many heartbeats; run until SIGTERM if unset
    #[serde(default)]
    pub beats: Option<u64>,
}

// Default value functions for serde
fn default_hint() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            beats: None,
        }
    }
}

impl HeartbeatConfig {
    /// Get the heartbeat interval as Duration
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: PathBuf::from(DEFAULT_PID_FILE),
            streams: StreamRedirection::default(),
            hint: default_hint(),
            log_level: default_log_level(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load the config named by `BGRUN_CONFIG`, or the defaults if unset
    pub fn from_env() -> Result<DaemonConfig> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Load a configuration file (supports TOML and JSON)
    pub fn from_file(path: &Path) -> Result<DaemonConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BgrunError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        let mut config = match extension {
            "toml" => Self::parse_toml(&contents)?,
            "json" => Self::parse_json(&contents)?,
            _ => {
                return Err(BgrunError::InvalidConfig(format!(
                    "Unsupported file format: {}. Use .toml or .json",
                    extension
                )))
            }
        };

        config.expand_env_vars();

        // Relative paths are anchored at the config file's directory
        if let Some(anchor) = path.parent() {
            config.anchor_paths(anchor);
        }

        config.validate()?;
        Ok(config)
    }

    fn parse_toml(contents: &str) -> Result<DaemonConfig> {
        toml::from_str(contents)
            .map_err(|e| BgrunError::InvalidConfig(format!("Failed to parse TOML: {}", e)))
    }

    fn parse_json(contents: &str) -> Result<DaemonConfig> {
        serde_json::from_str(contents)
            .map_err(|e| BgrunError::InvalidConfig(format!("Failed to parse JSON: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.pid_file.as_os_str().is_empty() {
            return Err(BgrunError::MissingConfigField("pid_file".to_string()));
        }

        if self.heartbeat.interval_ms == 0 {
            return Err(BgrunError::ConfigValidationError(
                "heartbeat.interval_ms must be at least 1".to_string(),
            ));
        }

        // Same parser the subscriber uses, so directives like `info,bgrun=debug` pass
        if let Err(e) = EnvFilter::try_new(&self.log_level) {
            return Err(BgrunError::ConfigValidationError(format!(
                "Invalid log_level: {}: {}",
                self.log_level, e
            )));
        }

        Ok(())
    }

    /// Stream destinations for the detacher
    pub fn redirection(&self) -> StreamRedirection {
        self.streams.clone()
    }

    fn expand_env_vars(&mut self) {
        self.pid_file = Self::expand_env_in_path(&self.pid_file);
        self.streams.stdin = Self::expand_env_in_path(&self.streams.stdin);
        self.streams.stdout = Self::expand_env_in_path(&self.streams.stdout);
        self.streams.stderr = Self::expand_env_in_path(&self.streams.stderr);
    }

    fn anchor_paths(&mut self, anchor: &Path) {
        for path in [
            &mut self.pid_file,
            &mut self.streams.stdin,
            &mut self.streams.stdout,
            &mut self.streams.stderr,
        ] {
            if path.is_relative() && !path.as_os_str().is_empty() {
                *path = anchor.join(&*path);
            }
        }
    }

    /// Expand `$VAR` and `${VAR}` references; unset variables are left as written
    fn expand_env_in_string(s: &str) -> String {
        let is_name_char = |c: char| c.is_ascii_alphanumeric() || c == '_';
        let mut result = String::with_capacity(s.len());
        let mut rest = s;

        while let Some(pos) = rest.find('$') {
            result.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            let (name, token_len) = if let Some(braced) = after.strip_prefix('{') {
                match braced.find('}') {
                    Some(end) if end > 0 && braced[..end].chars().all(is_name_char) => {
                        (&braced[..end], end + 2)
                    }
                    _ => ("", 0),
                }
            } else {
                let end = after.find(|c: char| !is_name_char(c)).unwrap_or(after.len());
                (&after[..end], end)
            };

            let token = &rest[pos..pos + 1 + token_len];
            match std::env::var(name) {
                Ok(value) if !name.is_empty() => result.push_str(&value),
                _ => result.push_str(token),
            }
            rest = &rest[pos + 1 + token_len..];
        }

        result.push_str(rest);
        result
    }

    fn expand_env_in_path(path: &Path) -> PathBuf {
        let path_str = path.to_string_lossy();
        PathBuf::from(Self::expand_env_in_string(&path_str))
    }
}
