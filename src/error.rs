use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which of the two detachment forks failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkStage {
    First,
    Second,
}

impl fmt::Display for ForkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForkStage::First => write!(f, "fork #1"),
            ForkStage::Second => write!(f, "fork #2"),
        }
    }
}

/// Main error type for bgrun
#[derive(Debug, Error)]
pub enum BgrunError {
    // Command-line errors
    #[error("Usage: {program} [start|stop]")]
    Usage { program: String },

    #[error("Unknown argument: {0}")]
    UnknownCommand(String),

    // Lifecycle errors
    #[error("Failed to start: already running (pidfile {} exists)", .path.display())]
    AlreadyRunning { path: PathBuf },

    #[error("Failed to start: {stage} failed: {source}")]
    Fork {
        stage: ForkStage,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start: setsid failed: {0}")]
    Setsid(std::io::Error),

    #[error("Failed to redirect {stream} to {}: {source}", .path.display())]
    Redirect {
        stream: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stop, check whether {} exists", .path.display())]
    MissingPidFile { path: PathBuf },

    #[error("Invalid pid in {}: {content:?}", .path.display())]
    InvalidPidFile { path: PathBuf, content: String },

    #[error("Failed to send SIGTERM to pid {pid}: {source}")]
    Signal {
        pid: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("Signal handler error: {0}")]
    SignalInstall(String),

    #[error("Payload failed: {0}")]
    Payload(String),

    #[error("{0} is only supported on Unix systems")]
    Unsupported(&'static str),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Missing required configuration field: {0}")]
    MissingConfigField(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BgrunError {
    /// Exit status for a standalone invocation that failed with this error
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// Result type alias for bgrun operations
pub type Result<T> = std::result::Result<T, BgrunError>;
