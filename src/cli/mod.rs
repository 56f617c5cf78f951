// CLI module - start/stop protocol for a single daemon

mod output;

pub use output::{print_error, print_info};

use crate::config::DaemonConfig;
use crate::daemon::{DaemonExit, DaemonManager, Finalizer, PidFile, StreamRedirection};
use crate::daemon::SIGNAL_EXIT_CODE;
use crate::error::{BgrunError, Result};
use clap::Parser;
use std::ffi::OsString;
use std::path::Path;

/// Raw command line: exactly one positional command
#[derive(Parser, Debug)]
#[command(name = "bgrun", disable_help_flag = true, disable_version_flag = true)]
struct ServiceArgs {
    /// `start` or `stop`
    #[arg(allow_hyphen_values = true)]
    command: String,
}

/// Parsed command-line intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    Start,
    Stop,
}

impl Invocation {
    /// Parse `argv` (program name first)
    pub fn parse<I, T>(argv: I) -> Result<Invocation>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
        let program = argv
            .first()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bgrun".to_string());

        // Counted before clap sees argv: `--` must not swallow an argument
        if argv.len() != 2 {
            return Err(BgrunError::Usage { program });
        }

        let unknown = || BgrunError::UnknownCommand(argv[1].to_string_lossy().into_owned());
        let args = ServiceArgs::try_parse_from(&argv).map_err(|_| unknown())?;

        match args.command.as_str() {
            "start" => Ok(Invocation::Start),
            "stop" => Ok(Invocation::Stop),
            _ => Err(unknown()),
        }
    }
}

/// Result of a successful [`Service::run`]
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<R> {
    /// `stop` delivered SIGTERM to this pid
    Stopped { pid: i32 },
    /// Inside the daemon: the payload returned
    Completed(R),
    /// Inside the daemon: SIGTERM ended the payload
    Terminated,
}

impl<R> Outcome<R> {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Terminated => SIGNAL_EXIT_CODE,
            _ => 0,
        }
    }
}

impl<R> From<DaemonExit<R>> for Outcome<R> {
    fn from(exit: DaemonExit<R>) -> Self {
        match exit {
            DaemonExit::Completed(value) => Outcome::Completed(value),
            DaemonExit::Terminated => Outcome::Terminated,
        }
    }
}

/// Command-level runner binding a payload to `start` / `stop`
pub struct Service {
    manager: DaemonManager,
    finalizer: Option<Finalizer>,
    hint: bool,
}

impl Service {
    pub fn new<P: AsRef<Path>>(pid_file: P) -> Self {
        Self {
            manager: DaemonManager::with_pid_file(PidFile::with_path(pid_file)),
            finalizer: None,
            hint: true,
        }
    }

    /// Build a service from a loaded configuration
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self::new(&config.pid_file)
            .redirection(config.redirection())
            .hint(config.hint)
    }

    pub fn redirection(mut self, redirection: StreamRedirection) -> Self {
        self.manager = self.manager.redirection(redirection);
        self
    }

    /// Run `finalizer` during teardown, after the pid file is gone
    pub fn finalizer<F>(mut self, finalizer: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    /// Print start/stop hints on standard output
    pub fn hint(mut self, hint: bool) -> Self {
        self.hint = hint;
        self
    }

    pub fn pid_file(&self) -> &Path {
        self.manager.pid_file().path()
    }

    /// Dispatch on `argv` and surface failures as values.
    ///
    /// For `start`, the invoking process exits inside the detacher and only
    /// the daemon sees the returned outcome.
    pub fn run<I, T, F, R>(self, argv: I, payload: F) -> Result<Outcome<R>>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let Service {
            manager,
            finalizer,
            hint,
        } = self;

        match Invocation::parse(argv)? {
            Invocation::Start => {
                if hint {
                    print_info("Starting daemon");
                }
                manager.start(finalizer, payload).map(Outcome::from)
            }
            Invocation::Stop => {
                if hint {
                    print_info("Stopping daemon");
                }
                let pid = manager.stop()?;
                Ok(Outcome::Stopped { pid })
            }
        }
    }

    /// Run as a standalone command: report diagnostics on standard error and
    /// return the process exit status.
    pub fn execute<I, T, F>(self, argv: I, payload: F) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        match self.run(argv, payload) {
            Ok(Outcome::Completed(Err(e))) => {
                tracing::error!("Payload failed: {:#}", e);
                print_error(&format!("{:#}", e));
                1
            }
            Ok(outcome) => outcome.exit_code(),
            Err(e) => {
                print_error(&e.to_string());
                e.exit_code()
            }
        }
    }
}
