// Daemon lifecycle management

use super::daemonize::{daemonize, StreamRedirection};
use super::pid::PidFile;
use super::signal::{DaemonExit, Finalizer, Teardown};
use crate::error::{BgrunError, Result};

#[cfg(unix)]
use super::signal::SignalController;
#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// Daemon manager for controlling daemon lifecycle
#[derive(Debug, Clone, Default)]
pub struct DaemonManager {
    pid_file: PidFile,
    redirection: StreamRedirection,
}

impl DaemonManager {
    /// Create a new daemon manager with default PID file
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new daemon manager with custom PID file
    pub fn with_pid_file(pid_file: PidFile) -> Self {
        Self {
            pid_file,
            redirection: StreamRedirection::default(),
        }
    }

    /// Set where the daemon's standard streams go
    pub fn redirection(mut self, redirection: StreamRedirection) -> Self {
        self.redirection = redirection;
        self
    }

    /// Whether a daemon is believed to be running (pid file present)
    pub fn is_running(&self) -> bool {
        self.pid_file.exists()
    }

    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    /// Detach and run `payload` as the daemon.
    ///
    /// In the invoking process this never returns on success: both fork
    /// parents exit with status 0. The returned value is observed only inside
    /// the detached daemon, once the payload finished or SIGTERM arrived.
    #[cfg(unix)]
    pub fn start<F, R>(&self, finalizer: Option<Finalizer>, payload: F) -> Result<DaemonExit<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_running() {
            return Err(BgrunError::AlreadyRunning {
                path: self.pid_file.path().to_path_buf(),
            });
        }

        daemonize(&self.redirection)?;

        // From here on the pid file belongs to this process
        let pid = std::process::id();
        self.pid_file.write(pid)?;
        let teardown = Teardown::new(self.pid_file.clone(), finalizer);

        tracing::info!(
            "Daemon started (PID: {}, pid file: {})",
            pid,
            self.pid_file.path().display()
        );

        let mut controller = SignalController::install()?;
        controller.register_teardown(teardown)?;
        controller.run(payload)
    }

    #[cfg(not(unix))]
    pub fn start<F, R>(&self, _finalizer: Option<Finalizer>, _payload: F) -> Result<DaemonExit<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        Err(BgrunError::Unsupported("Daemon start"))
    }

    /// Send SIGTERM to the pid recorded in the pid file.
    ///
    /// Fire-and-forget: does not wait for the daemon to exit and never
    /// escalates. Returns the pid that was signalled.
    #[cfg(unix)]
    pub fn stop(&self) -> Result<i32> {
        let pid = self.pid_file.read()?;

        tracing::info!("Stopping daemon (PID: {})", pid);

        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|e| BgrunError::Signal {
            pid,
            source: e.into(),
        })?;

        Ok(pid)
    }

    #[cfg(not(unix))]
    pub fn stop(&self) -> Result<i32> {
        Err(BgrunError::Unsupported("Daemon stop"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager_in(dir: &TempDir) -> DaemonManager {
        DaemonManager::with_pid_file(PidFile::with_path(dir.path().join("daemon.pid")))
    }

    #[test]
    fn test_daemon_manager_not_running() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);

        assert!(!manager.is_running());
    }

    #[test]
    #[cfg(unix)]
    fn test_start_refuses_when_pid_file_exists() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);
        std::fs::write(manager.pid_file().path(), "31337\n").unwrap();

        // Fails before any fork happens
        let result = manager.start(None, || ());

        assert!(matches!(result, Err(BgrunError::AlreadyRunning { .. })));
        assert_eq!(
            std::fs::read_to_string(manager.pid_file().path()).unwrap(),
            "31337\n"
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_stop_without_pid_file() {
        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);

        match manager.stop() {
            Err(BgrunError::MissingPidFile { path }) => {
                assert_eq!(path, dir.path().join("daemon.pid"))
            }
            other => panic!("expected MissingPidFile, got {:?}", other),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_stop_signals_recorded_pid() {
        use std::process::Command;

        let dir = TempDir::new().unwrap();
        let manager = manager_in(&dir);

        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        manager.pid_file().write(child.id()).unwrap();

        assert_eq!(manager.stop().unwrap(), child.id() as i32);

        let status = child.wait().unwrap();
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(nix::libc::SIGTERM));

        // stop leaves the pid file alone; only the daemon's teardown removes it
        assert!(manager.is_running());
    }
}
