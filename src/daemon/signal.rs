// Termination signal handling and guaranteed teardown for the daemon process

use super::pid::PidFile;
use crate::error::{BgrunError, Result};
use std::sync::atomic::{AtomicU8, Ordering};

/// Caller-supplied action run after the pid file is removed
pub type Finalizer = Box<dyn FnOnce() + Send + 'static>;

/// Exit status used when the daemon leaves through SIGTERM
pub const SIGNAL_EXIT_CODE: i32 = 1;

/// Per-process daemon lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    Running,
    ControlledExiting,
    Terminated,
}

const UNINSTALLED: u8 = 0;
const RUNNING: u8 = 1;
const EXITING: u8 = 2;
const TERMINATED: u8 = 3;

/// Atomic holder for [`ExitState`]; transitions only move forward.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINSTALLED),
        }
    }

    /// Enter `Running`. Fails if the lifecycle was already started.
    pub fn install(&self) -> Result<()> {
        self.state
            .compare_exchange(UNINSTALLED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|_| {
                BgrunError::SignalInstall("termination handler already installed".to_string())
            })
    }

    /// `Running -> ControlledExiting`; returns false if not currently running
    pub fn begin_exit(&self) -> bool {
        self.state
            .compare_exchange(RUNNING, EXITING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// `ControlledExiting -> Terminated`
    pub fn finish(&self) {
        let _ = self
            .state
            .compare_exchange(EXITING, TERMINATED, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Current state, or `None` before installation
    pub fn state(&self) -> Option<ExitState> {
        match self.state.load(Ordering::SeqCst) {
            RUNNING => Some(ExitState::Running),
            EXITING => Some(ExitState::ControlledExiting),
            TERMINATED => Some(ExitState::Terminated),
            _ => None,
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

static LIFECYCLE: Lifecycle = Lifecycle::new();

/// Lifecycle state of the current process
pub fn exit_state() -> Option<ExitState> {
    LIFECYCLE.state()
}

/// Release of the "daemon is running" marker.
///
/// Deletes the pid file, then runs the finalizer if one was given. Fires at
/// most once, either through [`Teardown::fire`] or on drop. A hard kill skips
/// it and leaves a stale pid file behind.
pub struct Teardown {
    pid_file: PidFile,
    finalizer: Option<Finalizer>,
    fired: bool,
}

impl Teardown {
    pub fn new(pid_file: PidFile, finalizer: Option<Finalizer>) -> Self {
        Self {
            pid_file,
            finalizer,
            fired: false,
        }
    }

    pub fn fire(&mut self) {
        if self.fired {
            return;
        }
        self.fired = true;

        if let Err(e) = self.pid_file.delete() {
            tracing::warn!(
                "Failed to remove pid file {}: {}",
                self.pid_file.path().display(),
                e
            );
        }

        if let Some(finalizer) = self.finalizer.take() {
            finalizer();
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        self.fire();
    }
}

/// How the daemon main routine ended
#[derive(Debug, PartialEq, Eq)]
pub enum DaemonExit<R> {
    /// The payload returned normally
    Completed(R),
    /// SIGTERM arrived; the process should exit with [`SIGNAL_EXIT_CODE`]
    Terminated,
}

/// SIGTERM handler plus the teardown bound to it.
///
/// Built once per process, after detachment. The payload runs on a blocking
/// thread while the controller waits for either its completion or SIGTERM.
#[cfg(unix)]
pub struct SignalController {
    runtime: tokio::runtime::Runtime,
    sigterm: tokio::signal::unix::Signal,
    teardown: Option<Teardown>,
}

#[cfg(unix)]
impl SignalController {
    /// Install the SIGTERM handler. Only one controller may exist per process.
    pub fn install() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        LIFECYCLE.install()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BgrunError::SignalInstall(format!("failed to build runtime: {}", e)))?;

        let sigterm = {
            let _guard = runtime.enter();
            signal(SignalKind::terminate()).map_err(|e| {
                BgrunError::SignalInstall(format!("failed to install SIGTERM handler: {}", e))
            })?
        };

        tracing::debug!("SIGTERM handler installed");

        Ok(Self {
            runtime,
            sigterm,
            teardown: None,
        })
    }

    /// Register the single teardown action for this process
    pub fn register_teardown(&mut self, teardown: Teardown) -> Result<()> {
        if self.teardown.is_some() {
            return Err(BgrunError::SignalInstall(
                "teardown already registered".to_string(),
            ));
        }
        self.teardown = Some(teardown);
        Ok(())
    }

    /// Run `payload` until it returns or SIGTERM arrives, then fire the teardown
    pub fn run<F, R>(self, payload: F) -> Result<DaemonExit<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        enum Finished<R> {
            Payload(std::result::Result<R, tokio::task::JoinError>),
            Signal,
        }

        let SignalController {
            runtime,
            mut sigterm,
            teardown,
        } = self;

        let finished = runtime.block_on(async {
            let handle = tokio::task::spawn_blocking(payload);
            tokio::select! {
                result = handle => Finished::Payload(result),
                _ = sigterm.recv() => Finished::Signal,
            }
        });

        LIFECYCLE.begin_exit();

        match finished {
            Finished::Payload(result) => {
                tracing::info!("Payload finished, tearing down");
                drop(teardown);
                LIFECYCLE.finish();
                result
                    .map(DaemonExit::Completed)
                    .map_err(|e| BgrunError::Payload(e.to_string()))
            }
            Finished::Signal => {
                tracing::info!("Received SIGTERM, tearing down");
                drop(teardown);
                LIFECYCLE.finish();
                // The payload thread is still running; it ends with the process
                runtime.shutdown_background();
                Ok(DaemonExit::Terminated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), None);

        lifecycle.install().unwrap();
        assert_eq!(lifecycle.state(), Some(ExitState::Running));

        assert!(lifecycle.begin_exit());
        assert_eq!(lifecycle.state(), Some(ExitState::ControlledExiting));

        lifecycle.finish();
        assert_eq!(lifecycle.state(), Some(ExitState::Terminated));
    }

    #[test]
    fn test_lifecycle_rejects_reinstall() {
        let lifecycle = Lifecycle::new();
        lifecycle.install().unwrap();
        assert!(matches!(
            lifecycle.install(),
            Err(BgrunError::SignalInstall(_))
        ));
    }

    #[test]
    fn test_lifecycle_exit_only_once() {
        let lifecycle = Lifecycle::new();
        assert!(!lifecycle.begin_exit());

        lifecycle.install().unwrap();
        assert!(lifecycle.begin_exit());
        assert!(!lifecycle.begin_exit());
    }

    #[test]
    fn test_teardown_deletes_pid_file_before_finalizer() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(dir.path().join("daemon.pid"));
        pid_file.write(std::process::id()).unwrap();

        let saw_pid_file = Arc::new(AtomicBool::new(true));
        let observed = Arc::clone(&saw_pid_file);
        let path = pid_file.path().to_path_buf();

        let mut teardown = Teardown::new(
            pid_file.clone(),
            Some(Box::new(move || {
                observed.store(path.exists(), Ordering::SeqCst);
            })),
        );
        teardown.fire();

        assert!(teardown.has_fired());
        assert!(!pid_file.exists());
        assert!(!saw_pid_file.load(Ordering::SeqCst));
    }

    #[test]
    fn test_teardown_fires_once() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(dir.path().join("daemon.pid"));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut teardown = Teardown::new(
            pid_file,
            Some(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        teardown.fire();
        teardown.fire();
        drop(teardown);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_teardown_fires_on_drop_without_finalizer() {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(dir.path().join("daemon.pid"));
        pid_file.write(1234).unwrap();

        drop(Teardown::new(pid_file.clone(), None));

        assert!(!pid_file.exists());
    }
}
