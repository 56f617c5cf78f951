// Daemon module - detachment, pid file and termination handling

pub mod daemonize;
pub mod manager;
pub mod pid;
pub mod signal;

pub use daemonize::{daemonize, StreamRedirection};
pub use manager::DaemonManager;
pub use pid::PidFile;
#[cfg(unix)]
pub use signal::SignalController;
pub use signal::{exit_state, DaemonExit, ExitState, Finalizer, Teardown, SIGNAL_EXIT_CODE};
