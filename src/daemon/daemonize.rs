// Daemonization support for Unix systems

use crate::error::{BgrunError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Null device used when a stream has no configured destination
pub const NULL_DEVICE: &str = "/dev/null";

/// Destinations for the three standard streams of the detached process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRedirection {
    #[serde(default = "default_stream")]
    pub stdin: PathBuf,
    #[serde(default = "default_stream")]
    pub stdout: PathBuf,
    #[serde(default = "default_stream")]
    pub stderr: PathBuf,
}

fn default_stream() -> PathBuf {
    PathBuf::from(NULL_DEVICE)
}

impl Default for StreamRedirection {
    fn default() -> Self {
        Self {
            stdin: default_stream(),
            stdout: default_stream(),
            stderr: default_stream(),
        }
    }
}

impl StreamRedirection {
    pub fn stdin<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.stdin = path.as_ref().to_path_buf();
        self
    }

    pub fn stdout<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.stdout = path.as_ref().to_path_buf();
        self
    }

    pub fn stderr<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.stderr = path.as_ref().to_path_buf();
        self
    }
}

/// Detach the calling process from its terminal.
///
/// Both intermediate parents exit with status 0, so this only ever returns
/// inside the final, non-session-leader grandchild, after its standard
/// streams point at the configured destinations. Must be called before any
/// threads are spawned.
#[cfg(unix)]
pub fn daemonize(redirection: &StreamRedirection) -> Result<()> {
    use crate::error::ForkStage;
    use nix::unistd::{fork, setsid, ForkResult};

    // Buffered output would otherwise be emitted again by the child
    flush_std_streams();

    // First fork
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => std::process::exit(0),
        Ok(ForkResult::Child) => {}
        Err(e) => {
            return Err(BgrunError::Fork {
                stage: ForkStage::First,
                source: e.into(),
            })
        }
    }

    // Create new session and become session leader
    setsid().map_err(|e| BgrunError::Setsid(e.into()))?;

    // Second fork so the daemon is not a session leader and can never
    // acquire a controlling terminal
    match unsafe { fork() } {
        Ok(ForkResult::Parent { .. }) => std::process::exit(0),
        Ok(ForkResult::Child) => {}
        Err(e) => {
            return Err(BgrunError::Fork {
                stage: ForkStage::Second,
                source: e.into(),
            })
        }
    }

    flush_std_streams();
    redirect_std_streams(redirection)?;

    tracing::debug!("Detached as pid {}", std::process::id());
    Ok(())
}

#[cfg(not(unix))]
pub fn daemonize(_redirection: &StreamRedirection) -> Result<()> {
    Err(BgrunError::Unsupported("Daemonization"))
}

#[cfg(unix)]
fn flush_std_streams() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}

/// Point descriptors 0, 1 and 2 at the configured files.
///
/// Works at the descriptor level, so code writing to fd 1/2 directly is
/// redirected as well. Output files are opened for append and created if
/// missing.
#[cfg(unix)]
pub fn redirect_std_streams(redirection: &StreamRedirection) -> Result<()> {
    use nix::libc;
    use std::fs::OpenOptions;

    let mut input = OpenOptions::new();
    input.read(true);
    let mut output = OpenOptions::new();
    output.append(true).create(true);

    redirect_fd(&input, &redirection.stdin, libc::STDIN_FILENO, "stdin")?;
    redirect_fd(&output, &redirection.stdout, libc::STDOUT_FILENO, "stdout")?;
    redirect_fd(&output, &redirection.stderr, libc::STDERR_FILENO, "stderr")?;
    Ok(())
}

#[cfg(unix)]
fn redirect_fd(
    options: &std::fs::OpenOptions,
    path: &Path,
    target: std::os::unix::io::RawFd,
    stream: &'static str,
) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let redirect_err = |source: std::io::Error| BgrunError::Redirect {
        stream,
        path: path.to_path_buf(),
        source,
    };

    // The opened file is closed on drop; the duplicated descriptor stays
    let file = options.open(path).map_err(redirect_err)?;
    nix::unistd::dup2(file.as_raw_fd(), target).map_err(|e| redirect_err(e.into()))?;
    Ok(())
}
