// PID file management for the daemon process

use crate::error::{BgrunError, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Default PID file location
pub const DEFAULT_PID_FILE: &str = "/tmp/bgrun.pid";

/// Exclusivity marker for a single daemon.
///
/// Presence of the file is the only "is it running" signal; the content is
/// never checked against the process table.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create a new PID file manager with default path
    pub fn new() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PID_FILE),
        }
    }

    /// Create a new PID file manager with custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Check if the PID file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create or truncate the file and store `pid` as decimal text plus a newline
    pub fn write(&self, pid: u32) -> Result<()> {
        let mut file = fs::File::create(&self.path)?;
        writeln!(file, "{}", pid)?;
        tracing::debug!("Wrote pid {} to {}", pid, self.path.display());
        Ok(())
    }

    /// Read the PID from the file
    pub fn read(&self) -> Result<i32> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BgrunError::MissingPidFile {
                    path: self.path.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        // Zero and negative ids address process groups, never a single daemon
        match content.trim().parse::<i32>() {
            Ok(pid) if pid > 0 => Ok(pid),
            _ => Err(BgrunError::InvalidPidFile {
                path: self.path.clone(),
                content,
            }),
        }
    }

    /// Remove the PID file; a missing file is not an error
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Removed pid file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Get the path to the PID file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for PidFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scratch() -> (TempDir, PidFile) {
        let dir = TempDir::new().unwrap();
        let pid_file = PidFile::with_path(dir.path().join("daemon.pid"));
        (dir, pid_file)
    }

    #[test]
    fn test_write_and_read_pid() {
        let (_dir, pid_file) = scratch();

        pid_file.write(4242).unwrap();

        assert_eq!(pid_file.read().unwrap(), 4242);
    }

    #[test]
    fn test_write_format_is_decimal_with_newline() {
        let (_dir, pid_file) = scratch();

        pid_file.write(std::process::id()).unwrap();

        let raw = fs::read_to_string(pid_file.path()).unwrap();
        assert_eq!(raw, format!("{}\n", std::process::id()));
    }

    #[test]
    fn test_write_truncates_existing_content() {
        let (_dir, pid_file) = scratch();
        fs::write(pid_file.path(), "123456789 leftover garbage\n").unwrap();

        pid_file.write(7).unwrap();

        assert_eq!(fs::read_to_string(pid_file.path()).unwrap(), "7\n");
    }

    #[test]
    fn test_exists() {
        let (_dir, pid_file) = scratch();
        assert!(!pid_file.exists());

        pid_file.write(1).unwrap();
        assert!(pid_file.exists());
    }

    #[test]
    fn test_read_missing_file() {
        let (_dir, pid_file) = scratch();

        match pid_file.read() {
            Err(BgrunError::MissingPidFile { path }) => assert_eq!(path, pid_file.path()),
            other => panic!("expected MissingPidFile, got {:?}", other),
        }
    }

    #[test]
    fn test_read_rejects_garbage_and_non_positive() {
        let (_dir, pid_file) = scratch();

        for content in ["", "abc\n", "0\n", "-12\n"] {
            fs::write(pid_file.path(), content).unwrap();
            assert!(
                matches!(pid_file.read(), Err(BgrunError::InvalidPidFile { .. })),
                "content {:?} should be rejected",
                content
            );
        }
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, pid_file) = scratch();

        pid_file.write(99).unwrap();
        pid_file.delete().unwrap();
        assert!(!pid_file.exists());

        // Second delete on an absent file still succeeds
        pid_file.delete().unwrap();
    }
}
