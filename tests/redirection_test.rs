// Standard stream redirection at the descriptor level.
//
// The test re-runs its own binary so the dup2 calls never touch the
// harness's descriptors.

use bgrun::daemon::daemonize::redirect_std_streams;
use bgrun::daemon::StreamRedirection;
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const CHILD_DIR_ENV: &str = "BGRUN_REDIRECT_CHILD_DIR";
const TEST_NAME: &str = "test_std_streams_follow_redirection";

fn redirect_and_echo(dir: &Path) {
    let redirection = StreamRedirection::default()
        .stdin(dir.join("input.txt"))
        .stdout(dir.join("out.log"))
        .stderr(dir.join("err.log"));
    redirect_std_streams(&redirection).unwrap();

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).unwrap();

    let mut stdout = std::io::stdout();
    writeln!(stdout, "echo: {}", line.trim_end()).unwrap();
    stdout.flush().unwrap();
    eprintln!("written to stderr");
}

#[test]
fn test_std_streams_follow_redirection() {
    if let Some(dir) = std::env::var_os(CHILD_DIR_ENV) {
        redirect_and_echo(Path::new(&dir));
        return;
    }

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("input.txt"), "line from stdin\n").unwrap();
    fs::write(dir.path().join("out.log"), "existing\n").unwrap();

    let status = Command::new(std::env::current_exe().unwrap())
        .args(["--exact", TEST_NAME, "--nocapture", "--test-threads=1"])
        .env(CHILD_DIR_ENV, dir.path())
        .status()
        .unwrap();
    assert!(status.success());

    // Output files are appended to, never truncated
    let out = fs::read_to_string(dir.path().join("out.log")).unwrap();
    assert!(out.starts_with("existing\n"));
    assert!(out.contains("echo: line from stdin"));

    let err = fs::read_to_string(dir.path().join("err.log")).unwrap();
    assert!(err.contains("written to stderr"));
    assert!(!out.contains("written to stderr"));
}
