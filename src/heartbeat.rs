// Heartbeat payload run by the bgrun binary inside the daemon

use crate::config::HeartbeatConfig;
use anyhow::Context;
use chrono::Local;
use std::io::Write;

/// Emit heartbeat lines to standard output until `beats` is reached.
///
/// Without a beat limit this only ends when the process is signalled.
pub fn run(config: &HeartbeatConfig) -> anyhow::Result<u64> {
    run_with(config, std::io::stdout())
}

/// Emit heartbeat lines to `out`; returns the number written
pub fn run_with<W: Write>(config: &HeartbeatConfig, mut out: W) -> anyhow::Result<u64> {
    let pid = std::process::id();
    let mut count = 0u64;

    loop {
        count += 1;
        writeln!(
            out,
            "{} heartbeat #{} from pid {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            count,
            pid
        )
        .context("failed to write heartbeat")?;
        out.flush().context("failed to flush heartbeat")?;

        if config.beats.is_some_and(|beats| count >= beats) {
            tracing::info!("Heartbeat finished after {} beats", count);
            return Ok(count);
        }

        std::thread::sleep(config.interval());
    }
}
