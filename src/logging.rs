//! Per-process log setup
//!
//! Script windows are the scripts' own UI, so logs go to files only: one per
//! script and a shared `all_logs.log` every process appends to.

use crate::error::SlotResult;
use crate::paths::PATH_LOGS;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global subscriber for `script_name`. `RUST_LOG` wins over
/// `default_level`. Calling it again is a no-op.
pub fn init(script_name: &str, default_level: &str) -> SlotResult<()> {
    init_in(&PATH_LOGS, script_name, default_level)
}

pub fn init_in(dir: &Path, script_name: &str, default_level: &str) -> SlotResult<()> {
    std::fs::create_dir_all(dir)?;
    let own = open_append(&dir.join(format!("{}.log", script_name)))?;
    let shared = open_append(&dir.join("all_logs.log"))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(own).and(Mutex::new(shared)))
        .with_ansi(false) // No color codes in log files
        .with_thread_names(true)
        .try_init();

    if installed.is_ok() {
        tracing::info!("{} logging started (pid {})", script_name, std::process::id());
    }
    Ok(())
}
