// SPDX-License-Identifier: MIT
//
// rawkey — a raw-mode key event viewer.
//
// This is the binary that exercises rawkey-term end to end:
//
//   mode     → ModeGuard puts the terminal in raw mode and takes it back out
//   geometry → the size shown in the header, re-probed on SIGWINCH
//   decoder  → every keystroke printed by name
//
// Logs go to a file (`--log-file`) because stdout is the raw terminal.
// `RAWKEY_LOG` sets the filter, `info` by default.

mod cli;
mod viewer;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let _log_guard = match &cli.log_file {
        Some(path) => Some(
            init_tracing(path)
                .with_context(|| format!("cannot log to {}", path.display()))?,
        ),
        None => None,
    };
    tracing::info!(?cli, "starting");

    viewer::run(&cli)
}

/// File logging through a non-blocking writer. Keep the guard alive for
/// the life of the process or buffered lines are lost.
fn init_tracing(path: &Path) -> anyhow::Result<WorkerGuard> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .context("log file path has no file name")?
        .to_string_lossy()
        .into_owned();

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_env("RAWKEY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;

    Ok(guard)
}
