//! Tracing setup.
//!
//! Logs go to stdout by default. When a log file is configured, the previous
//! files are rotated (`bridge.log` → `bridge.log.1` → … → `.3`) and a fresh
//! file is opened. Each event is written straight to the file with no
//! userspace buffering.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};

const KEEP_ROTATED: u32 = 3;

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let mut file_error = None;
    let (writer, ansi) = match config.file.as_deref().map(Path::new) {
        Some(path) => match open_log_file(path) {
            Ok(file) => (BoxMakeWriter::new(Mutex::new(file)), false),
            Err(e) => {
                file_error = Some((path.to_path_buf(), e));
                (BoxMakeWriter::new(std::io::stdout), true)
            }
        },
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Text => fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(false)
            .boxed(),
    };

    if tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .is_err()
    {
        return;
    }

    if let Some((path, e)) = file_error {
        tracing::warn!(path = %path.display(), error = %e, "cannot open log file, logging to stdout");
    }
    install_panic_hook();
}

/// Route panics through tracing so they land in the configured sink.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        tracing::error!(%location, panic = %payload, "panic");
    }));
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    rotate_log_files(path, KEEP_ROTATED)?;
    OpenOptions::new().create(true).append(true).open(path)
}

/// `generation` 0 is the live file, `n` is `base.n`.
fn log_generation(base: &Path, generation: u32) -> PathBuf {
    match generation {
        0 => base.to_path_buf(),
        n => PathBuf::from(format!("{}.{n}", base.display())),
    }
}

/// Move every generation one step older, oldest first, overwriting whatever
/// sat in `base.{keep}`. Missing generations are skipped.
fn rotate_log_files(base: &Path, keep: u32) -> io::Result<()> {
    for generation in (0..keep).rev() {
        let from = log_generation(base, generation);
        if !from.exists() {
            continue;
        }
        let to = log_generation(base, generation + 1);
        if to.exists() {
            std::fs::remove_file(&to)?;
        }
        std::fs::rename(&from, &to)?;
    }
    Ok(())
}
