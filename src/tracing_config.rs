//! Tracing configuration for Silenceguard
//!
//! Structured logging with dual output: colored stdout (filtered by
//! RUST_LOG) and a plain-text daily-rotated file whose level can be
//! changed at runtime. File writes are non-blocking so the audit loop
//! never stalls on disk.

use once_cell::sync::OnceCell;
use std::sync::Mutex;

use tracing::Level;
use tracing_appender::{
    non_blocking::{NonBlockingBuilder, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Global guard to keep the non-blocking writer alive
static WORKER_GUARD: OnceCell<Mutex<Option<WorkerGuard>>> = OnceCell::new();

/// Current file log level (modified at runtime via atomic)
static FILE_LOG_LEVEL: std::sync::atomic::AtomicU8 = std::sync::atomic::AtomicU8::new(4);

fn level_to_u8(level: Level) -> u8 {
    match level {
        Level::ERROR => 1,
        Level::WARN => 2,
        Level::INFO => 3,
        Level::DEBUG => 4,
        Level::TRACE => 5,
    }
}

/// Set the file log level at runtime. The file layer's filter reads this
/// value per event, so the change applies immediately.
pub fn set_file_log_level(level: Level) {
    FILE_LOG_LEVEL.store(level_to_u8(level), std::sync::atomic::Ordering::Relaxed);
    tracing::info!("File log level changed to {:?}", level);
}

/// Initialize the tracing subscriber with dual output:
/// - Stdout: Colored, respects RUST_LOG env var
/// - File: Plain text, daily rotation, 7 days retention, non-blocking
///
/// Returns Ok(()) on success. The worker guard is stored globally.
pub fn init_tracing(log_dir: &std::path::Path) -> anyhow::Result<()> {
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(7)
        .filename_prefix("silenceguard")
        .filename_suffix("log")
        .build(log_dir)?;

    // Lossless non-blocking writer: audit events must not be dropped
    // under pressure.
    let (non_blocking_writer, guard) = NonBlockingBuilder::default()
        .lossy(false)
        .finish(file_appender);

    WORKER_GUARD.get_or_init(|| Mutex::new(Some(guard)));

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_target(true)
        .with_level(true)
        .compact()
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .with_writer(non_blocking_writer)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            let current = FILE_LOG_LEVEL.load(std::sync::atomic::Ordering::Relaxed);
            level_to_u8(*metadata.level()) <= current
        }));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!("Tracing initialized, log dir: {}", log_dir.display());

    Ok(())
}
