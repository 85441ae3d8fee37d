//! # Structured Logging Module
//!
//! Console logging for dispatch runs and store operations. Output is either a
//! human readable layer or one JSON object per event, selected by
//! [`LoggingConfig`]. `RUST_LOG` takes precedence over the configured level.

use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::execution::task::TaskFailure;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process
///
/// Later calls are no-ops. If the host application already installed a global
/// subscriber, that subscriber is kept.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = build_filter(&config.level);

        let layer = match config.format {
            LogFormat::Pretty => fmt::layer()
                .with_target(true)
                .with_thread_names(config.with_thread_names)
                .with_level(true)
                .with_ansi(true)
                .boxed(),
            LogFormat::Json => fmt::layer()
                .with_target(true)
                .with_thread_names(config.with_thread_names)
                .with_level(true)
                .with_ansi(false)
                .json()
                .boxed(),
        };

        // try_init: a global subscriber may already be set by the host application
        if tracing_subscriber::registry()
            .with(layer.with_filter(filter))
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - keeping it");
        }

        tracing::info!(
            level = %config.level,
            format = ?config.format,
            pid = std::process::id(),
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Log structured data for a dispatch run
pub fn log_dispatch_operation(
    mode: &str,
    items: usize,
    processes: usize,
    batches: Option<usize>,
    status: &str,
    elapsed_ms: Option<u128>,
) {
    tracing::info!(
        mode = %mode,
        items = items,
        processes = processes,
        batches = batches,
        status = %status,
        elapsed_ms = elapsed_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "🌀 DISPATCH_OPERATION"
    );
}

/// Log a failed item with the originating error text
pub fn log_task_failure(failure: &TaskFailure) {
    tracing::warn!(
        index = failure.index,
        kind = %failure.kind,
        error = %failure.message,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ TASK_FAILED"
    );
}

/// Log structured data for scratch and store file operations
pub fn log_storage_operation(operation: &str, path: &str, count: usize, status: &str) {
    tracing::debug!(
        operation = %operation,
        path = %path,
        count = count,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "💾 STORAGE_OPERATION"
    );
}
