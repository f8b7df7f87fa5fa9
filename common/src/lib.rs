//! Shared building blocks for `rtcmp`: runtime bootstrap, line diffing and report summaries.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod linediff;
pub mod report;

pub use config::{OutputConfig, RuntimeConfig, TracingConfig};
pub use report::{EntryKind, ReportWriter, Summary};

fn init_tracing(output: &OutputConfig, tracing_config: &TracingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(output.level_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    // a subscriber may already be installed (e.g. by a test harness), that's fine
    let _ = match &tracing_config.debug_log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open debug log file: {:?}", path))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    Ok(())
}

fn build_runtime(runtime: &RuntimeConfig) -> anyhow::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    builder.build().context("Failed to create tokio runtime")
}

/// Sets up tracing and a tokio runtime, then drives `func` to completion.
///
/// Returns `None` if anything failed; the error chain is printed to stderr unless `quiet` is set.
pub fn run<Fut, T>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    tracing_config: TracingConfig,
    func: impl FnOnce() -> Fut,
) -> Option<T>
where
    Fut: std::future::Future<Output = anyhow::Result<T>>,
{
    let res = init_tracing(&output, &tracing_config)
        .and_then(|()| build_runtime(&runtime))
        .and_then(|runtime| runtime.block_on(func()));
    match res {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::error!("{:#}", err);
            if !output.quiet {
                eprintln!("{:#}", err);
            }
            None
        }
    }
}
