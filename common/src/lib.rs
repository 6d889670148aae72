//! Common library for uploading local files to S3
//!
//! This crate provides the building blocks of the `s3cp` tool: a recursive directory walker
//! feeding a bounded queue, a sequential upload consumer streaming every file through a shared
//! rate limiter, the S3 object store, and the process harness used by the binary.
//!
//! # Core Modules
//!
//! - [`walk`] - Directory traversal producing upload tasks
//! - [`upload`] - Single file upload and the upload [`Summary`]
//! - [`pipeline`] - Walker / uploader pipeline with one-shot completion signalling
//! - [`store`] - Object store trait and the S3 implementation
//! - [`credentials`] - Credential source resolution
//! - [`progress`] - Progress tracking and reporting
//!
//! # Pipeline
//!
//! A recursive upload spawns a walker task that sends one [`walk::UploadTask`] per regular file
//! into a bounded queue ([`walk::QUEUE_CAPACITY`] entries) and reports its outcome exactly once
//! on a completion channel before closing the queue. The calling task consumes the queue one
//! upload at a time:
//!
//! - a walk error aborts the run immediately, even with tasks still queued
//! - a successful walk lets the consumer drain the queue until it is closed and empty
//! - the first failed upload drops the queue and cancels the walker
//!
//! Symbolic links and other non-regular entries are skipped, never followed.
//!
//! # Rate Limiting
//!
//! All bytes of a run go through a single [`throttle::Limiter`], so the configured rate caps
//! the whole invocation rather than each file.
//!
//! # Progress Reporting
//!
//! Progress is tracked in a process-wide [`progress::Progress`] instance and, when requested,
//! rendered by [`run`] either as an animated bar or as periodic text updates on stderr.
//!
//! # Examples
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), common::Error> {
//! let config = common::TransferConfig {
//!     bucket: "my-bucket".to_string(),
//!     region: "ap-northeast-1".to_string(),
//!     credentials: common::credentials::CredentialSource::Profile("default".to_string()),
//!     max_rate: throttle::DEFAULT_RATE,
//!     burst: throttle::DEFAULT_BURST,
//! };
//! let store = common::store::S3Store::connect(&config.region, &config.credentials).await;
//! let summary = common::upload_tree(
//!     &store,
//!     &config,
//!     std::path::Path::new("/var/log/app"),
//!     "backup/",
//! )
//! .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

pub mod config;
pub mod credentials;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod upload;
pub mod walk;

#[cfg(test)]
mod testutils;

pub use config::{OutputConfig, RuntimeConfig, TransferConfig};
pub use error::Error;
pub use progress::{ProgressSettings, ProgressType};
pub use upload::Summary;

static PROGRESS: std::sync::LazyLock<progress::Progress> =
    std::sync::LazyLock::new(progress::Progress::new);

/// Uploads every regular file under `root`, keyed under `prefix`.
pub async fn upload_tree(
    store: &dyn store::ObjectStore,
    config: &TransferConfig,
    root: &std::path::Path,
    prefix: &str,
) -> Result<Summary, Error> {
    pipeline::upload_tree(&PROGRESS, store, config, root, prefix).await
}

/// Uploads a single regular file to `dst` (or into `dst` when it ends with `/`).
pub async fn upload_single(
    store: &dyn store::ObjectStore,
    config: &TransferConfig,
    src: &std::path::Path,
    dst: &str,
) -> Result<Summary, Error> {
    upload::upload_single(&PROGRESS, store, config, src, dst).await
}

fn init_tracing(output: &OutputConfig) {
    let level = match output.verbose {
        0 if output.quiet => "off",
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        eprintln!("tracing subscriber already installed");
    }
}

fn print_progress(progress_type: ProgressType, delay: std::time::Duration, stop: &AtomicBool) {
    let mut printer = progress::ProgressPrinter::new(&PROGRESS);
    match progress_type.resolve() {
        ProgressType::TextUpdates => {
            while !stop.load(Ordering::Acquire) {
                std::thread::park_timeout(delay);
                eprintln!("{}", printer.print());
            }
        }
        _ => {
            let bar = indicatif::ProgressBar::new_spinner();
            while !stop.load(Ordering::Acquire) {
                bar.set_message(printer.print());
                bar.tick();
                std::thread::park_timeout(delay);
            }
            bar.finish_and_clear();
        }
    }
}

/// Runs `func` on a freshly built tokio runtime with logging and progress reporting set up.
///
/// Returns `None` if `func` failed or the runtime could not be started; the error is printed
/// to stderr unless `output.quiet` is set.
pub fn run<Fut, Summary, E>(
    progress: Option<ProgressSettings>,
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    E: std::fmt::Display,
    Fut: std::future::Future<Output = Result<Summary, E>>,
{
    init_tracing(&output);
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let tokio_runtime = match builder.build() {
        Ok(tokio_runtime) => tokio_runtime,
        Err(error) => {
            if !output.quiet {
                eprintln!("failed to start tokio runtime: {error}");
            }
            return None;
        }
    };
    let progress_delay = match progress.as_ref().map(ProgressSettings::delay).transpose() {
        Ok(delay) => delay,
        Err(error) => {
            if !output.quiet {
                eprintln!("invalid --progress-delay: {error:#}");
            }
            return None;
        }
    };
    let stop = std::sync::Arc::new(AtomicBool::new(false));
    let printer = match (progress, progress_delay) {
        (Some(settings), Some(delay)) => {
            let stop = stop.clone();
            Some(std::thread::spawn(move || {
                print_progress(settings.progress_type, delay, &stop)
            }))
        }
        _ => None,
    };
    let res = tokio_runtime.block_on(func());
    stop.store(true, Ordering::Release);
    if let Some(printer) = printer {
        printer.thread().unpark();
        if printer.join().is_err() {
            tracing::debug!("progress printer panicked");
        }
    }
    match res {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
                println!(
                    "walltime: {}",
                    humantime::format_duration(std::time::Duration::from_millis(
                        PROGRESS.get_duration().as_millis() as u64
                    ))
                );
            }
            Some(summary)
        }
        Err(error) => {
            if !output.quiet {
                eprintln!("{error:#}");
            }
            None
        }
    }
}
