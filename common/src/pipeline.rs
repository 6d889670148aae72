//! Recursive upload: one walker task producing [`UploadTask`]s and the calling task consuming
//! them, one upload at a time, under a single rate limiter.
//!
//! The two sides share only the bounded queue and the one-shot completion channel. The walker
//! reports its outcome and then closes the queue; the consumer treats "queue closed and empty"
//! as the end of a successful run, while a walk error on the completion channel aborts at once,
//! even if tasks are still queued.

use tracing::instrument;

use crate::config::TransferConfig;
use crate::error::Error;
use crate::progress;
use crate::store::ObjectStore;
use crate::upload::{self, Summary};
use crate::walk::{self, UploadTask, WalkResult, WalkSummary};

/// Uploads every regular file under `root` to `prefix`. A `root` that is not a directory is
/// uploaded as a single file.
#[instrument(skip(prog_track, store, config))]
pub async fn upload_tree(
    prog_track: &'static progress::Progress,
    store: &dyn ObjectStore,
    config: &TransferConfig,
    root: &std::path::Path,
    prefix: &str,
) -> Result<Summary, Error> {
    let root_metadata = tokio::fs::metadata(root)
        .await
        .map_err(|source| Error::Source {
            path: root.to_path_buf(),
            source,
        })?;
    if !root_metadata.is_dir() {
        tracing::info!("{:?} is not a directory, uploading it as a single file", root);
        return upload::upload_single(prog_track, store, config, root, prefix).await;
    }
    let (tasks_tx, tasks_rx) = async_channel::bounded(walk::QUEUE_CAPACITY);
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let walker = tokio::spawn(walk::walk(
        prog_track,
        root.to_path_buf(),
        prefix.to_string(),
        tasks_tx,
        done_tx,
    ));
    match consume(prog_track, store, config, tasks_rx, done_rx).await {
        Ok(summary) => {
            walker
                .await
                .map_err(|error| Error::Aborted(format!("directory walk failed: {error}")))?;
            Ok(summary)
        }
        Err(error) => {
            tracing::debug!("upload of {:?} failed: {}", root, &error);
            walker.abort();
            Err(error)
        }
    }
}

fn walk_outcome(
    outcome: Result<WalkResult, tokio::sync::oneshot::error::RecvError>,
) -> Result<WalkSummary, Error> {
    outcome.unwrap_or_else(|_| {
        Err(Error::Aborted(
            "directory walk ended without reporting a result".to_string(),
        ))
    })
}

async fn consume(
    prog_track: &progress::Progress,
    store: &dyn ObjectStore,
    config: &TransferConfig,
    tasks: async_channel::Receiver<UploadTask>,
    mut done: tokio::sync::oneshot::Receiver<WalkResult>,
) -> Result<Summary, Error> {
    let mut limiter = config.limiter();
    let mut summary = Summary::default();
    let mut walk_summary: Option<WalkSummary> = None;
    loop {
        tokio::select! {
            // a failed walk pre-empts draining, a successful one only lets the queue run dry
            biased;
            outcome = &mut done, if walk_summary.is_none() => {
                walk_summary = Some(walk_outcome(outcome)?);
                tracing::debug!("walk completed, draining remaining uploads");
            }
            task = tasks.recv() => {
                let Ok(task) = task else {
                    break;
                };
                let bytes =
                    upload::upload_task(prog_track, store, &config.bucket, &task, &mut limiter)
                        .await?;
                summary.files_uploaded += 1;
                summary.bytes_uploaded += bytes;
            }
        }
    }
    // the walker reports before it closes the queue, so this never waits
    let walk_summary = match walk_summary {
        Some(walk_summary) => walk_summary,
        None => walk_outcome(done.await)?,
    };
    Ok(Summary {
        directories_walked: walk_summary.directories_walked,
        entries_skipped: walk_summary.entries_skipped,
        ..summary
    })
}
