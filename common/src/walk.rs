use async_recursion::async_recursion;
use tracing::instrument;

use crate::error::Error;
use crate::progress;

/// Capacity of the queue between the walker and the uploader.
pub const QUEUE_CAPACITY: usize = 1024;

/// A regular file waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTask {
    pub source: std::path::PathBuf,
    pub key: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub files_found: usize,
    pub directories_walked: usize,
    pub entries_skipped: usize,
}

impl std::ops::Add for WalkSummary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            files_found: self.files_found + other.files_found,
            directories_walked: self.directories_walked + other.directories_walked,
            entries_skipped: self.entries_skipped + other.entries_skipped,
        }
    }
}

/// Outcome of a walk, delivered exactly once on the completion channel.
pub type WalkResult = Result<WalkSummary, Error>;

/// Builds the object key for a file found under the walked root.
///
/// Exactly one trailing `/` is stripped from `prefix` and the relative path components are
/// joined with `/`: `"backup/"` + `logs/app.log` gives `"backup/logs/app.log"`. An empty prefix
/// yields the bare relative path.
pub fn destination_key(prefix: &str, relative: &std::path::Path) -> Result<String, Error> {
    let mut components = Vec::new();
    for component in relative.components() {
        match component {
            std::path::Component::Normal(name) => components.push(
                name.to_str()
                    .ok_or_else(|| Error::NonUtf8Path(relative.to_path_buf()))?,
            ),
            std::path::Component::CurDir => {}
            _ => {
                return Err(Error::Configuration(format!(
                    "unexpected path component in {relative:?}"
                )));
            }
        }
    }
    let relative = components.join("/");
    let prefix = prefix.strip_suffix('/').unwrap_or(prefix);
    if prefix.is_empty() {
        return Ok(relative);
    }
    Ok(format!("{prefix}/{relative}"))
}

/// Walks `root` and queues an [`UploadTask`] for every regular file below it.
///
/// The walk stops at the first I/O error, or as soon as the queue is closed by the consumer.
/// Its result is sent on `done` before the queue sender is dropped, so once the consumer sees
/// the queue closed and empty the completion value is already available.
#[instrument(skip(tasks, done, prog_track))]
pub async fn walk(
    prog_track: &'static progress::Progress,
    root: std::path::PathBuf,
    prefix: String,
    tasks: async_channel::Sender<UploadTask>,
    done: tokio::sync::oneshot::Sender<WalkResult>,
) {
    let result = walk_dir(prog_track, &root, &root, &prefix, &tasks).await;
    match &result {
        Ok(summary) => tracing::debug!("walk finished: {:?}", summary),
        Err(error) => tracing::debug!("walk failed: {:#}", error),
    }
    if done.send(result).is_err() {
        tracing::debug!("consumer is gone, dropping walk result");
    }
    drop(tasks);
}

#[async_recursion]
async fn walk_dir(
    prog_track: &'static progress::Progress,
    root: &std::path::Path,
    dir: &std::path::Path,
    prefix: &str,
    tasks: &async_channel::Sender<UploadTask>,
) -> WalkResult {
    tracing::debug!("walking {:?}", dir);
    let traversal_error = |source| Error::Traversal {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(traversal_error)?;
    let mut summary = WalkSummary {
        directories_walked: 1,
        ..Default::default()
    };
    while let Some(entry) = entries.next_entry().await.map_err(traversal_error)? {
        let entry_path = entry.path();
        // does not follow symlinks
        let file_type = entry.file_type().await.map_err(|source| Error::Traversal {
            path: entry_path.clone(),
            source,
        })?;
        if file_type.is_dir() {
            summary = summary + walk_dir(prog_track, root, &entry_path, prefix, tasks).await?;
            continue;
        }
        if !file_type.is_file() {
            tracing::warn!("skipping {:?}, not a regular file", entry_path);
            summary.entries_skipped += 1;
            continue;
        }
        let relative = entry_path
            .strip_prefix(root)
            .map_err(|_| Error::Aborted(format!("{entry_path:?} is outside of {root:?}")))?;
        let task = UploadTask {
            key: destination_key(prefix, relative)?,
            source: entry_path.clone(),
        };
        tracing::debug!("queueing {:?} as {:?}", task.source, task.key);
        // blocks while the queue is full
        tasks
            .send(task)
            .await
            .map_err(|_| Error::Aborted("upload queue closed".to_string()))?;
        prog_track.files_discovered.inc();
        summary.files_found += 1;
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils;
    use tracing_test::traced_test;

    static PROGRESS: std::sync::LazyLock<progress::Progress> =
        std::sync::LazyLock::new(progress::Progress::new);

    async fn collect(
        root: &std::path::Path,
        prefix: &str,
    ) -> (Vec<UploadTask>, WalkResult) {
        let (tx, rx) = async_channel::bounded(QUEUE_CAPACITY);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        walk(&PROGRESS, root.to_path_buf(), prefix.to_string(), tx, done_tx).await;
        let mut tasks = Vec::new();
        while let Ok(task) = rx.recv().await {
            tasks.push(task);
        }
        let result = done_rx.await.expect("walker always reports");
        tasks.sort_by(|a, b| a.key.cmp(&b.key));
        (tasks, result)
    }

    #[test]
    fn key_strips_one_trailing_separator() {
        let relative = std::path::Path::new("logs/app.log");
        assert_eq!(
            destination_key("backup/", relative).unwrap(),
            "backup/logs/app.log"
        );
        assert_eq!(
            destination_key("backup", relative).unwrap(),
            "backup/logs/app.log"
        );
        assert_eq!(
            destination_key("backup//", relative).unwrap(),
            "backup//logs/app.log"
        );
        assert_eq!(destination_key("", relative).unwrap(), "logs/app.log");
        assert_eq!(destination_key("/", relative).unwrap(), "logs/app.log");
    }

    #[test]
    fn key_rejects_escaping_paths() {
        assert!(destination_key("backup", std::path::Path::new("../etc/passwd")).is_err());
    }

    #[tokio::test]
    #[traced_test]
    async fn every_regular_file_becomes_one_task() -> anyhow::Result<()> {
        let tmp_dir = testutils::setup_test_dir().await?;
        let (tasks, result) = collect(&tmp_dir.path().join("foo"), "backup/").await;
        let summary = result?;
        let keys: Vec<&str> = tasks.iter().map(|task| task.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "backup/0.txt",
                "backup/bar/1.txt",
                "backup/bar/2.txt",
                "backup/bar/3.txt",
                "backup/baz/4.txt",
            ]
        );
        assert_eq!(summary.files_found, 5);
        // foo, bar, baz, baz/empty
        assert_eq!(summary.directories_walked, 4);
        // the two symlinks in baz
        assert_eq!(summary.entries_skipped, 2);
        for task in &tasks {
            assert!(task.source.is_file());
        }
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn empty_tree_produces_no_tasks() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        tokio::fs::create_dir_all(tmp_dir.path().join("a/b/c")).await?;
        let (tasks, result) = collect(tmp_dir.path(), "prefix").await;
        assert!(tasks.is_empty());
        assert_eq!(result?.directories_walked, 4);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_root_reports_traversal_error() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let (tasks, result) = collect(&tmp_dir.path().join("nope"), "prefix").await;
        assert!(tasks.is_empty());
        assert!(matches!(result, Err(Error::Traversal { .. })));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn error_mid_walk_stops_queueing() -> anyhow::Result<()> {
        use std::os::unix::ffi::OsStrExt;
        let tmp_dir = tempfile::tempdir()?;
        let bad_name = std::ffi::OsStr::from_bytes(b"bad\xff.txt");
        tokio::fs::write(tmp_dir.path().join(bad_name), "x").await?;
        for i in 0..20 {
            tokio::fs::write(tmp_dir.path().join(format!("{i}.txt")), "x").await?;
        }
        // the walker sees entries in the same order as a fresh read_dir of the unchanged directory
        let mut expected = Vec::new();
        for entry in std::fs::read_dir(tmp_dir.path())? {
            let name = entry?.file_name();
            if name == bad_name {
                break;
            }
            expected.push(format!("prefix/{}", name.to_string_lossy()));
        }
        expected.sort();
        let (tasks, result) = collect(tmp_dir.path(), "prefix").await;
        assert!(matches!(result, Err(Error::NonUtf8Path(_))), "{result:?}");
        let keys: Vec<String> = tasks.into_iter().map(|task| task.key).collect();
        assert_eq!(keys, expected);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn closed_queue_stops_the_walk() -> anyhow::Result<()> {
        let tmp_dir = testutils::setup_test_dir().await?;
        let (tx, rx) = async_channel::bounded(1);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        rx.close();
        walk(
            &PROGRESS,
            tmp_dir.path().join("foo"),
            String::new(),
            tx,
            done_tx,
        )
        .await;
        assert!(matches!(done_rx.await?, Err(Error::Aborted(_))));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn walker_waits_for_room_in_the_queue() -> anyhow::Result<()> {
        let tmp_dir = testutils::setup_test_dir().await?;
        let (tx, rx) = async_channel::bounded(1);
        let (done_tx, mut done_rx) = tokio::sync::oneshot::channel();
        let walker = tokio::spawn(walk(
            &PROGRESS,
            tmp_dir.path().join("foo"),
            String::new(),
            tx,
            done_tx,
        ));
        // nothing is lost while the consumer lags behind
        let mut received = 0;
        while let Ok(_task) = rx.recv().await {
            tokio::task::yield_now().await;
            received += 1;
        }
        walker.await?;
        assert_eq!(received, 5);
        assert_eq!(done_rx.try_recv()??.files_found, 5);
        Ok(())
    }
}
