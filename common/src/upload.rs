use tracing::instrument;

use crate::config::TransferConfig;
use crate::error::Error;
use crate::progress;
use crate::store::ObjectStore;
use crate::walk::UploadTask;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub bytes_uploaded: u64,
    pub files_uploaded: usize,
    pub directories_walked: usize,
    pub entries_skipped: usize,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "bytes uploaded: {}\n\
            files uploaded: {}\n\
            directories walked: {}\n\
            entries skipped: {}",
            bytesize::ByteSize(self.bytes_uploaded),
            self.files_uploaded,
            self.directories_walked,
            self.entries_skipped,
        )
    }
}

/// Resolves the key of a single uploaded file: a destination that is empty or ends with `/`
/// names a "directory" and gets the source file name appended, anything else is used as is.
pub fn resolve_single_key(src: &std::path::Path, dst: &str) -> Result<String, Error> {
    if !dst.is_empty() && !dst.ends_with('/') {
        return Ok(dst.to_string());
    }
    let file_name = src
        .file_name()
        .ok_or_else(|| Error::Configuration(format!("source path {src:?} has no file name")))?;
    let file_name = file_name
        .to_str()
        .ok_or_else(|| Error::NonUtf8Path(src.to_path_buf()))?;
    Ok(format!("{dst}{file_name}"))
}

/// Opens the task's source, checks it is not a directory, and streams it through the limiter
/// into the store. Returns the number of bytes uploaded.
#[instrument(skip(store, limiter, prog_track))]
pub async fn upload_task(
    prog_track: &progress::Progress,
    store: &dyn ObjectStore,
    bucket: &str,
    task: &UploadTask,
    limiter: &mut throttle::Limiter,
) -> Result<u64, Error> {
    let _guard = prog_track.uploads.guard();
    let source_error = |source| Error::Source {
        path: task.source.clone(),
        source,
    };
    let file = tokio::fs::File::open(&task.source)
        .await
        .map_err(source_error)?;
    let metadata = file.metadata().await.map_err(source_error)?;
    if metadata.is_dir() {
        return Err(Error::SourceIsDirectory(task.source.clone()));
    }
    if !metadata.is_file() {
        return Err(Error::NotRegularFile(task.source.clone()));
    }
    tracing::debug!("uploading {} bytes", metadata.len());
    let mut reader = throttle::ThrottledReader::new(file, limiter);
    let sent = store
        .put(bucket, &task.key, &mut reader)
        .await
        .map_err(|source| Error::Upload {
            path: task.source.clone(),
            key: task.key.clone(),
            source,
        })?;
    tracing::info!("uploaded {:?} to {}/{} ({} bytes)", task.source, bucket, task.key, sent);
    prog_track.files_uploaded.inc();
    prog_track.bytes_uploaded.add(sent);
    Ok(sent)
}

/// Uploads one regular file.
///
/// The source is checked before the store is touched: a missing path fails with
/// [`Error::Source`], a directory with [`Error::SourceIsDirectory`] and anything else that is
/// not a regular file with [`Error::NotRegularFile`].
#[instrument(skip(store, config, prog_track))]
pub async fn upload_single(
    prog_track: &progress::Progress,
    store: &dyn ObjectStore,
    config: &TransferConfig,
    src: &std::path::Path,
    dst: &str,
) -> Result<Summary, Error> {
    let metadata = tokio::fs::metadata(src)
        .await
        .map_err(|source| Error::Source {
            path: src.to_path_buf(),
            source,
        })?;
    if metadata.is_dir() {
        return Err(Error::SourceIsDirectory(src.to_path_buf()));
    }
    // devices, FIFOs and sockets could block or never end
    if !metadata.is_file() {
        return Err(Error::NotRegularFile(src.to_path_buf()));
    }
    let task = UploadTask {
        source: src.to_path_buf(),
        key: resolve_single_key(src, dst)?,
    };
    prog_track.files_discovered.inc();
    let mut limiter = config.limiter();
    let bytes_uploaded = upload_task(prog_track, store, &config.bucket, &task, &mut limiter).await?;
    Ok(Summary {
        bytes_uploaded,
        files_uploaded: 1,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{self, MemoryStore};
    use tracing_test::traced_test;

    static PROGRESS: std::sync::LazyLock<progress::Progress> =
        std::sync::LazyLock::new(progress::Progress::new);

    #[test]
    fn single_key_resolution() {
        let src = std::path::Path::new("/data/report.csv");
        assert_eq!(resolve_single_key(src, "reports/q1.csv").unwrap(), "reports/q1.csv");
        assert_eq!(resolve_single_key(src, "reports/").unwrap(), "reports/report.csv");
        assert_eq!(resolve_single_key(src, "").unwrap(), "report.csv");
    }

    #[tokio::test]
    #[traced_test]
    async fn uploads_file_contents() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let src = tmp_dir.path().join("hello.txt");
        tokio::fs::write(&src, "hello world").await?;
        let store = MemoryStore::new();
        let summary = upload_single(
            &PROGRESS,
            &store,
            &testutils::transfer_config(),
            &src,
            "greetings/",
        )
        .await?;
        assert_eq!(summary.files_uploaded, 1);
        assert_eq!(summary.bytes_uploaded, 11);
        assert_eq!(
            store.object("greetings/hello.txt").as_deref(),
            Some(&b"hello world"[..])
        );
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_source_fails_before_any_store_call() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let store = MemoryStore::new();
        let error = upload_single(
            &PROGRESS,
            &store,
            &testutils::transfer_config(),
            &tmp_dir.path().join("missing.txt"),
            "key",
        )
        .await
        .unwrap_err();
        match error {
            Error::Source { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.attempts().is_empty());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn directory_source_is_rejected() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let store = MemoryStore::new();
        let error = upload_single(
            &PROGRESS,
            &store,
            &testutils::transfer_config(),
            tmp_dir.path(),
            "key",
        )
        .await
        .unwrap_err();
        assert!(matches!(error, Error::SourceIsDirectory(_)), "{error}");
        assert!(store.attempts().is_empty());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn device_source_is_rejected() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let error = upload_single(
            &PROGRESS,
            &store,
            &testutils::transfer_config(),
            std::path::Path::new("/dev/null"),
            "k/",
        )
        .await
        .unwrap_err();
        assert!(matches!(error, Error::NotRegularFile(_)), "{error}");
        assert!(store.attempts().is_empty());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn task_pointing_at_directory_is_rejected() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let store = MemoryStore::new();
        let task = UploadTask {
            source: tmp_dir.path().to_path_buf(),
            key: "key".to_string(),
        };
        let mut limiter = testutils::transfer_config().limiter();
        let error = upload_task(&PROGRESS, &store, "bucket", &task, &mut limiter)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::SourceIsDirectory(_)), "{error}");
        assert!(store.attempts().is_empty());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn store_failure_is_an_upload_error() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let src = tmp_dir.path().join("a.txt");
        tokio::fs::write(&src, "a").await?;
        let store = MemoryStore::failing_on("a.txt");
        let error = upload_single(&PROGRESS, &store, &testutils::transfer_config(), &src, "a.txt")
            .await
            .unwrap_err();
        match error {
            Error::Upload { key, .. } => assert_eq!(key, "a.txt"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.attempts(), vec!["a.txt".to_string()]);
        Ok(())
    }
}
