use crate::credentials::CredentialsError;

/// Errors terminating an upload.
///
/// Any of these aborts the whole invocation: nothing is retried and no further uploads are
/// attempted once one is returned.
///
/// # Logging Convention
/// `Upload` keeps the store error as an `anyhow::Error`; its Display prints the full chain
/// so the error can be logged with `{}` or `{:#}` alike.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("failed walking {path:?}: {source}")]
    Traversal {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read source {path:?}: {source}")]
    Source {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("source {0:?} is a directory, use --recursive to upload its contents")]
    SourceIsDirectory(std::path::PathBuf),
    #[error("source {0:?} is not a regular file")]
    NotRegularFile(std::path::PathBuf),
    #[error("path {0:?} is not valid UTF-8 and cannot be used as an object key")]
    NonUtf8Path(std::path::PathBuf),
    #[error("failed uploading {path:?} to {key:?}: {source:#}")]
    Upload {
        path: std::path::PathBuf,
        key: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("upload aborted: {0}")]
    Aborted(String),
}
