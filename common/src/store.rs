//! Object store seam
//!
//! The pipeline depends on exactly one capability of the remote side: storing a byte stream
//! under a key. [`S3Store`] provides it on top of the AWS SDK; tests use an in-memory double.

use anyhow::{Context, anyhow};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::credentials::CredentialSource;

/// Bodies up to this size are sent with a single `PutObject`, larger ones as multipart uploads
/// made of parts of this size (S3 requires at least 5 MiB for every part but the last).
pub const PART_SIZE: usize = 8 * 1024 * 1024;

#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores everything read from `body` under `bucket`/`key`, returns the number of bytes sent.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> anyhow::Result<u64>;
}

pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    #[must_use]
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Builds a client for `region` with the given credentials. No request is made here.
    pub async fn connect(region: &str, credentials: &CredentialSource) -> Self {
        let loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(region.to_string()));
        let loader = match credentials {
            CredentialSource::Static {
                access_key,
                secret_key,
            } => loader.credentials_provider(aws_sdk_s3::config::Credentials::new(
                access_key, secret_key, None, None, "s3cp",
            )),
            CredentialSource::Profile(name) => loader.profile_name(name),
        };
        let sdk_config = loader.load().await;
        tracing::debug!("s3 client configured for region {}", region);
        Self::new(aws_sdk_s3::Client::new(&sdk_config))
    }

    async fn put_multipart(
        &self,
        bucket: &str,
        key: &str,
        first_part: Vec<u8>,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> anyhow::Result<u64> {
        let upload = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("failed starting multipart upload of {key:?}"))?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| anyhow!("no upload id returned for {key:?}"))?
            .to_string();
        match self
            .upload_parts(bucket, key, &upload_id, first_part, body)
            .await
        {
            Ok(sent) => Ok(sent),
            Err(error) => {
                // a failed abort is only logged, the part upload error is returned
                if let Err(abort_error) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    tracing::warn!(
                        "failed aborting multipart upload {} of {:?}: {}",
                        upload_id,
                        key,
                        abort_error
                    );
                }
                Err(error)
            }
        }
    }

    async fn upload_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        first_part: Vec<u8>,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> anyhow::Result<u64> {
        let mut completed_parts = Vec::new();
        let mut part = first_part;
        let mut part_number = 1;
        let mut sent = 0u64;
        loop {
            let part_len = part.len() as u64;
            tracing::debug!("uploading part {} of {:?} ({} bytes)", part_number, key, part_len);
            let response = self
                .client
                .upload_part()
                .bucket(bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(part))
                .send()
                .await
                .with_context(|| format!("failed uploading part {part_number} of {key:?}"))?;
            completed_parts.push(
                CompletedPart::builder()
                    .set_e_tag(response.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            sent += part_len;
            part = read_part(body).await?;
            if part.is_empty() {
                break;
            }
            part_number += 1;
        }
        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .with_context(|| format!("failed completing multipart upload of {key:?}"))?;
        Ok(sent)
    }
}

/// Fills a buffer of up to [`PART_SIZE`] bytes, short only at end of stream.
async fn read_part(body: &mut (dyn AsyncRead + Unpin + Send)) -> anyhow::Result<Vec<u8>> {
    let mut part = Vec::with_capacity(PART_SIZE);
    let mut limited = body.take(PART_SIZE as u64);
    limited
        .read_to_end(&mut part)
        .await
        .context("failed reading source data")?;
    Ok(part)
}

#[async_trait::async_trait]
impl ObjectStore for S3Store {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &mut (dyn AsyncRead + Unpin + Send),
    ) -> anyhow::Result<u64> {
        let first_part = read_part(body).await?;
        if first_part.len() < PART_SIZE {
            let size = first_part.len() as u64;
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(ByteStream::from(first_part))
                .send()
                .await
                .with_context(|| format!("failed putting object {key:?}"))?;
            return Ok(size);
        }
        self.put_multipart(bucket, key, first_part, body).await
    }
}
