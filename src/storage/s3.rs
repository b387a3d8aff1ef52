//! S3-compatible object store client.
//!
//! Talks to AWS S3 or any S3-compatible service (MinIO, Ceph RGW, ...)
//! through `aws-sdk-s3`.  Objects are written to a single bucket under
//! their literal keys; there is no prefix convention.
//!
//! Uploads no larger than one part go out as a single `PutObject`.
//! Anything bigger is split into `part_size` chunks and sent through the
//! multipart API with at most `concurrency` parts in flight.  A failed
//! multipart upload is aborted so no dangling parts are billed.

use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::io::Cursor;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::backend::{ObjectMetadata, ObjectStore, StoreError, StoreFuture, UploadSource};
use crate::config::S3Config;

/// Error code S3 reports for a key that is already gone.
const NO_SUCH_KEY: &str = "NoSuchKey";

/// Object store backed by an S3 bucket.
pub struct S3Store {
    /// AWS S3 SDK client.
    client: Client,
    /// Target bucket.
    bucket: String,
    /// Size of each multipart chunk in bytes.
    part_size: usize,
    /// Maximum number of parts uploaded at once.
    concurrency: usize,
    /// Per-operation timeout applied by the SDK.
    timeout: Duration,
}

impl S3Store {
    /// Create a new S3 client from the storage configuration.
    ///
    /// Explicit credentials are used when both the key ID and secret are
    /// set; otherwise the standard AWS credential chain applies.
    pub async fn new(config: &S3Config) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .timeout_config(
                aws_config::timeout::TimeoutConfig::builder()
                    .operation_timeout(timeout)
                    .build(),
            );

        if let Some(endpoint) = endpoint_url(&config.endpoint, config.disable_ssl) {
            config_loader = config_loader.endpoint_url(endpoint);
        }

        if !config.access_key_id.is_empty() && !config.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "makaroni-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;

        let s3_config_builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style);

        let client = Client::from_conf(s3_config_builder.build());

        info!(
            "S3 object store initialized: bucket={} endpoint='{}' path_style={} part_size={} concurrency={}",
            config.bucket, config.endpoint, config.path_style, config.part_size, config.concurrency
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            part_size: config.part_size as usize,
            concurrency: config.concurrency.max(1),
            timeout,
        })
    }

    async fn upload(
        &self,
        key: &str,
        source: UploadSource,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> Result<(), StoreError> {
        let mut reader: Box<dyn AsyncRead + Send + Unpin> = match source {
            UploadSource::Bytes(data) if data.len() <= self.part_size => {
                return self.put_single(key, data, content_type, metadata).await;
            }
            UploadSource::Bytes(data) => Box::new(Cursor::new(data)),
            UploadSource::Reader { reader, .. } => reader,
        };

        let first = read_part(&mut reader, self.part_size)
            .await
            .map_err(|e| upload_failure(key.to_string(), e.into()))?;
        if first.len() < self.part_size {
            return self.put_single(key, first, content_type, metadata).await;
        }

        self.put_multipart(key, first, reader, content_type, metadata)
            .await
    }

    async fn put_single(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> Result<(), StoreError> {
        debug!(
            "S3 put_object: bucket={} key={} size={}",
            self.bucket,
            key,
            data.len()
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(Some(metadata.clone()))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| map_sdk_error("put_object", key, self.timeout, e, upload_failure))?;

        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        first: Bytes,
        reader: Box<dyn AsyncRead + Send + Unpin>,
        content_type: &str,
        metadata: &ObjectMetadata,
    ) -> Result<(), StoreError> {
        let create_resp = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .set_metadata(Some(metadata.clone()))
            .send()
            .await
            .map_err(|e| {
                map_sdk_error(
                    "create_multipart_upload",
                    key,
                    self.timeout,
                    e,
                    upload_failure,
                )
            })?;

        let upload_id = create_resp
            .upload_id()
            .ok_or_else(|| upload_failure(key.to_string(), anyhow::anyhow!("S3 did not return an upload ID")))?
            .to_string();

        debug!("S3 multipart upload started: key={} upload_id={}", key, upload_id);

        let result = async {
            let parts = self.upload_parts(key, &upload_id, first, reader).await?;
            self.complete_multipart(key, &upload_id, parts).await
        }
        .await;

        if let Err(ref e) = result {
            warn!(
                "Aborting S3 multipart upload {} for {} due to error: {}",
                upload_id, key, e
            );
            if let Err(abort_err) = self
                .client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .send()
                .await
            {
                warn!(
                    "Failed to abort S3 multipart upload {}: {}",
                    upload_id,
                    DisplayErrorContext(abort_err)
                );
            }
        }

        result
    }

    /// Read the remaining stream in `part_size` chunks and upload them,
    /// keeping at most `concurrency` parts in flight.
    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        first: Bytes,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Result<Vec<CompletedPart>, StoreError> {
        // Dropping the set aborts every outstanding part upload.
        let mut tasks: JoinSet<Result<CompletedPart, StoreError>> = JoinSet::new();
        let mut completed = Vec::new();
        let mut part_number: i32 = 1;
        let mut chunk = first;

        loop {
            while tasks.len() >= self.concurrency {
                if let Some(joined) = tasks.join_next().await {
                    completed.push(joined_part(key, joined)?);
                }
            }

            tasks.spawn(upload_part(
                self.client.clone(),
                self.bucket.clone(),
                key.to_string(),
                upload_id.to_string(),
                part_number,
                chunk,
                self.timeout,
            ));

            chunk = read_part(&mut reader, self.part_size)
                .await
                .map_err(|e| upload_failure(key.to_string(), e.into()))?;
            if chunk.is_empty() {
                break;
            }
            part_number += 1;
        }

        while let Some(joined) = tasks.join_next().await {
            completed.push(joined_part(key, joined)?);
        }

        completed.sort_by_key(|part| part.part_number());
        Ok(completed)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StoreError> {
        debug!(
            "S3 complete_multipart_upload: key={} upload_id={} parts={}",
            key,
            upload_id,
            parts.len()
        );

        let completed_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .map_err(|e| {
                map_sdk_error(
                    "complete_multipart_upload",
                    key,
                    self.timeout,
                    e,
                    upload_failure,
                )
            })?;

        Ok(())
    }

    async fn head(&self, key: &str) -> Result<ObjectMetadata, StoreError> {
        debug!("S3 head_object: bucket={} key={}", self.bucket, key);

        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => Ok(resp.metadata().cloned().unwrap_or_default()),
            Err(SdkError::TimeoutError(_)) => Err(StoreError::Timeout {
                operation: "head_object",
                key: key.to_string(),
                timeout: self.timeout,
            }),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Err(StoreError::NotFound {
                        key: key.to_string(),
                    })
                } else {
                    Err(StoreError::Metadata {
                        key: key.to_string(),
                        source: anyhow::anyhow!(
                            "S3 head_object: {}",
                            DisplayErrorContext(service_err)
                        ),
                    })
                }
            }
        }
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }

        debug!(
            "S3 delete_objects: bucket={} keys={:?}",
            self.bucket, keys
        );

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Delete(e.into()))?;

        // Quiet mode: the response only lists keys that failed.
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StoreError::Delete(e.into()))?;

        let resp = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| match e {
                SdkError::TimeoutError(_) => StoreError::Timeout {
                    operation: "delete_objects",
                    key: keys.join(","),
                    timeout: self.timeout,
                },
                other => StoreError::Delete(anyhow::anyhow!(
                    "S3 delete_objects: {}",
                    DisplayErrorContext(other)
                )),
            })?;

        let failed = count_delete_failures(resp.errors());

        if failed > 0 {
            return Err(StoreError::PartialDelete {
                failed,
                total: keys.len(),
            });
        }

        Ok(())
    }
}

/// Count the per-object errors of a batch delete that are real failures.
///
/// Keys S3 reports as `NoSuchKey` are already gone and do not count.
fn count_delete_failures(errors: &[aws_sdk_s3::types::Error]) -> usize {
    let mut failed = 0;
    for err in errors {
        let key = err.key().unwrap_or("<unknown>");
        let code = err.code().unwrap_or("");
        if code == NO_SUCH_KEY {
            debug!("S3 delete_objects: {} already absent", key);
            continue;
        }
        warn!(
            "S3 delete_objects: failed to delete {}: code={} message={}",
            key,
            code,
            err.message().unwrap_or("")
        );
        failed += 1;
    }
    failed
}

impl ObjectStore for S3Store {
    fn upload_content<'a>(
        &'a self,
        key: &'a str,
        source: UploadSource,
        content_type: &'a str,
        metadata: &'a ObjectMetadata,
    ) -> StoreFuture<'a, ()> {
        Box::pin(self.upload(key, source, content_type, metadata))
    }

    fn fetch_metadata<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMetadata> {
        Box::pin(self.head(key))
    }

    fn delete_objects<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, ()> {
        Box::pin(self.delete_batch(keys))
    }
}

// -- Helpers -----------------------------------------------------------------

/// Build the endpoint URL handed to the SDK.
///
/// A bare `host:port` gets `http://` when TLS is disabled and `https://`
/// otherwise.  An empty endpoint means "use the AWS default".
fn endpoint_url(endpoint: &str, disable_ssl: bool) -> Option<String> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return None;
    }
    if endpoint.contains("://") {
        return Some(endpoint.to_string());
    }
    let scheme = if disable_ssl { "http" } else { "https" };
    Some(format!("{scheme}://{endpoint}"))
}

/// Read up to `part_size` bytes.  A short result means end of stream.
async fn read_part<R>(reader: &mut R, part_size: usize) -> std::io::Result<Bytes>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = Vec::with_capacity(part_size);
    reader.take(part_size as u64).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

async fn upload_part(
    client: Client,
    bucket: String,
    key: String,
    upload_id: String,
    part_number: i32,
    data: Bytes,
    timeout: Duration,
) -> Result<CompletedPart, StoreError> {
    debug!(
        "S3 upload_part: key={} upload_id={} part={} size={}",
        key,
        upload_id,
        part_number,
        data.len()
    );

    let resp = client
        .upload_part()
        .bucket(&bucket)
        .key(&key)
        .upload_id(&upload_id)
        .part_number(part_number)
        .body(ByteStream::from(data))
        .send()
        .await
        .map_err(|e| map_sdk_error("upload_part", &key, timeout, e, upload_failure))?;

    Ok(CompletedPart::builder()
        .set_e_tag(resp.e_tag().map(str::to_string))
        .part_number(part_number)
        .build())
}

fn joined_part(
    key: &str,
    joined: Result<Result<CompletedPart, StoreError>, tokio::task::JoinError>,
) -> Result<CompletedPart, StoreError> {
    joined.map_err(|e| upload_failure(key.to_string(), e.into()))?
}

fn upload_failure(key: String, source: anyhow::Error) -> StoreError {
    StoreError::Upload { key, source }
}

/// Translate an SDK failure into a [`StoreError`].  Timeouts map to
/// [`StoreError::Timeout`]; everything else goes through `kind`.
fn map_sdk_error<E, R>(
    operation: &'static str,
    key: &str,
    timeout: Duration,
    err: SdkError<E, R>,
    kind: impl FnOnce(String, anyhow::Error) -> StoreError,
) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if matches!(err, SdkError::TimeoutError(_)) {
        return StoreError::Timeout {
            operation,
            key: key.to_string(),
            timeout,
        };
    }
    kind(
        key.to_string(),
        anyhow::anyhow!("S3 {operation}: {}", DisplayErrorContext(err)),
    )
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_empty_uses_default() {
        assert_eq!(endpoint_url("", false), None);
        assert_eq!(endpoint_url("   ", true), None);
    }

    #[test]
    fn test_endpoint_url_adds_scheme() {
        assert_eq!(
            endpoint_url("minio:9000", true).as_deref(),
            Some("http://minio:9000")
        );
        assert_eq!(
            endpoint_url("s3.example.com", false).as_deref(),
            Some("https://s3.example.com")
        );
    }

    #[test]
    fn test_endpoint_url_keeps_explicit_scheme() {
        assert_eq!(
            endpoint_url("http://localhost:9000", false).as_deref(),
            Some("http://localhost:9000")
        );
    }

    #[tokio::test]
    async fn test_read_part_chunks_stream() {
        let mut reader = Cursor::new(vec![7u8; 10]);

        let first = read_part(&mut reader, 4).await.unwrap();
        let second = read_part(&mut reader, 4).await.unwrap();
        let third = read_part(&mut reader, 4).await.unwrap();
        let fourth = read_part(&mut reader, 4).await.unwrap();

        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 4);
        assert_eq!(third.len(), 2);
        assert!(fourth.is_empty());
    }

    #[tokio::test]
    async fn test_read_part_short_stream() {
        let mut reader = Cursor::new(b"tiny".to_vec());
        let part = read_part(&mut reader, 1024).await.unwrap();
        assert_eq!(part, Bytes::from_static(b"tiny"));
    }

    #[test]
    fn test_joined_part_propagates_task_error() {
        let joined: Result<Result<CompletedPart, StoreError>, tokio::task::JoinError> =
            Ok(Err(StoreError::Upload {
                key: "k".to_string(),
                source: anyhow::anyhow!("network down"),
            }));
        let err = joined_part("k", joined).unwrap_err();
        assert!(matches!(err, StoreError::Upload { .. }));
    }

    fn delete_error(key: &str, code: &str) -> aws_sdk_s3::types::Error {
        aws_sdk_s3::types::Error::builder()
            .key(key)
            .code(code)
            .message("denied")
            .build()
    }

    #[test]
    fn test_count_delete_failures_empty() {
        assert_eq!(count_delete_failures(&[]), 0);
    }

    #[test]
    fn test_count_delete_failures_skips_missing_keys() {
        let errors = [
            delete_error("abc", NO_SUCH_KEY),
            delete_error("abc.html", NO_SUCH_KEY),
        ];
        assert_eq!(count_delete_failures(&errors), 0);
    }

    #[test]
    fn test_count_delete_failures_counts_real_failures() {
        let errors = [
            delete_error("abc", NO_SUCH_KEY),
            delete_error("abc.html", "AccessDenied"),
            aws_sdk_s3::types::Error::builder().build(),
        ];
        assert_eq!(count_delete_failures(&errors), 2);
    }
}
