// dbbackup/src/storage/s3.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use bytes::{Bytes, BytesMut};
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use s3::types::{CompletedMultipartUpload, CompletedPart};
use tracing::{debug, info, warn};

use super::{ObjectStore, ObjectWriter};
use crate::config::StorageConfig;
use crate::errors::{AppError, Result};

/// Compressed bytes are uploaded in parts of this size. S3 requires at least
/// 5 MiB for every part except the last one.
const PART_SIZE: usize = 8 * 1024 * 1024;
const MAX_PARTS: usize = 10_000;
const CONTENT_TYPE: &str = "application/x-bzip2";

fn storage_error<E>(action: &str, target: &str, err: E) -> AppError
where
    E: std::error::Error + 'static,
{
    AppError::Storage(format!("{} {}: {}", action, target, DisplayErrorContext(&err)))
}

/// An S3-compatible bucket, optionally narrowed to a key prefix.
#[derive(Clone)]
pub struct S3Store {
    client: s3::Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Store {
    /// Builds a fresh client for one phase of the run.
    ///
    /// Settings missing from `storage` are resolved by the AWS default chain.
    /// Custom endpoints (Spaces, MinIO) get path-style addressing.
    pub async fn connect(storage: &StorageConfig, bucket: &str, prefix: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest());
        if let Some(region) = &storage.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &storage.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let Some(creds) = &storage.credentials {
            loader = loader.credentials_provider(s3::config::Credentials::new(
                &creds.access_key_id,
                &creds.secret_access_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ));
        }
        let sdk_config = loader.load().await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(storage.endpoint_url.is_some())
            .build();

        debug!(
            bucket = bucket,
            endpoint = storage.endpoint_url.as_deref().unwrap_or("<aws>"),
            "S3 client ready"
        );

        S3Store {
            client: s3::Client::from_conf(s3_config),
            bucket: bucket.to_string(),
            prefix: prefix.map(str::to_string),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn open_writer(&self, key: &str) -> Result<Box<dyn ObjectWriter>> {
        let created = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| storage_error("Failed to open upload for", key, e))?;

        let upload_id = created
            .upload_id()
            .ok_or_else(|| AppError::Storage(format!("No upload ID returned for {}", key)))?
            .to_string();

        debug!(bucket = %self.bucket, key = key, upload_id = %upload_id, "Multipart upload opened");

        Ok(Box::new(S3Writer {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            upload_id,
            buffer: PartBuffer::new(),
            parts: Vec::new(),
            bytes_written: 0,
        }))
    }

    async fn list_names(&self) -> Result<Vec<String>> {
        let list_prefix = self.prefix.as_ref().map(|p| format!("{}/", p));
        let mut names = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(list_prefix.clone())
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| storage_error("Failed to list bucket", &self.bucket, e))?;

            names.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_string),
            );

            match page.next_continuation_token() {
                Some(token) if page.is_truncated() == Some(true) => {
                    continuation_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(names)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error("Failed to delete", key, e))?;
        Ok(())
    }
}

/// Cuts a byte stream into numbered upload parts of a fixed size.
struct PartBuffer {
    buffer: BytesMut,
    part_size: usize,
    max_parts: usize,
    emitted: usize,
}

impl PartBuffer {
    fn new() -> Self {
        Self::with_limits(PART_SIZE, MAX_PARTS)
    }

    fn with_limits(part_size: usize, max_parts: usize) -> Self {
        PartBuffer {
            buffer: BytesMut::with_capacity(part_size),
            part_size,
            max_parts,
            emitted: 0,
        }
    }

    fn next_number(&mut self) -> Result<i32> {
        if self.emitted >= self.max_parts {
            return Err(AppError::Storage(format!(
                "Upload exceeds {} parts",
                self.max_parts
            )));
        }
        self.emitted += 1;
        Ok(self.emitted as i32)
    }

    /// Appends `chunk` and returns every part that is now full.
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<(i32, Bytes)>> {
        self.buffer.extend_from_slice(chunk);
        let mut ready = Vec::new();
        while self.buffer.len() >= self.part_size {
            let body = self.buffer.split_to(self.part_size).freeze();
            ready.push((self.next_number()?, body));
        }
        Ok(ready)
    }

    /// Returns the remainder as the last part. A multipart upload needs at
    /// least one part, so an empty stream yields one empty part.
    fn finish(&mut self) -> Result<Option<(i32, Bytes)>> {
        if self.buffer.is_empty() && self.emitted > 0 {
            return Ok(None);
        }
        let body = self.buffer.split().freeze();
        Ok(Some((self.next_number()?, body)))
    }
}

struct S3Writer {
    client: s3::Client,
    bucket: String,
    key: String,
    upload_id: String,
    buffer: PartBuffer,
    parts: Vec<CompletedPart>,
    bytes_written: u64,
}

impl S3Writer {
    async fn upload_part(&mut self, part_number: i32, body: Bytes) -> Result<()> {
        let size = body.len();

        let uploaded = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| storage_error("Failed to upload part of", &self.key, e))?;

        let etag = uploaded.e_tag().ok_or_else(|| {
            AppError::Storage(format!("No ETag returned for part {} of {}", part_number, self.key))
        })?;

        self.parts.push(
            CompletedPart::builder()
                .part_number(part_number)
                .e_tag(etag)
                .build(),
        );
        debug!(key = %self.key, part_number, size, "Uploaded part");
        Ok(())
    }
}

#[async_trait]
impl ObjectWriter for S3Writer {
    async fn write(&mut self, chunk: Bytes) -> Result<()> {
        self.bytes_written += chunk.len() as u64;
        for (part_number, body) in self.buffer.push(&chunk)? {
            self.upload_part(part_number, body).await?;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<u64> {
        if let Some((part_number, body)) = self.buffer.finish()? {
            self.upload_part(part_number, body).await?;
        }

        let parts = std::mem::take(&mut self.parts);
        let part_count = parts.len();
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| storage_error("Failed to complete upload of", &self.key, e))?;

        info!(
            bucket = %self.bucket,
            key = %self.key,
            size_bytes = self.bytes_written,
            parts = part_count,
            "Upload completed"
        );
        Ok(self.bytes_written)
    }

    async fn abort(&mut self) -> Result<()> {
        warn!(bucket = %self.bucket, key = %self.key, "Aborting multipart upload");
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .send()
            .await
            .map_err(|e| storage_error("Failed to abort upload of", &self.key, e))?;
        Ok(())
    }
}
