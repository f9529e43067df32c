//! Object storage abstraction used by the backup pipeline and the retention sweep.

pub(crate) mod s3;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::Result;

pub use s3::S3Store;

/// A bucket (optionally narrowed to a key prefix) holding backup objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Opens a write stream for `key`. Nothing is visible under `key` until
    /// the writer is finished.
    async fn open_writer(&self, key: &str) -> Result<Box<dyn ObjectWriter>>;

    /// Lists every object key, following pagination to the end.
    async fn list_names(&self) -> Result<Vec<String>>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// An in-progress upload of a single object.
#[async_trait]
pub trait ObjectWriter: Send {
    async fn write(&mut self, chunk: Bytes) -> Result<()>;

    /// Completes the upload and returns the number of bytes written.
    ///
    /// On error the upload is still open and must be aborted.
    async fn finish(&mut self) -> Result<u64>;

    /// Discards the upload.
    async fn abort(&mut self) -> Result<()>;
}
