//! Abstract blob storage trait.
//!
//! Every storage backend must implement [`BlobStore`].  The trait works
//! in terms of opaque byte buffers keyed by a flat storage key, so
//! callers do not need to know the underlying medium.

use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;

/// A stored blob's data plus its content hash.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    /// Raw bytes of the blob.
    pub data: Bytes,
    /// Hex-encoded SHA-256 content hash.
    pub content_hash: String,
}

/// Async blob storage contract.
pub trait BlobStore: Send + Sync + 'static {
    /// Write `data` to `storage_key`, returning the content hash.
    fn put(
        &self,
        storage_key: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>>;

    /// Read the full blob at `storage_key`.
    fn get(
        &self,
        storage_key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<StoredBlob>> + Send + '_>>;

    /// Delete the blob at `storage_key`. Idempotent.
    fn delete(
        &self,
        storage_key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Check whether a blob exists at `storage_key`.
    fn exists(
        &self,
        storage_key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;
}
