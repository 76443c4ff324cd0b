//! Local filesystem blob storage.
//!
//! Each storage key maps directly to a file under the configured root.
//! Writes go to a scratch file first, get fsynced, and are renamed into
//! place, so a crash never leaves a half-written blob under a live key.
//! Keys containing `..` components are rejected outright.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::pin::Pin;

use super::backend::{BlobStore, StoredBlob};

/// Directory for in-flight writes, inside the root so renames stay on
/// one filesystem.
const SCRATCH_DIR: &str = ".tmp";

/// Stores blobs as files under a root directory.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Open a blob store rooted at `root`, creating the directory (and
    /// the scratch directory for in-flight writes) if needed.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(SCRATCH_DIR))?;
        Ok(Self { root })
    }

    /// Turn a storage key into the path it lives at, refusing any key
    /// that would land outside the root.
    fn resolve(&self, storage_key: &str) -> anyhow::Result<PathBuf> {
        if std::path::Path::new(storage_key)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            anyhow::bail!("Path traversal detected in storage key: {}", storage_key);
        }
        let path = self.root.join(storage_key);
        // Keys pointing at existing files also get a canonical check, in
        // case a symlink leads out of the root.
        if path.exists() {
            let canonical_root = self
                .root
                .canonicalize()
                .unwrap_or_else(|_| self.root.clone());
            if !path.canonicalize()?.starts_with(&canonical_root) {
                anyhow::bail!("Path traversal detected in storage key: {}", storage_key);
            }
        }
        Ok(path)
    }

    /// Fresh scratch path for one write.
    fn temp_path(&self) -> PathBuf {
        self.root
            .join(SCRATCH_DIR)
            .join(format!("tmp-{}", uuid::Uuid::new_v4()))
    }

    fn hash_hex(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }
}

impl BlobStore for LocalBlobStore {
    fn put(
        &self,
        storage_key: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let final_path = self.resolve(&storage_key)?;
            // Keys may carry '/' separators; make the directories real.
            if let Some(parent) = final_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let content_hash = Self::hash_hex(&data);

            // Scratch write, fsync, then rename into place.
            let tmp_path = self.temp_path();
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, &final_path)?;

            Ok(content_hash)
        })
    }

    fn get(
        &self,
        storage_key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<StoredBlob>> + Send + '_>> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let path = self.resolve(&storage_key)?;
            if !path.exists() {
                anyhow::bail!("Blob not found at storage key: {}", storage_key);
            }

            let data = Bytes::from(std::fs::read(&path)?);
            let content_hash = Self::hash_hex(&data);
            Ok(StoredBlob { data, content_hash })
        })
    }

    fn delete(
        &self,
        storage_key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let path = self.resolve(&storage_key)?;
            // A key that is already gone is a successful delete.
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            Ok(())
        })
    }

    fn exists(
        &self,
        storage_key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let storage_key = storage_key.to_string();
        Box::pin(async move {
            let path = self.resolve(&storage_key)?;
            Ok(path.exists() && path.is_file())
        })
    }
}

// -- Tests --------------------------------------------------------------------
