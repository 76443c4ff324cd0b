//! In-memory metadata store.
//!
//! Stores all metadata in memory with no persistence. Useful for testing
//! and ephemeral deployments. Uses `RwLock<HashMap>` for thread-safe access
//! and mirrors the SQLite store's semantics, including email and
//! access-token uniqueness.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use super::store::{FileRecord, FileUpdate, MetadataStore, UserRecord, UserUpdate};

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<Uuid, UserRecord>,
    files: HashMap<Uuid, FileRecord>,
}

/// Metadata store holding everything in process memory.
pub struct MemoryMetadataStore {
    inner: RwLock<Inner>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for MemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl MetadataStore for MemoryMetadataStore {
    // ── Users ───────────────────────────────────────────────────────

    fn create_user(
        &self,
        record: UserRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            if inner.users.values().any(|u| u.email == record.email) {
                anyhow::bail!("UNIQUE constraint failed: users.email");
            }
            inner.users.insert(record.user_id, record);
            Ok(())
        })
    }

    fn get_user_by_email(
        &self,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        let email = email.to_string();
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(inner.users.values().find(|u| u.email == email).cloned())
        })
    }

    fn get_user_by_id(
        &self,
        user_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(inner.users.get(&user_id).cloned())
        })
    }

    fn verify_user(
        &self,
        verification_token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let token = verification_token.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            let matched = inner
                .users
                .values_mut()
                .find(|u| u.verification_token.as_deref() == Some(token.as_str()));
            match matched {
                Some(user) => {
                    user.verified = true;
                    user.verification_token = None;
                    user.updated_at = now_rfc3339();
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn update_user(
        &self,
        user_id: Uuid,
        update: UserUpdate,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            let Some(user) = inner.users.get_mut(&user_id) else {
                return Ok(None);
            };
            if let Some(full_name) = update.full_name {
                user.full_name = full_name;
            }
            if let Some(password_hash) = update.password_hash {
                user.password_hash = password_hash;
            }
            user.updated_at = now_rfc3339();
            Ok(Some(user.clone()))
        })
    }

    fn make_ops_user(
        &self,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>> {
        let email = email.to_string();
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            let matched = inner.users.values_mut().find(|u| u.email == email);
            match matched {
                Some(user) => {
                    user.ops_user = true;
                    user.updated_at = now_rfc3339();
                    Ok(Some(user.clone()))
                }
                None => Ok(None),
            }
        })
    }

    // ── Files ───────────────────────────────────────────────────────

    fn create_file(
        &self,
        record: FileRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            inner.files.insert(record.file_id, record);
            Ok(())
        })
    }

    fn get_file_by_id(
        &self,
        file_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(inner.files.get(&file_id).cloned())
        })
    }

    fn get_file_by_access_token(
        &self,
        access_token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>> {
        let access_token = access_token.to_string();
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            Ok(inner
                .files
                .values()
                .find(|f| f.access_token.as_deref() == Some(access_token.as_str()))
                .cloned())
        })
    }

    fn list_files_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<FileRecord>>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.inner.read().expect("rwlock poisoned");
            let mut files: Vec<FileRecord> = inner
                .files
                .values()
                .filter(|f| f.owner_id == owner_id)
                .cloned()
                .collect();
            files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(files)
        })
    }

    fn update_file(
        &self,
        file_id: Uuid,
        update: FileUpdate,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            if let Some(token) = &update.access_token {
                let taken = inner
                    .files
                    .values()
                    .any(|f| f.file_id != file_id && f.access_token.as_deref() == Some(token));
                if taken {
                    anyhow::bail!("UNIQUE constraint failed: files.access_token");
                }
            }
            let Some(file) = inner.files.get_mut(&file_id) else {
                return Ok(None);
            };
            if let Some(token) = update.access_token {
                file.access_token = Some(token);
            }
            file.updated_at = now_rfc3339();
            Ok(Some(file.clone()))
        })
    }

    fn delete_file(
        &self,
        file_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.write().expect("rwlock poisoned");
            Ok(inner.files.remove(&file_id))
        })
    }
}

// -- Tests --------------------------------------------------------------------
