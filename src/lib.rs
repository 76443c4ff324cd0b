//! DocVault library — secure office-document sharing service.
//!
//! This crate provides the components for running a small file-sharing
//! backend: account signup with email verification, session-token
//! authentication, role-gated uploads, and capability-token downloads,
//! over a metadata store and a blob storage backend.

use std::sync::Arc;

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod email;
pub mod errors;
pub mod handlers;
pub mod metadata;
pub mod metrics;
pub mod server;
pub mod storage;

use crate::config::Config;
use crate::email::Mailer;
use crate::metadata::store::MetadataStore;
use crate::storage::backend::BlobStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Metadata store (SQLite, or in-memory for tests).
    pub metadata: Arc<dyn MetadataStore>,
    /// Blob storage backend for uploaded documents.
    pub storage: Arc<dyn BlobStore>,
    /// Verification-mail sender.
    pub mailer: Mailer,
}
