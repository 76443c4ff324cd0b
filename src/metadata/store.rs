//! Abstract metadata store trait.
//!
//! Any metadata backend must implement [`MetadataStore`].  The trait
//! uses `async_trait`-style methods (manual desugaring with pinned
//! futures) so it can sit behind an `Arc<dyn MetadataStore>` shared by
//! every handler.

use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

// ── Record types ───────────────────────────────────────────────────

/// Stored record for a registered account.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Unique account identifier.
    pub user_id: Uuid,
    /// Login email. Globally unique.
    pub email: String,
    /// Display name.
    pub full_name: String,
    /// Argon2id password hash (PHC string).
    pub password_hash: String,
    /// Whether the email address has been confirmed.
    pub verified: bool,
    /// Whether the account carries the elevated ops role.
    pub ops_user: bool,
    /// Outstanding email-confirmation token. Cleared on successful
    /// verification and never reissued for the same signup.
    pub verification_token: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
}

/// Stored record for an uploaded file.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Unique file identifier.
    pub file_id: Uuid,
    /// Original filename as uploaded.
    pub filename: String,
    /// Content type declared by the uploader.
    pub content_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Key of the backing blob in the storage backend.
    pub storage_key: String,
    /// Account that uploaded the file.
    pub owner_id: Uuid,
    /// Current download capability token, if one has been issued.
    /// Unique across all files while present; regenerating replaces it.
    pub access_token: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-update timestamp.
    pub updated_at: String,
}

// ── Partial updates ────────────────────────────────────────────────

/// Fields of a user record that can change after creation. `None`
/// leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub full_name: Option<String>,
    pub password_hash: Option<String>,
}

/// Fields of a file record that can change after creation. `None`
/// leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    pub access_token: Option<String>,
}

// ── Trait ───────────────────────────────────────────────────────────

/// Async metadata store contract.
///
/// Every write stamps the record's `updated_at`. Implementations rely on
/// the backing store's single-row atomicity; there are no cross-record
/// transactions.
pub trait MetadataStore: Send + Sync + 'static {
    // ── Users ───────────────────────────────────────────────────────

    /// Insert a new user record. Fails if the email is already taken.
    fn create_user(
        &self,
        record: UserRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Look up a user by email.
    fn get_user_by_email(
        &self,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>>;

    /// Look up a user by id.
    fn get_user_by_id(
        &self,
        user_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>>;

    /// Redeem an email-confirmation token: atomically set the verified
    /// flag and clear the token. Returns `false` when no record carries
    /// the token (unknown, or already redeemed). Two concurrent calls
    /// with the same token race harmlessly; the loser matches nothing.
    fn verify_user(
        &self,
        verification_token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>>;

    /// Apply a partial update and return the updated record, or `None`
    /// if the user does not exist.
    fn update_user(
        &self,
        user_id: Uuid,
        update: UserUpdate,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>>;

    /// Grant the elevated ops role. One-way: nothing ever clears the
    /// flag. Returns the updated record, or `None` for an unknown email.
    fn make_ops_user(
        &self,
        email: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<UserRecord>>> + Send + '_>>;

    // ── Files ───────────────────────────────────────────────────────

    /// Insert a new file record.
    fn create_file(
        &self,
        record: FileRecord,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;

    /// Look up a file by id.
    fn get_file_by_id(
        &self,
        file_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>>;

    /// Look up a file by its current access token.
    fn get_file_by_access_token(
        &self,
        access_token: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>>;

    /// List all files uploaded by `owner_id`, newest first.
    fn list_files_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<FileRecord>>> + Send + '_>>;

    /// Apply a partial update and return the updated record, or `None`
    /// if the file does not exist. Writing a new access token replaces
    /// the previous one, which stops resolving immediately.
    fn update_file(
        &self,
        file_id: Uuid,
        update: FileUpdate,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>>;

    /// Delete a file record, returning the pre-deletion record or `None`
    /// if it did not exist. Removal of the backing blob is the caller's
    /// responsibility and happens after the record is gone.
    fn delete_file(
        &self,
        file_id: Uuid,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<FileRecord>>> + Send + '_>>;
}
