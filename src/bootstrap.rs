//! Ops-account initialization.
//!
//! Elevation through the API requires an already-elevated caller, so the
//! first ops account has to come from somewhere outside the API. The
//! `auth.bootstrap` config section names that account; this runs on every
//! startup and is idempotent.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

use crate::auth;
use crate::config::BootstrapConfig;
use crate::metadata::store::{MetadataStore, UserRecord};

/// Ensure the configured ops account exists and carries the ops role.
///
/// An existing account is elevated in place (its password and
/// verification state are left untouched). A missing account is created
/// verified, since there is no signup flow behind it to confirm.
pub async fn ensure_ops_user(
    metadata: &dyn MetadataStore,
    cfg: &BootstrapConfig,
) -> anyhow::Result<()> {
    if let Some(existing) = metadata.get_user_by_email(&cfg.email).await? {
        if existing.ops_user {
            tracing::debug!(email = %cfg.email, "ops account already present");
        } else {
            metadata.make_ops_user(&cfg.email).await?;
            tracing::info!(email = %cfg.email, "existing account elevated to ops");
        }
        return Ok(());
    }

    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let record = UserRecord {
        user_id: Uuid::new_v4(),
        email: cfg.email.clone(),
        full_name: cfg.full_name.clone(),
        password_hash: auth::hash_password(&cfg.password)?,
        verified: true,
        ops_user: true,
        verification_token: None,
        created_at: now.clone(),
        updated_at: now,
    };
    metadata.create_user(record).await?;
    tracing::info!(email = %cfg.email, "ops account created");

    Ok(())
}

// -- Tests --------------------------------------------------------------------
