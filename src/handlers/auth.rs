//! Account-level API handlers: signup, email verification, login, and
//! role elevation.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{Extension, Form, Json};
use garde::Validate;
use metrics::counter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{self, AuthenticatedUser};
use crate::errors::ApiError;
use crate::metadata::store::{MetadataStore, UserRecord};
use crate::metrics::{LOGINS_TOTAL, SIGNUPS_TOTAL};
use crate::AppState;

// -- Request / response types -------------------------------------------------

/// Signup payload.
#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct SignupRequest {
    /// Login email. Must be unique.
    #[garde(length(max = 254), pattern(r"^[^@\s]+@[^@\s]+\.[^@\s]+$"))]
    pub email: String,

    /// Display name.
    #[garde(length(min = 1, max = 128))]
    pub full_name: String,

    /// Plaintext password; hashed before storage.
    #[garde(length(min = 8, max = 128))]
    pub password: String,
}

/// Login form body (OAuth2 password-style field names).
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    /// The account email.
    pub username: String,
    /// The account password.
    pub password: String,
}

/// Target of a role elevation.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct MakeOpsQuery {
    /// Email of the account to elevate.
    pub email: String,
}

/// Token handed out by the verification email link.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct VerifyEmailQuery {
    /// The verification token from the signup email.
    pub token: String,
}

/// Public view of an account. Never carries the password hash or the
/// outstanding verification token.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub is_verified: bool,
    pub is_ops_user: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<UserRecord> for UserResponse {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.user_id.to_string(),
            email: record.email,
            full_name: record.full_name,
            is_verified: record.verified,
            is_ops_user: record.ops_user,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Successful login response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Generic confirmation message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

// -- Handlers -----------------------------------------------------------------

/// `POST /auth/signup` -- Register a new account and send the
/// verification email.
#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "Auth",
    operation_id = "Signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SignupRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    payload
        .validate()
        .map_err(|report| ApiError::bad_request(report.to_string()))?;

    if state
        .metadata
        .get_user_by_email(&payload.email)
        .await?
        .is_some()
    {
        return Err(ApiError::conflict("email already registered"));
    }

    let password_hash = auth::hash_password(&payload.password)?;
    let verification_token = auth::generate_secure_token(auth::VERIFICATION_TOKEN_LEN);
    let now = now_rfc3339();

    let record = UserRecord {
        user_id: Uuid::new_v4(),
        email: payload.email.clone(),
        full_name: payload.full_name,
        password_hash,
        verified: false,
        ops_user: false,
        verification_token: Some(verification_token.clone()),
        created_at: now.clone(),
        updated_at: now,
    };
    state.metadata.create_user(record.clone()).await?;

    let verification_url = format!(
        "{}/auth/verify-email?token={}",
        state.config.server.public_url, verification_token
    );
    state
        .mailer
        .send_verification(&payload.email, &verification_url)
        .await?;

    counter!(SIGNUPS_TOTAL).increment(1);
    tracing::info!(email = %record.email, "account created");

    Ok(Json(UserResponse::from(record)))
}

/// `GET /auth/verify-email?token=` -- Redeem a verification token.
#[utoipa::path(
    get,
    path = "/auth/verify-email",
    tag = "Auth",
    operation_id = "VerifyEmail",
    params(VerifyEmailQuery),
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 401, description = "Unknown or already-redeemed token")
    )
)]
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyEmailQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    let verified = state.metadata.verify_user(&params.token).await?;
    if !verified {
        return Err(ApiError::unauthenticated(
            "invalid or expired verification token",
        ));
    }
    Ok(Json(MessageResponse {
        message: "email verified successfully".to_string(),
    }))
}

/// `POST /auth/login` -- Exchange credentials for a bearer token.
///
/// A single message covers both an unknown email and a wrong password.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    operation_id = "Login",
    request_body(content = LoginRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Bearer token issued", body = TokenResponse),
        (status = 401, description = "Bad credentials or unverified email")
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = state.metadata.get_user_by_email(&payload.username).await?;
    let user = match user {
        Some(user) if auth::verify_password(&payload.password, &user.password_hash) => user,
        _ => return Err(ApiError::unauthenticated("incorrect email or password")),
    };

    if !user.verified {
        return Err(ApiError::unauthenticated("email not verified"));
    }

    let access_token = auth::create_session_token(&state.config.auth, &user.email)?;

    counter!(LOGINS_TOTAL).increment(1);
    tracing::debug!(email = %user.email, "login succeeded");

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// `POST /auth/make-ops-user?email=` -- Grant the ops role to another
/// account. One-way; only an ops caller may do this.
#[utoipa::path(
    post,
    path = "/auth/make-ops-user",
    tag = "Auth",
    operation_id = "MakeOpsUser",
    params(MakeOpsQuery),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Account elevated", body = MessageResponse),
        (status = 403, description = "Caller is not an ops user"),
        (status = 404, description = "Target account not found")
    )
)]
pub async fn make_ops_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedUser>,
    Query(params): Query<MakeOpsQuery>,
) -> Result<Json<MessageResponse>, ApiError> {
    caller.require_ops()?;

    let elevated = state.metadata.make_ops_user(&params.email).await?;
    if elevated.is_none() {
        return Err(ApiError::not_found("user not found"));
    }

    tracing::info!(email = %params.email, by = %caller.user.email, "account elevated to ops");
    Ok(Json(MessageResponse {
        message: format!("user {} is now an ops user", params.email),
    }))
}

/// Get current time as an RFC 3339 string with millisecond precision.
fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

// -- Tests --------------------------------------------------------------------
