//! Authentication and authorization.
//!
//! Three token kinds are issued here, all from a cryptographically
//! secure random source:
//!
//! - **Verification tokens**: 32-character alphanumeric strings stored
//!   on the user record and redeemed exactly once to confirm an email
//!   address.
//! - **Session tokens**: signed, expiring JWTs carrying the user's email
//!   as subject. Verified by signature and expiry on every protected
//!   request.
//! - **File access tokens**: 64-character alphanumeric capability
//!   strings stored on the file record. Holding one (plus a valid
//!   session) is sufficient to download the file it names.
//!
//! The [`auth_middleware`] resolves incoming bearer tokens to an
//! [`AuthenticatedUser`] request extension; handlers needing the
//! elevated ops role call [`AuthenticatedUser::require_ops`].

use std::str::FromStr;
use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::errors::ApiError;
use crate::metadata::store::{MetadataStore, UserRecord};
use crate::AppState;

/// Length of an email-verification token.
pub const VERIFICATION_TOKEN_LEN: usize = 32;

/// Length of a file access token.
pub const ACCESS_TOKEN_LEN: usize = 64;

// -- Random tokens ------------------------------------------------------------

/// Generate a random alphanumeric token of `len` characters from the
/// operating system's CSPRNG.
pub fn generate_secure_token(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a file access token.
pub fn generate_access_token() -> String {
    generate_secure_token(ACCESS_TOKEN_LEN)
}

// -- Password hashing ---------------------------------------------------------

/// Hash a password with Argon2id and a fresh random salt, returning the
/// PHC string for storage.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC string. Returns `false` for
/// both a mismatch and an unparsable hash.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

// -- Session tokens -----------------------------------------------------------

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Email of the authenticated account.
    pub sub: String,
    /// Expiry as a Unix timestamp.
    pub exp: usize,
}

/// Parse and validate the configured signature algorithm. Only the HMAC
/// family works with a shared secret key.
pub fn parse_algorithm(name: &str) -> anyhow::Result<Algorithm> {
    let alg = Algorithm::from_str(name)
        .map_err(|_| anyhow::anyhow!("unknown signature algorithm: {name}"))?;
    if !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        anyhow::bail!("only HMAC signature algorithms are supported, got {name}");
    }
    Ok(alg)
}

/// Issue a signed session token for `email`, expiring after the
/// configured lifetime.
pub fn create_session_token(cfg: &AuthConfig, email: &str) -> anyhow::Result<String> {
    let alg = parse_algorithm(&cfg.algorithm)?;
    let expires_at =
        chrono::Utc::now() + chrono::Duration::minutes(cfg.token_expire_minutes as i64);
    let claims = SessionClaims {
        sub: email.to_string(),
        exp: expires_at.timestamp() as usize,
    };
    let token = encode(
        &Header::new(alg),
        &claims,
        &EncodingKey::from_secret(cfg.secret_key.as_bytes()),
    )?;
    Ok(token)
}

/// Verify a session token's signature and expiry and return its claims.
pub fn decode_session_token(cfg: &AuthConfig, token: &str) -> Result<SessionClaims, ApiError> {
    let alg = parse_algorithm(&cfg.algorithm).map_err(ApiError::Internal)?;
    let validation = Validation::new(alg);
    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(cfg.secret_key.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::unauthenticated("invalid or expired bearer token"))
}

// -- Request identity ---------------------------------------------------------

/// Authenticated request extension: the resolved, verified account.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    /// The account the bearer token resolved to.
    pub user: UserRecord,
}

impl AuthenticatedUser {
    /// Whether the account carries the elevated ops role.
    pub fn is_ops(&self) -> bool {
        self.user.ops_user
    }

    /// Require the elevated ops role, returning `Forbidden` otherwise.
    pub fn require_ops(&self) -> Result<(), ApiError> {
        if self.is_ops() {
            Ok(())
        } else {
            Err(ApiError::forbidden("operation requires the ops role"))
        }
    }
}

/// Extract the bearer token from the Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(&v[7..])
            } else {
                None
            }
        })
}

// -- Middleware ---------------------------------------------------------------

/// Paths that bypass authentication.
const AUTH_SKIP_PATHS: &[&str] = &[
    "/",
    "/health",
    "/metrics",
    "/openapi.json",
    "/auth/signup",
    "/auth/verify-email",
    "/auth/login",
];

/// Bearer-token authentication middleware.
///
/// Runs before handlers on every protected route: verifies the token's
/// signature and expiry, resolves the subject email to an account, and
/// rejects unverified accounts. The resolved [`AuthenticatedUser`] is
/// attached as a request extension for handlers to consume.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path();
    if AUTH_SKIP_PATHS.iter().any(|skip| path == *skip) {
        return Ok(next.run(req).await);
    }

    let token = extract_bearer_token(&req)
        .ok_or_else(|| ApiError::unauthenticated("missing bearer token"))?;
    let claims = decode_session_token(&state.config.auth, token)?;

    let user = state
        .metadata
        .get_user_by_email(&claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthenticated("unknown account"))?;

    if !user.verified {
        return Err(ApiError::unauthenticated("email not verified"));
    }

    tracing::debug!(email = %user.email, "authenticated request");
    req.extensions_mut().insert(AuthenticatedUser { user });

    Ok(next.run(req).await)
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn test_auth_config() -> AuthConfig {
        AuthConfig {
            secret_key: "unit-test-secret".to_string(),
            algorithm: "HS256".to_string(),
            token_expire_minutes: 30,
            bootstrap: None,
        }
    }

    fn make_user(ops_user: bool) -> UserRecord {
        UserRecord {
            user_id: uuid::Uuid::new_v4(),
            email: "user@example.com".to_string(),
            full_name: "User".to_string(),
            password_hash: String::new(),
            verified: true,
            ops_user,
            verification_token: None,
            created_at: "2026-08-01T00:00:00.000Z".to_string(),
            updated_at: "2026-08-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn test_generate_secure_token_length_and_charset() {
        let token = generate_secure_token(VERIFICATION_TOKEN_LEN);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));

        let access = generate_access_token();
        assert_eq!(access.len(), 64);
        assert!(access.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generated_tokens_differ() {
        assert_ne!(generate_access_token(), generate_access_token());
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn test_verify_password_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_session_token_roundtrip() {
        let cfg = test_auth_config();
        let token = create_session_token(&cfg, "alice@example.com").unwrap();
        let claims = decode_session_token(&cfg, &token).unwrap();
        assert_eq!(claims.sub, "alice@example.com");
    }

    #[test]
    fn test_expired_session_token_rejected() {
        let cfg = test_auth_config();
        // Expired two hours ago, well past the default validation leeway.
        let claims = SessionClaims {
            sub: "alice@example.com".to_string(),
            exp: (chrono::Utc::now().timestamp() - 7200) as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(cfg.secret_key.as_bytes()),
        )
        .unwrap();

        let err = decode_session_token(&cfg, &token).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated { .. }));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let cfg = test_auth_config();
        let token = create_session_token(&cfg, "alice@example.com").unwrap();

        let mut other = test_auth_config();
        other.secret_key = "a-different-secret".to_string();
        assert!(decode_session_token(&other, &token).is_err());
    }

    #[test]
    fn test_parse_algorithm() {
        assert!(parse_algorithm("HS256").is_ok());
        assert!(parse_algorithm("HS512").is_ok());
        assert!(parse_algorithm("RS256").is_err());
        assert!(parse_algorithm("none").is_err());
        assert!(parse_algorithm("bogus").is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        let req = Request::builder()
            .header(AUTHORIZATION, "Bearer abc.def.ghi")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req), Some("abc.def.ghi"));

        // Case-insensitive scheme.
        let req = Request::builder()
            .header(AUTHORIZATION, "bearer xyz")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req), Some("xyz"));

        let req = Request::builder()
            .header(AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req), None);

        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_bearer_token(&req), None);
    }

    #[test]
    fn test_require_ops() {
        let regular = AuthenticatedUser {
            user: make_user(false),
        };
        let err = regular.require_ops().unwrap_err();
        assert!(matches!(err, ApiError::Forbidden { .. }));

        let ops = AuthenticatedUser {
            user: make_user(true),
        };
        assert!(ops.require_ops().is_ok());
    }
}
