//! Axum router construction and route mapping.
//!
//! The [`app`] function wires every endpoint to its handler and returns
//! a ready-to-serve [`axum::Router`].  Authentication runs as the
//! innermost middleware; everything under `/auth` except role elevation
//! is public, everything under `/files` requires a valid session.

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::auth::auth_middleware;
use crate::errors::generate_request_id;
use crate::handlers;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

// -- OpenAPI specification ----------------------------------------------------

/// Registers the bearer-token security scheme referenced by protected
/// endpoints.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::HttpBuilder::new()
                    .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// OpenAPI documentation for the DocVault API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "DocVault API",
        version = "0.1.0",
        description = "Secure office-document sharing server"
    ),
    paths(
        // Health check
        health_check,
        // Account operations
        crate::handlers::auth::signup,
        crate::handlers::auth::verify_email,
        crate::handlers::auth::login,
        crate::handlers::auth::make_ops_user,
        // File operations
        crate::handlers::files::upload_file,
        crate::handlers::files::generate_download_link,
        crate::handlers::files::download_file,
        crate::handlers::files::list_files,
        crate::handlers::files::delete_file,
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Auth", description = "Account and session operations"),
        (name = "Files", description = "Upload and download operations"),
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

/// Build the axum [`Router`] with all routes and middleware.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Service banner.
        .route("/", get(root))
        // OpenAPI spec.
        .route("/openapi.json", get(openapi_json))
        // Account routes.
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/verify-email", get(handlers::auth::verify_email))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/make-ops-user", post(handlers::auth::make_ops_user))
        // File routes.
        .route("/files/upload", post(handlers::files::upload_file))
        .route(
            "/files/download/:file_id",
            get(handlers::files::generate_download_link),
        )
        .route("/files/download", get(handlers::files::download_file))
        .route("/files/list", get(handlers::files::list_files))
        .route("/files/:file_id", delete(handlers::files::delete_file));

    // Probes are optional so hardened deployments can turn them off.
    if state.config.observability.health_check {
        router = router.route("/health", get(health_check));
    }
    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    let max_upload_size = state.config.server.max_upload_size;

    router
        // Application state shared across all handlers.
        .with_state(state.clone())
        // Layer ordering: inner layers run first, outer layers wrap them.
        // auth_middleware is innermost (closest to handlers, after routing).
        .layer(middleware::from_fn_with_state(state, auth_middleware))
        // common_headers_middleware adds request id / Date / Server.
        .layer(middleware::from_fn(common_headers_middleware))
        // metrics_middleware captures the full request lifecycle.
        .layer(middleware::from_fn(metrics_middleware))
        // Browser clients talk to this API directly.
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        // Uploads are bounded; nothing else comes close to the limit.
        .layer(DefaultBodyLimit::max(max_upload_size))
}

// -- Common headers middleware -----------------------------------------------

/// Tower middleware that adds common response headers to every response:
/// - `x-request-id`: 16-character uppercase hex string
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `DocVault`
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Only set x-request-id if not already present (the error handler may
    // have set it).
    if !headers.contains_key("x-request-id") {
        let request_id = generate_request_id();
        headers.insert("x-request-id", HeaderValue::from_str(&request_id).unwrap());
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    // Always overwrite Date and Server to ensure consistency.
    headers.insert("date", HeaderValue::from_str(&date).unwrap());
    headers.insert("server", HeaderValue::from_static("DocVault"));

    response
}

// -- Service handlers ---------------------------------------------------------

/// `GET /` -- Service banner.
async fn root() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"message":"Secure File Sharing System"}"#,
    )
}

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /openapi.json` -- The generated OpenAPI document.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap;
    use crate::config::{BootstrapConfig, Config};
    use crate::email::Mailer;
    use crate::metadata::memory::MemoryMetadataStore;
    use crate::metadata::store::MetadataStore;
    use crate::storage::backend::BlobStore;
    use crate::storage::local::LocalBlobStore;
    use axum::body::Body;
    use axum::http::{header, Method};
    use tower::ServiceExt;

    const DOCX_MIME: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

    fn test_config() -> Config {
        let mut config: Config = serde_yaml::from_str("{}").unwrap();
        config.auth.secret_key = "integration-test-secret".to_string();
        // The global Prometheus recorder is not installed under test.
        config.observability.metrics = false;
        config
    }

    fn test_app() -> (Router, Arc<AppState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config();
        let metadata: Arc<dyn MetadataStore> = Arc::new(MemoryMetadataStore::new());
        let storage: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(dir.path()).unwrap());
        let mailer = Mailer::from_config(&config.smtp).unwrap();
        let state = Arc::new(AppState {
            config,
            metadata,
            storage,
            mailer,
        });
        (app(state.clone()), state, dir)
    }

    /// Minimal ZIP local-file-header prefix that sniffs as a DOCX
    /// container.
    fn fake_docx() -> Vec<u8> {
        let entry_name = b"word/document.xml";
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0x50, 0x4B, 0x03, 0x04]);
        buf.extend_from_slice(&[0x14, 0x00, 0x00, 0x00, 0x00, 0x00]);
        buf.extend_from_slice(&[0x00; 16]); // time, date, crc, sizes
        buf.extend_from_slice(&(entry_name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&[0x00, 0x00]);
        buf.extend_from_slice(entry_name);
        buf.extend_from_slice(b"<w:document/>");
        buf
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    fn json_request(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn bearer_request(method: Method, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    fn upload_request(token: &str, filename: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let boundary = "docvault-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\n\
                 content-disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                 content-type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/files/upload")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    /// Sign up `email` through the API and redeem its verification token.
    async fn signup_and_verify(router: &Router, state: &Arc<AppState>, email: &str, password: &str) {
        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/auth/signup",
                serde_json::json!({
                    "email": email,
                    "full_name": "Test User",
                    "password": password,
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let token = state
            .metadata
            .get_user_by_email(email)
            .await
            .unwrap()
            .unwrap()
            .verification_token
            .unwrap();
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/auth/verify-email?token={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Log `email` in through the API and return the bearer token.
    async fn login(router: &Router, email: &str, password: &str) -> String {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/auth/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(format!("username={email}&password={password}")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["token_type"], "bearer");
        json["access_token"].as_str().unwrap().to_string()
    }

    /// Seed an ops account and log it in.
    async fn ops_token(router: &Router, state: &Arc<AppState>) -> String {
        bootstrap::ensure_ops_user(
            state.metadata.as_ref(),
            &BootstrapConfig {
                email: "ops@example.com".to_string(),
                password: "ops-password-123".to_string(),
                full_name: "Operations".to_string(),
            },
        )
        .await
        .unwrap();
        login(router, "ops@example.com", "ops-password-123").await
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let (router, _state, _dir) = test_app();

        let response = router
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("server").unwrap(),
            "DocVault"
        );
        assert!(response.headers().contains_key("x-request-id"));

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_signup_returns_user_without_secrets() {
        let (router, _state, _dir) = test_app();

        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/auth/signup",
                serde_json::json!({
                    "email": "alice@example.com",
                    "full_name": "Alice",
                    "password": "alice-password",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["email"], "alice@example.com");
        assert_eq!(json["full_name"], "Alice");
        assert_eq!(json["is_verified"], false);
        assert_eq!(json["is_ops_user"], false);
        assert!(json.get("password").is_none());
        assert!(json.get("password_hash").is_none());
        assert!(json.get("hashed_password").is_none());
        assert!(json.get("verification_token").is_none());
    }

    #[tokio::test]
    async fn test_signup_duplicate_email_conflicts() {
        let (router, _state, _dir) = test_app();

        let payload = serde_json::json!({
            "email": "dup@example.com",
            "full_name": "Dup",
            "password": "dup-password",
        });
        let response = router
            .clone()
            .oneshot(json_request(Method::POST, "/auth/signup", payload.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(json_request(Method::POST, "/auth/signup", payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["code"], "Conflict");
    }

    #[tokio::test]
    async fn test_signup_rejects_invalid_payload() {
        let (router, _state, _dir) = test_app();

        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/auth/signup",
                serde_json::json!({
                    "email": "not-an-email",
                    "full_name": "X",
                    "password": "long-enough-password",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_login_requires_verification_and_token_single_use() {
        let (router, state, _dir) = test_app();

        let response = router
            .clone()
            .oneshot(json_request(
                Method::POST,
                "/auth/signup",
                serde_json::json!({
                    "email": "bob@example.com",
                    "full_name": "Bob",
                    "password": "bob-password-1",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Unverified login fails even with the right password.
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/auth/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("username=bob@example.com&password=bob-password-1"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Redeem the verification token; a second redemption fails.
        let token = state
            .metadata
            .get_user_by_email("bob@example.com")
            .await
            .unwrap()
            .unwrap()
            .verification_token
            .unwrap();
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/auth/verify-email?token={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/auth/verify-email?token={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // Now login works and the bearer token authorizes protected calls.
        let bearer = login(&router, "bob@example.com", "bob-password-1").await;
        let response = router
            .clone()
            .oneshot(bearer_request(Method::GET, "/files/list", &bearer))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_wrong_password_fails() {
        let (router, state, _dir) = test_app();
        signup_and_verify(&router, &state, "carol@example.com", "carol-password").await;

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/auth/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("username=carol@example.com&password=wrong"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("www-authenticate").unwrap(),
            "Bearer"
        );
    }

    #[tokio::test]
    async fn test_protected_routes_reject_missing_or_garbage_tokens() {
        let (router, _state, _dir) = test_app();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/files/list")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router
            .clone()
            .oneshot(bearer_request(Method::GET, "/files/list", "garbage.token"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_forbidden_for_regular_user() {
        let (router, state, _dir) = test_app();
        signup_and_verify(&router, &state, "user@example.com", "user-password").await;
        let bearer = login(&router, "user@example.com", "user-password").await;

        let response = router
            .clone()
            .oneshot(upload_request(&bearer, "report.docx", DOCX_MIME, &fake_docx()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["code"], "Forbidden");
    }

    #[tokio::test]
    async fn test_upload_accepts_office_document() {
        let (router, state, _dir) = test_app();
        let bearer = ops_token(&router, &state).await;

        let data = fake_docx();
        let response = router
            .clone()
            .oneshot(upload_request(&bearer, "report.docx", DOCX_MIME, &data))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["filename"], "report.docx");
        assert_eq!(json["content_type"], DOCX_MIME);
        assert_eq!(json["file_size"], data.len() as u64);
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_extension_and_content() {
        let (router, state, _dir) = test_app();
        let bearer = ops_token(&router, &state).await;

        // Disallowed extension.
        let response = router
            .clone()
            .oneshot(upload_request(&bearer, "notes.txt", "text/plain", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Allowed extension, but the payload is not an Office container.
        let response = router
            .clone()
            .oneshot(upload_request(&bearer, "report.docx", DOCX_MIME, b"plain text"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_download_link_roundtrip() {
        let (router, state, _dir) = test_app();
        let ops = ops_token(&router, &state).await;

        signup_and_verify(&router, &state, "reader@example.com", "reader-password").await;
        let reader = login(&router, "reader@example.com", "reader-password").await;

        // Ops uploads; any active user may mint a link and redeem it.
        let data = fake_docx();
        let response = router
            .clone()
            .oneshot(upload_request(&ops, "shared.docx", DOCX_MIME, &data))
            .await
            .unwrap();
        let file_id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = router
            .clone()
            .oneshot(bearer_request(
                Method::GET,
                &format!("/files/download/{file_id}"),
                &reader,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["message"], "success");
        let link = json["download_link"].as_str().unwrap().to_string();
        let token = link.split("token=").nth(1).unwrap().to_string();

        let response = router
            .clone()
            .oneshot(bearer_request(
                Method::GET,
                &format!("/files/download?token={token}"),
                &reader,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response
            .headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("shared.docx"));
        assert_eq!(body_bytes(response).await, data);
    }

    #[tokio::test]
    async fn test_superseded_and_unknown_tokens_404() {
        let (router, state, _dir) = test_app();
        let ops = ops_token(&router, &state).await;

        let response = router
            .clone()
            .oneshot(upload_request(&ops, "doc.docx", DOCX_MIME, &fake_docx()))
            .await
            .unwrap();
        let file_id = body_json(response).await["id"].as_str().unwrap().to_string();

        // Unknown token.
        let response = router
            .clone()
            .oneshot(bearer_request(
                Method::GET,
                "/files/download?token=never-issued",
                &ops,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Mint two links; the first token stops resolving.
        let response = router
            .clone()
            .oneshot(bearer_request(
                Method::GET,
                &format!("/files/download/{file_id}"),
                &ops,
            ))
            .await
            .unwrap();
        let first_link = body_json(response).await["download_link"]
            .as_str()
            .unwrap()
            .to_string();
        let first_token = first_link.split("token=").nth(1).unwrap().to_string();

        let response = router
            .clone()
            .oneshot(bearer_request(
                Method::GET,
                &format!("/files/download/{file_id}"),
                &ops,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(bearer_request(
                Method::GET,
                &format!("/files/download?token={first_token}"),
                &ops,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_shows_only_own_files_newest_first() {
        let (router, state, _dir) = test_app();
        let ops = ops_token(&router, &state).await;

        signup_and_verify(&router, &state, "other@example.com", "other-password").await;
        let other = login(&router, "other@example.com", "other-password").await;

        for name in ["first.docx", "second.docx"] {
            let response = router
                .clone()
                .oneshot(upload_request(&ops, name, DOCX_MIME, &fake_docx()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            // Keep creation timestamps strictly ordered.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let response = router
            .clone()
            .oneshot(bearer_request(Method::GET, "/files/list", &ops))
            .await
            .unwrap();
        let json = body_json(response).await;
        let listed = json.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0]["filename"], "second.docx");
        assert_eq!(listed[1]["filename"], "first.docx");

        // The other user sees none of them.
        let response = router
            .clone()
            .oneshot(bearer_request(Method::GET, "/files/list", &other))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_make_ops_user_flow() {
        let (router, state, _dir) = test_app();
        let ops = ops_token(&router, &state).await;

        signup_and_verify(&router, &state, "promote@example.com", "promote-password").await;
        let regular = login(&router, "promote@example.com", "promote-password").await;

        // A regular caller may not elevate anyone.
        let response = router
            .clone()
            .oneshot(bearer_request(
                Method::POST,
                "/auth/make-ops-user?email=promote@example.com",
                &regular,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Unknown targets are reported as missing.
        let response = router
            .clone()
            .oneshot(bearer_request(
                Method::POST,
                "/auth/make-ops-user?email=ghost@example.com",
                &ops,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Elevation by an ops caller unlocks upload for the target.
        let response = router
            .clone()
            .oneshot(bearer_request(
                Method::POST,
                "/auth/make-ops-user?email=promote@example.com",
                &ops,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .clone()
            .oneshot(upload_request(&regular, "now-allowed.docx", DOCX_MIME, &fake_docx()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_delete_file_removes_record_and_blob() {
        let (router, state, _dir) = test_app();
        let ops = ops_token(&router, &state).await;

        let response = router
            .clone()
            .oneshot(upload_request(&ops, "victim.docx", DOCX_MIME, &fake_docx()))
            .await
            .unwrap();
        let file_id = body_json(response).await["id"].as_str().unwrap().to_string();

        let record = state
            .metadata
            .get_file_by_id(file_id.parse().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(state.storage.exists(&record.storage_key).await.unwrap());

        let response = router
            .clone()
            .oneshot(bearer_request(
                Method::DELETE,
                &format!("/files/{file_id}"),
                &ops,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(state
            .metadata
            .get_file_by_id(file_id.parse().unwrap())
            .await
            .unwrap()
            .is_none());
        assert!(!state.storage.exists(&record.storage_key).await.unwrap());

        // Deleting again reports absence.
        let response = router
            .clone()
            .oneshot(bearer_request(
                Method::DELETE,
                &format!("/files/{file_id}"),
                &ops,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_forbidden_for_regular_user() {
        let (router, state, _dir) = test_app();
        let ops = ops_token(&router, &state).await;

        signup_and_verify(&router, &state, "user@example.com", "user-password").await;
        let regular = login(&router, "user@example.com", "user-password").await;

        let response = router
            .clone()
            .oneshot(upload_request(&ops, "keep.docx", DOCX_MIME, &fake_docx()))
            .await
            .unwrap();
        let file_id = body_json(response).await["id"].as_str().unwrap().to_string();

        let response = router
            .clone()
            .oneshot(bearer_request(
                Method::DELETE,
                &format!("/files/{file_id}"),
                &regular,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_verify_email_unknown_token() {
        let (router, _state, _dir) = test_app();
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/auth/verify-email?token=never-issued")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_openapi_document_served() {
        let (router, _state, _dir) = test_app();
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["info"]["title"], "DocVault API");
        assert!(json["paths"].get("/files/upload").is_some());
    }
}
