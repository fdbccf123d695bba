use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.uploads.max_upload_size as usize + MULTIPART_OVERHEAD;

    Router::new()
        // Auth
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/forgot-password", post(handlers::forgot_password))
        .route("/api/auth/reset-password", post(handlers::reset_password))
        // Uploads
        .route(
            "/api/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // The stream handler counts bytes against its own ceiling
        .route(
            "/api/upload/stream",
            post(handlers::upload_stream).layer(DefaultBodyLimit::disable()),
        )
        // Files
        .route("/api/files", get(handlers::list_files))
        .route(
            "/api/files/:id",
            get(handlers::download_file).delete(handlers::delete_file),
        )
        // Internal
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::create_router;
    use crate::storage::BackendKind;
    use crate::testutil::test_state;

    const BOUNDARY: &str = "vault-test-boundary";

    async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn post_json(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn register(app: &axum::Router, email: &str) -> String {
        let (status, body) = post_json(
            app,
            "/api/auth/register",
            json!({"email": email, "password": "correct horse", "name": "Test"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }

    fn multipart_request(token: &str, file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::post("/api/upload")
            .header("authorization", format!("Bearer {token}"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir, BackendKind::Relational).await);

        let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_register_login_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir, BackendKind::Relational).await);

        register(&app, "Alice@Example.com").await;

        let (status, _) = post_json(
            &app,
            "/api/auth/register",
            json!({"email": "alice@example.com", "password": "another pass", "name": "Other"}),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = post_json(
            &app,
            "/api/auth/login",
            json!({"email": "alice@example.com", "password": "correct horse"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].as_str().is_some());

        let (status, wrong_password) = post_json(
            &app,
            "/api/auth/login",
            json!({"email": "alice@example.com", "password": "wrong horse"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, unknown_user) = post_json(
            &app,
            "/api/auth/login",
            json!({"email": "nobody@example.com", "password": "correct horse"}),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_password["message"], unknown_user["message"]);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir, BackendKind::Document).await);

        let (status, _) = post_json(
            &app,
            "/api/auth/register",
            json!({"email": "not-an-email", "password": "correct horse", "name": "Test"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(
            &app,
            "/api/auth/register",
            json!({"email": "bob@example.com", "password": "short", "name": "Test"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(
            &app,
            "/api/auth/register",
            json!({"email": "bob@example.com", "password": "correct horse", "name": "   "}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir, BackendKind::Document).await);
        register(&app, "carol@example.com").await;

        let (status, _) = post_json(
            &app,
            "/api/auth/forgot-password",
            json!({"email": "nobody@example.com"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = post_json(
            &app,
            "/api/auth/forgot-password",
            json!({"email": "carol@example.com"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let reset_token = body["resetToken"].as_str().unwrap().to_string();

        let (status, _) = post_json(
            &app,
            "/api/auth/reset-password",
            json!({"email": "carol@example.com", "token": "wrong", "newPassword": "brand new pass"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(
            &app,
            "/api/auth/reset-password",
            json!({"email": "carol@example.com", "token": reset_token, "newPassword": "brand new pass"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        // The token is single use
        let (status, _) = post_json(
            &app,
            "/api/auth/reset-password",
            json!({"email": "carol@example.com", "token": reset_token, "newPassword": "third pass!"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(
            &app,
            "/api/auth/login",
            json!({"email": "carol@example.com", "password": "brand new pass"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_file_routes_require_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir, BackendKind::Relational).await);

        let (status, _) = send(&app, Request::get("/api/files").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, authed("GET", "/api/files", "garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_upload_list_download_delete() {
        for backend in [BackendKind::Relational, BackendKind::Document] {
            let dir = tempfile::tempdir().unwrap();
            let app = create_router(test_state(&dir, backend).await);
            let token = register(&app, "dave@example.com").await;

            let data = b"\x89PNG fake image bytes";
            let (status, body) =
                send(&app, multipart_request(&token, "holiday.png", "image/png", data)).await;
            assert_eq!(status, StatusCode::CREATED);
            let body: Value = serde_json::from_slice(&body).unwrap();
            let id = body["file"]["id"].as_str().unwrap().to_string();
            assert_eq!(body["file"]["size"], data.len());

            let (status, body) = send(&app, authed("GET", "/api/files", &token)).await;
            assert_eq!(status, StatusCode::OK);
            let list: Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(list.as_array().unwrap().len(), 1);
            assert_eq!(list[0]["original_name"], "holiday.png");
            assert!(list[0].get("path").is_none());

            let response = app
                .clone()
                .oneshot(authed("GET", &format!("/api/files/{id}"), &token))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["content-type"], "image/png");
            assert_eq!(
                response.headers()["content-disposition"],
                "attachment; filename=\"holiday.png\""
            );
            let downloaded = response.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&downloaded[..], data);

            // Another user can't see it
            let other = register(&app, "eve@example.com").await;
            let (status, _) = send(&app, authed("GET", &format!("/api/files/{id}"), &other)).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
            let (status, _) =
                send(&app, authed("DELETE", &format!("/api/files/{id}"), &other)).await;
            assert_eq!(status, StatusCode::NOT_FOUND);

            let (status, _) =
                send(&app, authed("DELETE", &format!("/api/files/{id}"), &token)).await;
            assert_eq!(status, StatusCode::OK);

            let (_, body) = send(&app, authed("GET", "/api/files", &token)).await;
            let list: Value = serde_json::from_slice(&body).unwrap();
            assert!(list.as_array().unwrap().is_empty());

            let (status, _) =
                send(&app, authed("DELETE", &format!("/api/files/{id}"), &token)).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_upload_rejects_invalid_type() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, BackendKind::Relational).await;
        let app = create_router(state.clone());
        let token = register(&app, "frank@example.com").await;

        let (status, body) = send(
            &app,
            multipart_request(&token, "script.sh", "text/x-shellscript", b"echo hi"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["message"], "Invalid file type");

        let staged = std::fs::read_dir(state.uploads.blobs().staging_path())
            .unwrap()
            .count();
        assert_eq!(staged, 0);
    }

    #[tokio::test]
    async fn test_upload_without_file_field() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir, BackendKind::Relational).await);
        let token = register(&app, "gina@example.com").await;

        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::post("/api/upload")
            .header("authorization", format!("Bearer {token}"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, BackendKind::Relational).await;
        let app = create_router(state.clone());
        let token = register(&app, "hank@example.com").await;

        let data = vec![0u8; state.config.uploads.max_upload_size as usize + 1];
        let (status, _) = send(&app, multipart_request(&token, "big.png", "image/png", &data)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let staged = std::fs::read_dir(state.uploads.blobs().staging_path())
            .unwrap()
            .count();
        assert_eq!(staged, 0);
    }

    #[tokio::test]
    async fn test_stream_upload() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir, BackendKind::Relational).await;
        let app = create_router(state.clone());
        let token = register(&app, "iris@example.com").await;

        let request = Request::post("/api/upload/stream")
            .header("authorization", format!("Bearer {token}"))
            .header("x-file-name", "notes.txt")
            .header("content-type", "text/plain")
            .body(Body::from("streamed contents"))
            .unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["file"]["original_name"], "notes.txt");
        assert_eq!(body["file"]["size"], 17);

        let declared = state.config.uploads.max_stream_size + 1;
        let request = Request::post("/api/upload/stream")
            .header("authorization", format!("Bearer {token}"))
            .header("content-length", declared.to_string())
            .body(Body::from("small"))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let (_, body) = send(&app, authed("GET", "/api/files", &token)).await;
        let list: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(list.as_array().unwrap().len(), 1);
    }
}
