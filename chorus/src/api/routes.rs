use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::rate_limit::rate_limit_middleware;
use super::AppState;

/// Room for multipart boundaries and the prompt field on top of the file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.allowed_origins);
    let body_limit = state.config.upload.max_bytes + MULTIPART_OVERHEAD_BYTES;

    let api = Router::new()
        .route("/chat", post(handlers::chat))
        .layer(DefaultBodyLimit::max(body_limit))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if allowed_origins.iter().any(|origin| origin == "*") {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::config::{Config, RateLimitConfig};
    use crate::models::{MediaType, NormalizedMessage};
    use crate::providers::{ProviderAdapter, ProviderError};

    const BOUNDARY: &str = "chorus-test-boundary";

    struct Echo(&'static str);

    #[async_trait]
    impl ProviderAdapter for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn supported_media_types(&self) -> &[MediaType] {
            &MediaType::ALL
        }

        async fn invoke(&self, message: &NormalizedMessage) -> Result<String, ProviderError> {
            let images = message.images().count();
            Ok(format!("{} saw {} image(s): {}", self.0, images, message.text()))
        }
    }

    fn test_config(upload_dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.upload.dir = upload_dir.to_path_buf();
        config.upload.max_bytes = 1024;
        config.rate_limit = RateLimitConfig {
            window_ms: 60_000,
            max_requests: 100,
        };
        config.server.allowed_origins = vec!["http://localhost:5173".to_string()];
        config
    }

    fn app_with(config: Config, adapters: Vec<Arc<dyn ProviderAdapter>>) -> Router {
        create_router(AppState::new(config, adapters, CancellationToken::new()))
    }

    fn app(upload_dir: &std::path::Path) -> Router {
        app_with(
            test_config(upload_dir),
            vec![Arc::new(Echo("chatgpt")), Arc::new(Echo("claude"))],
        )
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                }
                Part::File(name, content_type, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn chat_request(parts: &[Part<'_>]) -> Request<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        request
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn upload_dir_is_empty(dir: &std::path::Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "healthy" }));
    }

    #[tokio::test]
    async fn test_chat_text_only() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(chat_request(&[Part::Text("prompt", "hello")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("ratelimit"));
        assert_eq!(
            body_json(response).await,
            json!({
                "chatgpt": "chatgpt saw 0 image(s): hello",
                "claude": "claude saw 0 image(s): hello",
            })
        );
    }

    #[tokio::test]
    async fn test_chat_with_image_under_either_field_name() {
        for field in ["file", "mediaFile"] {
            let dir = tempfile::tempdir().unwrap();
            let response = app(dir.path())
                .oneshot(chat_request(&[
                    Part::Text("prompt", "what is this"),
                    Part::File(field, "image/png", b"\x89PNG"),
                ]))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["claude"], "claude saw 1 image(s): what is this");
            assert!(upload_dir_is_empty(dir.path()));
        }
    }

    #[tokio::test]
    async fn test_chat_missing_prompt_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(chat_request(&[Part::Text("prompt", "   ")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "Prompt is required" })
        );
    }

    #[tokio::test]
    async fn test_chat_rejects_unsupported_file_type() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(chat_request(&[
                Part::Text("prompt", "read this"),
                Part::File("file", "application/pdf", b"%PDF-1.7"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "Invalid file type. Supported: JPEG, PNG, GIF, WebP");
        assert!(upload_dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_chat_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let big = vec![0u8; 2048];
        let response = app(dir.path())
            .oneshot(chat_request(&[
                Part::Text("prompt", "big"),
                Part::File("file", "image/jpeg", &big),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"], "File too large (max 1024 bytes)");
        assert!(upload_dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_chat_rejects_second_file() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(chat_request(&[
                Part::Text("prompt", "two"),
                Part::File("file", "image/png", b"one"),
                Part::File("mediaFile", "image/png", b"two"),
            ]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(upload_dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_chat_without_multipart_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request::post("/api/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"prompt":"hi"}"#))
            .unwrap();

        let response = app(dir.path()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_without_providers_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let response = app_with(test_config(dir.path()), Vec::new())
            .oneshot(chat_request(&[Part::Text("prompt", "hello")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "AI client is not initialized" })
        );
    }

    #[tokio::test]
    async fn test_rate_limit_applies_to_api_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.rate_limit.max_requests = 1;
        let app = app_with(config, vec![Arc::new(Echo("chatgpt"))]);

        let first = app
            .clone()
            .oneshot(chat_request(&[Part::Text("prompt", "one")]))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .clone()
            .oneshot(chat_request(&[Part::Text("prompt", "two")]))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));
        assert_eq!(second.headers()["ratelimit-policy"], "1;w=60");

        let health = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin() {
        let dir = tempfile::tempdir().unwrap();
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/chat")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = app(dir.path()).oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5173"
        );
    }
}
