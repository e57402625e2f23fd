pub mod chat;
pub mod health;
pub mod session;
pub mod upload;

use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

pub fn router(state: AppState) -> Router {
    // headroom over the upload limit so oversized files reach the handler and get a 413
    let body_limit = state.settings.upload.max_file_size_bytes + 1024 * 1024;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/init_session", post(session::init_session))
        .route("/reset", post(session::reset_session))
        .route("/session/{session_id}", get(session::session_snapshot))
        .route("/chat", post(chat::chat_handler))
        .route("/upload", post(upload::upload_handler))
        // CORS
        .layer(CorsLayer::permissive())
        // Tracing
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::services::providers::{MockEmbeddingProvider, MockLlmProvider, MockVisionProvider};
    use crate::services::retrieval::InMemoryIndexStore;
    use crate::services::session::InMemoryConversationStore;
    use crate::state::Capabilities;
    use crate::utils::error::CAPABILITY_MESSAGE;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-TEST-BOUNDARY";

    fn app_with(llm: MockLlmProvider) -> Router {
        let mut embedder = MockEmbeddingProvider::new();
        embedder.expect_embed().returning(|_| Ok(vec![1.0, 0.0]));
        embedder
            .expect_embed_batch()
            .returning(|texts| Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect()));

        let mut settings = Settings::default();
        settings.upload.max_file_size_bytes = 256;

        let state = AppState::build(
            settings,
            Capabilities {
                llm: Arc::new(llm),
                vision: Arc::new(MockVisionProvider::new()),
                embedder: Arc::new(embedder),
            },
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(InMemoryIndexStore::new()),
        )
        .unwrap();
        router(state)
    }

    fn echo_llm() -> MockLlmProvider {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate().returning(|prompt| {
            if prompt.contains("Contesto:") {
                Ok("Parla di turni di reperibilità (turni.txt).".to_string())
            } else {
                Ok("4".to_string())
            }
        });
        llm
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn upload_request(session_id: &str, filename: &str, content: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\n{sid}\r\n\
                 --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                b = BOUNDARY,
                sid = session_id,
                f = filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app_with(MockLlmProvider::new());
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_init_session_returns_uuid() {
        let app = app_with(MockLlmProvider::new());
        let (status, body) = send(&app, json_request("/init_session", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        let id = body["session_id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_chat_requires_session_id() {
        let app = app_with(MockLlmProvider::new());
        let (status, body) = send(&app, json_request("/chat", json!({"message": "ciao"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "session_id obbligatorio");
    }

    #[tokio::test]
    async fn test_chat_general() {
        let app = app_with(echo_llm());
        let (status, body) = send(
            &app,
            json_request("/chat", json!({"session_id": "s1", "message": "quanto fa 2+2?"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agent"], "general");
        assert_eq!(body["answer"], "4");
        assert_eq!(body["session_id"], "s1");
        assert!(body["elapsed_time"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_chat_capability_failure_is_503() {
        let mut llm = MockLlmProvider::new();
        llm.expect_generate()
            .returning(|_| Err(anyhow::anyhow!("connection refused")));
        let app = app_with(llm);

        let (status, body) = send(
            &app,
            json_request("/chat", json!({"session_id": "s1", "message": "ciao"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["message"], CAPABILITY_MESSAGE);
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let app = app_with(MockLlmProvider::new());

        let (status, _) = send(&app, upload_request("s1", "setup.exe", b"MZ")).await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let (status, _) = send(&app, upload_request("s1", "big.txt", &[b'a'; 300])).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let (status, _) = send(&app, upload_request("s1", "blank.txt", b"   \n  ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_document_upload_then_document_chat() {
        let app = app_with(echo_llm());

        let (status, body) = send(
            &app,
            upload_request("s2", "turni.txt", "Turni di reperibilità: lunedì Rossi, martedì Bianchi.".as_bytes()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "document");
        assert_eq!(body["index"], "fresh");
        assert_eq!(body["chunks"], 1);
        assert!(body.get("pages").is_none());

        let snapshot = Request::builder().uri("/session/s2").body(Body::empty()).unwrap();
        let (status, body) = send(&app, snapshot).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["has_document"], true);

        let (status, body) = send(
            &app,
            json_request("/chat", json!({"session_id": "s2", "message": "di cosa parla il file?"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agent"], "document");
        assert_eq!(body["sources"], json!(["turni.txt"]));
    }

    #[tokio::test]
    async fn test_image_upload() {
        let app = app_with(MockLlmProvider::new());
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        let (status, body) = send(&app, upload_request("s3", "foto.png", &png)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "image");
        assert!(body.get("index").is_none());
    }

    #[tokio::test]
    async fn test_reset_and_unknown_snapshot() {
        let app = app_with(echo_llm());
        send(
            &app,
            json_request("/chat", json!({"session_id": "s4", "message": "ciao"})),
        )
        .await;

        let (status, body) = send(&app, json_request("/reset", json!({"session_id": "s4"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "reset");

        let snapshot = Request::builder().uri("/session/s4").body(Body::empty()).unwrap();
        let (_, body) = send(&app, snapshot).await;
        assert_eq!(body["turns"], 0);

        let missing = Request::builder().uri("/session/nobody").body(Body::empty()).unwrap();
        let (status, _) = send(&app, missing).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
