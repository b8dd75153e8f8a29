//! HTTP surface: router, handlers and server setup.

use std::num::NonZeroU16;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tracing::{error, info};

use crate::constants::MAX_BODY_BYTES;
use crate::coordinator::FallbackCoordinator;

mod edit;
mod generate;
mod middleware;
mod prelude;

use prelude::*;

use edit::{photoroom_handler, remove_text_handler, resize_handler, translate_handler};
use generate::{generate_ad_handler, generate_handler};

#[derive(Clone)]
pub(crate) struct AppState {
    coordinator: Arc<FallbackCoordinator>,
}

impl AppState {
    fn new(coordinator: FallbackCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
        }
    }
}

async fn root_handler() -> Json<Value> {
    Json(json!({
        "message": "StaticGenius API Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "generate": "POST /api/generate",
            "generateAd": "POST /api/generate-ad",
            "photoroom": "POST /api/photoroom",
            "removeText": "POST /api/remove-text",
            "translate": "POST /api/translate",
            "gptResize": "POST /api/gpt-resize",
        },
    }))
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "OK",
        "timestamp": crate::model::iso_timestamp_now(),
    }))
}

fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/api/generate", post(generate_handler))
        .route("/api/generate-ad", post(generate_ad_handler))
        .route("/api/photoroom", post(photoroom_handler))
        .route("/api/remove-text", post(remove_text_handler))
        .route("/api/translate", post(translate_handler))
        .route("/api/gpt-resize", post(resize_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::cors_layer())
}

/// Binds the listener and serves the gateway until the process exits.
pub async fn setup_server(
    listen_addr: &str,
    port: NonZeroU16,
    coordinator: FallbackCoordinator,
) -> Result<(), anyhow::Error> {
    let app = create_router().with_state(AppState::new(coordinator));

    let addr = format!("{}:{}", listen_addr, port);
    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", err);
        }
        info!("Shutting down");
    });
    if let Err(err) = server.await {
        error!("Server error: {}", err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::GatewayConfig;
    use crate::coordinator::Adapters;
    use crate::model::ProviderId;
    use crate::test_helpers::{ScriptedAdapter, solid_png};

    fn app_with(primary: ScriptedAdapter, backup: ScriptedAdapter) -> Router {
        let adapters = Adapters {
            primary: Arc::new(primary),
            backup: Arc::new(backup),
            editor: Arc::new(ScriptedAdapter::returning(
                ProviderId::ImageEdit,
                &["data:image/png;base64,AAAA"],
            )),
        };
        let coordinator =
            FallbackCoordinator::new(GatewayConfig::for_tests(), adapters, reqwest::Client::new());
        create_router().with_state(AppState::new(coordinator))
    }

    fn default_app() -> Router {
        app_with(
            ScriptedAdapter::returning(
                ProviderId::PrimaryGenerate,
                &["https://img.example.org/p.png"],
            ),
            ScriptedAdapter::returning(
                ProviderId::BackupGenerate,
                &["https://img.example.org/b.jpg"],
            ),
        )
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = default_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["status"], "OK");
        assert!(
            body["timestamp"]
                .as_str()
                .is_some_and(|ts| ts.ends_with('Z'))
        );
    }

    #[tokio::test]
    async fn root_lists_endpoints() {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = default_app().oneshot(request).await.unwrap();
        let body = read_json(response).await;
        assert_eq!(body["message"], "StaticGenius API Server");
        assert_eq!(body["endpoints"]["generate"], "POST /api/generate");
    }

    #[tokio::test]
    async fn empty_prompt_is_a_bad_request() {
        let response = default_app()
            .oneshot(json_request("/api/generate", json!({ "prompt": "  " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert!(body["error"].as_str().is_some());
        assert!(body["timestamp"].as_str().is_some());
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/generate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = default_app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn generate_returns_primary_images() {
        let response = default_app()
            .oneshot(json_request(
                "/api/generate",
                json!({ "prompt": "a red shoe", "aspectRatio": "1:1", "numOutputs": 1 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["images"][0], "https://img.example.org/p.png");
        assert_eq!(body["model_used"], "openai/gpt-image-1");
        assert_eq!(body["is_backup"], false);
        assert!(body.get("backup_message").is_none());
    }

    #[tokio::test]
    async fn generate_reports_backup_use() {
        let app = app_with(
            ScriptedAdapter::failing(ProviderId::PrimaryGenerate, 500),
            ScriptedAdapter::returning(
                ProviderId::BackupGenerate,
                &["https://img.example.org/b.jpg"],
            ),
        );
        let response = app
            .oneshot(json_request(
                "/api/generate",
                json!({ "prompt": "a red shoe" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["model_used"], "google/imagen-4");
        assert_eq!(body["is_backup"], true);
        assert!(body["backup_message"].as_str().is_some());
    }

    #[tokio::test]
    async fn total_failure_lists_attempts() {
        let app = app_with(
            ScriptedAdapter::failing(ProviderId::PrimaryGenerate, 500),
            ScriptedAdapter::failing(ProviderId::BackupGenerate, 503),
        );
        let response = app
            .oneshot(json_request(
                "/api/generate",
                json!({ "prompt": "a red shoe" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = read_json(response).await;
        let attempts = body["attempts"].as_array().expect("attempts");
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0]["provider"], "openai/gpt-image-1");
        assert_eq!(attempts[1]["provider"], "google/imagen-4");
    }

    #[tokio::test]
    async fn expansion_requires_a_known_ratio() {
        let response = default_app()
            .oneshot(json_request(
                "/api/photoroom",
                json!({ "imageUrl": "https://img.example.org/a.png", "targetRatio": "7:3" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ads_need_a_product() {
        let response = default_app()
            .oneshot(json_request(
                "/api/generate-ad",
                json!({ "productName": "", "formats": ["Standard"] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    fn multipart_request(uri: &str, image: &[u8], language: Option<&str>) -> Request<Body> {
        let boundary = "gatewayboundary";
        let mut body = Vec::new();
        if let Some(language) = language {
            body.extend_from_slice(
                format!(
                    "--{boundary}\r\nContent-Disposition: form-data; name=\"targetLanguage\"\r\n\r\n{language}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"imageFile\"; filename=\"ad.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn translate_accepts_an_upload() {
        let png = solid_png(16, 16, [200, 10, 10]);
        let response = default_app()
            .oneshot(multipart_request("/api/translate", &png, Some("JP")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["imageUrl"], "https://img.example.org/p.png");
        assert_eq!(body["language"], "JP");
        assert_eq!(body["metadata"]["targetLanguage"], "Japanese");
        assert_eq!(body["metadata"]["originalFileName"], "ad.png");
    }

    #[tokio::test]
    async fn translate_requires_a_language() {
        let png = solid_png(16, 16, [200, 10, 10]);
        let response = default_app()
            .oneshot(multipart_request("/api/translate", &png, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn resize_reports_three_by_two() {
        let png = solid_png(16, 16, [0, 0, 200]);
        let response = default_app()
            .oneshot(multipart_request("/api/gpt-resize", &png, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["metadata"]["targetRatio"], "3:2");
    }

    #[tokio::test]
    async fn cors_allows_local_front_end() {
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let response = default_app().oneshot(request).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .expect("cors header"),
            "http://localhost:5173"
        );
    }
}
