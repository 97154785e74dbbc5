//! HTTP front end for the execution engine.
//!
//! Exposes `POST /run`, `GET /languages` and `GET /health`. Every request that
//! passes validation gets a 200 with the execution result, whichever variant it
//! is; only malformed requests are rejected with 400.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use snipbox_core::{ExecutionEngine, ExecutionRequest, ExecutionResult};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: ExecutionEngine,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

type HandlerError = (StatusCode, Json<Value>);

fn bad_request(message: impl Into<String>) -> HandlerError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
}

fn required(field: Option<String>, name: &str) -> Result<String, HandlerError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(bad_request(format!("Field '{}' is required", name))),
    }
}

async fn run_handler(
    State(state): State<AppState>,
    body: Result<Json<RunRequest>, JsonRejection>,
) -> Result<Json<ExecutionResult>, HandlerError> {
    let Json(body) = body.map_err(|rejection| bad_request(rejection.body_text()))?;
    let code = required(body.code, "code")?;
    let language = required(body.language, "language")?;

    log::info!("Received {} snippet ({} bytes)", language, code.len());
    let result = state
        .engine
        .execute(&ExecutionRequest::new(code, language))
        .await;
    Ok(Json(result))
}

async fn languages_handler(State(state): State<AppState>) -> Json<Value> {
    let languages: Vec<&str> = state.engine.registry().language_ids().collect();
    Json(json!({ "languages": languages }))
}

pub fn build_router(engine: ExecutionEngine) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .route("/languages", get(languages_handler))
        .route("/run", post(run_handler))
        .layer(CorsLayer::permissive())
        .with_state(AppState { engine })
}

/// Serves until `shutdown` resolves.
pub async fn serve<F>(engine: ExecutionEngine, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;
    log::info!("snipbox server listening on {}", addr);

    axum::serve(listener, build_router(engine))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use snipbox_core::runtime::DockerCli;
    use snipbox_core::{EngineConfig, LanguageRegistry, NetworkPolicy};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    fn router() -> (Router, TempDir) {
        let workspace = tempdir().unwrap();
        let config = EngineConfig::new(NetworkPolicy::Isolated)
            .with_workspace_root(workspace.path())
            .without_cache();
        let engine = ExecutionEngine::new(
            Arc::new(LanguageRegistry::builtin().unwrap()),
            Arc::new(DockerCli::new("snipbox-server-test-missing-runtime")),
            &config,
        );
        (build_router(engine), workspace)
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_run(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/run")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _workspace) = router();
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_languages_lists_builtins() {
        let (router, _workspace) = router();
        let request = Request::builder()
            .uri("/languages")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["languages"], json!(["bash", "javascript", "python"]));
    }

    #[tokio::test]
    async fn test_missing_or_empty_fields_are_rejected() {
        for body in [
            r#"{"language": "python"}"#,
            r#"{"code": "print(1)"}"#,
            r#"{"code": "", "language": "python"}"#,
            r#"{"code": "print(1)", "language": "  "}"#,
            "not json",
        ] {
            let (router, _workspace) = router();
            let (status, response) = send(router, post_run(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
            assert!(response["error"].is_string());
        }
    }

    #[tokio::test]
    async fn test_unsupported_language_is_a_result_not_an_http_error() {
        let (router, _workspace) = router();
        let (status, body) =
            send(router, post_run(r#"{"code": "puts 1", "language": "ruby"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error_kind"], "unsupported_language");
    }

    #[tokio::test]
    async fn test_runtime_failures_are_reported_in_the_body() {
        let (router, workspace) = router();
        let (status, body) = send(
            router,
            post_run(r#"{"code": "print(\"hi\")", "language": "python"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error_kind"], "runtime_unavailable");
        assert!(body.get("stdout").is_none());
        assert!(std::fs::read_dir(workspace.path()).unwrap().next().is_none());
    }
}
