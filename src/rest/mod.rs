//! REST Admission API: call registration plus a basic health endpoint.
//!
//! The teacher has no HTTP server of its own; grounded on the `axum`
//! router/handler/`IntoResponse` style found in `mmogr-gglib`'s
//! `gglib-proxy::server` (state-via-`State<T>`, JSON error bodies with an
//! explicit status code per failure branch) — the closest Rust HTTP control
//! plane in the retrieval pack to the Python `aiohttp` original
//! (`aicc_pipeline/api/call_metadata.py`, `aicc_pipeline/health/checker.py`).

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::pipeline::{Pipeline, PipelineError};

#[derive(Debug, Deserialize)]
struct RegisterCallRequest {
    call_id: String,
    customer_number: Option<String>,
    agent_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for &PipelineError {
    fn into_response(self) -> Response {
        let status = match self {
            PipelineError::PortPool(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Stt(_) | PipelineError::Udp(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

/// `POST /api/calls` — register a new call and receive its assigned port
/// pair. Idempotent on a duplicate `call_id`; 503 when the port pool is
/// exhausted (spec.md §4.12).
async fn register_call(State(pipeline): State<Arc<Pipeline>>, Json(body): Json<RegisterCallRequest>) -> Response {
    if body.call_id.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, Json(ErrorBody { error: "call_id is required".to_string() })).into_response();
    }

    match pipeline.register_call(body.call_id, body.customer_number, body.agent_id).await {
        Ok(handles) => (StatusCode::OK, Json(serde_json::json!({
            "status": "registered",
            "call_id": handles.call_id,
            "customer_port": handles.customer_port,
            "agent_port": handles.agent_port,
        })))
            .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "failed to register call");
            (&err).into_response()
        }
    }
}

/// `DELETE /api/calls/{call_id}` — ends a call, releasing its ports.
async fn end_call(State(pipeline): State<Arc<Pipeline>>, Path(call_id): Path<String>) -> Response {
    match pipeline.end_call(&call_id).await {
        Ok(()) => Json(serde_json::json!({ "status": "ended", "call_id": call_id })).into_response(),
        Err(err) => (&err).into_response(),
    }
}

/// `GET /api/calls/{call_id}` — snapshot of one call's session record.
async fn get_call(State(pipeline): State<Arc<Pipeline>>, Path(call_id): Path<String>) -> Response {
    match pipeline.registry().get(&call_id) {
        Some(session) => Json(session.snapshot()).into_response(),
        None => (StatusCode::NOT_FOUND, Json(ErrorBody { error: "call not found".to_string() })).into_response(),
    }
}

/// `GET /api/calls` — lists every active call.
async fn list_calls(State(pipeline): State<Arc<Pipeline>>) -> Response {
    let calls = pipeline.registry().list();
    Json(serde_json::json!({ "count": calls.len(), "calls": calls })).into_response()
}

/// `GET /healthz` — process uptime and active-call count, supplemented
/// from `aicc_pipeline/health/checker.py` (ambient operational surface,
/// not excluded by spec.md's Non-goals, which exclude the metrics
/// *exporter*, not a basic liveness probe).
async fn healthz(State(pipeline): State<Arc<Pipeline>>) -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": pipeline.uptime().as_secs(),
        "active_calls": pipeline.registry().len(),
    }))
    .into_response()
}

/// `GET /metrics/snapshot` — process-wide counters as JSON, in lieu of a
/// Prometheus scrape endpoint (external exporter wiring is a Non-goal).
async fn metrics_snapshot(State(pipeline): State<Arc<Pipeline>>) -> Response {
    Json(pipeline.metrics().snapshot()).into_response()
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/api/calls", post(register_call).get(list_calls))
        .route("/api/calls/:call_id", get(get_call).delete(end_call))
        .route("/healthz", get(healthz))
        .route("/metrics/snapshot", get(metrics_snapshot))
        .with_state(pipeline)
}

/// Serves the REST admission API on a pre-bound listener, matching the
/// teacher's `serve(listener, ...)` shape in `gglib-proxy::server`.
pub async fn serve(listener: TcpListener, pipeline: Arc<Pipeline>) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "REST admission API listening");
    axum::serve(listener, router(pipeline)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SttConfig, TurnWeights, WsConfig};
    use crate::error::SttError;
    use crate::metrics::Metrics;
    use crate::stt::provider::{ResultStream, SttProvider};
    use crate::stt::TranscriptResult;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    struct EchoProvider;

    #[async_trait]
    impl SttProvider for EchoProvider {
        async fn recognize(&self, cfg: &SttConfig, _pcm: &[u8]) -> Result<TranscriptResult, SttError> {
            Ok(TranscriptResult { text: "네".to_string(), language: cfg.language.clone(), confidence: 0.9 })
        }

        async fn streaming_recognize(&self, _cfg: &SttConfig, _audio_rx: tokio::sync::mpsc::Receiver<Vec<u8>>) -> Result<ResultStream, SttError> {
            Err(SttError::ProviderFailed("not used in this test".to_string()))
        }
    }

    fn test_pipeline(port_start: u16) -> Arc<Pipeline> {
        let config = Config {
            customer_port: 12345,
            agent_port: 12346,
            port_range_start: port_start,
            port_range_end: port_start + 4,
            rest_host: "127.0.0.1".to_string(),
            rest_port: 0,
            vad_threshold: 0.45,
            min_speech_ms: 300,
            min_silence_ms: 800,
            turn_weights: TurnWeights { morpheme: 0.6, duration: 0.2, silence: 0.2, complete_threshold: 0.65 },
            arbiter: crate::config::ArbiterConfig { min_silence_ms: 800, min_chars: 1, grace_period_ms: 1000 },
            ws: WsConfig { urls: vec!["ws://127.0.0.1:1/".to_string()], queue_maxsize: 10, reconnect_interval_secs: 5.0, auth_secret: None, auth_client_id: None, token_ttl_secs: 3600 },
            stt: SttConfig { language: "ko-KR".to_string(), phrases: vec![], phrase_boost: 10.0, rotation_secs: 270.0, audio_queue_maxsize: 300, credentials_path: None, endpoint: None, streaming: false },
            log_level: "info".to_string(),
        };
        Pipeline::new(config, Arc::new(Metrics::new()), Arc::new(EchoProvider))
    }

    #[tokio::test]
    async fn register_then_get_then_end_roundtrip() {
        let pipeline = test_pipeline(32000);
        let app = router(pipeline);

        let register = Request::builder()
            .method("POST")
            .uri("/api/calls")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"call_id":"call-1"}"#))
            .unwrap();
        let response = app.clone().oneshot(register).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let get = Request::builder().uri("/api/calls/call-1").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(get).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let end = Request::builder().method("DELETE").uri("/api/calls/call-1").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(end).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let missing = Request::builder().uri("/api/calls/call-1").body(Body::empty()).unwrap();
        let response = app.oneshot(missing).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn register_with_blank_call_id_is_rejected() {
        let pipeline = test_pipeline(32100);
        let app = router(pipeline);
        let request = Request::builder()
            .method("POST")
            .uri("/api/calls")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"call_id":""}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let pipeline = test_pipeline(32200);
        let app = router(pipeline);
        let request = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
