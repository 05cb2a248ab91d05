//! REST admission API exercised end-to-end through the router, including
//! port-pool exhaustion (spec.md §8 scenario 4): a pool with a single
//! pair available rejects the second registration with 503, and releases
//! the pair back to the pool once the call ends.

use std::sync::Arc;

use aicc_pipeline::config::{ArbiterConfig, Config, SttConfig, TurnWeights, WsConfig};
use aicc_pipeline::error::SttError;
use aicc_pipeline::metrics::Metrics;
use aicc_pipeline::pipeline::Pipeline;
use aicc_pipeline::rest::router;
use aicc_pipeline::stt::provider::{ResultStream, SttProvider};
use aicc_pipeline::stt::TranscriptResult;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
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

fn single_pair_config(port_start: u16) -> Config {
    Config {
        customer_port: 12345,
        agent_port: 12346,
        port_range_start: port_start,
        port_range_end: port_start + 2,
        rest_host: "127.0.0.1".to_string(),
        rest_port: 0,
        vad_threshold: 0.45,
        min_speech_ms: 300,
        min_silence_ms: 800,
        turn_weights: TurnWeights { morpheme: 0.6, duration: 0.2, silence: 0.2, complete_threshold: 0.65 },
        arbiter: ArbiterConfig { min_silence_ms: 800, min_chars: 1, grace_period_ms: 1000 },
        ws: WsConfig { urls: vec![], queue_maxsize: 10, reconnect_interval_secs: 5.0, auth_secret: None, auth_client_id: None, token_ttl_secs: 3600 },
        stt: SttConfig { language: "ko-KR".to_string(), phrases: vec![], phrase_boost: 10.0, rotation_secs: 270.0, audio_queue_maxsize: 300, credentials_path: None, endpoint: None, streaming: false },
        log_level: "info".to_string(),
    }
}

fn register_request(call_id: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/calls")
        .header("content-type", "application/json")
        .body(Body::from(format!(r#"{{"call_id":"{call_id}"}}"#)))
        .unwrap()
}

#[tokio::test]
async fn second_registration_is_rejected_when_pool_is_exhausted() {
    let pipeline = Pipeline::new(single_pair_config(33000), Arc::new(Metrics::new()), Arc::new(EchoProvider));
    let app = router(pipeline.clone());

    let first = app.clone().oneshot(register_request("call-a")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.clone().oneshot(register_request("call-b")).await.unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);

    assert_eq!(pipeline.metrics().snapshot().calls_rejected_pool_exhausted, 1);
}

#[tokio::test]
async fn ending_a_call_frees_its_ports_for_the_next_registration() {
    let pipeline = Pipeline::new(single_pair_config(33100), Arc::new(Metrics::new()), Arc::new(EchoProvider));
    let app = router(pipeline);

    let first = app.clone().oneshot(register_request("call-a")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let end = Request::builder().method("DELETE").uri("/api/calls/call-a").body(Body::empty()).unwrap();
    assert_eq!(app.clone().oneshot(end).await.unwrap().status(), StatusCode::OK);

    let second = app.oneshot(register_request("call-b")).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
}

#[tokio::test]
async fn list_calls_reflects_active_registrations() {
    let pipeline = Pipeline::new(single_pair_config(33200), Arc::new(Metrics::new()), Arc::new(EchoProvider));
    let app = router(pipeline);

    app.clone().oneshot(register_request("call-a")).await.unwrap();

    let list = Request::builder().uri("/api/calls").body(Body::empty()).unwrap();
    let response = app.oneshot(list).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["count"], 1);
    assert_eq!(json["calls"][0]["call_id"], "call-a");
}
