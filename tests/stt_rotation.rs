//! Continuous STT session rotation (spec.md §8 scenario 6): the session
//! manager opens a warm standby immediately and swaps to it once
//! `AICC_STT_ROTATION_SECS` elapses, without the caller ever seeing a gap.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aicc_pipeline::config::SttConfig;
use aicc_pipeline::error::SttError;
use aicc_pipeline::proto::stt_proto::StreamingRecognizeResponse;
use aicc_pipeline::stt::provider::{ResultStream, SttProvider};
use aicc_pipeline::stt::{ContinuousSttSession, TranscriptResult};

use async_trait::async_trait;
use futures_util::stream;
use tokio::sync::mpsc;

/// Counts how many streaming sessions have been opened, standing in for
/// a real gRPC provider. Every session's inbound stream is pending
/// forever, since this test only cares about rotation bookkeeping.
struct CountingProvider {
    sessions_opened: Arc<AtomicUsize>,
}

#[async_trait]
impl SttProvider for CountingProvider {
    async fn recognize(&self, cfg: &SttConfig, _pcm: &[u8]) -> Result<TranscriptResult, SttError> {
        Ok(TranscriptResult { text: String::new(), language: cfg.language.clone(), confidence: 0.0 })
    }

    async fn streaming_recognize(&self, _cfg: &SttConfig, _audio_rx: mpsc::Receiver<Vec<u8>>) -> Result<ResultStream, SttError> {
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        let empty: Pin<Box<dyn futures_util::Stream<Item = Result<StreamingRecognizeResponse, SttError>> + Send>> = Box::pin(stream::pending());
        Ok(empty)
    }
}

fn rotation_config() -> SttConfig {
    SttConfig {
        language: "ko-KR".to_string(),
        phrases: vec![],
        phrase_boost: 10.0,
        // Floored to 1 second by the continuous session manager itself.
        rotation_secs: 0.1,
        audio_queue_maxsize: 300,
        credentials_path: None,
        endpoint: None,
        streaming: true,
    }
}

#[tokio::test]
async fn session_opens_a_warm_standby_before_rotating() {
    let sessions_opened = Arc::new(AtomicUsize::new(0));
    let provider: Arc<dyn SttProvider> = Arc::new(CountingProvider { sessions_opened: sessions_opened.clone() });
    let (result_tx, _result_rx) = mpsc::channel(16);

    let session = ContinuousSttSession::start(provider, rotation_config(), "call-1".to_string(), "customer".to_string(), result_tx)
        .await
        .expect("continuous session starts");

    // Active session opens synchronously; standby prep is spawned right after.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sessions_opened.load(Ordering::SeqCst), 2, "expected one active plus one warm standby session");

    session.stop().await;
}

#[tokio::test]
async fn rotation_opens_a_fresh_standby_after_swapping_in_the_old_one() {
    let sessions_opened = Arc::new(AtomicUsize::new(0));
    let provider: Arc<dyn SttProvider> = Arc::new(CountingProvider { sessions_opened: sessions_opened.clone() });
    let (result_tx, _result_rx) = mpsc::channel(16);

    let session = ContinuousSttSession::start(provider, rotation_config(), "call-1".to_string(), "customer".to_string(), result_tx)
        .await
        .expect("continuous session starts");

    // One rotation tick (floored to 1s) plus margin for the standby-prep task.
    tokio::time::sleep(Duration::from_millis(1300)).await;

    assert!(
        sessions_opened.load(Ordering::SeqCst) >= 3,
        "expected active + standby + post-rotation standby, got {}",
        sessions_opened.load(Ordering::SeqCst)
    );

    session.stop().await;
}
