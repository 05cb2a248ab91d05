//! Batch-mode STT: accumulate PCM, submit one recognize RPC per turn.
//!
//! Grounded on `aicc_pipeline/stt/google_stt.py`'s buffer-then-transcribe
//! shape, generalized behind [`super::provider::SttProvider`] instead of a
//! single vendor SDK.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::config::SttConfig;
use crate::error::SttError;

use super::provider::SttProvider;
use super::{SpeechToText, TranscriptResult};

pub struct BatchStt {
    provider: Arc<dyn SttProvider>,
    config: SttConfig,
    buffer: Mutex<Vec<u8>>,
}

impl BatchStt {
    pub fn new(provider: Arc<dyn SttProvider>, config: SttConfig) -> Self {
        Self { provider, config, buffer: Mutex::new(Vec::new()) }
    }

    fn pcm_to_bytes(pcm: &[i16]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(pcm.len() * 2);
        for sample in pcm {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }
}

#[async_trait]
impl SpeechToText for BatchStt {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn is_initialized(&self) -> bool {
        true
    }

    async fn initialize(&self) -> Result<(), SttError> {
        Ok(())
    }

    async fn add_audio(&self, pcm: &[i16]) {
        self.buffer.lock().extend_from_slice(&Self::pcm_to_bytes(pcm));
    }

    async fn transcribe(&self) -> TranscriptResult {
        let buffer = self.buffer.lock().clone();
        if buffer.is_empty() {
            return TranscriptResult { text: String::new(), language: self.config.language.clone(), confidence: 0.0 };
        }

        match self.provider.recognize(&self.config, &buffer).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(error = %err, "batch STT recognize failed, returning empty transcript");
                TranscriptResult { text: String::new(), language: self.config.language.clone(), confidence: 0.0 }
            }
        }
    }

    async fn clear(&self) {
        self.buffer.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::provider::ResultStream;

    struct FailingProvider;

    #[async_trait]
    impl SttProvider for FailingProvider {
        async fn recognize(&self, _cfg: &SttConfig, _pcm: &[u8]) -> Result<TranscriptResult, SttError> {
            Err(SttError::ProviderFailed("unreachable".to_string()))
        }

        async fn streaming_recognize(
            &self,
            _cfg: &SttConfig,
            _audio_rx: tokio::sync::mpsc::Receiver<Vec<u8>>,
        ) -> Result<ResultStream, SttError> {
            Err(SttError::ProviderFailed("unreachable".to_string()))
        }
    }

    fn config() -> SttConfig {
        SttConfig {
            language: "ko-KR".to_string(),
            phrases: vec![],
            phrase_boost: 10.0,
            rotation_secs: 270.0,
            audio_queue_maxsize: 300,
            credentials_path: None,
            endpoint: None,
            streaming: false,
        }
    }

    #[tokio::test]
    async fn transcribe_with_empty_buffer_returns_empty_text() {
        let stt = BatchStt::new(Arc::new(FailingProvider), config());
        let result = stt.transcribe().await;
        assert_eq!(result.text, "");
    }

    #[tokio::test]
    async fn provider_failure_yields_empty_transcript_not_error() {
        let stt = BatchStt::new(Arc::new(FailingProvider), config());
        stt.add_audio(&[1, 2, 3]).await;
        let result = stt.transcribe().await;
        assert_eq!(result.text, "");
    }

    #[tokio::test]
    async fn clear_empties_buffer() {
        let stt = BatchStt::new(Arc::new(FailingProvider), config());
        stt.add_audio(&[1, 2, 3]).await;
        stt.clear().await;
        assert!(stt.buffer.lock().is_empty());
    }
}
