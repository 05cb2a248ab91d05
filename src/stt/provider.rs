//! gRPC transport for the STT contract.
//!
//! `SttProvider` is the seam between the pipeline and the wire: batch and
//! streaming adapters both go through it, so a test double can stand in
//! without touching tonic. `GrpcSttProvider` is the concrete client
//! generated from `proto/stt.proto` via `build.rs` (tonic + prost, already
//! teacher dependencies).

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use tonic::transport::Channel;
use tonic::Request;

use crate::config::SttConfig;
use crate::error::SttError;
use crate::proto::stt_proto::{
    speech_to_text_client::SpeechToTextClient, streaming_recognize_request, RecognitionConfig,
    RecognizeRequest, StreamingRecognizeRequest, StreamingRecognizeResponse,
};

use super::TranscriptResult;

pub type ResultStream = Pin<Box<dyn Stream<Item = Result<StreamingRecognizeResponse, SttError>> + Send>>;

fn recognition_config(cfg: &SttConfig) -> RecognitionConfig {
    RecognitionConfig {
        sample_rate_hertz: 16000,
        audio_channel_count: 1,
        language_code: cfg.language.clone(),
        model: "telephony".to_string(),
        phrases: cfg.phrases.clone(),
        phrase_boost: cfg.phrase_boost,
        interim_results: true,
    }
}

/// Transport abstraction between the pipeline and the STT wire contract.
#[async_trait]
pub trait SttProvider: Send + Sync {
    async fn recognize(&self, cfg: &SttConfig, pcm: &[u8]) -> Result<TranscriptResult, SttError>;

    /// Opens a bidirectional streaming session, fed by `audio_rx`, and
    /// returns a stream of recognition results.
    async fn streaming_recognize(
        &self,
        cfg: &SttConfig,
        audio_rx: tokio::sync::mpsc::Receiver<Vec<u8>>,
    ) -> Result<ResultStream, SttError>;
}

pub struct GrpcSttProvider {
    client: SpeechToTextClient<Channel>,
}

impl GrpcSttProvider {
    pub async fn connect(endpoint: &str) -> Result<Self, SttError> {
        let client = SpeechToTextClient::connect(endpoint.to_string())
            .await
            .map_err(|e| SttError::ProviderFailed(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SttProvider for GrpcSttProvider {
    async fn recognize(&self, cfg: &SttConfig, pcm: &[u8]) -> Result<TranscriptResult, SttError> {
        let request = Request::new(RecognizeRequest {
            config: Some(recognition_config(cfg)),
            audio: pcm.to_vec(),
        });

        let mut client = self.client.clone();
        let response = client
            .recognize(request)
            .await
            .map_err(|e| SttError::ProviderFailed(e.to_string()))?
            .into_inner();

        let text = response
            .alternatives
            .iter()
            .map(|a| a.transcript.as_str())
            .collect::<Vec<_>>()
            .join("");
        let confidence = response.alternatives.iter().map(|a| a.confidence).fold(0.0f32, f32::max);

        Ok(TranscriptResult { text, language: cfg.language.clone(), confidence })
    }

    async fn streaming_recognize(
        &self,
        cfg: &SttConfig,
        mut audio_rx: tokio::sync::mpsc::Receiver<Vec<u8>>,
    ) -> Result<ResultStream, SttError> {
        let config = recognition_config(cfg);
        let outbound = async_stream::stream! {
            yield StreamingRecognizeRequest {
                request: Some(streaming_recognize_request::Request::Config(config)),
            };
            while let Some(chunk) = audio_rx.recv().await {
                yield StreamingRecognizeRequest {
                    request: Some(streaming_recognize_request::Request::Audio(chunk)),
                };
            }
        };

        let mut client = self.client.clone();
        let response = client
            .streaming_recognize(Request::new(outbound))
            .await
            .map_err(|e| SttError::ProviderFailed(e.to_string()))?
            .into_inner();

        let mapped = response.map(|r| r.map_err(|e| SttError::ProviderFailed(e.to_string())));
        Ok(Box::pin(mapped))
    }
}
