//! Speech-to-Text adapters.
//!
//! Two interchangeable back-ends share the same externally observable
//! contract (spec.md §4.6): batch (accumulate then transcribe on turn
//! close) and streaming (long-lived bidirectional session with a
//! continuous-session manager that rotates every 270 s). Grounded on the
//! teacher's `SpeechToText` trait (`voice/stt/mod.rs`) and `StubSTT`
//! (`stt/stub.rs`), generalized from a global adapter registry to
//! explicit per-call construction per REDESIGN FLAGS §9.

pub mod batch;
pub mod continuous;
pub mod provider;
pub mod streaming;

pub use batch::BatchStt;
pub use continuous::ContinuousSttSession;
pub use provider::{GrpcSttProvider, SttProvider};
pub use streaming::{StreamingResult, StreamingSttSession};

use async_trait::async_trait;

use crate::error::SttError;

#[derive(Debug, Clone)]
pub struct TranscriptResult {
    pub text: String,
    pub language: String,
    pub confidence: f32,
}

/// Batch-mode speech-to-text adapter.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_initialized(&self) -> bool;

    async fn initialize(&self) -> Result<(), SttError>;

    /// Appends PCM samples to the in-memory buffer.
    async fn add_audio(&self, pcm: &[i16]);

    /// Submits the accumulated buffer for recognition and returns the
    /// concatenated first-alternative transcript. Provider errors yield an
    /// empty string (logged), never propagate, per spec.md §7.
    async fn transcribe(&self) -> TranscriptResult;

    /// Empties the buffer after turn emission.
    async fn clear(&self);
}
