//! Per-speaker state machine: rolling buffer → VAD → STT → turn detection.
//!
//! Grounded on `aicc_pipeline/core/pipeline.py`'s `SpeakerProcessor`. One
//! instance per `(call, speaker)`; the UDP receiver's audio callback drives
//! [`SpeakerProcessor::process_audio`] directly on the hot path, while STT
//! transport and (in streaming mode) turn arbitration run on their own
//! tasks, matching the teacher's split between synchronous call-handling
//! code and spawned `tokio::task` workers.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::event::TurnEvent;
use crate::metrics::Metrics;
use crate::stt::provider::SttProvider;
use crate::stt::{BatchStt, ContinuousSttSession, SpeechToText};
use crate::turn::arbiter::TurnArbiter;
use crate::turn::detector::{TurnDecision, TurnDetector, TurnResult};
use crate::vad::{self, VadResult, VoiceActivityDetection};

fn pcm_to_bytes(pcm: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(pcm.len() * 2);
    for sample in pcm {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

fn decision_str(decision: TurnDecision) -> &'static str {
    match decision {
        TurnDecision::Complete => "complete",
        TurnDecision::Incomplete => "incomplete",
    }
}

struct RuntimeState {
    buffer: Vec<i16>,
    current_time_sec: f32,
    is_speaking: bool,
    speech_start_time: Option<f32>,
    silence_frames: u32,
    feed_dropped: u64,
    turn_count: u64,
    complete_turns: u64,
    incomplete_turns: u64,
    total_speech_time: f32,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            current_time_sec: 0.0,
            is_speaking: false,
            speech_start_time: None,
            silence_frames: 0,
            feed_dropped: 0,
            turn_count: 0,
            complete_turns: 0,
            incomplete_turns: 0,
            total_speech_time: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct SpeakerStats {
    pub turn_count: u64,
    pub complete_turns: u64,
    pub incomplete_turns: u64,
    pub total_speech_time: f32,
}

/// Shared between the hot audio-processing path and any background task
/// that can also finalize a turn (the streaming STT-final forwarder).
struct Core {
    speaker: &'static str,
    call_id: String,
    metrics: Arc<Metrics>,
    event_tx: mpsc::Sender<TurnEvent>,
    state: SyncMutex<RuntimeState>,
}

impl Core {
    fn new(speaker: &'static str, call_id: String, metrics: Arc<Metrics>, event_tx: mpsc::Sender<TurnEvent>) -> Self {
        Self { speaker, call_id, metrics, event_tx, state: SyncMutex::new(RuntimeState::new()) }
    }

    async fn send_event(&self, event: TurnEvent) {
        if event.is_empty_turn() {
            self.metrics.turns_suppressed_empty.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if self.event_tx.send(event).await.is_err() {
            tracing::warn!(speaker = %self.speaker, call_id = %self.call_id, "turn event channel closed, dropping event");
        }
    }

    async fn emit(&self, start_time: f32, end_time: f32, transcript: String, decision: TurnDecision, fusion_score: f32) {
        {
            let mut st = self.state.lock();
            st.turn_count += 1;
            st.total_speech_time += (end_time - start_time).max(0.0);
            match decision {
                TurnDecision::Complete => st.complete_turns += 1,
                TurnDecision::Incomplete => st.incomplete_turns += 1,
            }
        }
        match decision {
            TurnDecision::Complete => self.metrics.turns_complete.fetch_add(1, Ordering::Relaxed),
            TurnDecision::Incomplete => self.metrics.turns_incomplete.fetch_add(1, Ordering::Relaxed),
        };

        tracing::info!(
            speaker = %self.speaker, call_id = %self.call_id,
            start_time, end_time, decision = decision_str(decision),
            "turn finalized"
        );

        let event = TurnEvent::turn_complete(
            self.call_id.clone(),
            self.speaker,
            start_time as f64,
            end_time as f64,
            transcript,
            decision_str(decision),
            fusion_score as f64,
        );
        self.send_event(event).await;
    }

    /// Finalizes a [`TurnResult`] produced by the streaming-mode arbiter:
    /// pulls start/end from the shared runtime clock, resets speaking
    /// bookkeeping, and emits (or suppresses, if empty).
    async fn emit_turn_result(&self, result: TurnResult) {
        let (start_time, end_time) = {
            let mut st = self.state.lock();
            let start_time = st.speech_start_time.unwrap_or(st.current_time_sec);
            let end_time = st.current_time_sec;
            st.is_speaking = false;
            st.speech_start_time = None;
            st.silence_frames = 0;
            (start_time, end_time)
        };

        if result.transcript.trim().is_empty() {
            self.metrics.turns_suppressed_empty.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.emit(start_time, end_time, result.transcript, result.decision, result.fusion_score).await;
    }

    fn stats(&self) -> SpeakerStats {
        let st = self.state.lock();
        SpeakerStats {
            turn_count: st.turn_count,
            complete_turns: st.complete_turns,
            incomplete_turns: st.incomplete_turns,
            total_speech_time: st.total_speech_time,
        }
    }
}

enum Backend {
    Batch { stt: Arc<BatchStt>, detector: TurnDetector },
    Streaming { session: ContinuousSttSession, arbiter: Arc<SyncMutex<TurnArbiter>>, result_forwarder: JoinHandle<()> },
}

/// Per-speaker audio-to-turn-event pipeline.
pub struct SpeakerProcessor {
    core: Arc<Core>,
    vad: Box<dyn VoiceActivityDetection>,
    window_ms: f32,
    target_sample_rate: u32,
    min_speech_ms: u32,
    min_silence_ms: u32,
    backend: Backend,
}

impl SpeakerProcessor {
    pub fn new_batch(
        speaker: &'static str,
        call_id: String,
        config: &Config,
        provider: Arc<dyn SttProvider>,
        metrics: Arc<Metrics>,
        event_tx: mpsc::Sender<TurnEvent>,
    ) -> Self {
        let vad = vad::select(config.vad_threshold);
        let window_ms = vad.window_size() as f32 / 16000.0 * 1000.0;
        let stt = Arc::new(BatchStt::new(provider, config.stt.clone()));
        let detector = TurnDetector::new(config.turn_weights);
        let core = Arc::new(Core::new(speaker, call_id, metrics, event_tx));

        Self {
            core,
            vad,
            window_ms,
            target_sample_rate: 16000,
            min_speech_ms: config.min_speech_ms,
            min_silence_ms: config.min_silence_ms,
            backend: Backend::Batch { stt, detector },
        }
    }

    pub async fn new_streaming(
        speaker: &'static str,
        call_id: String,
        config: &Config,
        provider: Arc<dyn SttProvider>,
        metrics: Arc<Metrics>,
        event_tx: mpsc::Sender<TurnEvent>,
    ) -> Result<Self, crate::error::SttError> {
        let vad = vad::select(config.vad_threshold);
        let window_ms = vad.window_size() as f32 / 16000.0 * 1000.0;

        let (result_tx, mut result_rx) = mpsc::channel(64);
        let session = ContinuousSttSession::start(provider, config.stt.clone(), call_id.clone(), speaker.to_string(), result_tx).await?;

        let core = Arc::new(Core::new(speaker, call_id, metrics, event_tx));
        let arbiter = Arc::new(SyncMutex::new(TurnArbiter::new(config.arbiter, config.turn_weights)));

        let forwarder_core = core.clone();
        let forwarder_arbiter = arbiter.clone();
        let result_forwarder = tokio::spawn(async move {
            while let Some(result) = result_rx.recv().await {
                if !result.is_final {
                    continue;
                }
                let turn = { forwarder_arbiter.lock().on_stt_final(&result.transcript, Instant::now()) };
                if let Some(turn_result) = turn {
                    forwarder_core.emit_turn_result(turn_result).await;
                }
            }
        });

        Ok(Self {
            core,
            vad,
            window_ms,
            target_sample_rate: 16000,
            min_speech_ms: config.min_speech_ms,
            min_silence_ms: config.min_silence_ms,
            backend: Backend::Streaming { session, arbiter, result_forwarder },
        })
    }

    /// Processes one chunk of 16kHz mono PCM (LINEAR16 bytes, little-endian).
    pub async fn process_audio(&self, pcm_bytes: &[u8]) {
        let samples: Vec<i16> = pcm_bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();

        let window_size = self.vad.window_size();
        let frames: Vec<Vec<i16>> = {
            let mut st = self.core.state.lock();
            st.buffer.extend_from_slice(&samples);
            let mut frames = Vec::new();
            while st.buffer.len() >= window_size {
                frames.push(st.buffer.drain(..window_size).collect());
            }
            frames
        };

        for frame in frames {
            let result = match self.vad.detect(&frame).await {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!(speaker = %self.core.speaker, error = %err, "VAD error, treating frame as non-speech");
                    VadResult { is_speech: false, confidence: 0.0, rms: 0.0, zcr: 0.0 }
                }
            };

            self.process_vad_state(result.is_speech, &frame).await;

            let mut st = self.core.state.lock();
            st.current_time_sec += window_size as f32 / self.target_sample_rate as f32;
        }
    }

    async fn process_vad_state(&self, is_speech: bool, frame: &[i16]) {
        let speaking_now = {
            let mut st = self.core.state.lock();
            if is_speech {
                st.silence_frames = 0;
                if !st.is_speaking {
                    st.is_speaking = true;
                    st.speech_start_time = Some(st.current_time_sec);
                    tracing::info!(speaker = %self.core.speaker, call_id = %self.core.call_id, t = st.current_time_sec, "speech start");
                }
            } else if st.is_speaking {
                st.silence_frames += 1;
            }
            st.is_speaking
        };

        if !speaking_now {
            return;
        }

        if is_speech {
            self.feed_audio(frame).await;
        } else {
            self.check_finalize().await;
        }
    }

    async fn feed_audio(&self, frame: &[i16]) {
        match &self.backend {
            Backend::Batch { stt, .. } => stt.add_audio(frame).await,
            Backend::Streaming { session, .. } => session.feed_audio(&pcm_to_bytes(frame)).await,
        }
    }

    async fn check_finalize(&self) {
        match &self.backend {
            Backend::Batch { .. } => {
                let min_silence_frames = (self.min_silence_ms as f32 / self.window_ms).ceil() as u32;
                let reached = self.core.state.lock().silence_frames >= min_silence_frames;
                if reached {
                    self.finalize_batch().await;
                }
            }
            Backend::Streaming { arbiter, .. } => {
                let accumulated_ms = (self.core.state.lock().silence_frames as f32 * self.window_ms) as u32;
                let turn = { arbiter.lock().on_vad_silence(accumulated_ms, Instant::now()) };
                if let Some(result) = turn {
                    self.core.emit_turn_result(result).await;
                }
            }
        }
    }

    async fn finalize_batch(&self) {
        let Backend::Batch { stt, detector } = &self.backend else { return };

        let finalize_info = {
            let st = self.core.state.lock();
            st.speech_start_time.map(|speech_start| {
                let end_time = st.current_time_sec - (st.silence_frames as f32 * self.window_ms / 1000.0);
                let duration = end_time - speech_start;
                let silence_ms = st.silence_frames as f32 * self.window_ms;
                (speech_start, end_time, duration, silence_ms)
            })
        };

        let Some((speech_start, end_time, duration, silence_ms)) = finalize_info else { return };

        if duration < self.min_speech_ms as f32 / 1000.0 {
            self.reset_speaking_state(stt).await;
            return;
        }

        let transcript_result = stt.transcribe().await;
        let transcript = transcript_result.text;

        if transcript.trim().is_empty() {
            tracing::debug!(speaker = %self.core.speaker, "empty transcript, skipping turn");
            self.reset_speaking_state(stt).await;
            return;
        }

        let turn_result = detector.detect(&transcript, duration, silence_ms);
        self.core.emit(speech_start, end_time, transcript, turn_result.decision, turn_result.fusion_score).await;
        self.reset_speaking_state(stt).await;
    }

    async fn reset_speaking_state(&self, stt: &BatchStt) {
        {
            let mut st = self.core.state.lock();
            st.is_speaking = false;
            st.speech_start_time = None;
            st.silence_frames = 0;
        }
        stt.clear().await;
    }

    pub fn stats(&self) -> SpeakerStats {
        self.core.stats()
    }

    /// Flushes a pending turn (if mid-speech), then tears down STT resources.
    pub async fn shutdown(self) {
        let speaking = self.core.state.lock().is_speaking;
        if speaking {
            tracing::info!(speaker = %self.core.speaker, call_id = %self.core.call_id, "flushing pending turn on shutdown");
            match &self.backend {
                Backend::Batch { .. } => self.finalize_batch().await,
                Backend::Streaming { arbiter, .. } => {
                    let accumulated_ms = (self.core.state.lock().silence_frames as f32 * self.window_ms).max(self.min_silence_ms as f32) as u32;
                    let turn = { arbiter.lock().on_vad_silence(accumulated_ms, Instant::now()) };
                    if let Some(result) = turn {
                        self.core.emit_turn_result(result).await;
                    }
                }
            }
        }

        match self.backend {
            Backend::Batch { .. } => {}
            Backend::Streaming { session, result_forwarder, .. } => {
                session.stop().await;
                result_forwarder.abort();
            }
        }
    }
}
