//! Turn-boundary arbiter for streaming STT mode.
//!
//! Finite-state automaton combining STT finals with VAD silence so a
//! single turn event is emitted even when silence fires before the final
//! transcript arrives. Grounded on the explicit state-enum, transition-match
//! style the teacher uses for its own sentence buffering state machine.

use std::time::{Duration, Instant};

use crate::config::{ArbiterConfig, TurnWeights};
use crate::turn::detector::{TurnDetector, TurnResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Accumulating,
    WaitingFinal,
}

pub struct TurnArbiter {
    state: State,
    pending_transcript: String,
    speech_start: Option<Instant>,
    last_final_time: Option<Instant>,
    silence_detected_at: Option<Instant>,
    pending_silence_ms: u32,
    config: ArbiterConfig,
    detector: TurnDetector,
}

impl TurnArbiter {
    pub fn new(config: ArbiterConfig, weights: TurnWeights) -> Self {
        Self {
            state: State::Idle,
            pending_transcript: String::new(),
            speech_start: None,
            last_final_time: None,
            silence_detected_at: None,
            pending_silence_ms: 0,
            config,
            detector: TurnDetector::new(weights),
        }
    }

    fn reset(&mut self) {
        self.state = State::Idle;
        self.pending_transcript.clear();
        self.speech_start = None;
        self.last_final_time = None;
        self.silence_detected_at = None;
        self.pending_silence_ms = 0;
    }

    /// Feeds one STT final-result event. Returns a completed turn if the
    /// grace-period reunion with a pending silence fires a turn.
    pub fn on_stt_final(&mut self, text: &str, now: Instant) -> Option<TurnResult> {
        match self.state {
            State::Idle => {
                self.speech_start.get_or_insert(now);
                self.pending_transcript.push_str(text);
                self.last_final_time = Some(now);
                self.state = State::Accumulating;
                None
            }
            State::Accumulating => {
                if !self.pending_transcript.is_empty() {
                    self.pending_transcript.push(' ');
                }
                self.pending_transcript.push_str(text);
                self.last_final_time = Some(now);
                None
            }
            State::WaitingFinal => {
                let silence_at = self.silence_detected_at.expect("silence recorded before WaitingFinal");
                let grace_period = Duration::from_millis(self.config.grace_period_ms as u64);
                let within_grace = now.saturating_duration_since(silence_at) <= grace_period;

                if !self.pending_transcript.is_empty() {
                    self.pending_transcript.push(' ');
                }
                self.pending_transcript.push_str(text);

                if within_grace {
                    let result = self.finalize(self.pending_silence_ms as f32, now);
                    Some(result)
                } else {
                    self.last_final_time = Some(now);
                    self.state = State::Accumulating;
                    None
                }
            }
        }
    }

    /// Feeds one VAD silence event (`accumulated_ms` is the running silence
    /// duration since the last speech). Returns a completed turn when
    /// silence crosses the threshold in `Accumulating` state.
    pub fn on_vad_silence(&mut self, accumulated_ms: u32, now: Instant) -> Option<TurnResult> {
        if accumulated_ms < self.config.min_silence_ms {
            return None;
        }

        match self.state {
            State::Accumulating => Some(self.finalize(accumulated_ms as f32, now)),
            State::Idle => {
                self.state = State::WaitingFinal;
                self.silence_detected_at = Some(now);
                self.pending_silence_ms = accumulated_ms;
                None
            }
            State::WaitingFinal => None,
        }
    }

    fn finalize(&mut self, silence_ms: f32, now: Instant) -> TurnResult {
        let duration = self
            .speech_start
            .map(|s| now.saturating_duration_since(s).as_secs_f32())
            .unwrap_or(0.0);

        let transcript = self.pending_transcript.trim().to_string();
        let mut result = self.detector.detect(&transcript, duration, silence_ms);
        if !self.meets_min_chars(&transcript) {
            // Below AICC_TURN_MIN_CHARS: clear the transcript so the caller's
            // empty-transcript check suppresses emission instead of sending
            // a near-silent turn downstream.
            result.transcript.clear();
        }
        self.reset();
        result
    }

    /// Whether the stripped transcript is long enough to emit, per
    /// `AICC_TURN_MIN_CHARS`.
    pub fn meets_min_chars(&self, transcript: &str) -> bool {
        transcript.trim().chars().count() >= self.config.min_chars
    }
}
