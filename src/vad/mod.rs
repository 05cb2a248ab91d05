//! Voice Activity Detection (VAD) Module
//!
//! Supports two back-ends behind the same trait:
//! - Adaptive-energy (RMS + zero-crossing-rate veto, always available)
//! - Neural (capability variant, selected when a model is available)
//!
//! Follows the same runtime-polymorphism pattern as the rest of the crate:
//! trait-based abstraction, factory selection, no-op fallback so the hot
//! path never branches on "is this back-end present".

use async_trait::async_trait;

pub mod adaptive_energy;
pub mod neural;

pub use adaptive_energy::AdaptiveEnergyVad;
pub use neural::NeuralVad;

use crate::error::VadError;

/// Voice Activity Detection result for one frame.
#[derive(Debug, Clone, Copy)]
pub struct VadResult {
    pub is_speech: bool,
    pub confidence: f32,
    pub rms: f32,
    pub zcr: f32,
}

/// Voice Activity Detection trait.
///
/// Implementations must be `Send + Sync` for use across the per-speaker
/// processing tasks.
#[async_trait]
pub trait VoiceActivityDetection: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn is_initialized(&self) -> bool;

    async fn initialize(&self) -> Result<(), VadError>;

    /// Classifies one frame of 16kHz mono PCM.
    async fn detect(&self, samples: &[i16]) -> Result<VadResult, VadError>;

    /// Fixed frame size this back-end expects, in samples at 16kHz.
    fn window_size(&self) -> usize {
        512
    }

    /// Silence hangover before declaring an utterance finished, given how
    /// long the speaker had been talking. Spec.md §4.3: 200/300/400 ms.
    fn adaptive_silence_ms(&self, speech_duration_secs: f32) -> u32 {
        if speech_duration_secs < 0.5 {
            200
        } else if speech_duration_secs < 2.0 {
            300
        } else {
            400
        }
    }
}

/// Selects the VAD back-end: neural if available, else adaptive-energy.
///
/// `config_threshold` is the user-facing `AICC_VAD_THRESHOLD` (default
/// 0.45); per spec.md §4.3 it is mapped to an RMS energy threshold via
/// `energyThreshold = 500 * configThreshold` so both back-ends agree on
/// what "loud enough" means.
pub fn select(config_threshold: f32) -> Box<dyn VoiceActivityDetection> {
    let neural = NeuralVad::new();
    if neural.is_initialized() {
        return Box::new(neural);
    }
    Box::new(AdaptiveEnergyVad::new(config_threshold))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn select_falls_back_to_adaptive_energy() {
        let vad = select(0.45);
        assert_eq!(vad.name(), "adaptive-energy");
    }
}
