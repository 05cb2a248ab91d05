//! Neural VAD capability variant.
//!
//! No model is bundled with this crate (spec.md treats the model artifact
//! as external). `is_initialized()` reports `false` so `vad::select`
//! always falls through to [`super::AdaptiveEnergyVad`] — this is the
//! "explicit capability variant with a no-op fallback" REDESIGN FLAGS §9
//! calls for, replacing the teacher's import-time `silero`/`silero-raw`
//! probing with an always-present, always-checked type.

use async_trait::async_trait;

use super::{VadResult, VoiceActivityDetection};
use crate::error::VadError;

pub struct NeuralVad;

impl NeuralVad {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NeuralVad {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoiceActivityDetection for NeuralVad {
    fn name(&self) -> &'static str {
        "neural"
    }

    fn description(&self) -> &'static str {
        "Neural voice-activity detector (model not bundled)"
    }

    fn is_initialized(&self) -> bool {
        false
    }

    async fn initialize(&self) -> Result<(), VadError> {
        Err(VadError::ModelNotLoaded("neural VAD model not bundled".to_string()))
    }

    async fn detect(&self, _samples: &[i16]) -> Result<VadResult, VadError> {
        Err(VadError::ModelNotLoaded("neural VAD model not bundled".to_string()))
    }

    fn window_size(&self) -> usize {
        512
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neural_vad_reports_uninitialized() {
        assert!(!NeuralVad::new().is_initialized());
    }
}
