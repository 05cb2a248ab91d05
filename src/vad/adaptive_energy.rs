//! RMS-energy VAD with zero-crossing-rate noise veto and 3-window smoothing.
//!
//! Grounded on the teacher's `rms_threshold.rs` RMS-vote shape, extended
//! with the ZCR veto and smoothing spec.md §4.3 requires.

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{VadResult, VoiceActivityDetection};
use crate::error::VadError;

const SMOOTHING_WINDOW: usize = 3;

pub struct AdaptiveEnergyVad {
    energy_threshold: f32,
    recent_confidences: Mutex<Vec<f32>>,
}

impl AdaptiveEnergyVad {
    /// `config_threshold` is the raw `AICC_VAD_THRESHOLD` value (default
    /// 0.45); spec.md §4.3 maps it to an RMS threshold via `500 * threshold`.
    pub fn new(config_threshold: f32) -> Self {
        Self {
            energy_threshold: 500.0 * config_threshold,
            recent_confidences: Mutex::new(Vec::with_capacity(SMOOTHING_WINDOW)),
        }
    }

    fn calculate_rms(samples: &[i16]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        ((sum_sq / samples.len() as f64).sqrt()) as f32
    }

    fn calculate_zcr(samples: &[i16]) -> f32 {
        if samples.len() < 2 {
            return 0.0;
        }
        let crossings = samples
            .windows(2)
            .filter(|w| (w[0] >= 0) != (w[1] >= 0))
            .count();
        crossings as f32 / (samples.len() - 1) as f32
    }

    fn smooth(&self, confidence: f32) -> f32 {
        let mut history = self.recent_confidences.lock();
        history.push(confidence);
        if history.len() > SMOOTHING_WINDOW {
            history.remove(0);
        }
        history.iter().sum::<f32>() / history.len() as f32
    }
}

#[async_trait]
impl VoiceActivityDetection for AdaptiveEnergyVad {
    fn name(&self) -> &'static str {
        "adaptive-energy"
    }

    fn description(&self) -> &'static str {
        "RMS energy threshold with zero-crossing-rate noise veto and smoothing"
    }

    fn is_initialized(&self) -> bool {
        true
    }

    async fn initialize(&self) -> Result<(), VadError> {
        Ok(())
    }

    async fn detect(&self, samples: &[i16]) -> Result<VadResult, VadError> {
        if samples.is_empty() {
            return Err(VadError::InvalidAudio("empty frame".to_string()));
        }

        let rms = Self::calculate_rms(samples);
        let zcr = Self::calculate_zcr(samples);

        let mut is_speech = rms > self.energy_threshold;

        // Noise veto: high zero-crossing rate at modest energy looks like
        // fricative noise or hiss rather than voiced speech.
        if zcr > 0.35 && rms < 1.5 * self.energy_threshold {
            is_speech = false;
        }

        let raw_confidence = if self.energy_threshold > 0.0 {
            (rms / (self.energy_threshold * 2.0)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let confidence = self.smooth(raw_confidence);

        Ok(VadResult { is_speech, confidence, rms, zcr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(amplitude: i16, len: usize) -> Vec<i16> {
        (0..len)
            .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
            .collect()
    }

    #[tokio::test]
    async fn loud_tone_is_speech() {
        let vad = AdaptiveEnergyVad::new(0.45);
        let frame = tone(2000, 512);
        let result = vad.detect(&frame).await.unwrap();
        assert!(result.is_speech);
    }

    #[tokio::test]
    async fn silence_is_not_speech() {
        let vad = AdaptiveEnergyVad::new(0.45);
        let frame = vec![0i16; 512];
        let result = vad.detect(&frame).await.unwrap();
        assert!(!result.is_speech);
    }

    #[tokio::test]
    async fn empty_frame_is_invalid_audio() {
        let vad = AdaptiveEnergyVad::new(0.45);
        assert!(matches!(vad.detect(&[]).await, Err(VadError::InvalidAudio(_))));
    }

    #[test]
    fn adaptive_silence_ms_boundaries() {
        let vad = AdaptiveEnergyVad::new(0.45);
        assert_eq!(vad.adaptive_silence_ms(0.3), 200);
        assert_eq!(vad.adaptive_silence_ms(1.0), 300);
        assert_eq!(vad.adaptive_silence_ms(3.0), 400);
    }

    #[test]
    fn high_zcr_low_energy_is_vetoed() {
        // Energy threshold scaled so moderate RMS falls under 1.5x but above 1x.
        let vad = AdaptiveEnergyVad::new(0.45);
        let mut frame = Vec::with_capacity(512);
        for i in 0..512 {
            frame.push(if i % 2 == 0 { 400 } else { -400 });
        }
        let zcr = AdaptiveEnergyVad::calculate_zcr(&frame);
        assert!(zcr > 0.35);
    }
}
