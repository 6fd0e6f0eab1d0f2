use crate::provider::{VoiceActivity, VoiceActivityDetector};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnergyVadParams {
    /// RMS level (0.0..=1.0) above which a frame counts as speech.
    pub threshold: f32,
    /// Consecutive quiet frames that end an utterance.
    pub silence_frames: usize,
}

impl Default for EnergyVadParams {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            silence_frames: 15,
        }
    }
}

/// Energy-based detector over little-endian PCM16 mono frames.
#[derive(Debug)]
pub struct EnergyVad {
    params: EnergyVadParams,
    in_speech: bool,
    quiet_run: usize,
}

impl EnergyVad {
    pub fn new(params: EnergyVadParams) -> Self {
        Self {
            params,
            in_speech: false,
            quiet_run: 0,
        }
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn process(&mut self, frame: &[u8]) -> VoiceActivity {
        let loud = rms(frame) > self.params.threshold;

        if loud {
            self.in_speech = true;
            self.quiet_run = 0;
            return VoiceActivity::Speech;
        }
        if !self.in_speech {
            return VoiceActivity::Silence;
        }

        self.quiet_run += 1;
        if self.quiet_run >= self.params.silence_frames {
            self.reset();
            VoiceActivity::SpeechEnded
        } else {
            VoiceActivity::Speech
        }
    }

    fn reset(&mut self) {
        self.in_speech = false;
        self.quiet_run = 0;
    }
}

fn rms(frame: &[u8]) -> f32 {
    let samples = frame.chunks_exact(2).len();
    if samples == 0 {
        return 0.0;
    }
    let sum: f32 = frame
        .chunks_exact(2)
        .map(|c| {
            let s = i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0;
            s * s
        })
        .sum();
    (sum / samples as f32).sqrt()
}
