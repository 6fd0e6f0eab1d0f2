use super::{OPENAI_API_BASE, require_api_key};
use crate::provider::{AudioFrame, BatchRecognizer};
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{AudioInput, CreateTranscriptionRequestArgs},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::io::Cursor;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhisperParams {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Sample rate of the PCM16 mono frames sent by the client.
    pub sample_rate: u32,
    pub language: Option<String>,
}

impl Default for WhisperParams {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: OPENAI_API_BASE.to_string(),
            model: "whisper-1".to_string(),
            sample_rate: 16_000,
            language: None,
        }
    }
}

/// Batch recognition against an OpenAI-compatible transcription endpoint.
pub struct WhisperRecognizer {
    client: Client<OpenAIConfig>,
    model: String,
    sample_rate: u32,
    language: Option<String>,
}

impl WhisperRecognizer {
    pub fn new(params: WhisperParams) -> Result<Self> {
        let config = OpenAIConfig::new()
            .with_api_key(require_api_key(params.api_key)?)
            .with_api_base(params.base_url);
        Ok(Self {
            client: Client::with_config(config),
            model: params.model,
            sample_rate: params.sample_rate,
            language: params.language,
        })
    }
}

#[async_trait]
impl BatchRecognizer for WhisperRecognizer {
    async fn handle_voice_stop(&self, frames: Vec<AudioFrame>) -> Result<Option<String>> {
        let wav = pcm16_to_wav(&frames, self.sample_rate)?;
        debug!(frames = frames.len(), bytes = wav.len(), "transcribing utterance");

        let mut args = CreateTranscriptionRequestArgs::default();
        args.file(AudioInput::from_vec_u8("utterance.wav".to_string(), wav))
            .model(&self.model);
        if let Some(language) = &self.language {
            args.language(language);
        }
        let request = args.build()?;

        let response = self
            .client
            .audio()
            .transcribe(request)
            .await
            .context("transcription request failed")?;
        let text = response.text.trim().to_string();
        Ok((!text.is_empty()).then_some(text))
    }
}

/// Wraps little-endian PCM16 mono frames in a WAV container.
fn pcm16_to_wav(frames: &[AudioFrame], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for frame in frames {
            for pair in frame.chunks_exact(2) {
                writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
            }
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn wav_header_wraps_all_samples() {
        let frames = vec![
            Bytes::from_static(&[1, 0, 2, 0]),
            Bytes::from_static(&[3, 0, 4, 0]),
        ];

        let wav = pcm16_to_wav(&frames, 16_000).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1, 2, 3, 4]);
    }

    #[test]
    fn missing_api_key_fails_construction() {
        assert!(WhisperRecognizer::new(WhisperParams::default()).is_err());
    }
}
