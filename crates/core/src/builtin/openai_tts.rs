use super::{OPENAI_API_BASE, require_api_key};
use crate::provider::{AudioFrame, Synthesizer};
use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechParams {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub voice: String,
    /// Encoding requested from the backend and forwarded to the client as-is.
    pub response_format: String,
    /// Size of each outbound audio frame in bytes.
    pub frame_bytes: usize,
    /// Upper bound on one speech request, connect through last byte.
    pub timeout_secs: u64,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: OPENAI_API_BASE.to_string(),
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            response_format: "opus".to_string(),
            frame_bytes: 960,
            timeout_secs: 20,
        }
    }
}

/// Speech synthesis against an OpenAI-compatible `/audio/speech` endpoint.
///
/// Uses a blocking HTTP client; callers offload it from the async runtime.
/// The client is built on first use so that it is created on the blocking
/// thread rather than inside the runtime.
pub struct SpeechSynthesizer {
    client: OnceLock<Client>,
    timeout: Duration,
    endpoint: String,
    api_key: String,
    model: String,
    voice: String,
    response_format: String,
    frame_bytes: usize,
}

impl SpeechSynthesizer {
    pub fn new(params: SpeechParams) -> Result<Self> {
        Ok(Self {
            client: OnceLock::new(),
            timeout: Duration::from_secs(params.timeout_secs.max(1)),
            endpoint: format!("{}/audio/speech", params.base_url.trim_end_matches('/')),
            api_key: require_api_key(params.api_key)?,
            model: params.model,
            voice: params.voice,
            response_format: params.response_format,
            frame_bytes: params.frame_bytes.max(1),
        })
    }

    fn client(&self) -> Result<&Client> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .context("failed to build speech client")?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl Synthesizer for SpeechSynthesizer {
    fn to_tts(&self, text: &str) -> Result<Vec<AudioFrame>> {
        let audio = self
            .client()?
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "input": text,
                "voice": self.voice,
                "response_format": self.response_format,
            }))
            .send()
            .context("speech request failed")?
            .error_for_status()
            .context("speech endpoint rejected the request")?
            .bytes()
            .context("failed to read speech response")?;
        debug!(bytes = audio.len(), "speech synthesized");
        Ok(split_frames(audio, self.frame_bytes))
    }
}

fn split_frames(audio: Bytes, frame_bytes: usize) -> Vec<AudioFrame> {
    let mut frames = Vec::with_capacity(audio.len().div_ceil(frame_bytes));
    let mut offset = 0;
    while offset < audio.len() {
        let end = (offset + frame_bytes).min(audio.len());
        frames.push(audio.slice(offset..end));
        offset = end;
    }
    frames
}
