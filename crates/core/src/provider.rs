//! Capability interfaces for the pluggable speech and AI backends.
//!
//! The gateway never talks to a concrete backend directly. Each backend kind
//! is consumed through one of the traits below and obtained from the
//! [`ProviderRegistry`](crate::registry::ProviderRegistry).

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// One encoded audio packet as exchanged with the client.
pub type AudioFrame = Bytes;

/// How a recognition backend expects to receive audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceMode {
    /// Frames are pushed as they arrive; end of utterance is signalled explicitly.
    Streaming,
    /// The complete utterance is handed over at once.
    Batch,
}

impl fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceMode::Streaming => write!(f, "streaming"),
            InterfaceMode::Batch => write!(f, "batch"),
        }
    }
}

/// A recognizer that receives incremental audio.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait StreamingRecognizer: Send + Sync {
    /// Forwards one frame of the current utterance.
    async fn push_audio(&self, frame: AudioFrame) -> Result<()>;

    /// Tells the backend the utterance has ended.
    async fn signal_stop_streaming(&self) -> Result<()>;

    /// Subscribes to final transcripts produced by the backend.
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/// A recognizer that transcribes a complete utterance in one call.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait BatchRecognizer: Send + Sync {
    /// Transcribes the buffered utterance.
    ///
    /// Returns `None` when nothing intelligible was heard.
    async fn handle_voice_stop(&self, frames: Vec<AudioFrame>) -> Result<Option<String>>;
}

/// A resolved recognition backend, tagged with its interface mode.
///
/// The variant is fixed when the provider is constructed, so the mode of a
/// session's recognizer can never change.
#[derive(Clone)]
pub enum Recognizer {
    Streaming(Arc<dyn StreamingRecognizer>),
    Batch(Arc<dyn BatchRecognizer>),
}

impl Recognizer {
    pub fn interface_mode(&self) -> InterfaceMode {
        match self {
            Recognizer::Streaming(_) => InterfaceMode::Streaming,
            Recognizer::Batch(_) => InterfaceMode::Batch,
        }
    }
}

impl fmt::Debug for Recognizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Recognizer")
            .field(&self.interface_mode())
            .finish()
    }
}

/// Text-to-speech.
///
/// Implementations are allowed to block; callers on an async runtime must
/// offload the call (e.g. `tokio::task::spawn_blocking`).
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
pub trait Synthesizer: Send + Sync {
    /// Converts `text` into encoded audio frames ready to be sent to the client.
    fn to_tts(&self, text: &str) -> Result<Vec<AudioFrame>>;
}

/// Outcome of feeding one frame to a voice-activity detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceActivity {
    /// No speech, and none in progress.
    Silence,
    /// Speech is present or still within the hangover window.
    Speech,
    /// Speech that was in progress has just ended.
    SpeechEnded,
}

/// Per-session voice-activity detection. The detector owns its state.
pub trait VoiceActivityDetector: Send + Sync {
    fn process(&mut self, frame: &[u8]) -> VoiceActivity;

    /// Forgets any partially observed utterance.
    fn reset(&mut self);
}

/// What the user wants from the current turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Carry on with a normal chat turn.
    Continue,
    /// The user asked to end the conversation.
    Exit,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Intent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single dialogue entry passed to the language model and memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Long-term recall for one session.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Returns remembered context relevant to `query`, if any.
    async fn recall(&self, query: &str) -> Result<Option<String>>;

    /// Records the dialogue so far.
    async fn remember(&mut self, dialogue: &[ChatMessage]) -> Result<()>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produces the assistant reply for the given prompt and dialogue.
    async fn respond(&self, messages: &[ChatMessage]) -> Result<String>;
}
