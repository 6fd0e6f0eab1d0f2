//! Implementations shipped with the gateway.
//!
//! Every built-in is registered here explicitly; nothing is discovered at
//! runtime.

mod energy_vad;
mod intent;
mod memory;
mod openai_asr;
mod openai_llm;
mod openai_tts;

pub use energy_vad::{EnergyVad, EnergyVadParams};
pub use intent::{KeywordIntent, KeywordIntentParams, NoIntent};
pub use memory::{NoMemory, ShortTermMemory, ShortTermMemoryParams};
pub use openai_asr::{WhisperParams, WhisperRecognizer};
pub use openai_llm::{ChatCompletionModel, ChatCompletionParams};
pub use openai_tts::{SpeechParams, SpeechSynthesizer};

use crate::provider::Recognizer;
use crate::registry::{ProviderHandle, ProviderKind, ProviderRegistry};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub(crate) const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

pub(crate) fn register_all(registry: &mut ProviderRegistry) {
    registry.register(ProviderKind::Recognition, "openai", |params| {
        let recognizer = WhisperRecognizer::new(parse_params(params)?)?;
        Ok(ProviderHandle::Recognizer(Recognizer::Batch(Arc::new(
            recognizer,
        ))))
    });
    registry.register(ProviderKind::Synthesis, "openai", |params| {
        let synthesizer = SpeechSynthesizer::new(parse_params(params)?)?;
        Ok(ProviderHandle::Synthesizer(Arc::new(synthesizer)))
    });
    registry.register(ProviderKind::VoiceActivity, "energy", |params| {
        Ok(ProviderHandle::VoiceActivity(Box::new(EnergyVad::new(
            parse_params(params)?,
        ))))
    });
    registry.register(ProviderKind::Intent, "nointent", |_| {
        Ok(ProviderHandle::Intent(Arc::new(NoIntent)))
    });
    registry.register(ProviderKind::Intent, "keyword", |params| {
        Ok(ProviderHandle::Intent(Arc::new(KeywordIntent::new(
            parse_params(params)?,
        ))))
    });
    registry.register(ProviderKind::Memory, "nomem", |_| {
        Ok(ProviderHandle::Memory(Box::new(NoMemory)))
    });
    registry.register(ProviderKind::Memory, "short_term", |params| {
        Ok(ProviderHandle::Memory(Box::new(ShortTermMemory::new(
            parse_params(params)?,
        ))))
    });
    registry.register(ProviderKind::LanguageModel, "openai", |params| {
        let model = ChatCompletionModel::new(parse_params(params)?)?;
        Ok(ProviderHandle::LanguageModel(Arc::new(model)))
    });
}

/// Deserializes a provider's parameter block. `null` is treated as `{}` so
/// that every field falls back to its default.
fn parse_params<T: DeserializeOwned>(params: &Value) -> anyhow::Result<T> {
    let value = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params.clone()
    };
    serde_json::from_value(value).context("invalid provider parameters")
}

/// Fails when an API-backed provider was configured without a key.
fn require_api_key(api_key: Option<String>) -> anyhow::Result<String> {
    api_key
        .filter(|k| !k.trim().is_empty())
        .context("`api_key` is required")
}
