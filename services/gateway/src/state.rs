//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds everything shared by
//! all connections: configuration, the provider registry, the shareable
//! providers resolved from it at startup, and the report queue.

use crate::{
    config::Config,
    report::{ReportQueue, ReportSink},
    ws::{dispatch::Dispatcher, wakeup::WakeReplyCache},
};
use parley_core::{
    ProviderKind, ProviderRegistry, RegistryError, WakeWordSet,
    provider::{IntentClassifier, LanguageModel, Synthesizer},
};
use std::sync::Arc;
use tracing::info;

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ProviderRegistry>,
    pub wake_words: Arc<WakeWordSet>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub intent: Arc<dyn IntentClassifier>,
    pub llm: Arc<dyn LanguageModel>,
    pub dispatcher: Arc<Dispatcher>,
    pub reports: ReportQueue,
    pub wake_reply: Arc<WakeReplyCache>,
}

impl AppState {
    /// Validates every configured provider name and resolves the shareable ones.
    ///
    /// An unknown implementation name is fatal here, before any connection
    /// is accepted. Must be called from within a Tokio runtime (the report
    /// worker is spawned).
    pub fn new(
        config: Config,
        registry: ProviderRegistry,
        report_sink: Arc<dyn ReportSink>,
    ) -> Result<Self, RegistryError> {
        let providers = &config.providers;
        for kind in ProviderKind::ALL {
            registry.ensure(kind, &providers.get(kind).name)?;
        }

        let synthesizer = registry.synthesizer(&providers.tts.name, &providers.tts.params)?;
        let intent = registry.intent(&providers.intent.name, &providers.intent.params)?;
        let llm = registry.language_model(&providers.llm.name, &providers.llm.params)?;
        info!(
            asr = %providers.asr.name,
            tts = %providers.tts.name,
            vad = %providers.vad.name,
            intent = %providers.intent.name,
            memory = %providers.memory.name,
            llm = %providers.llm.name,
            "providers resolved"
        );

        let wake_words = Arc::new(WakeWordSet::new(&config.wakeup_words));
        let (reports, _worker) = ReportQueue::spawn(report_sink);

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            wake_words,
            synthesizer,
            intent,
            llm,
            dispatcher: Arc::new(Dispatcher::with_default_handlers()),
            reports,
            wake_reply: Arc::new(WakeReplyCache::default()),
        })
    }
}
