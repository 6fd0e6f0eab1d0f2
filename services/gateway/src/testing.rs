//! Fakes and a session harness shared by the unit tests.

use crate::{
    config::Config,
    report::{ReportItem, ReportQueue, tests::CapturingSink},
    state::AppState,
    ws::{
        dispatch::Dispatcher,
        protocol::Outbound,
        session::{Outbox, Session},
        tasks::TaskSupervisor,
        wakeup::WakeReplyCache,
    },
};
use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use parley_core::{
    AudioFrame, ProviderRegistry, Recognizer, WakeWordSet,
    builtin::{NoIntent, NoMemory},
    provider::{
        BatchRecognizer, ChatMessage, IntentClassifier, LanguageModel, MemoryStore, Role,
        Synthesizer, VoiceActivity, VoiceActivityDetector,
    },
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Batch recognizer that always returns the same transcript.
pub(crate) struct FixedRecognizer(pub(crate) Option<String>);

#[async_trait]
impl BatchRecognizer for FixedRecognizer {
    async fn handle_voice_stop(&self, _frames: Vec<AudioFrame>) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Produces one frame containing `tts:<text>`.
pub(crate) struct EchoSynthesizer;

impl Synthesizer for EchoSynthesizer {
    fn to_tts(&self, text: &str) -> Result<Vec<AudioFrame>> {
        Ok(vec![Bytes::from(format!("tts:{text}"))])
    }
}

/// Blocks its thread for a while, then fails, like a backend that never answers.
pub(crate) struct StalledSynthesizer {
    stall: Duration,
}

impl StalledSynthesizer {
    pub(crate) fn new(stall: Duration) -> Self {
        Self { stall }
    }
}

impl Synthesizer for StalledSynthesizer {
    fn to_tts(&self, _text: &str) -> Result<Vec<AudioFrame>> {
        std::thread::sleep(self.stall);
        bail!("speech backend did not answer")
    }
}

/// Answers `echo: <last user message>` and records every prompt it receives.
#[derive(Default)]
pub(crate) struct EchoModel {
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
    fail: bool,
}

impl EchoModel {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub(crate) fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for EchoModel {
    async fn respond(&self, messages: &[ChatMessage]) -> Result<String> {
        if self.fail {
            bail!("model unavailable");
        }
        self.prompts.lock().unwrap().push(messages.to_vec());
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(format!("echo: {last_user}"))
    }
}

/// Plays back a fixed sequence of activities, then reports silence.
#[derive(Default)]
pub(crate) struct ScriptedVad {
    script: VecDeque<VoiceActivity>,
    pub(crate) resets: Arc<AtomicUsize>,
}

impl ScriptedVad {
    pub(crate) fn new(script: impl IntoIterator<Item = VoiceActivity>) -> Self {
        Self {
            script: script.into_iter().collect(),
            resets: Arc::default(),
        }
    }
}

impl VoiceActivityDetector for ScriptedVad {
    fn process(&mut self, _frame: &[u8]) -> VoiceActivity {
        self.script.pop_front().unwrap_or(VoiceActivity::Silence)
    }

    fn reset(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Overrides for the providers of a test session. Unset ones get a fake.
#[derive(Default)]
pub(crate) struct TestProviders {
    pub(crate) recognizer: Option<Recognizer>,
    pub(crate) synthesizer: Option<Arc<dyn Synthesizer>>,
    pub(crate) intent: Option<Arc<dyn IntentClassifier>>,
    pub(crate) llm: Option<Arc<dyn LanguageModel>>,
    pub(crate) vad: Option<Box<dyn VoiceActivityDetector>>,
    pub(crate) memory: Option<Box<dyn MemoryStore>>,
}

/// A session wired to fake providers, with its outbound queue exposed.
pub(crate) struct Harness {
    pub(crate) state: Arc<AppState>,
    pub(crate) session: Session,
    pub(crate) outbound: mpsc::Receiver<Outbound>,
    pub(crate) reports: Arc<CapturingSink>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::build(Self::config(), TestProviders::default())
    }
}

impl Harness {
    /// Default configuration with a greeting asset that does not exist.
    pub(crate) fn config() -> Config {
        Config {
            greeting_asset: PathBuf::from("/nonexistent/wakeup_words_short.wav"),
            ..Config::default()
        }
    }

    /// Must be called inside a Tokio runtime.
    pub(crate) fn build(config: Config, providers: TestProviders) -> Self {
        let reports = Arc::new(CapturingSink::default());
        let (queue, _worker) = ReportQueue::spawn(reports.clone());
        let task_timeout = config.task_timeout;
        let state = Arc::new(AppState {
            wake_words: Arc::new(WakeWordSet::new(&config.wakeup_words)),
            config: Arc::new(config),
            registry: Arc::new(ProviderRegistry::new()),
            synthesizer: providers
                .synthesizer
                .unwrap_or_else(|| Arc::new(EchoSynthesizer)),
            intent: providers.intent.unwrap_or_else(|| Arc::new(NoIntent)),
            llm: providers
                .llm
                .unwrap_or_else(|| Arc::new(EchoModel::default())),
            dispatcher: Arc::new(Dispatcher::with_default_handlers()),
            reports: queue,
            wake_reply: Arc::new(WakeReplyCache::default()),
        });

        let (outbox, outbound) = Outbox::channel();
        let session = Session::new(
            providers
                .recognizer
                .unwrap_or_else(|| Recognizer::Batch(Arc::new(FixedRecognizer(None)))),
            providers
                .vad
                .unwrap_or_else(|| Box::new(ScriptedVad::default())),
            providers.memory.unwrap_or_else(|| Box::new(NoMemory)),
            outbox,
            TaskSupervisor::new(task_timeout),
        );
        Self {
            state,
            session,
            outbound,
            reports,
        }
    }

    pub(crate) fn into_parts(self) -> (Arc<AppState>, Session, mpsc::Receiver<Outbound>) {
        (self.state, self.session, self.outbound)
    }

    /// Reports delivered so far, after giving the worker a moment to drain.
    pub(crate) async fn reports(&self) -> Vec<ReportItem> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.reports.items.lock().await.clone()
    }
}

/// Everything queued for the client so far.
pub(crate) fn drain(outbound: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
    let mut sent = Vec::new();
    while let Ok(item) = outbound.try_recv() {
        sent.push(item);
    }
    sent
}
