//! Provider Registry
//!
//! Maps a `(kind, implementation name)` pair to a constructor. The table is
//! populated explicitly (see [`ProviderRegistry::with_builtins`]); there is no
//! runtime discovery and no fallback between names. Asking for a name that was
//! never registered always fails with [`UnsupportedProviderError`].

use crate::builtin;
use crate::provider::{
    IntentClassifier, LanguageModel, MemoryStore, Recognizer, Synthesizer, VoiceActivityDetector,
};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// The logical kind of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Recognition,
    Synthesis,
    VoiceActivity,
    Intent,
    Memory,
    LanguageModel,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 6] = [
        ProviderKind::Recognition,
        ProviderKind::Synthesis,
        ProviderKind::VoiceActivity,
        ProviderKind::Intent,
        ProviderKind::Memory,
        ProviderKind::LanguageModel,
    ];

    /// Whether one instance may be shared by every session.
    ///
    /// Kinds that hold per-call mutable state are constructed per session.
    pub fn is_shareable(self) -> bool {
        matches!(
            self,
            ProviderKind::Synthesis | ProviderKind::Intent | ProviderKind::LanguageModel
        )
    }

    /// Short configuration name of the kind (`asr`, `tts`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Recognition => "asr",
            ProviderKind::Synthesis => "tts",
            ProviderKind::VoiceActivity => "vad",
            ProviderKind::Intent => "intent",
            ProviderKind::Memory => "memory",
            ProviderKind::LanguageModel => "llm",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An instantiated backend of any kind.
pub enum ProviderHandle {
    Recognizer(Recognizer),
    Synthesizer(Arc<dyn Synthesizer>),
    VoiceActivity(Box<dyn VoiceActivityDetector>),
    Intent(Arc<dyn IntentClassifier>),
    Memory(Box<dyn MemoryStore>),
    LanguageModel(Arc<dyn LanguageModel>),
}

impl ProviderHandle {
    pub fn kind(&self) -> ProviderKind {
        match self {
            ProviderHandle::Recognizer(_) => ProviderKind::Recognition,
            ProviderHandle::Synthesizer(_) => ProviderKind::Synthesis,
            ProviderHandle::VoiceActivity(_) => ProviderKind::VoiceActivity,
            ProviderHandle::Intent(_) => ProviderKind::Intent,
            ProviderHandle::Memory(_) => ProviderKind::Memory,
            ProviderHandle::LanguageModel(_) => ProviderKind::LanguageModel,
        }
    }

    /// Clones the handle if it is backed by a shared (`Arc`) instance.
    fn share(&self) -> Option<ProviderHandle> {
        match self {
            ProviderHandle::Synthesizer(p) => Some(ProviderHandle::Synthesizer(p.clone())),
            ProviderHandle::Intent(p) => Some(ProviderHandle::Intent(p.clone())),
            ProviderHandle::LanguageModel(p) => Some(ProviderHandle::LanguageModel(p.clone())),
            _ => None,
        }
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProviderHandle").field(&self.kind()).finish()
    }
}

/// No implementation is registered under the requested name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported {kind} provider `{name}`")]
pub struct UnsupportedProviderError {
    pub kind: ProviderKind,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedProviderError),
    #[error("failed to construct {kind} provider `{name}`")]
    Construction {
        kind: ProviderKind,
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    #[error("{kind} factory `{name}` produced a {actual} provider")]
    KindMismatch {
        kind: ProviderKind,
        name: String,
        actual: ProviderKind,
    },
}

/// A constructor for one implementation. Receives the configured parameters
/// exactly as they appear in configuration.
pub type ProviderFactory =
    Arc<dyn Fn(&Value) -> anyhow::Result<ProviderHandle> + Send + Sync + 'static>;

type Key = (ProviderKind, String);

/// Resolves backends by kind and implementation name.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<Key, ProviderFactory>,
    shared: Mutex<HashMap<Key, ProviderHandle>>,
}

impl ProviderRegistry {
    /// An empty registry. Mostly useful for tests; see [`Self::with_builtins`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry populated with every implementation shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Registers (or replaces) the factory for `(kind, name)`.
    pub fn register<F>(&mut self, kind: ProviderKind, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> anyhow::Result<ProviderHandle> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(%kind, %name, "registering provider");
        self.factories.insert((kind, name), Arc::new(factory));
    }

    pub fn contains(&self, kind: ProviderKind, name: &str) -> bool {
        self.factories.contains_key(&(kind, name.to_string()))
    }

    /// Names registered for `kind`, sorted.
    pub fn names(&self, kind: ProviderKind) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .factories
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, n)| n.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Fails with [`UnsupportedProviderError`] unless `(kind, name)` is registered.
    pub fn ensure(&self, kind: ProviderKind, name: &str) -> Result<(), UnsupportedProviderError> {
        if self.contains(kind, name) {
            Ok(())
        } else {
            Err(UnsupportedProviderError {
                kind,
                name: name.to_string(),
            })
        }
    }

    /// Resolves and instantiates the backend registered as `(kind, name)`.
    ///
    /// Shareable kinds are constructed once and the same instance is handed
    /// out on every later call; the parameters of the first call win.
    /// Per-session kinds get a fresh instance every time.
    pub fn resolve(
        &self,
        kind: ProviderKind,
        name: &str,
        params: &Value,
    ) -> Result<ProviderHandle, RegistryError> {
        let key = (kind, name.to_string());
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| UnsupportedProviderError {
                kind,
                name: name.to_string(),
            })?;

        if !kind.is_shareable() {
            return construct(factory, kind, name, params);
        }

        let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = shared.get(&key).and_then(ProviderHandle::share) {
            return Ok(handle);
        }
        let handle = construct(factory, kind, name, params)?;
        if let Some(copy) = handle.share() {
            shared.insert(key, copy);
        }
        info!(%kind, %name, "provider initialized");
        Ok(handle)
    }

    pub fn recognizer(&self, name: &str, params: &Value) -> Result<Recognizer, RegistryError> {
        match self.resolve(ProviderKind::Recognition, name, params)? {
            ProviderHandle::Recognizer(r) => Ok(r),
            other => Err(mismatch(ProviderKind::Recognition, name, &other)),
        }
    }

    pub fn synthesizer(
        &self,
        name: &str,
        params: &Value,
    ) -> Result<Arc<dyn Synthesizer>, RegistryError> {
        match self.resolve(ProviderKind::Synthesis, name, params)? {
            ProviderHandle::Synthesizer(s) => Ok(s),
            other => Err(mismatch(ProviderKind::Synthesis, name, &other)),
        }
    }

    pub fn voice_activity(
        &self,
        name: &str,
        params: &Value,
    ) -> Result<Box<dyn VoiceActivityDetector>, RegistryError> {
        match self.resolve(ProviderKind::VoiceActivity, name, params)? {
            ProviderHandle::VoiceActivity(v) => Ok(v),
            other => Err(mismatch(ProviderKind::VoiceActivity, name, &other)),
        }
    }

    pub fn intent(
        &self,
        name: &str,
        params: &Value,
    ) -> Result<Arc<dyn IntentClassifier>, RegistryError> {
        match self.resolve(ProviderKind::Intent, name, params)? {
            ProviderHandle::Intent(i) => Ok(i),
            other => Err(mismatch(ProviderKind::Intent, name, &other)),
        }
    }

    pub fn memory(
        &self,
        name: &str,
        params: &Value,
    ) -> Result<Box<dyn MemoryStore>, RegistryError> {
        match self.resolve(ProviderKind::Memory, name, params)? {
            ProviderHandle::Memory(m) => Ok(m),
            other => Err(mismatch(ProviderKind::Memory, name, &other)),
        }
    }

    pub fn language_model(
        &self,
        name: &str,
        params: &Value,
    ) -> Result<Arc<dyn LanguageModel>, RegistryError> {
        match self.resolve(ProviderKind::LanguageModel, name, params)? {
            ProviderHandle::LanguageModel(l) => Ok(l),
            other => Err(mismatch(ProviderKind::LanguageModel, name, &other)),
        }
    }
}

fn construct(
    factory: &ProviderFactory,
    kind: ProviderKind,
    name: &str,
    params: &Value,
) -> Result<ProviderHandle, RegistryError> {
    let handle = factory(params).map_err(|e| RegistryError::Construction {
        kind,
        name: name.to_string(),
        source: e.into(),
    })?;
    if handle.kind() != kind {
        return Err(mismatch(kind, name, &handle));
    }
    Ok(handle)
}

fn mismatch(kind: ProviderKind, name: &str, handle: &ProviderHandle) -> RegistryError {
    RegistryError::KindMismatch {
        kind,
        name: name.to_string(),
        actual: handle.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{InterfaceMode, MockBatchRecognizer, MockSynthesizer};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn batch_recognizer() -> ProviderHandle {
        ProviderHandle::Recognizer(Recognizer::Batch(Arc::new(MockBatchRecognizer::new())))
    }

    #[test]
    fn unknown_name_is_unsupported() {
        let registry = ProviderRegistry::with_builtins();

        let err = registry
            .resolve(ProviderKind::Recognition, "doesnotexist", &json!({}))
            .unwrap_err();

        match err {
            RegistryError::Unsupported(e) => {
                assert_eq!(e.kind, ProviderKind::Recognition);
                assert_eq!(e.name, "doesnotexist");
                assert_eq!(e.to_string(), "unsupported asr provider `doesnotexist`");
            }
            other => panic!("expected Unsupported, got {other:?}"),
        }
    }

    #[test]
    fn names_are_not_shared_between_kinds() {
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderKind::Recognition, "fake", |_| Ok(batch_recognizer()));

        assert!(registry.contains(ProviderKind::Recognition, "fake"));
        assert!(registry.ensure(ProviderKind::Synthesis, "fake").is_err());
        assert!(registry.synthesizer("fake", &json!({})).is_err());
    }

    #[test]
    fn shareable_kinds_are_constructed_once() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderKind::Synthesis, "fake", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ProviderHandle::Synthesizer(Arc::new(MockSynthesizer::new())))
        });

        let a = registry.synthesizer("fake", &json!({})).unwrap();
        let b = registry.synthesizer("fake", &json!({})).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn per_session_kinds_get_fresh_instances() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderKind::Recognition, "fake", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(batch_recognizer())
        });

        let first = registry.recognizer("fake", &json!({})).unwrap();
        let second = registry.recognizer("fake", &json!({})).unwrap();

        assert_eq!(first.interface_mode(), InterfaceMode::Batch);
        assert_eq!(second.interface_mode(), InterfaceMode::Batch);
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn params_are_passed_through_unchanged() {
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderKind::Recognition, "fake", |params| {
            assert_eq!(params, &json!({"model": "tiny", "nested": {"a": [1, 2]}}));
            Ok(batch_recognizer())
        });

        registry
            .recognizer("fake", &json!({"model": "tiny", "nested": {"a": [1, 2]}}))
            .unwrap();
    }

    #[test]
    fn factory_failure_is_a_construction_error() {
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderKind::LanguageModel, "broken", |_| {
            Err(anyhow::anyhow!("missing api_key"))
        });

        let Err(err) = registry.language_model("broken", &json!({})) else {
            panic!("construction should fail");
        };
        assert!(matches!(err, RegistryError::Construction { .. }));
        assert!(
            std::error::Error::source(&err)
                .unwrap()
                .to_string()
                .contains("missing api_key")
        );
    }

    #[test]
    fn factory_returning_wrong_kind_is_rejected() {
        let mut registry = ProviderRegistry::new();
        registry.register(ProviderKind::Synthesis, "confused", |_| Ok(batch_recognizer()));

        let Err(err) = registry.synthesizer("confused", &json!({})) else {
            panic!("kind mismatch should be rejected");
        };
        assert!(matches!(
            err,
            RegistryError::KindMismatch {
                kind: ProviderKind::Synthesis,
                actual: ProviderKind::Recognition,
                ..
            }
        ));
    }

    #[test]
    fn builtins_cover_every_kind() {
        let registry = ProviderRegistry::with_builtins();
        for kind in ProviderKind::ALL {
            assert!(!registry.names(kind).is_empty(), "no builtin for {kind}");
        }
        assert_eq!(
            registry.names(ProviderKind::Memory),
            vec!["nomem", "short_term"]
        );
    }
}
