use parley_core::ProviderKind;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Preset greeting played on the first `listen start` of a session.
pub const DEFAULT_GREETING_ASSET: &str = "config/assets/wakeup_words_short.wav";
/// Text accompanying the greeting, and what the greeting falls back to synthesizing.
pub const GREETING_TEXT: &str = "你好";
/// Phrase reported and chatted with when a wake word starts a conversation.
pub const WAKE_ACK_TEXT: &str = "你好";

const DEFAULT_WAKEUP_WORDS: &[&str] = &["你好小智", "小智小智", "嘿你好呀", "你好"];
const DEFAULT_WAKEUP_REPLY: &str = "我在，有什么可以帮你的吗？";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly voice assistant. Keep answers short and conversational; they are read aloud.";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which implementation to use for one provider kind, and its construction parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderSettings {
    pub name: String,
    pub params: Value,
}

impl ProviderSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Value::Object(Default::default()),
        }
    }
}

/// The implementation selected for every provider kind.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderSelection {
    pub asr: ProviderSettings,
    pub tts: ProviderSettings,
    pub vad: ProviderSettings,
    pub intent: ProviderSettings,
    pub memory: ProviderSettings,
    pub llm: ProviderSettings,
}

impl ProviderSelection {
    pub fn get(&self, kind: ProviderKind) -> &ProviderSettings {
        match kind {
            ProviderKind::Recognition => &self.asr,
            ProviderKind::Synthesis => &self.tts,
            ProviderKind::VoiceActivity => &self.vad,
            ProviderKind::Intent => &self.intent,
            ProviderKind::Memory => &self.memory,
            ProviderKind::LanguageModel => &self.llm,
        }
    }

    fn get_mut(&mut self, kind: ProviderKind) -> &mut ProviderSettings {
        match kind {
            ProviderKind::Recognition => &mut self.asr,
            ProviderKind::Synthesis => &mut self.tts,
            ProviderKind::VoiceActivity => &mut self.vad,
            ProviderKind::Intent => &mut self.intent,
            ProviderKind::Memory => &mut self.memory,
            ProviderKind::LanguageModel => &mut self.llm,
        }
    }
}

impl Default for ProviderSelection {
    fn default() -> Self {
        Self {
            asr: ProviderSettings::new("openai"),
            tts: ProviderSettings::new("openai"),
            vad: ProviderSettings::new("energy"),
            intent: ProviderSettings::new("nointent"),
            memory: ProviderSettings::new("nomem"),
            llm: ProviderSettings::new("openai"),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub enable_greeting: bool,
    pub wakeup_words: Vec<String>,
    pub enable_wakeup_reply: bool,
    pub wakeup_reply_text: String,
    pub greeting_asset: PathBuf,
    pub system_prompt: String,
    pub idle_timeout: Duration,
    pub task_timeout: Duration,
    pub report_url: Option<String>,
    pub providers: ProviderSelection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8000)),
            log_level: Level::INFO,
            enable_greeting: true,
            wakeup_words: DEFAULT_WAKEUP_WORDS.iter().map(|w| w.to_string()).collect(),
            enable_wakeup_reply: true,
            wakeup_reply_text: DEFAULT_WAKEUP_REPLY.to_string(),
            greeting_asset: PathBuf::from(DEFAULT_GREETING_ASSET),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            idle_timeout: Duration::from_secs(120),
            task_timeout: Duration::from_secs(30),
            report_url: None,
            providers: ProviderSelection::default(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        let defaults = Self::default();

        let bind_address = match var("BIND_ADDRESS") {
            Some(s) => s
                .parse::<SocketAddr>()
                .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".into(), e.to_string()))?,
            None => defaults.bind_address,
        };

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let wakeup_words = match var("WAKEUP_WORDS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.wakeup_words,
        };

        let mut providers = ProviderSelection::default();
        for kind in ProviderKind::ALL {
            let prefix = kind.as_str().to_uppercase();
            let settings = providers.get_mut(kind);
            if let Some(name) = var(&format!("{prefix}_PROVIDER")) {
                settings.name = name;
            }
            if let Some(raw) = var(&format!("{prefix}_PARAMS")) {
                settings.params = serde_json::from_str(&raw).map_err(|e| {
                    ConfigError::InvalidValue(format!("{prefix}_PARAMS"), e.to_string())
                })?;
            }
        }
        inject_openai_key(&mut providers, var("OPENAI_API_KEY"))?;

        Ok(Self {
            bind_address,
            log_level,
            enable_greeting: flag("ENABLE_GREETING", defaults.enable_greeting)?,
            wakeup_words,
            enable_wakeup_reply: flag("ENABLE_WAKEUP_REPLY", defaults.enable_wakeup_reply)?,
            wakeup_reply_text: var("WAKEUP_REPLY_TEXT").unwrap_or(defaults.wakeup_reply_text),
            greeting_asset: var("GREETING_ASSET")
                .map(PathBuf::from)
                .unwrap_or(defaults.greeting_asset),
            system_prompt: var("SYSTEM_PROMPT").unwrap_or(defaults.system_prompt),
            idle_timeout: seconds("IDLE_TIMEOUT_SECS", defaults.idle_timeout)?,
            task_timeout: seconds("TASK_TIMEOUT_SECS", defaults.task_timeout)?,
            report_url: var("REPORT_URL"),
            providers,
        })
    }
}

/// Gives every `openai` provider the shared API key unless its params carry one.
fn inject_openai_key(
    providers: &mut ProviderSelection,
    api_key: Option<String>,
) -> Result<(), ConfigError> {
    for kind in ProviderKind::ALL {
        let settings = providers.get_mut(kind);
        if settings.name != "openai" {
            continue;
        }
        let Some(params) = settings.params.as_object_mut() else {
            return Err(ConfigError::InvalidValue(
                format!("{}_PARAMS", kind.as_str().to_uppercase()),
                "expected a JSON object".to_string(),
            ));
        };
        if params.contains_key("api_key") {
            continue;
        }
        match &api_key {
            Some(key) => {
                params.insert("api_key".to_string(), Value::String(key.clone()));
            }
            None => {
                return Err(ConfigError::MissingVar(format!(
                    "OPENAI_API_KEY must be set for the 'openai' {} provider",
                    kind
                )));
            }
        }
    }
    Ok(())
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn flag(name: &str, default: bool) -> Result<bool, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(v) => match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(name.to_string(), v)),
        },
    }
}

fn seconds(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(v) => v
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
    }
}
