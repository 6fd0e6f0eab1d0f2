//! Drives the real router over a WebSocket connection.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parley_core::{
    AudioFrame, ProviderHandle, ProviderKind, ProviderRegistry, Recognizer, RegistryError,
    builtin::{EnergyVad, NoIntent, NoMemory},
    provider::{BatchRecognizer, ChatMessage, LanguageModel, Synthesizer},
};
use parley_gateway::{
    config::{Config, ProviderSettings},
    report::LogReportSink,
    router::{WS_PATH, create_router},
    state::AppState,
};
use serde_json::{Value, json};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};

struct SilentRecognizer;

#[async_trait]
impl BatchRecognizer for SilentRecognizer {
    async fn handle_voice_stop(&self, _frames: Vec<AudioFrame>) -> Result<Option<String>> {
        Ok(None)
    }
}

struct ToneSynthesizer;

impl Synthesizer for ToneSynthesizer {
    fn to_tts(&self, _text: &str) -> Result<Vec<AudioFrame>> {
        Ok(vec![Bytes::from_static(&[1, 2, 3, 4])])
    }
}

struct WeatherModel;

#[async_trait]
impl LanguageModel for WeatherModel {
    async fn respond(&self, _messages: &[ChatMessage]) -> Result<String> {
        Ok("今天晴".to_string())
    }
}

fn registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(ProviderKind::Recognition, "fake", |_| {
        Ok(ProviderHandle::Recognizer(Recognizer::Batch(Arc::new(
            SilentRecognizer,
        ))))
    });
    registry.register(ProviderKind::Synthesis, "fake", |_| {
        Ok(ProviderHandle::Synthesizer(Arc::new(ToneSynthesizer)))
    });
    registry.register(ProviderKind::VoiceActivity, "energy", |_| {
        Ok(ProviderHandle::VoiceActivity(Box::new(EnergyVad::new(
            Default::default(),
        ))))
    });
    registry.register(ProviderKind::Intent, "nointent", |_| {
        Ok(ProviderHandle::Intent(Arc::new(NoIntent)))
    });
    registry.register(ProviderKind::Memory, "nomem", |_| {
        Ok(ProviderHandle::Memory(Box::new(NoMemory)))
    });
    registry.register(ProviderKind::LanguageModel, "fake", |_| {
        Ok(ProviderHandle::LanguageModel(Arc::new(WeatherModel)))
    });
    registry
}

fn config() -> Config {
    let mut config = Config {
        greeting_asset: PathBuf::from("/nonexistent/greeting.wav"),
        ..Config::default()
    };
    config.providers.asr = ProviderSettings::new("fake");
    config.providers.tts = ProviderSettings::new("fake");
    config.providers.llm = ProviderSettings::new("fake");
    config
}

async fn spawn_server() -> SocketAddr {
    let state = AppState::new(config(), registry(), Arc::new(LogReportSink)).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(Arc::new(state)))
            .await
            .unwrap();
    });
    addr
}

async fn next_json<S>(socket: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for the gateway")
            .expect("connection closed")
            .unwrap();
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Binary(data) => return json!({"binary": data.len()}),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn unknown_provider_name_fails_at_startup() {
    let mut config = config();
    config.providers.asr = ProviderSettings::new("doesnotexist");

    let result = AppState::new(config, registry(), Arc::new(LogReportSink));

    let Err(RegistryError::Unsupported(err)) = result else {
        panic!("expected an unsupported provider error");
    };
    assert_eq!(err.kind, ProviderKind::Recognition);
    assert_eq!(err.name, "doesnotexist");
}

#[tokio::test]
async fn hello_then_text_turn_over_websocket() {
    let addr = spawn_server().await;
    let (mut socket, _) = connect_async(format!("ws://{addr}{WS_PATH}"))
        .await
        .unwrap();

    socket
        .send(Message::text(
            json!({"type": "hello", "audio_params": {"format": "opus"}}).to_string(),
        ))
        .await
        .unwrap();
    let hello = next_json(&mut socket).await;
    assert_eq!(hello["type"], "hello");
    assert_eq!(hello["audio_params"], json!({"format": "opus"}));
    let session_id = hello["session_id"].clone();

    socket
        .send(Message::text(
            json!({"type": "listen", "state": "detect", "text": "帮我查天气"}).to_string(),
        ))
        .await
        .unwrap();

    let mut replies = Vec::new();
    for _ in 0..5 {
        replies.push(next_json(&mut socket).await);
    }
    assert_eq!(
        replies,
        vec![
            json!({"type": "stt", "session_id": session_id, "text": "帮我查天气"}),
            json!({"type": "tts", "session_id": session_id, "state": "start"}),
            json!({"type": "tts", "session_id": session_id, "state": "sentence_start", "text": "今天晴"}),
            json!({"binary": 4}),
            json!({"type": "tts", "session_id": session_id, "state": "stop"}),
        ]
    );

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn health_endpoint_responds() {
    let addr = spawn_server().await;

    let body = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(body, "ok");
}
