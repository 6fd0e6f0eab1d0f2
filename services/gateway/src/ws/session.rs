//! Manages the WebSocket connection lifecycle and the per-connection session state.

use super::{
    audio,
    protocol::{Inbound, ListenMode, Outbound, ServerMessage},
    tasks::TaskSupervisor,
};
use crate::state::AppState;
use anyhow::{Result, anyhow};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, Stream, StreamExt};
use parley_core::{
    AudioFrame, Recognizer, RegistryError,
    provider::{ChatMessage, MemoryStore, VoiceActivityDetector},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    sync::{broadcast, mpsc},
    time::Instant,
};
use tracing::{Instrument, debug, error, info, instrument, warn};
use uuid::Uuid;

const OUTBOX_CAPACITY: usize = 256;
/// How long background tasks of a closed connection may keep running.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Sending half of a connection's outbound queue.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Outbound>,
}

impl Outbox {
    pub fn channel() -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        (Self { tx }, rx)
    }

    pub async fn send(&self, msg: ServerMessage) -> Result<()> {
        self.push(Outbound::Message(msg)).await
    }

    pub async fn send_audio(&self, frame: AudioFrame) -> Result<()> {
        self.push(Outbound::Audio(frame)).await
    }

    async fn push(&self, item: Outbound) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| anyhow!("client connection closed"))
    }
}

/// Everything the gateway knows about one connection.
///
/// Owned by the connection's task and passed by `&mut` to every handler;
/// never shared with another connection.
pub struct Session {
    pub id: Uuid,
    pub listen_mode: ListenMode,
    /// Voice is present in the current utterance.
    pub has_voice: bool,
    /// The client (or the VAD) ended the current utterance.
    pub voice_stopped: bool,
    /// Frames since the last utterance boundary.
    pub audio_buffer: Vec<AudioFrame>,
    /// Set at most once; never reset.
    pub greeting_played: bool,
    /// The last turn came from a wake/detect event rather than recognized speech.
    pub just_woken_up: bool,
    /// A reply is between FIRST and LAST.
    pub is_speaking: bool,
    pub last_activity: Instant,
    /// Ends the session loop once the current message is handled.
    pub close_requested: bool,
    pub dialogue: Vec<ChatMessage>,
    pub recognizer: Recognizer,
    pub vad: Box<dyn VoiceActivityDetector>,
    pub memory: Box<dyn MemoryStore>,
    pub outbox: Outbox,
    pub tasks: TaskSupervisor,
}

impl Session {
    /// Resolves the per-session providers and creates the session.
    pub fn open(state: &AppState, outbox: Outbox) -> Result<Self, RegistryError> {
        let providers = &state.config.providers;
        let registry = &state.registry;
        let recognizer = registry.recognizer(&providers.asr.name, &providers.asr.params)?;
        let vad = registry.voice_activity(&providers.vad.name, &providers.vad.params)?;
        let memory = registry.memory(&providers.memory.name, &providers.memory.params)?;
        Ok(Self::new(
            recognizer,
            vad,
            memory,
            outbox,
            TaskSupervisor::new(state.config.task_timeout),
        ))
    }

    pub fn new(
        recognizer: Recognizer,
        vad: Box<dyn VoiceActivityDetector>,
        memory: Box<dyn MemoryStore>,
        outbox: Outbox,
        tasks: TaskSupervisor,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            listen_mode: ListenMode::default(),
            has_voice: false,
            voice_stopped: false,
            audio_buffer: Vec::new(),
            greeting_played: false,
            just_woken_up: false,
            is_speaking: false,
            last_activity: Instant::now(),
            close_requested: false,
            dialogue: Vec::new(),
            recognizer,
            vad,
            memory,
            outbox,
            tasks,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Takes the buffered utterance and resets the detector with it.
    pub fn take_utterance(&mut self) -> Vec<AudioFrame> {
        self.vad.reset();
        std::mem::take(&mut self.audio_buffer)
    }

    /// Drops the buffered utterance and resets the detector.
    pub fn clear_utterance(&mut self) {
        self.audio_buffer.clear();
        self.vad.reset();
    }
}

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Main handler for an individual WebSocket connection.
///
/// Creates the session before any message is read, then runs the session loop
/// until the client leaves, asks to exit, or goes idle.
#[instrument(name = "ws_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut socket_tx, socket_rx) = socket.split();
    let (outbox, mut outbound_rx) = Outbox::channel();

    let session = match Session::open(&state, outbox) {
        Ok(session) => session,
        Err(e) => {
            error!(error = ?e, "failed to initialize session providers");
            let _ = socket_tx.close().await;
            return;
        }
    };
    tracing::Span::current().record("session_id", tracing::field::display(session.id));
    info!("New WebSocket connection.");

    let writer = tokio::spawn(
        async move {
            while let Some(item) = outbound_rx.recv().await {
                let msg = match item {
                    Outbound::Message(msg) => match serde_json::to_string(&msg) {
                        Ok(text) => Message::Text(text.into()),
                        Err(e) => {
                            error!(error = ?e, "failed to serialize outbound message");
                            continue;
                        }
                    },
                    Outbound::Audio(frame) => Message::Binary(frame),
                };
                if socket_tx.send(msg).await.is_err() {
                    debug!("client went away while sending");
                    break;
                }
            }
            let _ = socket_tx.close().await;
        }
        .in_current_span(),
    );

    let inbound = socket_rx.filter_map(|msg| async move {
        match msg {
            Ok(Message::Text(text)) => Some(Inbound::Text(text.as_str().to_owned())),
            Ok(Message::Binary(data)) => Some(Inbound::Audio(data)),
            Ok(Message::Close(_)) => Some(Inbound::Close),
            Ok(Message::Ping(_) | Message::Pong(_)) => None,
            Err(e) => {
                warn!(error = ?e, "error receiving from client WebSocket");
                Some(Inbound::Close)
            }
        }
    });

    run_session(state, session, inbound).await;
    if let Err(e) = writer.await {
        error!(error = ?e, "outbound writer task failed");
    }
    info!("WebSocket connection closed.");
}

/// The main event loop of one session.
///
/// Messages are handled strictly one at a time in arrival order; a handler
/// that is waiting on a provider suspends only this session.
pub async fn run_session<S>(state: Arc<AppState>, mut session: Session, inbound: S)
where
    S: Stream<Item = Inbound> + Send,
{
    let mut transcripts = match &session.recognizer {
        Recognizer::Streaming(recognizer) => Some(recognizer.subscribe()),
        Recognizer::Batch(_) => None,
    };
    let idle_timeout = state.config.idle_timeout;
    let mut inbound = std::pin::pin!(inbound);

    loop {
        let idle_deadline = session.last_activity + idle_timeout;
        tokio::select! {
            item = inbound.next() => match item {
                Some(Inbound::Text(text)) => {
                    state.dispatcher.dispatch_text(&state, &mut session, &text).await;
                }
                Some(Inbound::Audio(frame)) => {
                    if let Err(e) = audio::receive_audio(&state, &mut session, frame).await {
                        warn!(error = ?e, "failed to process inbound audio");
                    }
                }
                Some(Inbound::Close) | None => {
                    info!("Client closed the connection.");
                    break;
                }
            },
            Some(text) = next_transcript(&mut transcripts) => {
                if let Err(e) = audio::handle_transcript(&state, &mut session, text, Vec::new()).await {
                    warn!(error = ?e, "failed to handle streaming transcript");
                }
            },
            _ = tokio::time::sleep_until(idle_deadline) => {
                info!(?idle_timeout, "Closing idle connection.");
                break;
            },
        }
        if session.close_requested {
            info!("Session ended by request.");
            break;
        }
    }

    let Session { tasks, outbox, .. } = session;
    drop(outbox);
    tasks.shutdown(SHUTDOWN_GRACE).await;
}

/// Next final transcript from a streaming recognizer; pending forever for batch ones.
async fn next_transcript(rx: &mut Option<broadcast::Receiver<String>>) -> Option<String> {
    loop {
        let Some(receiver) = rx.as_mut() else {
            return std::future::pending().await;
        };
        match receiver.recv().await {
            Ok(text) => return Some(text),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "transcript subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("recognizer closed its transcript stream");
                *rx = None;
            }
        }
    }
}
