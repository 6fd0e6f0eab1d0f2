//! The `listen` message: start, stop and detect.

use crate::{
    assets,
    config::{GREETING_TEXT, WAKE_ACK_TEXT},
    report::ReportItem,
    state::AppState,
    ws::{
        audio, chat,
        dispatch::MessageHandler,
        output::{self, ReplySegment},
        protocol::{ClientMessage, ListenState, MessageType},
        session::Session,
        wakeup,
    },
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

pub struct ListenHandler;

#[async_trait]
impl MessageHandler for ListenHandler {
    fn message_type(&self) -> MessageType {
        MessageType::Listen
    }

    #[instrument(name = "listen", skip_all, fields(state = ?message.state))]
    async fn handle(
        &self,
        state: &AppState,
        session: &mut Session,
        message: &ClientMessage,
    ) -> Result<()> {
        if let Some(mode) = message.mode {
            debug!(?mode, "client listen mode");
            session.listen_mode = mode;
        }
        let listen_state = message
            .state
            .context("listen message without a state")?;
        match listen_state {
            ListenState::Start => on_start(state, session).await,
            ListenState::Stop => on_stop(state, session).await,
            ListenState::Detect => on_detect(state, session, message.text.as_deref()).await,
        }
    }
}

async fn on_start(state: &AppState, session: &mut Session) -> Result<()> {
    session.has_voice = true;
    session.voice_stopped = false;

    let enabled = state.config.enable_greeting;
    info!(enabled, already_played = session.greeting_played, "listen start greeting check");
    if !enabled || session.greeting_played {
        return Ok(());
    }
    // Flag first: a failed greeting is not retried on the next start.
    session.greeting_played = true;
    if let Err(e) = play_greeting(state, session).await {
        warn!(error = ?e, "greeting playback failed");
    }
    Ok(())
}

/// Preset asset first, synthesized greeting phrase if the asset cannot be loaded.
async fn play_greeting(state: &AppState, session: &mut Session) -> Result<()> {
    let path = &state.config.greeting_asset;
    let audio = match assets::load_audio_asset(path).await {
        Ok(frames) => {
            info!(path = %path.display(), "greeting from preset asset");
            frames
        }
        Err(e) => {
            warn!(error = %e, "preset greeting unavailable, falling back to synthesis");
            output::synthesize(
                state.synthesizer.clone(),
                GREETING_TEXT.to_string(),
                state.config.task_timeout,
            )
            .await?
        }
    };
    if audio.is_empty() {
        debug!("greeting produced no audio");
        return Ok(());
    }
    output::emit(session, ReplySegment::first(audio, GREETING_TEXT)).await?;
    output::emit(session, ReplySegment::last()).await
}

async fn on_stop(state: &AppState, session: &mut Session) -> Result<()> {
    session.has_voice = true;
    session.voice_stopped = true;
    audio::end_utterance(state, session).await
}

async fn on_detect(state: &AppState, session: &mut Session, text: Option<&str>) -> Result<()> {
    session.has_voice = false;
    session.clear_utterance();
    let Some(text) = text else {
        return Ok(());
    };
    session.touch();

    let is_wake_word = state.wake_words.matches(text);
    if is_wake_word && !state.config.enable_greeting {
        output::send_stt(session, text).await?;
        return output::send_stop(session).await;
    }

    let chat_text = if is_wake_word {
        if wakeup::play_wake_reply(state, session, text).await {
            info!("wake reply played");
            return Ok(());
        }
        WAKE_ACK_TEXT
    } else {
        text
    };
    session.just_woken_up = true;
    state
        .reports
        .enqueue(ReportItem::new(session.id, chat_text, Vec::new()));
    chat::start_to_chat(state, session, chat_text).await
}
