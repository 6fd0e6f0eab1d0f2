//! Immediate spoken acknowledgement of a wake word.

use super::{
    chat,
    output::{self, ReplySegment},
    session::Session,
};
use crate::state::AppState;
use anyhow::{Result, bail};
use parley_core::{
    AudioFrame,
    provider::{ChatMessage, Synthesizer},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

/// Process-wide cache of the synthesized wake reply.
#[derive(Default)]
pub struct WakeReplyCache {
    audio: RwLock<Option<Arc<Vec<AudioFrame>>>>,
}

impl WakeReplyCache {
    /// Returns the cached reply, synthesizing it on first use.
    ///
    /// Synthesis runs without holding the lock, so a slow backend only delays
    /// the sessions that are themselves waiting for it. When two sessions miss
    /// at once, the first result stored wins.
    pub async fn get_or_synthesize(
        &self,
        synthesizer: &Arc<dyn Synthesizer>,
        text: &str,
        timeout: Duration,
    ) -> Result<Arc<Vec<AudioFrame>>> {
        if let Some(audio) = self.audio.read().await.as_ref() {
            return Ok(audio.clone());
        }
        debug!("synthesizing wake reply");
        let frames = output::synthesize(synthesizer.clone(), text.to_string(), timeout).await?;
        if frames.is_empty() {
            bail!("wake reply synthesis produced no audio");
        }
        let mut slot = self.audio.write().await;
        Ok(slot.get_or_insert_with(|| Arc::new(frames)).clone())
    }
}

/// Plays the wake reply for a detected wake word.
///
/// Returns `true` when the reply was sent; the caller then starts no chat
/// turn. Returns `false` when the reply is disabled or could not be produced.
#[instrument(name = "wake_reply", skip_all)]
pub async fn play_wake_reply(state: &AppState, session: &mut Session, original_text: &str) -> bool {
    if !state.config.enable_wakeup_reply {
        return false;
    }
    match try_play(state, session, original_text).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = ?e, "wake reply unavailable");
            false
        }
    }
}

async fn try_play(state: &AppState, session: &mut Session, original_text: &str) -> Result<()> {
    let reply_text = &state.config.wakeup_reply_text;
    let audio = state
        .wake_reply
        .get_or_synthesize(&state.synthesizer, reply_text, state.config.task_timeout)
        .await?;

    output::send_stt(session, original_text).await?;
    output::emit(
        session,
        ReplySegment::first(audio.as_ref().clone(), reply_text.clone()),
    )
    .await?;
    output::emit(session, ReplySegment::last()).await?;

    chat::push_dialogue(&mut session.dialogue, ChatMessage::user(original_text));
    chat::push_dialogue(&mut session.dialogue, ChatMessage::assistant(reply_text.clone()));
    Ok(())
}
