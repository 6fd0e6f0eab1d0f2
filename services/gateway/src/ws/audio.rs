//! Inbound audio: buffering, utterance boundaries and recognition dispatch.

use super::{chat, protocol::ListenMode, session::Session};
use crate::{report::ReportItem, state::AppState};
use anyhow::{Context, Result};
use parley_core::{
    AudioFrame, Recognizer,
    provider::{BatchRecognizer, VoiceActivity},
};
use std::sync::Arc;
use tracing::{debug, info};

/// Silent frames kept in front of an utterance so its onset is not clipped.
const PRE_ROLL_FRAMES: usize = 10;

/// Takes one binary frame from the client.
///
/// Streaming recognizers get every frame. For batch recognizers the frame is
/// buffered: in `manual` mode only while the client reports voice, otherwise
/// the session's voice-activity detector decides where the utterance ends.
pub async fn receive_audio(state: &AppState, session: &mut Session, frame: AudioFrame) -> Result<()> {
    if let Recognizer::Streaming(recognizer) = &session.recognizer {
        return recognizer
            .push_audio(frame)
            .await
            .context("failed to forward audio to the recognizer");
    }
    match session.listen_mode {
        ListenMode::Manual => {
            if session.has_voice {
                session.audio_buffer.push(frame);
            }
            Ok(())
        }
        ListenMode::Auto | ListenMode::Realtime => detect_voice(state, session, frame).await,
    }
}

async fn detect_voice(state: &AppState, session: &mut Session, frame: AudioFrame) -> Result<()> {
    let activity = session.vad.process(&frame);
    session.audio_buffer.push(frame);
    match activity {
        VoiceActivity::Speech => {
            if !session.has_voice {
                debug!("speech started");
            }
            session.has_voice = true;
            session.touch();
            Ok(())
        }
        VoiceActivity::Silence => {
            let excess = session.audio_buffer.len().saturating_sub(PRE_ROLL_FRAMES);
            session.audio_buffer.drain(..excess);
            Ok(())
        }
        VoiceActivity::SpeechEnded => {
            debug!(frames = session.audio_buffer.len(), "speech ended");
            session.voice_stopped = true;
            let result = end_utterance(state, session).await;
            session.has_voice = false;
            session.voice_stopped = false;
            result
        }
    }
}

/// Closes the current utterance.
///
/// A streaming recognizer is only told that the utterance is over; the
/// transcript arrives later on its subscription. A batch recognizer is handed
/// the buffered frames directly.
pub async fn end_utterance(state: &AppState, session: &mut Session) -> Result<()> {
    match session.recognizer.clone() {
        Recognizer::Streaming(recognizer) => {
            session.tasks.spawn("asr_stop", async move {
                recognizer.signal_stop_streaming().await
            });
            Ok(())
        }
        Recognizer::Batch(recognizer) => recognize_buffered(state, session, recognizer).await,
    }
}

async fn recognize_buffered(
    state: &AppState,
    session: &mut Session,
    recognizer: Arc<dyn BatchRecognizer>,
) -> Result<()> {
    if session.audio_buffer.is_empty() {
        return Ok(());
    }
    let snapshot = session.take_utterance();
    let transcript = recognizer
        .handle_voice_stop(snapshot.clone())
        .await
        .context("speech recognition failed")?;
    match transcript {
        Some(text) => handle_transcript(state, session, text, snapshot).await,
        None => {
            debug!(frames = snapshot.len(), "nothing recognized");
            Ok(())
        }
    }
}

/// A finished transcript from either recognizer mode.
pub async fn handle_transcript(
    state: &AppState,
    session: &mut Session,
    text: String,
    audio: Vec<AudioFrame>,
) -> Result<()> {
    let text = text.trim();
    if text.is_empty() {
        debug!("ignoring empty transcript");
        return Ok(());
    }
    info!(text, "recognized speech");
    session.touch();
    session.just_woken_up = false;
    state
        .reports
        .enqueue(ReportItem::new(session.id, text, audio));
    chat::start_to_chat(state, session, text).await
}
