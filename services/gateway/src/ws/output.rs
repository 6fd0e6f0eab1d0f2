//! Reply framing towards the client.
//!
//! A reply is one FIRST segment followed by one LAST segment. FIRST opens the
//! `tts` stream and carries the audio and the sentence text; LAST flushes any
//! trailing audio and closes the stream with `tts stop`.

use super::{
    protocol::{ServerMessage, TtsState},
    session::Session,
};
use anyhow::{Context, Result};
use parley_core::{AudioFrame, provider::Synthesizer};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplySegment {
    pub kind: SegmentKind,
    pub audio: Vec<AudioFrame>,
    pub text: Option<String>,
}

impl ReplySegment {
    pub fn first(audio: Vec<AudioFrame>, text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::First,
            audio,
            text: Some(text.into()),
        }
    }

    /// The empty terminator.
    pub fn last() -> Self {
        Self {
            kind: SegmentKind::Last,
            audio: Vec::new(),
            text: None,
        }
    }
}

/// Sends one segment of a reply.
///
/// A FIRST while another reply is still open stops that reply before starting
/// the new one, so two replies never interleave. A LAST with no open reply is
/// dropped.
pub async fn emit(session: &mut Session, segment: ReplySegment) -> Result<()> {
    match segment.kind {
        SegmentKind::First => {
            if session.is_speaking {
                debug!("reply still in flight; stopping it first");
                send_stop(session).await?;
            }
            session.is_speaking = true;
            send_tts(session, TtsState::Start, None).await?;
            if let Some(text) = segment.text {
                send_tts(session, TtsState::SentenceStart, Some(text)).await?;
            }
            for frame in segment.audio {
                session.outbox.send_audio(frame).await?;
            }
        }
        SegmentKind::Last => {
            if !session.is_speaking {
                debug!("no reply in flight; ignoring LAST");
                return Ok(());
            }
            for frame in segment.audio {
                session.outbox.send_audio(frame).await?;
            }
            send_stop(session).await?;
        }
    }
    Ok(())
}

/// Explicit stop framing. Ends whatever reply is open.
pub async fn send_stop(session: &mut Session) -> Result<()> {
    session.is_speaking = false;
    send_tts(session, TtsState::Stop, None).await
}

/// The recognized-text notice.
pub async fn send_stt(session: &Session, text: &str) -> Result<()> {
    session
        .outbox
        .send(ServerMessage::Stt {
            session_id: session.id,
            text: text.to_string(),
        })
        .await
}

async fn send_tts(session: &Session, state: TtsState, text: Option<String>) -> Result<()> {
    session
        .outbox
        .send(ServerMessage::Tts {
            session_id: session.id,
            state,
            text,
        })
        .await
}

/// Runs a synthesizer off the async workers, giving up after `timeout`.
///
/// A call that times out keeps its blocking thread until the synthesizer
/// returns; the caller is released immediately.
pub async fn synthesize(
    synthesizer: Arc<dyn Synthesizer>,
    text: String,
    timeout: Duration,
) -> Result<Vec<AudioFrame>> {
    let task = tokio::task::spawn_blocking(move || synthesizer.to_tts(&text));
    tokio::time::timeout(timeout, task)
        .await
        .with_context(|| format!("synthesis did not finish within {timeout:?}"))?
        .context("synthesis task did not complete")?
}
