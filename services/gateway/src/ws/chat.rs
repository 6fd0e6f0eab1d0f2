//! Contains the logic for one conversational turn.

use super::{
    output::{self, ReplySegment},
    session::Session,
};
use crate::state::AppState;
use anyhow::{Context, Result};
use parley_core::provider::{ChatMessage, Intent};
use tracing::{debug, info, instrument, warn};

/// Dialogue entries kept on the session and sent to the language model.
const MAX_DIALOGUE_MESSAGES: usize = 20;

/// Handles a single user utterance, from recognized text to spoken reply.
///
/// This involves:
/// 1.  Interrupting a reply that is still playing and acknowledging the text.
/// 2.  Classifying the intent; an exit request ends the session.
/// 3.  Building the prompt from the system prompt, recalled memory and the
///     recent dialogue, and asking the language model for an answer.
/// 4.  Synthesizing the answer and sending it as one FIRST/LAST reply.
/// 5.  Letting the memory provider record the dialogue.
#[instrument(name = "chat", skip_all)]
pub async fn start_to_chat(state: &AppState, session: &mut Session, text: &str) -> Result<()> {
    if session.is_speaking {
        output::send_stop(session).await?;
    }
    output::send_stt(session, text).await?;

    let intent = state.intent.classify(text).await.unwrap_or_else(|e| {
        warn!(error = ?e, "intent classification failed, continuing the chat");
        Intent::Continue
    });
    if intent == Intent::Exit {
        info!("user ended the conversation");
        session.close_requested = true;
        return Ok(());
    }

    let recalled = session.memory.recall(text).await.unwrap_or_else(|e| {
        warn!(error = ?e, "memory recall failed");
        None
    });
    push_dialogue(&mut session.dialogue, ChatMessage::user(text));
    let messages = build_prompt(
        &state.config.system_prompt,
        recalled.as_deref(),
        &session.dialogue,
    );

    let timeout = state.config.task_timeout;
    let reply = tokio::time::timeout(timeout, state.llm.respond(&messages))
        .await
        .with_context(|| format!("language model did not answer within {timeout:?}"))?
        .context("language model request failed")?;
    let reply = reply.trim().to_string();
    if reply.is_empty() {
        debug!("language model returned an empty reply");
        return Ok(());
    }
    push_dialogue(&mut session.dialogue, ChatMessage::assistant(reply.clone()));

    let audio = match output::synthesize(state.synthesizer.clone(), reply.clone(), timeout).await {
        Ok(audio) => audio,
        Err(e) => {
            warn!(error = ?e, "reply synthesis failed, sending text only");
            Vec::new()
        }
    };
    output::emit(session, ReplySegment::first(audio, reply)).await?;
    output::emit(session, ReplySegment::last()).await?;

    if let Err(e) = session.memory.remember(&session.dialogue).await {
        warn!(error = ?e, "failed to update memory");
    }
    Ok(())
}

/// Appends to the dialogue, dropping the oldest entries beyond the bound.
pub(crate) fn push_dialogue(dialogue: &mut Vec<ChatMessage>, message: ChatMessage) {
    dialogue.push(message);
    let excess = dialogue.len().saturating_sub(MAX_DIALOGUE_MESSAGES);
    dialogue.drain(..excess);
}

fn build_prompt(
    system_prompt: &str,
    recalled: Option<&str>,
    dialogue: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];
    if let Some(recalled) = recalled {
        messages.push(ChatMessage::system(format!(
            "What you remember about this user:\n{recalled}"
        )));
    }
    let start = dialogue.len().saturating_sub(MAX_DIALOGUE_MESSAGES);
    messages.extend_from_slice(&dialogue[start..]);
    messages
}
