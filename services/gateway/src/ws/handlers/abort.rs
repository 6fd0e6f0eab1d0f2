use crate::{
    state::AppState,
    ws::{
        dispatch::MessageHandler,
        output,
        protocol::{ClientMessage, MessageType},
        session::Session,
    },
};
use async_trait::async_trait;
use tracing::{info, instrument};

/// The client interrupted playback.
pub struct AbortHandler;

#[async_trait]
impl MessageHandler for AbortHandler {
    fn message_type(&self) -> MessageType {
        MessageType::Abort
    }

    #[instrument(name = "abort", skip_all)]
    async fn handle(
        &self,
        _state: &AppState,
        session: &mut Session,
        _message: &ClientMessage,
    ) -> anyhow::Result<()> {
        info!(was_speaking = session.is_speaking, "client aborted playback");
        output::send_stop(session).await
    }
}
