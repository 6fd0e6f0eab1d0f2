use crate::{
    state::AppState,
    ws::{
        dispatch::MessageHandler,
        protocol::{ClientMessage, MessageType, ServerMessage},
        session::Session,
    },
};
use async_trait::async_trait;
use tracing::{info, instrument};

const TRANSPORT: &str = "websocket";

/// Answers the client's handshake with the session id.
pub struct HelloHandler;

#[async_trait]
impl MessageHandler for HelloHandler {
    fn message_type(&self) -> MessageType {
        MessageType::Hello
    }

    #[instrument(name = "hello", skip_all)]
    async fn handle(
        &self,
        _state: &AppState,
        session: &mut Session,
        message: &ClientMessage,
    ) -> anyhow::Result<()> {
        let audio_params = message.extra.get("audio_params").cloned();
        info!(?audio_params, "client hello");
        session
            .outbox
            .send(ServerMessage::Hello {
                session_id: session.id,
                transport: TRANSPORT.to_string(),
                audio_params,
            })
            .await
    }
}
