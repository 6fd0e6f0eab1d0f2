//! Routes inbound JSON messages to their handlers.

use super::{
    handlers::{AbortHandler, HelloHandler, ListenHandler},
    protocol::{ClientMessage, MessageType},
    session::Session,
};
use crate::state::AppState;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no handler for message type `{0}`")]
    UnknownMessageType(String),
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One handler per message type.
///
/// Errors returned from `handle` never reach the connection; the dispatcher
/// logs them and moves on to the next message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    fn message_type(&self) -> MessageType;

    async fn handle(
        &self,
        state: &AppState,
        session: &mut Session,
        message: &ClientMessage,
    ) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<MessageType, Arc<dyn MessageHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_handlers() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(Arc::new(HelloHandler));
        dispatcher.register(Arc::new(ListenHandler));
        dispatcher.register(Arc::new(AbortHandler));
        dispatcher
    }

    /// Registers a handler, replacing any previous one for the same type.
    pub fn register(&mut self, handler: Arc<dyn MessageHandler>) {
        self.handlers.insert(handler.message_type(), handler);
    }

    /// Parses a text frame and dispatches it. Never fails; problems are logged.
    pub async fn dispatch_text(&self, state: &AppState, session: &mut Session, raw: &str) {
        let result = match serde_json::from_str::<ClientMessage>(raw) {
            Ok(message) => self.dispatch(state, session, &message).await,
            Err(e) => Err(DispatchError::from(e)),
        };
        if let Err(e) = result {
            warn!(error = %e, "dropping inbound message");
        }
    }

    /// Runs the handler registered for `message.kind`.
    ///
    /// Only an unknown type is reported to the caller. Handler errors and
    /// panics are contained here.
    pub async fn dispatch(
        &self,
        state: &AppState,
        session: &mut Session,
        message: &ClientMessage,
    ) -> Result<(), DispatchError> {
        let handler = MessageType::parse(&message.kind)
            .and_then(|kind| self.handlers.get(&kind))
            .ok_or_else(|| DispatchError::UnknownMessageType(message.kind.clone()))?;

        match AssertUnwindSafe(handler.handle(state, session, message))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(message_type = %message.kind, error = ?e, "message handler failed");
            }
            Err(_) => {
                error!(message_type = %message.kind, "message handler panicked");
            }
        }
        Ok(())
    }
}
