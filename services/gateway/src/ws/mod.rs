//! WebSocket Session Engine
//!
//! This module contains the per-connection logic of the gateway. It is
//! structured into submodules:
//!
//! - `protocol`: The JSON message format exchanged with the client.
//! - `session`: Connection lifecycle, the `Session` record and the session loop.
//! - `dispatch`: Routes inbound messages to the handler for their type.
//! - `handlers`: The `hello`, `listen` and `abort` handlers.
//! - `audio`: Inbound audio buffering and recognition dispatch.
//! - `chat`: One conversational turn, from recognized text to spoken reply.
//! - `wakeup`: The cached wake-word acknowledgement.
//! - `output`: FIRST/LAST reply framing.
//! - `tasks`: Supervision of fire-and-forget work tied to a connection.

pub mod audio;
pub mod chat;
pub mod dispatch;
pub mod handlers;
pub mod output;
pub mod protocol;
pub mod session;
pub mod tasks;
pub mod wakeup;

pub use session::ws_handler;
