//! Handlers for the inbound message types.

mod abort;
mod hello;
mod listen;

pub use abort::AbortHandler;
pub use hello::HelloHandler;
pub use listen::ListenHandler;
