//! Parley Gateway Library Crate
//!
//! This library contains all the logic of the voice gateway: configuration,
//! shared application state, the WebSocket session engine, transcript
//! reporting and routing. The `gateway` binary is a thin wrapper around it.

pub mod assets;
pub mod config;
pub mod report;
pub mod router;
pub mod state;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;
