//! Parley Core
//!
//! Backend-facing building blocks of the conversation gateway: the capability
//! traits every speech/AI backend is consumed through, the registry that
//! resolves configured implementation names into instances, wake word
//! normalization, and the built-in implementations.

pub mod builtin;
pub mod provider;
pub mod registry;
pub mod wake;

pub use provider::{AudioFrame, InterfaceMode, Recognizer};
pub use registry::{
    ProviderHandle, ProviderKind, ProviderRegistry, RegistryError, UnsupportedProviderError,
};
pub use wake::WakeWordSet;
