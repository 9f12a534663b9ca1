//! Errors raised while building a cache.
//!
//! Lookups never fail: a panicking compute function propagates its panic
//! and leaves nothing stored. Only construction returns errors.

use crate::probe::Unsupported;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("native backend requested but unavailable: {0}")]
    NativeUnavailable(Unsupported),
    #[error("failed to bind native backend: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The probe found a provider but the adapter could not be bound to it.
/// This is an inconsistency between the provider and this crate, never an
/// ordinary absence, and is not downgraded to the fallback.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SynthesisError {
    #[error("provider `{provider}` speaks ABI v{found}, expected v{expected}")]
    AbiMismatch {
        provider: &'static str,
        expected: u32,
        found: u32,
    },
    #[error("provider `{provider}` does not supply the `{hook}` hook")]
    MissingHook {
        provider: &'static str,
        hook: &'static str,
    },
    #[error("provider `{provider}` panicked while allocating a slot")]
    ProviderPanicked { provider: &'static str },
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {var}: expected auto, fallback or native")]
    InvalidBackend { var: &'static str, value: String },
}
