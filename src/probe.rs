//! Capability probe: does this process offer a native type-local provider?
//!
//! Runs once, on first use, and the outcome is kept for the life of the
//! process. The probe looks for registered `NativeProvider`s and asks each
//! one whether it is available; it never checks versions of anything.
//! Absence is an ordinary outcome. A provider whose availability check
//! panics, or an environment that forces the fallback, also yields
//! "unsupported". The probe itself never fails.

use crate::abi::{self, NativeProvider};
use crate::config::{BackendPreference, BACKEND_ENV};
use core::fmt;
use once_cell::sync::Lazy;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

/// Why the native primitive is not used.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Unsupported {
    NoProvider,
    ForcedByEnvironment,
    ProbeFailed,
}

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Unsupported::NoProvider => "no type-local provider is registered",
            Unsupported::ForcedByEnvironment => "fallback forced by TYPE_CACHE_BACKEND",
            Unsupported::ProbeFailed => "provider availability check failed",
        })
    }
}

/// Probe result as reported to callers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NativeSupport {
    Supported { provider: &'static str },
    Unsupported(Unsupported),
}

impl NativeSupport {
    pub fn is_supported(&self) -> bool {
        matches!(self, NativeSupport::Supported { .. })
    }
}

#[derive(Copy, Clone)]
pub(crate) enum ProbeOutcome {
    Native(&'static NativeProvider),
    Unsupported(Unsupported),
}

impl ProbeOutcome {
    pub(crate) fn support(&self) -> NativeSupport {
        match self {
            ProbeOutcome::Native(p) => NativeSupport::Supported { provider: p.name },
            ProbeOutcome::Unsupported(reason) => NativeSupport::Unsupported(*reason),
        }
    }
}

static PROBE: Lazy<ProbeOutcome> = Lazy::new(|| {
    let forced = forces_fallback(std::env::var(BACKEND_ENV).ok().as_deref());
    let outcome = probe_providers(abi::registered_providers(), forced);
    match outcome.support() {
        NativeSupport::Supported { provider } => {
            info!(provider, "native type-local storage available")
        }
        NativeSupport::Unsupported(reason) => {
            info!(%reason, "native type-local storage unavailable; using fallback map")
        }
    }
    outcome
});

/// The process-wide probe result.
pub fn native_support() -> NativeSupport {
    PROBE.support()
}

pub(crate) fn outcome() -> &'static ProbeOutcome {
    &PROBE
}

/// Whether a raw `TYPE_CACHE_BACKEND` value forces the fallback. Invalid
/// values are logged and ignored here; `CacheConfig::from_env` rejects them.
pub(crate) fn forces_fallback(raw: Option<&str>) -> bool {
    match raw.map(str::parse::<BackendPreference>) {
        Some(Ok(pref)) => pref == BackendPreference::Fallback,
        Some(Err(e)) => {
            warn!(error = %e, "ignoring invalid backend override during probe");
            false
        }
        None => false,
    }
}

/// Pick the first available provider. Panics raised by a provider's
/// availability check are caught and downgrade the result.
pub(crate) fn probe_providers<I>(providers: I, forced_fallback: bool) -> ProbeOutcome
where
    I: IntoIterator<Item = &'static NativeProvider>,
{
    if forced_fallback {
        return ProbeOutcome::Unsupported(Unsupported::ForcedByEnvironment);
    }
    for provider in providers {
        debug!(provider = provider.name, "probing type-local provider");
        match panic::catch_unwind(AssertUnwindSafe(|| (provider.available)())) {
            Ok(true) => return ProbeOutcome::Native(provider),
            Ok(false) => continue,
            Err(_) => {
                warn!(
                    provider = provider.name,
                    "availability check panicked; treating native storage as unsupported"
                );
                return ProbeOutcome::Unsupported(Unsupported::ProbeFailed);
            }
        }
    }
    ProbeOutcome::Unsupported(Unsupported::NoProvider)
}
