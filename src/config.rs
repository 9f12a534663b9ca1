//! Cache configuration.
//!
//! `TYPE_CACHE_BACKEND` selects the backend for caches built from the
//! environment (`auto`, `fallback`, `native`; case-insensitive). The
//! capability probe also reads it: `fallback` makes the probe report the
//! native primitive as unsupported for the whole process.

use crate::error::ConfigError;
use crate::weak_store::DEFAULT_SWEEP_FLOOR;
use core::str::FromStr;

pub const BACKEND_ENV: &str = "TYPE_CACHE_BACKEND";

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum BackendPreference {
    /// Native when the probe finds a provider, fallback otherwise.
    #[default]
    Auto,
    Fallback,
    /// Native or an error; never silently falls back.
    Native,
}

impl FromStr for BackendPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(BackendPreference::Auto),
            "fallback" => Ok(BackendPreference::Fallback),
            "native" => Ok(BackendPreference::Native),
            _ => Err(ConfigError::InvalidBackend {
                var: BACKEND_ENV,
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheConfig {
    pub backend: BackendPreference,
    /// Fallback store size below which inserts never sweep unloaded entries.
    pub sweep_floor: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            sweep_floor: DEFAULT_SWEEP_FLOOR,
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by `TYPE_CACHE_BACKEND` when it is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup(BACKEND_ENV) {
            cfg.backend = raw.parse()?;
        }
        Ok(cfg)
    }
}
