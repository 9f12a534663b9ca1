//! The contract every cache backend implements.

use crate::types::TypeHandle;
use core::fmt;

/// Which backend a cache is bound to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BackendKind {
    /// Delegates to the host's type-local slots. Compute may run more than
    /// once per key under contention; one result is retained.
    Native,
    /// Weak-keyed map with a per-key critical section. Compute runs exactly
    /// once per key until it is removed.
    Fallback,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Native => "native",
            BackendKind::Fallback => "fallback",
        })
    }
}

/// Get-or-compute storage bound to one compute function.
pub trait Backend<V>: Send + Sync {
    fn get_or_compute(&self, ty: &TypeHandle) -> V;

    /// Forget the value for `ty`. Missing keys are a no-op.
    fn remove(&self, ty: &TypeHandle);

    fn kind(&self) -> BackendKind;

    /// Reclaim storage held for unloaded types; returns how many entries
    /// were released. Backends whose storage dies with the type report 0.
    fn purge_unloaded(&self) -> usize {
        0
    }
}
