//! Contract between caches and a native type-local provider.
//!
//! Caches never name a provider implementation. A host that offers
//! per-type storage publishes a `NativeProvider` function table with
//! `inventory::submit!`; the capability probe discovers it at runtime and
//! the adapter synthesizer binds to whatever table it finds. A binary
//! linked without any provider simply has no submissions.

use crate::types::TypeHandle;
use std::any::Any;
use std::sync::Arc;

/// Version of the function-table layout below. Bumped on any change to
/// `NativeProvider` or `ComputeOnMiss`.
pub const NATIVE_ABI_VERSION: u32 = 1;

/// Value stored in a native slot. Each slot id is owned by one cache, so
/// the concrete type behind the `Any` is fixed per id.
pub type ErasedValue = Arc<dyn Any + Send + Sync>;

/// Identifies one cache's slot across all types.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u64);

/// Compute-on-miss hook. The provider calls it when a type has no value in
/// the requested slot. It may be called concurrently, and more than once
/// for the same type; the provider keeps the first value stored.
pub trait ComputeOnMiss {
    fn compute_value(&self, ty: &TypeHandle) -> ErasedValue;
}

/// Function table published by a native provider.
///
/// Hooks are optional so that an incomplete table is detected while
/// binding instead of at the first lookup.
pub struct NativeProvider {
    pub name: &'static str,
    pub abi_version: u32,
    /// Runtime availability check. Absence is `false`, never a panic.
    pub available: fn() -> bool,
    pub allocate_local: Option<fn() -> LocalId>,
    pub get: Option<fn(&TypeHandle, LocalId, &dyn ComputeOnMiss) -> ErasedValue>,
    pub remove: Option<fn(&TypeHandle, LocalId) -> bool>,
    /// Release every value stored under a slot id that will never be used
    /// again, in every type that is still loaded.
    pub retire: Option<fn(LocalId)>,
}

inventory::collect!(NativeProvider);

/// Iterate every provider linked into this binary.
pub(crate) fn registered_providers() -> impl Iterator<Item = &'static NativeProvider> {
    inventory::iter::<NativeProvider>.into_iter()
}
