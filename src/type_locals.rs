//! Type-local slots: the host's native per-type storage.
//!
//! Every `TypeDescriptor` carries a small slot table keyed by `LocalId`.
//! Values live inside the type itself, so they are dropped when the type is
//! unloaded. A side table remembers, per slot id, which types hold a value
//! (weakly), so `retire` can release a slot across all loaded types once
//! its cache is dropped.
//!
//! Lookups take a read lock on the one type's slots. On a miss the compute
//! hook runs with no lock held, then the result is offered with
//! insert-if-absent. Racing callers may therefore each compute a value;
//! the first one stored is kept and returned to all of them.
//!
//! With the `type-locals` feature the table is published as a
//! `NativeProvider`; caches only reach it through that registration.

use crate::abi::{ComputeOnMiss, ErasedValue, LocalId};
use crate::types::{TypeHandle, WeakTypeHandle};
use hashbrown::HashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

/// Occupant count below which recording never prunes unloaded types.
const PRUNE_FLOOR: usize = 32;

static OCCUPANTS: Lazy<Mutex<HashMap<LocalId, Occupants>>> = Lazy::new(Default::default);

/// Types holding a value under one slot id, keyed by descriptor address.
/// The weak handle pins the address, so keys are never reused while stored.
#[derive(Default)]
struct Occupants {
    types: HashMap<usize, WeakTypeHandle>,
    next_prune: usize,
}

impl Occupants {
    fn record(&mut self, ty: &TypeHandle) {
        if self.types.len() >= self.next_prune {
            self.types.retain(|_, w| w.is_loaded());
            self.next_prune = (self.types.len() * 2).max(PRUNE_FLOOR);
        }
        self.types.entry(ty.addr()).or_insert_with(|| ty.downgrade());
    }
}

#[derive(Default)]
pub(crate) struct TypeLocalSlots {
    slots: RwLock<HashMap<LocalId, ErasedValue>>,
}

impl TypeLocalSlots {
    pub(crate) fn lookup(&self, id: LocalId) -> Option<ErasedValue> {
        self.slots.read().get(&id).cloned()
    }

    /// Store `value` unless the slot is already filled; returns the value
    /// that ends up in the slot.
    pub(crate) fn insert_if_absent(&self, id: LocalId, value: ErasedValue) -> ErasedValue {
        self.slots.write().entry(id).or_insert(value).clone()
    }

    pub(crate) fn remove(&self, id: LocalId) -> Option<ErasedValue> {
        self.slots.write().remove(&id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.read().len()
    }
}

#[cfg_attr(not(feature = "type-locals"), allow(dead_code))]
pub(crate) fn allocate_local() -> LocalId {
    LocalId(NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed))
}

#[cfg_attr(not(feature = "type-locals"), allow(dead_code))]
pub(crate) fn get(ty: &TypeHandle, id: LocalId, hook: &dyn ComputeOnMiss) -> ErasedValue {
    if let Some(v) = ty.locals().lookup(id) {
        return v;
    }
    let computed = hook.compute_value(ty);
    let stored = ty.locals().insert_if_absent(id, computed);
    OCCUPANTS.lock().entry(id).or_default().record(ty);
    stored
}

#[cfg_attr(not(feature = "type-locals"), allow(dead_code))]
pub(crate) fn remove(ty: &TypeHandle, id: LocalId) -> bool {
    let removed = ty.locals().remove(id);
    if let Some(occupants) = OCCUPANTS.lock().get_mut(&id) {
        occupants.types.remove(&ty.addr());
    }
    removed.is_some()
}

/// Drop every value stored under `id`. The id must not be used afterwards.
#[cfg_attr(not(feature = "type-locals"), allow(dead_code))]
pub(crate) fn retire(id: LocalId) {
    let Some(occupants) = OCCUPANTS.lock().remove(&id) else {
        return;
    };
    // Values are dropped here, with no lock held.
    let released: Vec<ErasedValue> = occupants
        .types
        .into_values()
        .filter_map(|w| w.upgrade())
        .filter_map(|ty| ty.locals().remove(id))
        .collect();
    trace!(local = id.0, released = released.len(), "retired type-local slot");
}

#[cfg(test)]
fn occupant_count(id: LocalId) -> usize {
    OCCUPANTS.lock().get(&id).map_or(0, |o| o.types.len())
}

#[cfg(feature = "type-locals")]
fn available() -> bool {
    true
}

#[cfg(feature = "type-locals")]
inventory::submit! {
    crate::abi::NativeProvider {
        name: "type-locals",
        abi_version: crate::abi::NATIVE_ABI_VERSION,
        available,
        allocate_local: Some(allocate_local),
        get: Some(get),
        remove: Some(remove),
        retire: Some(retire),
    }
}
