//! WeakEntryStore: concurrent map from type identity to an entry, holding
//! the key weakly.
//!
//! A `HandleTable` behind a `parking_lot::RwLock`. Reads share the lock;
//! `put_if_absent` and `remove` take it exclusively for a short,
//! allocation-only critical section. The lock is never held while user
//! code runs: values unlinked by a removal or a sweep are dropped after
//! the guard is released, so their `Drop` may re-enter the store.
//!
//! Entries whose type has unloaded are invisible to `get` immediately and
//! are reclaimed opportunistically: an insert sweeps the table once it has
//! grown to twice the size it had after the previous sweep (and at least
//! `sweep_floor`). `purge_unloaded` sweeps on demand.

use crate::handle_table::{HandleTable, InsertError};
use crate::types::TypeHandle;
use parking_lot::RwLock;
use tracing::trace;

/// Table size below which inserts never trigger a sweep.
pub const DEFAULT_SWEEP_FLOOR: usize = 64;

struct State<E> {
    table: HandleTable<E>,
    next_sweep: usize,
}

pub struct WeakEntryStore<E> {
    state: RwLock<State<E>>,
    sweep_floor: usize,
}

impl<E: Clone> WeakEntryStore<E> {
    pub fn new() -> Self {
        Self::with_sweep_floor(DEFAULT_SWEEP_FLOOR)
    }

    pub fn with_sweep_floor(sweep_floor: usize) -> Self {
        let sweep_floor = sweep_floor.max(1);
        Self {
            state: RwLock::new(State {
                table: HandleTable::new(),
                next_sweep: sweep_floor,
            }),
            sweep_floor,
        }
    }

    /// Entry for `ty`, if one is stored. `ty` is live by construction, so a
    /// hit is always a live entry.
    pub fn get(&self, ty: &TypeHandle) -> Option<E> {
        let st = self.state.read();
        st.table.find(ty).and_then(|h| st.table.value(h)).cloned()
    }

    /// Store `entry` unless `ty` already has one; returns whichever entry is
    /// stored afterwards.
    pub fn put_if_absent(&self, ty: &TypeHandle, entry: E) -> E {
        let reclaimed;
        let stored = {
            let mut guard = self.state.write();
            let st = &mut *guard;
            if let Some(existing) = st.table.find(ty).and_then(|h| st.table.value(h)) {
                return existing.clone();
            }
            reclaimed = if st.table.len() >= st.next_sweep {
                let dead = st.table.drain_unloaded();
                st.next_sweep = (st.table.len() * 2).max(self.sweep_floor);
                dead
            } else {
                Vec::new()
            };
            match st.table.insert(ty, entry.clone()) {
                Ok(_) => entry,
                // Unreachable under the write lock; keep whatever is stored.
                Err(InsertError::DuplicateKey) => st
                    .table
                    .find(ty)
                    .and_then(|h| st.table.value(h))
                    .cloned()
                    .unwrap_or(entry),
            }
        };
        if !reclaimed.is_empty() {
            trace!(reclaimed = reclaimed.len(), "swept entries of unloaded types");
        }
        drop(reclaimed);
        stored
    }

    /// Delete the entry for `ty`. Missing keys are a no-op.
    pub fn remove(&self, ty: &TypeHandle) -> Option<E> {
        let removed = {
            let mut st = self.state.write();
            st.table.find(ty).and_then(|h| st.table.remove(h))
        };
        removed.map(|(_key, entry)| entry)
    }

    /// Reclaim every entry whose type has unloaded; returns how many.
    pub fn purge_unloaded(&self) -> usize {
        let reclaimed = {
            let mut guard = self.state.write();
            let st = &mut *guard;
            let dead = st.table.drain_unloaded();
            st.next_sweep = (st.table.len() * 2).max(self.sweep_floor);
            dead
        };
        let n = reclaimed.len();
        drop(reclaimed);
        if n > 0 {
            trace!(reclaimed = n, "purged entries of unloaded types");
        }
        n
    }

    /// Physically stored entries, including unloaded ones not yet swept.
    pub fn len(&self) -> usize {
        self.state.read().table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().table.is_empty()
    }

    /// Keys of entries whose type is still loaded.
    pub fn loaded_keys(&self) -> Vec<TypeHandle> {
        self.state
            .read()
            .table
            .iter_loaded()
            .map(|(ty, _)| ty)
            .collect()
    }
}

impl<E: Clone> Default for WeakEntryStore<E> {
    fn default() -> Self {
        Self::new()
    }
}
