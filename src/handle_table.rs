//! HandleTable: structural layer keyed by weak type identity.
//!
//! Entries live in a `SlotMap` and are indexed by a `HashTable` of slot
//! keys. Each entry stores the hash computed at insertion; every rehash and
//! removal uses that stored hash, never the key, because a key whose type
//! has been unloaded can no longer be upgraded.
//!
//! Identity matching compares addresses. An entry's weak key pins the
//! descriptor allocation, so a live `TypeHandle` with the same address is
//! the same type, and a match always denotes a loaded key.
//!
//! Single-threaded: callers provide synchronization.

use crate::types::{TypeHandle, WeakTypeHandle};
use core::hash::BuildHasher;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(DefaultKey);

impl Handle {
    fn new(k: DefaultKey) -> Self {
        Handle(k)
    }
    fn raw_handle(&self) -> DefaultKey {
        self.0
    }
}

#[derive(Debug)]
struct Entry<V> {
    key: WeakTypeHandle,
    value: V,
    hash: u64,
}

pub struct HandleTable<V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<V>>,
}

#[derive(Debug, Eq, PartialEq)]
pub enum InsertError {
    DuplicateKey,
}

impl<V> HandleTable<V> {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<V> Default for HandleTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S> HandleTable<V, S>
where
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::new(),
            slots: SlotMap::with_key(),
        }
    }

    fn make_hash(&self, ty: &TypeHandle) -> u64 {
        self.hasher.hash_one(ty.addr())
    }

    /// Physically stored entries, including ones whose type has unloaded
    /// but which have not been swept yet.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn find(&self, ty: &TypeHandle) -> Option<Handle> {
        let hash = self.make_hash(ty);
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|e| e.key.refers_to(ty))
                    .unwrap_or(false)
            })
            .map(|&k| Handle::new(k))
    }

    pub fn value(&self, h: Handle) -> Option<&V> {
        self.slots.get(h.raw_handle()).map(|e| &e.value)
    }

    pub fn insert(&mut self, ty: &TypeHandle, value: V) -> Result<Handle, InsertError> {
        let hash = self.make_hash(ty);
        match self.index.entry(
            hash,
            |&kk| {
                self.slots
                    .get(kk)
                    .map(|e| e.key.refers_to(ty))
                    .unwrap_or(false)
            },
            |&kk| self.slots.get(kk).map(|e| e.hash).unwrap_or(0),
        ) {
            hashbrown::hash_table::Entry::Occupied(_) => Err(InsertError::DuplicateKey),
            hashbrown::hash_table::Entry::Vacant(v) => {
                let k = self.slots.insert(Entry {
                    key: ty.downgrade(),
                    value,
                    hash,
                });
                let _ = v.insert(k);
                Ok(Handle::new(k))
            }
        }
    }

    /// Unlink an entry and hand back its parts. The table is consistent
    /// again before the caller drops them.
    pub fn remove(&mut self, handle: Handle) -> Option<(WeakTypeHandle, V)> {
        let k = handle.raw_handle();
        let entry = self.slots.remove(k)?;
        if let Ok(occupied) = self.index.find_entry(entry.hash, |&kk| kk == k) {
            occupied.remove();
        }
        Some((entry.key, entry.value))
    }

    /// Unlink every entry whose type has unloaded and return their values.
    pub fn drain_unloaded(&mut self) -> Vec<V> {
        let dead: Vec<DefaultKey> = self
            .slots
            .iter()
            .filter(|(_, e)| !e.key.is_loaded())
            .map(|(k, _)| k)
            .collect();
        dead.into_iter()
            .filter_map(|k| self.remove(Handle::new(k)))
            .map(|(_key, value)| value)
            .collect()
    }

    /// Iterate entries whose type is still loaded.
    pub fn iter_loaded(&self) -> impl Iterator<Item = (TypeHandle, &V)> + '_ {
        self.slots
            .values()
            .filter_map(|e| e.key.upgrade().map(|ty| (ty, &e.value)))
    }
}
