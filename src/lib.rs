//! type-cache: a lazily computed value per runtime type, held weakly so the
//! cache never keeps a type loaded.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one memoized value per `TypeHandle`, with storage that goes away
//!   when the type is unloaded, on hosts with or without native per-type
//!   storage.
//! - Layers:
//!   - HandleTable<V>: structural map keyed by weak type identity; returns
//!     stable handles and stores each entry's hash so dead keys can be
//!     rehashed and unlinked without upgrading them.
//!   - WeakEntryStore<E>: wraps HandleTable in a `RwLock`; `get`,
//!     `put_if_absent`, `remove`, plus opportunistic sweeps of unloaded
//!     entries.
//!   - FallbackBackend: get-or-compute over the store with one `OnceCell`
//!     per key as that key's critical section.
//!   - probe / adapter: discover a `NativeProvider` at runtime, validate its
//!     function table once, and instantiate `NativeAdapter`s that delegate
//!     to the host's type-local slots.
//!   - TypeCache<V>: public facade; picks one backend at construction.
//!
//! Constraints
//! - Thread-safe: `TypeCache<V>` is `Send + Sync`; any thread may look up
//!   any key.
//! - Per-key blocking only: the fallback never holds a lock shared across
//!   keys while a compute function runs.
//! - Keys are held weakly. The fallback treats unloaded keys as absent
//!   at once and frees their storage on a later sweep. The native backend
//!   stores values inside the type, so they are freed with it.
//! - Backend choice is fixed per cache; the probe result and the adapter
//!   binding are fixed per process.
//!
//! Race policy
//! - Fallback: the compute function runs exactly once per key between
//!   removals. Racing callers block on the key's cell and share its value.
//! - Native: the compute function may run several times for one key under
//!   contention; the host keeps the first stored value and all callers
//!   receive it. Compute functions must tolerate being repeated.
//!
//! Failure policy
//! - No provider, a provider reporting unavailable, a panicking
//!   availability check, or `TYPE_CACHE_BACKEND=fallback`: the probe says
//!   unsupported and caches use the fallback.
//! - A provider that was found but cannot be bound (ABI mismatch, missing
//!   hook, panicking slot allocation) is a configuration error surfaced by
//!   `TypeCache::try_new`, and a panic from `TypeCache::new`.
//! - A panicking compute function propagates to the caller and stores
//!   nothing; the next lookup retries.
//! - A compute function that looks up its own key on the same cache panics
//!   in debug builds instead of deadlocking.
//!
//! Notes and non-goals
//! - Not a general cache: keys are type handles only. No eviction, no size
//!   bound, no persistence.
//! - A value that strongly references its own type keeps the type loaded
//!   on either backend: the entry is only reclaimed once its type unloads.
//!   Hold such back-references weakly.
//! - Dropping a cache releases its values on either backend. A native
//!   adapter retires its slot id, and the provider clears that slot from
//!   every type still loaded.

mod abi;
mod adapter;
mod backend;
mod cache;
mod config;
mod error;
mod fallback;
mod handle_table;
#[cfg(test)]
mod handle_table_proptest;
pub mod probe;
mod reentrancy;
mod type_locals;
mod types;
pub mod weak_store;

// Public surface
pub use abi::{ComputeOnMiss, ErasedValue, LocalId, NativeProvider, NATIVE_ABI_VERSION};
pub use backend::BackendKind;
pub use cache::{TypeCache, TypeCacheBuilder};
pub use config::{BackendPreference, CacheConfig, BACKEND_ENV};
pub use error::{CacheError, ConfigError, SynthesisError};
pub use probe::{native_support, NativeSupport, Unsupported};
pub use types::{TypeDescriptor, TypeHandle, WeakTypeHandle};
pub use weak_store::WeakEntryStore;
