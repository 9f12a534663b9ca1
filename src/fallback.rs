//! Fallback backend: get-or-compute over a `WeakEntryStore`.
//!
//! Each key maps to a shared `OnceCell` that acts as the key's critical
//! section. The first caller to install a cell for a key runs the compute
//! function inside `get_or_init`; every other caller for the same key
//! blocks on that cell only, and callers on other keys never wait. A panic
//! in the compute function leaves the cell empty, and the next caller
//! retries from scratch.
//!
//! A caller that raced a concurrent `remove` may finish computing into a
//! cell that is no longer stored. It returns that value; the next lookup
//! computes afresh.

use crate::backend::{Backend, BackendKind};
use crate::reentrancy::DebugReentrancy;
use crate::types::TypeHandle;
use crate::weak_store::WeakEntryStore;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::trace;

type EntryCell<V> = Arc<OnceCell<V>>;

pub struct FallbackBackend<V, F> {
    store: WeakEntryStore<EntryCell<V>>,
    compute: F,
    reentrancy: DebugReentrancy,
}

impl<V, F> FallbackBackend<V, F>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(&TypeHandle) -> V + Send + Sync + 'static,
{
    pub fn new(compute: F, sweep_floor: usize) -> Self {
        Self {
            store: WeakEntryStore::with_sweep_floor(sweep_floor),
            compute,
            reentrancy: DebugReentrancy::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn store_len(&self) -> usize {
        self.store.len()
    }
}

impl<V, F> Backend<V> for FallbackBackend<V, F>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(&TypeHandle) -> V + Send + Sync + 'static,
{
    fn get_or_compute(&self, ty: &TypeHandle) -> V {
        if let Some(v) = self.store.get(ty).and_then(|cell| cell.get().cloned()) {
            return v;
        }
        let cell = self.store.put_if_absent(ty, Arc::new(OnceCell::new()));
        // Must precede get_or_init: a nested call for the same key would
        // otherwise block on this thread's own cell.
        let _g = self.reentrancy.enter(ty);
        cell.get_or_init(|| {
            trace!(ty = %ty, "computing fallback value");
            (self.compute)(ty)
        })
        .clone()
    }

    fn remove(&self, ty: &TypeHandle) {
        if self.store.remove(ty).is_some() {
            trace!(ty = %ty, "removed fallback entry");
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }

    fn purge_unloaded(&self) -> usize {
        self.store.purge_unloaded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Arc<AtomicUsize>, impl Fn(&TypeHandle) -> Arc<String> + Send + Sync + 'static) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        (calls, move |ty: &TypeHandle| {
            c.fetch_add(1, Ordering::SeqCst);
            Arc::new(ty.to_string())
        })
    }

    /// Invariant: a stored value is returned without recomputation.
    #[test]
    fn hit_does_not_recompute() {
        let (calls, f) = counting();
        let b = FallbackBackend::new(f, 8);
        let ty = TypeHandle::load("TypeA");
        let v1 = b.get_or_compute(&ty);
        let v2 = b.get_or_compute(&ty);
        assert_eq!(*v1, "TypeA");
        assert!(Arc::ptr_eq(&v1, &v2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.store_len(), 1);
    }

    /// Invariant: a panicking compute stores nothing and the next call retries.
    #[test]
    fn panic_leaves_key_retryable() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = attempts.clone();
        let b = FallbackBackend::new(
            move |ty: &TypeHandle| {
                if a.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first attempt fails");
                }
                ty.to_string()
            },
            8,
        );
        let ty = TypeHandle::load("Flaky");
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| b.get_or_compute(&ty)));
        assert!(res.is_err());
        assert_eq!(b.get_or_compute(&ty), "Flaky");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    /// Invariant: after remove, the next lookup recomputes.
    #[test]
    fn remove_forces_recompute() {
        let (calls, f) = counting();
        let b = FallbackBackend::new(f, 8);
        let ty = TypeHandle::load("T");
        let v1 = b.get_or_compute(&ty);
        b.remove(&ty);
        b.remove(&ty);
        let v2 = b.get_or_compute(&ty);
        assert_eq!(v1, v2);
        assert!(!Arc::ptr_eq(&v1, &v2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    /// Invariant: entries of unloaded types are reclaimed by a purge and
    /// their values dropped.
    #[test]
    fn purge_drops_values_of_unloaded_types() {
        let (_calls, f) = counting();
        let b = FallbackBackend::new(f, 8);
        let ty = TypeHandle::load("Short");
        let witness = Arc::downgrade(&b.get_or_compute(&ty));
        drop(ty);
        assert!(witness.upgrade().is_some());
        assert_eq!(b.purge_unloaded(), 1);
        assert!(witness.upgrade().is_none());
        assert_eq!(b.store_len(), 0);
    }

    /// Invariant (debug-only): a compute function asking for its own key
    /// panics instead of deadlocking.
    #[cfg(debug_assertions)]
    #[test]
    fn recursive_compute_panics_in_debug() {
        static SELF_REF: OnceCell<FallbackBackend<String, fn(&TypeHandle) -> String>> =
            OnceCell::new();
        fn looping(ty: &TypeHandle) -> String {
            match SELF_REF.get() {
                Some(b) => b.get_or_compute(ty),
                None => String::new(),
            }
        }
        let b = SELF_REF.get_or_init(|| FallbackBackend::new(looping as fn(&TypeHandle) -> String, 8));
        let ty = TypeHandle::load("Loop");
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| b.get_or_compute(&ty)));
        assert!(res.is_err(), "expected recursive compute to panic");
    }
}
