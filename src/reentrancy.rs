//! Debug-only detection of recursive computation.
//!
//! A compute function that asks its own cache for the key it is computing
//! would block forever on the fallback's per-key cell, or recurse without
//! bound on the native path. In debug builds each cache marks the
//! `(cache, type)` pairs the current thread is computing, and a nested
//! entry for a marked pair panics with the type's name. In release builds
//! this compiles to a zero-cost no-op.

#[cfg(debug_assertions)]
use core::cell::RefCell;
use core::marker::PhantomData;
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::types::TypeHandle;

#[cfg(debug_assertions)]
static NEXT_OWNER: AtomicUsize = AtomicUsize::new(1);

#[cfg(debug_assertions)]
thread_local! {
    static ACTIVE: RefCell<Vec<(usize, usize)>> = const { RefCell::new(Vec::new()) };
}

/// Per-cache tracker. Embed it in a backend and guard the compute path with
/// `let _g = self.reentrancy.enter(ty);`.
#[derive(Debug)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    owner: usize,
}

impl DebugReentrancy {
    pub fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Mark `ty` as being computed on this thread. In debug builds, panics
    /// if it already is.
    #[inline]
    pub fn enter(&self, ty: &TypeHandle) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            let mark = (self.owner, ty.addr());
            ACTIVE.with(|active| {
                let mut active = active.borrow_mut();
                assert!(
                    !active.contains(&mark),
                    "reentrancy detected: recursive computation for type `{}`",
                    ty
                );
                active.push(mark);
            });
            ReentrancyGuard {
                mark,
                _lt: PhantomData,
            }
        }

        #[cfg(not(debug_assertions))]
        {
            let _ = ty;
            ReentrancyGuard { _lt: PhantomData }
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `DebugReentrancy::enter`.
pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    mark: (usize, usize),
    _lt: PhantomData<&'a ()>,
}

impl<'a> Drop for ReentrancyGuard<'a> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            let mark = self.mark;
            // try_with: the guard may be dropped during thread teardown.
            let _ = ACTIVE.try_with(|active| {
                let mut active = active.borrow_mut();
                if let Some(pos) = active.iter().rposition(|m| *m == mark) {
                    active.swap_remove(pos);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DebugReentrancy;
    use crate::types::TypeHandle;

    #[test]
    fn enter_and_exit_is_ok() {
        let r = DebugReentrancy::new();
        let ty = TypeHandle::load("T");
        {
            let _g = r.enter(&ty);
        }
        let _g = r.enter(&ty);
    }

    /// Invariant: distinct types, or the same type on distinct caches, nest freely.
    #[test]
    fn nesting_other_keys_is_ok() {
        let r1 = DebugReentrancy::new();
        let r2 = DebugReentrancy::new();
        let a = TypeHandle::load("A");
        let b = TypeHandle::load("B");
        let _g1 = r1.enter(&a);
        let _g2 = r1.enter(&b);
        let _g3 = r2.enter(&a);
    }

    #[cfg(debug_assertions)]
    #[test]
    fn reentrancy_panics_in_debug() {
        let r = DebugReentrancy::new();
        let ty = TypeHandle::load("Loop");
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g1 = r.enter(&ty);
            let _g2 = r.enter(&ty);
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
        // The unwound guard released its mark.
        let _g = r.enter(&ty);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn reentrancy_noop_in_release() {
        let r = DebugReentrancy::new();
        let ty = TypeHandle::load("Loop");
        let _g1 = r.enter(&ty);
        let _g2 = r.enter(&ty);
    }
}
