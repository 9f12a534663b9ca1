//! Adapter synthesizer: binds caches to a discovered native provider.
//!
//! The provider's function table is validated once per process and turned
//! into an `AdapterBinding`. Every native-backed cache then gets its own
//! `NativeAdapter`: a fresh slot id, the shared binding, and the client's
//! compute function in a single field. The adapter is the provider's
//! `ComputeOnMiss` hook; its implementation only forwards to that field.
//!
//! Race policy. The provider runs the hook without holding any lock, so
//! concurrent first lookups of one type may each run the compute function.
//! The provider keeps the first value stored and every racer receives that
//! retained value. This is weaker than the fallback's exactly-once
//! guarantee, and compute functions used with this backend must tolerate
//! repeated calls that produce equivalent results.

use crate::abi::{ComputeOnMiss, ErasedValue, LocalId, NativeProvider, NATIVE_ABI_VERSION};
use crate::backend::{Backend, BackendKind};
use crate::error::SynthesisError;
use crate::reentrancy::DebugReentrancy;
use crate::types::TypeHandle;
use core::fmt;
use core::marker::PhantomData;
use once_cell::sync::OnceCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, trace};

type GetFn = fn(&TypeHandle, LocalId, &dyn ComputeOnMiss) -> ErasedValue;
type RemoveFn = fn(&TypeHandle, LocalId) -> bool;

/// Validated function table of one provider.
pub(crate) struct AdapterBinding {
    provider: &'static str,
    allocate_local: fn() -> LocalId,
    get: GetFn,
    remove: RemoveFn,
    retire: fn(LocalId),
}

static BINDING: OnceCell<Result<AdapterBinding, SynthesisError>> = OnceCell::new();

/// The process-wide binding, built on first call from `provider`.
///
/// Only the probe's provider is ever passed in, so the first call decides
/// the binding for the whole process.
pub(crate) fn binding(
    provider: &'static NativeProvider,
) -> Result<&'static AdapterBinding, SynthesisError> {
    BINDING
        .get_or_init(|| synthesize(provider))
        .as_ref()
        .map_err(Clone::clone)
}

pub(crate) fn synthesize(provider: &'static NativeProvider) -> Result<AdapterBinding, SynthesisError> {
    if provider.abi_version != NATIVE_ABI_VERSION {
        return Err(SynthesisError::AbiMismatch {
            provider: provider.name,
            expected: NATIVE_ABI_VERSION,
            found: provider.abi_version,
        });
    }
    let missing = |hook| SynthesisError::MissingHook {
        provider: provider.name,
        hook,
    };
    let binding = AdapterBinding {
        provider: provider.name,
        allocate_local: provider.allocate_local.ok_or_else(|| missing("allocate_local"))?,
        get: provider.get.ok_or_else(|| missing("get"))?,
        remove: provider.remove.ok_or_else(|| missing("remove"))?,
        retire: provider.retire.ok_or_else(|| missing("retire"))?,
    };
    debug!(provider = binding.provider, "bound native type-local adapter");
    Ok(binding)
}

impl fmt::Debug for AdapterBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterBinding")
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl AdapterBinding {
    /// Instantiate an adapter with its own slot id.
    pub(crate) fn instantiate<V, F>(&'static self, compute: F) -> Result<NativeAdapter<V, F>, SynthesisError>
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&TypeHandle) -> V + Send + Sync + 'static,
    {
        let local = panic::catch_unwind(AssertUnwindSafe(|| (self.allocate_local)())).map_err(|_| {
            SynthesisError::ProviderPanicked {
                provider: self.provider,
            }
        })?;
        debug!(provider = self.provider, local = local.0, "allocated type-local slot");
        Ok(NativeAdapter {
            binding: self,
            local,
            compute,
            reentrancy: DebugReentrancy::new(),
            _value: PhantomData,
        })
    }
}

pub struct NativeAdapter<V, F> {
    binding: &'static AdapterBinding,
    local: LocalId,
    compute: F,
    reentrancy: DebugReentrancy,
    _value: PhantomData<fn() -> V>,
}

// The slot id dies with the adapter; the provider releases its values in
// every type still loaded.
impl<V, F> Drop for NativeAdapter<V, F> {
    fn drop(&mut self) {
        trace!(local = self.local.0, "retiring type-local slot");
        (self.binding.retire)(self.local);
    }
}

impl<V, F> ComputeOnMiss for NativeAdapter<V, F>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(&TypeHandle) -> V + Send + Sync + 'static,
{
    fn compute_value(&self, ty: &TypeHandle) -> ErasedValue {
        let _g = self.reentrancy.enter(ty);
        trace!(ty = %ty, local = self.local.0, "computing type-local value");
        Arc::new((self.compute)(ty))
    }
}

impl<V, F> Backend<V> for NativeAdapter<V, F>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(&TypeHandle) -> V + Send + Sync + 'static,
{
    fn get_or_compute(&self, ty: &TypeHandle) -> V {
        let erased = (self.binding.get)(ty, self.local, self);
        match erased.downcast_ref::<V>() {
            Some(v) => v.clone(),
            // Slot ids are never shared between caches.
            None => panic!(
                "type-local slot {} of `{}` holds a value of a foreign type",
                self.local.0, ty
            ),
        }
    }

    fn remove(&self, ty: &TypeHandle) {
        if (self.binding.remove)(ty, self.local) {
            trace!(ty = %ty, local = self.local.0, "removed type-local value");
        }
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::provider;

    fn yes() -> bool {
        true
    }

    /// Invariant: a table speaking another ABI version is rejected.
    #[test]
    fn abi_mismatch_is_rejected() {
        static OLD: NativeProvider = NativeProvider {
            abi_version: NATIVE_ABI_VERSION + 1,
            ..provider("old", yes)
        };
        assert_eq!(
            synthesize(&OLD).unwrap_err(),
            SynthesisError::AbiMismatch {
                provider: "old",
                expected: NATIVE_ABI_VERSION,
                found: NATIVE_ABI_VERSION + 1,
            }
        );
    }

    /// Invariant: every hook must be present before anything is bound.
    #[test]
    fn missing_hook_is_rejected() {
        static PARTIAL: NativeProvider = NativeProvider {
            get: None,
            ..provider("partial", yes)
        };
        let err = synthesize(&PARTIAL).unwrap_err();
        assert_eq!(
            err,
            SynthesisError::MissingHook {
                provider: "partial",
                hook: "get",
            }
        );
        assert_eq!(err.to_string(), "provider `partial` does not supply the `get` hook");
    }

    /// Invariant: dropping an adapter retires exactly its own slot id.
    #[test]
    fn drop_retires_slot() {
        use std::sync::atomic::{AtomicU64, Ordering};
        static RETIRED: AtomicU64 = AtomicU64::new(0);
        fn record(id: LocalId) {
            RETIRED.store(id.0 + 1, Ordering::SeqCst);
        }
        static RECORDING: NativeProvider = NativeProvider {
            retire: Some(record),
            ..provider("recording", yes)
        };
        let binding: &'static AdapterBinding = Box::leak(Box::new(synthesize(&RECORDING).unwrap()));
        let adapter = binding.instantiate(|ty: &TypeHandle| ty.id()).unwrap();
        let local = adapter.local;
        assert_eq!(RETIRED.load(Ordering::SeqCst), 0);
        drop(adapter);
        assert_eq!(RETIRED.load(Ordering::SeqCst), local.0 + 1);
    }

    /// Invariant: a provider panicking during slot allocation surfaces as an
    /// error instead of unwinding through construction.
    #[test]
    fn panicking_allocation_is_reported() {
        fn explode() -> LocalId {
            panic!("slot space exhausted")
        }
        static BROKEN: NativeProvider = NativeProvider {
            allocate_local: Some(explode),
            ..provider("broken", yes)
        };
        let binding: &'static AdapterBinding = Box::leak(Box::new(synthesize(&BROKEN).unwrap()));
        let err = binding
            .instantiate(|ty: &TypeHandle| ty.to_string())
            .err()
            .expect("allocation must fail");
        assert_eq!(err, SynthesisError::ProviderPanicked { provider: "broken" });
    }

    /// Invariant: the adapter's hook forwards to its compute field and the
    /// backend hands back the provider's retained value.
    #[test]
    fn adapter_delegates_to_compute_field() {
        static PASSTHROUGH: NativeProvider = provider("passthrough", yes);
        let binding: &'static AdapterBinding =
            Box::leak(Box::new(synthesize(&PASSTHROUGH).unwrap()));
        assert_eq!(binding.provider, "passthrough");
        let adapter = binding
            .instantiate(|ty: &TypeHandle| format!("<{}>", ty))
            .unwrap();
        let ty = TypeHandle::load("T");
        assert_eq!(adapter.get_or_compute(&ty), "<T>");
        assert_eq!(adapter.kind(), BackendKind::Native);
        let erased = adapter.compute_value(&ty);
        assert_eq!(erased.downcast_ref::<String>().map(String::as_str), Some("<T>"));
    }
}
