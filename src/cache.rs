//! TypeCache: the public facade over the selected backend.

use crate::abi::NativeProvider;
use crate::adapter::{self, AdapterBinding};
use crate::backend::{Backend, BackendKind};
use crate::config::{BackendPreference, CacheConfig};
use crate::error::{CacheError, SynthesisError};
use crate::fallback::FallbackBackend;
use crate::probe::{self, ProbeOutcome};
use crate::types::TypeHandle;
use core::fmt;
use core::marker::PhantomData;
use tracing::debug;

/// A lazily computed value per type, held only while the type is loaded.
///
/// The backend is chosen when the cache is built and never changes. With
/// the fallback backend the compute function runs exactly once per type
/// until `remove`. With the native backend it may run more than once for a
/// type under concurrent first access; every caller still observes the one
/// value the host retained. Compute functions should therefore be cheap to
/// repeat and return equivalent values.
///
/// ```
/// use std::sync::Arc;
/// use type_cache::{TypeCache, TypeHandle};
///
/// let names = TypeCache::new(|ty: &TypeHandle| Arc::new(ty.to_string()));
/// let ty = TypeHandle::load("TypeA");
/// let first = names.get_or_compute(&ty);
/// assert_eq!(*first, "TypeA");
/// assert!(Arc::ptr_eq(&first, &names.get_or_compute(&ty)));
/// ```
pub struct TypeCache<V> {
    backend: Box<dyn Backend<V>>,
}

impl<V> TypeCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Build a cache using the process probe and default configuration.
    ///
    /// # Panics
    ///
    /// If the probe found a native provider but binding to it failed. That
    /// is a startup configuration error; use `try_new` to handle it.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn(&TypeHandle) -> V + Send + Sync + 'static,
    {
        Self::or_panic(Self::try_new(compute))
    }

    fn or_panic(built: Result<Self, CacheError>) -> Self {
        match built {
            Ok(cache) => cache,
            Err(e) => panic!("type cache initialization failed: {e}"),
        }
    }

    pub fn try_new<F>(compute: F) -> Result<Self, CacheError>
    where
        F: Fn(&TypeHandle) -> V + Send + Sync + 'static,
    {
        TypeCacheBuilder::new().build(compute)
    }

    pub fn builder() -> TypeCacheBuilder<V> {
        TypeCacheBuilder::new()
    }

    /// The value for `ty`, computing and storing it on a miss.
    ///
    /// A panic in the compute function propagates to the caller and leaves
    /// nothing stored for `ty`.
    #[inline]
    pub fn get_or_compute(&self, ty: &TypeHandle) -> V {
        self.backend.get_or_compute(ty)
    }

    /// Forget the value for `ty`; the next lookup recomputes. No-op if absent.
    #[inline]
    pub fn remove(&self, ty: &TypeHandle) {
        self.backend.remove(ty)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Release storage held for unloaded types now instead of waiting for
    /// the next opportunistic sweep. Returns the number of entries freed.
    pub fn purge_unloaded(&self) -> usize {
        self.backend.purge_unloaded()
    }
}

impl<V> fmt::Debug for TypeCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCache")
            .field("backend", &self.backend.kind())
            .finish()
    }
}

/// Per-instance configuration for a `TypeCache<V>`.
pub struct TypeCacheBuilder<V> {
    config: CacheConfig,
    _value: PhantomData<fn() -> V>,
}

impl<V> Clone for TypeCacheBuilder<V> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            _value: PhantomData,
        }
    }
}

impl<V> fmt::Debug for TypeCacheBuilder<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCacheBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl<V> Default for TypeCacheBuilder<V> {
    fn default() -> Self {
        Self {
            config: CacheConfig::default(),
            _value: PhantomData,
        }
    }
}

impl<V> TypeCacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn backend(mut self, backend: BackendPreference) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn sweep_floor(mut self, sweep_floor: usize) -> Self {
        self.config.sweep_floor = sweep_floor;
        self
    }

    /// Bind a cache to `compute`.
    ///
    /// `Auto` takes the native backend exactly when the process probe found
    /// a provider. Binding failures after a positive probe are returned, not
    /// downgraded to the fallback.
    pub fn build<F>(self, compute: F) -> Result<TypeCache<V>, CacheError>
    where
        F: Fn(&TypeHandle) -> V + Send + Sync + 'static,
    {
        self.build_on(*probe::outcome(), adapter::binding, compute)
    }

    /// `build` against an explicit probe outcome and binder.
    pub(crate) fn build_on<B, F>(
        self,
        outcome: ProbeOutcome,
        bind: B,
        compute: F,
    ) -> Result<TypeCache<V>, CacheError>
    where
        B: FnOnce(&'static NativeProvider) -> Result<&'static AdapterBinding, SynthesisError>,
        F: Fn(&TypeHandle) -> V + Send + Sync + 'static,
    {
        let native = match (self.config.backend, outcome) {
            (BackendPreference::Fallback, _) => None,
            (_, ProbeOutcome::Native(provider)) => Some(provider),
            (BackendPreference::Auto, ProbeOutcome::Unsupported(_)) => None,
            (BackendPreference::Native, ProbeOutcome::Unsupported(reason)) => {
                return Err(CacheError::NativeUnavailable(reason));
            }
        };

        let backend: Box<dyn Backend<V>> = match native {
            Some(provider) => {
                let binding = bind(provider)?;
                Box::new(binding.instantiate(compute)?)
            }
            None => Box::new(FallbackBackend::new(compute, self.config.sweep_floor)),
        };
        debug!(backend = %backend.kind(), "type cache created");
        Ok(TypeCache { backend })
    }
}
