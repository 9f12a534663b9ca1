//! Type handles: the identity keys every cache is indexed by.
//!
//! A `TypeHandle` is a strong, cheaply clonable reference to a loaded
//! `TypeDescriptor`. Equality and hashing use the descriptor's allocation
//! address, never its name: two types loaded under the same name are
//! distinct keys. Dropping the last strong handle unloads the type; any
//! `WeakTypeHandle` pointing at it stops upgrading from then on.

use crate::type_locals::TypeLocalSlots;
use core::fmt;
use core::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

/// Host-side description of a loaded type.
pub struct TypeDescriptor {
    id: u64,
    name: String,
    // Native per-type storage; dropped together with the type.
    locals: TypeLocalSlots,
}

/// Strong handle to a loaded type. Clone is an `Arc` clone.
#[derive(Clone)]
pub struct TypeHandle(Arc<TypeDescriptor>);

impl TypeHandle {
    /// Load a new type. Every call yields a distinct identity.
    pub fn load(name: impl Into<String>) -> Self {
        let id = NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed);
        TypeHandle(Arc::new(TypeDescriptor {
            id,
            name: name.into(),
            locals: TypeLocalSlots::default(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Process-unique sequence number, useful for logging only.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn downgrade(&self) -> WeakTypeHandle {
        WeakTypeHandle(Arc::downgrade(&self.0))
    }

    /// Number of strong handles keeping this type loaded.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub(crate) fn locals(&self) -> &TypeLocalSlots {
        &self.0.locals
    }
}

impl PartialEq for TypeHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for TypeHandle {}

impl Hash for TypeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHandle({}#{})", self.0.name, self.0.id)
    }
}

/// Weak handle to a type. Never keeps the type loaded.
///
/// The weak reference pins the descriptor's allocation (not the type), so
/// its address cannot be handed out to a newly loaded type while this
/// handle exists. Address comparison is therefore a sound identity check.
#[derive(Clone)]
pub struct WeakTypeHandle(Weak<TypeDescriptor>);

impl WeakTypeHandle {
    pub fn upgrade(&self) -> Option<TypeHandle> {
        self.0.upgrade().map(TypeHandle)
    }

    /// True while at least one strong handle exists.
    pub fn is_loaded(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// True if this weak handle was downgraded from `ty`.
    #[inline]
    pub fn refers_to(&self, ty: &TypeHandle) -> bool {
        self.addr() == ty.addr()
    }

    #[inline]
    pub(crate) fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for WeakTypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(ty) => write!(f, "WeakTypeHandle({:?})", ty),
            None => f.write_str("WeakTypeHandle(<unloaded>)"),
        }
    }
}
