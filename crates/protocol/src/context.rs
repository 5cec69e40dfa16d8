//! Opaque per-part context
//!
//! A part carries ambient state that travels with it without changing its
//! bytes. Values are stored behind `Arc` keyed by type, so attaching state is
//! cheap and copies of a part observe the same underlying value. The roundtrip
//! result store is the primary user.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Typed ambient state attached to a part
#[derive(Clone, Default)]
pub struct Context {
    slots: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl Context {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a value, replacing any existing value of the same type
    pub fn set<T: Any + Send + Sync>(&mut self, value: Arc<T>) {
        self.slots.insert(TypeId::of::<T>(), value);
    }

    /// Fetch the attached value of a type, if present
    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.slots
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|any| any.downcast::<T>().ok())
    }

    /// Whether any state is attached
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
