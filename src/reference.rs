//! Persistent and weak references.

use std::fmt;
use std::marker::PhantomData;

use jsbind_core::{Env, Handle, Kind, ReferenceId, Result, kind};
use tracing::warn;

/// A reference to an engine value that outlives the current handle scope.
///
/// A strong reference keeps its value alive; a weak one does not, and
/// [`get`](Self::get) returns `None` once the value has been collected. The
/// underlying engine reference is released exactly once, by
/// [`reset`](Self::reset) or on drop, whichever comes first.
pub struct Persistent<'e, K: Kind = kind::Value> {
    env: &'e Env,
    reference: Option<ReferenceId>,
    weak: bool,
    _kind: PhantomData<K>,
}

impl<'e, K: Kind> Persistent<'e, K> {
    /// Create a strong reference to `handle`.
    pub fn new(env: &'e Env, handle: Handle<K>) -> Result<Self> {
        Self::with_count(env, handle, 1)
    }

    /// Create a weak reference to `handle`.
    pub fn weak(env: &'e Env, handle: Handle<K>) -> Result<Self> {
        Self::with_count(env, handle, 0)
    }

    fn with_count(env: &'e Env, handle: Handle<K>, count: u32) -> Result<Self> {
        let reference = env.create_reference(handle.to_raw()?, count)?;
        Ok(Self {
            env,
            reference: Some(reference),
            weak: count == 0,
            _kind: PhantomData,
        })
    }

    /// A reference to nothing.
    pub fn empty(env: &'e Env) -> Self {
        Self {
            env,
            reference: None,
            weak: false,
            _kind: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.reference.is_none()
    }

    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// The referenced value, rooted in the current scope.
    ///
    /// `None` after a reset, or once a weak target has been collected.
    pub fn get(&self) -> Result<Option<Handle<K>>> {
        match self.reference {
            Some(reference) => Ok(self.env.get_reference_value(reference)?.map(Handle::from_raw)),
            None => Ok(None),
        }
    }

    /// Release the reference. Further calls do nothing.
    pub fn reset(&mut self) -> Result<()> {
        match self.reference.take() {
            Some(reference) => self.env.delete_reference(reference),
            None => Ok(()),
        }
    }
}

impl<K: Kind> Drop for Persistent<'_, K> {
    fn drop(&mut self) {
        if let Err(err) = self.reset() {
            warn!(%err, "failed to release persistent reference");
        }
    }
}

impl<K: Kind> fmt::Debug for Persistent<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistent")
            .field("kind", &K::LABEL)
            .field("reference", &self.reference)
            .field("weak", &self.weak)
            .finish()
    }
}
