//! Native pointers attached to engine values, finalizers, and environment
//! lifecycle hooks.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;

use jsbind_core::{
    DeferredTeardown, Env, FinalizeCallback, Handle, JsExternal, JsObject, Result, TeardownId,
};

/// Release callback for a `*mut T` handed to the engine.
///
/// The engine runs it at most once, when the owning value is collected or
/// the environment is torn down.
pub struct Finalizer<T> {
    callback: FinalizeCallback,
    _data: PhantomData<fn(*mut T)>,
}

impl<T: 'static> Finalizer<T> {
    pub fn new(finalize: impl FnOnce(&Env, *mut T) + 'static) -> Self {
        Self {
            callback: Box::new(move |env: &Env, data: *mut c_void| finalize(env, data.cast())),
            _data: PhantomData,
        }
    }

    /// A finalizer that also receives `hint`.
    pub fn with_hint<H: 'static>(
        finalize: impl FnOnce(&Env, *mut T, *mut H) + 'static,
        hint: *mut H,
    ) -> Self {
        Self::new(move |env, data| finalize(env, data, hint))
    }

    /// A finalizer reclaiming a pointer produced by [`Box::into_raw`].
    pub fn drop_box() -> Self {
        Self::new(|_, data| drop(unsafe { Box::from_raw(data) }))
    }

    pub(crate) fn into_callback(self) -> FinalizeCallback {
        self.callback
    }
}

impl<T> fmt::Debug for Finalizer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Finalizer").finish_non_exhaustive()
    }
}

// ============================================================================
// Wrapping
// ============================================================================

/// Associate `data` with `object`.
///
/// An object carries at most one wrapped pointer.
pub fn wrap<T: 'static>(
    env: &Env,
    object: impl Into<JsObject>,
    data: *mut T,
    finalizer: Option<Finalizer<T>>,
) -> Result<()> {
    env.wrap(
        object.into().to_raw()?,
        data.cast(),
        finalizer.map(Finalizer::into_callback),
    )
}

/// The pointer wrapped in `object`, leaving the association in place.
pub fn unwrap<T>(env: &Env, object: impl Into<JsObject>) -> Result<*mut T> {
    env.unwrap(object.into().to_raw()?).map(<*mut c_void>::cast)
}

/// Detach the pointer wrapped in `object`. Its finalizer will not run.
pub fn remove_wrap<T>(env: &Env, object: impl Into<JsObject>) -> Result<*mut T> {
    env.remove_wrap(object.into().to_raw()?).map(<*mut c_void>::cast)
}

/// Run `finalizer` with `data` when `object` is collected.
///
/// Unlike [`wrap`], any number of finalizers may be attached.
pub fn add_finalizer<T: 'static>(
    env: &Env,
    object: impl Into<JsObject>,
    data: *mut T,
    finalizer: Finalizer<T>,
) -> Result<()> {
    env.add_finalizer(object.into().to_raw()?, data.cast(), finalizer.into_callback())
}

// ============================================================================
// Externals
// ============================================================================

/// Create an opaque value carrying `data`.
pub fn create_external<T: 'static>(
    env: &Env,
    data: *mut T,
    finalizer: Option<Finalizer<T>>,
) -> Result<JsExternal<T>> {
    env.create_external(data.cast(), finalizer.map(Finalizer::into_callback))
        .map(Handle::from_raw)
}

pub fn get_external<T: 'static>(env: &Env, external: JsExternal<T>) -> Result<*mut T> {
    env.get_value_external(external.to_raw()?).map(<*mut c_void>::cast)
}

// ============================================================================
// Environment lifecycle
// ============================================================================

/// Run `callback` when the environment is torn down.
///
/// Callbacks run in reverse registration order, before remaining values are
/// finalized.
pub fn add_teardown_callback(
    env: &Env,
    callback: impl FnOnce(&Env) + 'static,
) -> Result<TeardownId> {
    env.add_teardown_callback(Box::new(callback))
}

/// Run `callback` when the environment is torn down, and keep the
/// environment's remaining values alive until the [`DeferredTeardown`] it
/// receives is finished.
pub fn add_deferred_teardown_callback(
    env: &Env,
    callback: impl FnOnce(&Env, DeferredTeardown) + 'static,
) -> Result<TeardownId> {
    env.add_deferred_teardown_callback(Box::new(callback))
}

pub fn remove_teardown_callback(env: &Env, id: TeardownId) -> Result<()> {
    env.remove_teardown_callback(id)
}

/// Ask the engine to collect unreachable values now. Intended for tests.
pub fn request_garbage_collection(env: &Env) -> Result<()> {
    env.request_garbage_collection()
}
