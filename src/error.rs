//! Raising JavaScript exceptions from native code.
//!
//! The helpers raise an exception in the engine and return
//! [`Error::PendingException`], so a native function can fail with
//! `return Err(throw_type_error(env, "..."))`. An exception that is already
//! pending is never replaced.

pub use jsbind_core::error::{INVALID_ARGUMENT, PENDING_EXCEPTION, Status};
pub use jsbind_core::{Error, Result};

use jsbind_core::Env;

fn raised(result: Result<()>) -> Error {
    match result {
        Ok(()) => Error::PendingException,
        Err(err) => err,
    }
}

/// Raise an `Error` with `message`.
pub fn throw_error(env: &Env, message: &str) -> Error {
    raised(env.throw_error(None, message))
}

/// Raise an `Error` with `message` and a `code` property.
pub fn throw_error_with_code(env: &Env, code: &str, message: &str) -> Error {
    raised(env.throw_error(Some(code), message))
}

/// Raise a `TypeError` with `message`.
pub fn throw_type_error(env: &Env, message: &str) -> Error {
    raised(env.throw_type_error(None, message))
}

/// Raise a `RangeError` with `message`.
pub fn throw_range_error(env: &Env, message: &str) -> Error {
    raised(env.throw_range_error(None, message))
}

/// Whether an exception is waiting to be observed.
pub fn is_exception_pending(env: &Env) -> Result<bool> {
    env.is_exception_pending()
}

/// Make sure a failed native operation is visible to JavaScript.
///
/// Errors other than a pending exception become a generic `Error` unless
/// something is already pending.
pub(crate) fn ensure_pending(env: &Env, err: Error) {
    if matches!(env.is_exception_pending(), Ok(true)) {
        return;
    }
    tracing::warn!(%err, code = err.code(), "native call failed without a pending exception");
    let _ = env.throw_error(None, &format!("native call failed: {err}"));
}
