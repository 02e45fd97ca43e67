//! Status and error types shared by the binding layer and engines.
//!
//! Every engine operation reports failure through [`Error`]. The variants
//! follow the status convention of embedding APIs: non-negative is success,
//! a negative code is a failure that callers forward untouched.
//!
//! ## Pending exceptions
//!
//! [`Error::PendingException`] is special. It means a JavaScript exception
//! has been raised and is waiting to be observed by the engine. Code that
//! receives it must propagate it as-is and must not raise another error on
//! top of it.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

/// Failure statuses with a dedicated [`Error`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum Status {
    PendingException = -1,
    InvalidArgument = -2,
}

/// Status code reported for [`Error::PendingException`].
pub const PENDING_EXCEPTION: i32 = Status::PendingException as i32;

/// Status code reported for [`Error::InvalidArgument`].
pub const INVALID_ARGUMENT: i32 = Status::InvalidArgument as i32;

/// Failure reported by an engine or by the conversion layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// A JavaScript exception is pending in the engine.
    #[error("a JavaScript exception is pending")]
    PendingException,

    /// The engine rejected an argument, e.g. a stale or empty handle.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Any other negative engine status.
    #[error("engine failed with status {0}")]
    Status(i32),
}

impl Error {
    /// The negative status code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Error::PendingException => Status::PendingException.into(),
            Error::InvalidArgument(_) => Status::InvalidArgument.into(),
            Error::Status(code) => *code,
        }
    }

    /// Build an error from a raw engine status.
    ///
    /// Returns `None` for non-negative (successful) statuses.
    pub fn from_code(code: i32) -> Option<Self> {
        if code >= 0 {
            return None;
        }
        Some(match Status::try_from(code) {
            Ok(Status::PendingException) => Error::PendingException,
            Ok(Status::InvalidArgument) => Error::InvalidArgument("rejected by engine"),
            Err(_) => Error::Status(code),
        })
    }

    /// Whether this error signals a pending JavaScript exception.
    pub fn is_pending_exception(&self) -> bool {
        matches!(self, Error::PendingException)
    }
}

/// Result alias used throughout the binding layer.
pub type Result<T, E = Error> = std::result::Result<T, E>;
