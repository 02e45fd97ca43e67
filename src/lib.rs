//! Type marshalling between native Rust code and an embedded JavaScript
//! engine.
//!
//! The crate sits on top of the primitive [`Engine`] interface from
//! `jsbind-core` and provides:
//!
//! - [`convert`]: a registry of conversions keyed by native type, with
//!   checked and unchecked reads
//! - [`callback`] and [`function`]: adapting native functions into engine
//!   callbacks, with a typed fast path next to the untyped one
//! - [`object`], [`buffer`], [`reference`], [`wrap`]: helpers for objects,
//!   arrays, buffers, persistent references, and native data attached to
//!   engine values
//! - [`scope`], [`error`], [`statistics`]: handle scopes, exception helpers,
//!   and per-function call counters
//!
//! ```ignore
//! use jsbind::prelude::*;
//!
//! let add = create_function(env, "add", |a: i32, b: i32| a + b, FunctionOptions::new())?;
//! assert_eq!(call_function(env, &add, (2, 3))?, 5);
//! ```

pub mod buffer;
pub mod callback;
pub mod convert;
pub mod error;
pub mod function;
pub mod object;
pub mod options;
pub mod reference;
pub mod scope;
pub mod span;
pub mod statistics;
pub mod wrap;

pub use jsbind_core::{
    AnyElement, DeferredTeardown, Engine, Env, Error, Handle, JsArray, JsArrayBuffer, JsBigint,
    JsBoolean, JsExternal, JsFunction, JsInteger, JsName, JsNumber, JsNumeric, JsObject,
    JsPrimitive, JsReceiver, JsString, JsSymbol, JsTypedArray, JsValue, Kind, Plain,
    PropertyAttributes, RawValue, Result, Status, TypeTag, TypedArrayElement, TypedArrayType,
    ValueType, kind,
};

pub mod prelude {
    pub use crate::buffer::*;
    pub use crate::convert::{
        FixedUtf8, FixedUtf16, FromJs, JsType, ToJs, Utf16String, marshal, unmarshal,
    };
    pub use crate::error::*;
    pub use crate::function::*;
    pub use crate::object::*;
    pub use crate::options::{FunctionOptions, TypeOptions};
    pub use crate::reference::Persistent;
    pub use crate::scope::{EscapableHandleScope, HandleScope};
    pub use crate::span::*;
    pub use crate::statistics::{CallKind, FunctionStatistics};
    pub use crate::wrap::*;
    pub use jsbind_core::{
        DeferredTeardown, Engine, Env, Handle, JsArray, JsArrayBuffer, JsBigint, JsBoolean,
        JsExternal, JsFunction, JsName, JsNumber, JsObject, JsReceiver, JsString, JsSymbol,
        JsTypedArray, JsValue, PropertyAttributes, TypedArrayType,
    };
}
