//! Shared vocabulary for binding native Rust code to an embedded JavaScript
//! engine.
//!
//! This crate defines what the binding layer consumes, not how it converts:
//!
//! - [`Engine`]: the primitive capability interface an engine provides
//! - [`Handle`] and its kind markers: typed, non-owning value references
//! - [`Signature`], [`CallSignature`], [`TypedValue`]: call descriptions for
//!   the typed calling convention
//! - [`Plain`], [`ElementKind`], [`TypedArrayElement`]: buffer element types
//! - [`Error`]: the status type every operation returns

pub mod element;
pub mod engine;
pub mod error;
pub mod handle;
pub mod value;

pub use element::{AnyElement, ElementKind, Plain, TypedArrayElement};
pub use engine::{
    CallbackInfo, DeferredTeardown, DeferredTeardownCallback, Engine, Env, FinalizeCallback,
    PropertyAttributes, PropertyDescriptor, ReferenceId, ScopeId, TeardownCallback, TeardownId,
    TypeTag, TypedCallback, TypedEntry, UntypedCallback,
};
pub use error::{Error, Result, Status};
pub use handle::{
    Extends, Handle, JsArray, JsArrayBuffer, JsBigint, JsBoolean, JsExternal, JsFunction,
    JsInteger, JsName, JsNumber, JsNumeric, JsObject, JsPrimitive, JsReceiver, JsString,
    JsSymbol, JsTypedArray, JsValue, Kind, kind,
};
pub use value::{
    CallSignature, RawValue, Signature, TypedArrayInfo, TypedArrayType, TypedValue, ValueType,
};
