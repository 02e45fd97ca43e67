//! Type-directed conversion between native values and engine values.
//!
//! Every supported native type implements [`JsType`] (its signature tag)
//! plus [`ToJs`] and/or [`FromJs`]. Container impls defer to their element
//! types, so conversions compose recursively: `Vec<(String, Option<u32>)>`
//! needs no code of its own.
//!
//! ## Checked and unchecked reads
//!
//! [`FromJs::from_js`] takes [`TypeOptions`]. With `checked` set, the value's
//! category is validated first and a mismatch raises a `TypeError`
//! (`Value is not of type '<label>'`), returning
//! [`Error::PendingException`]. Unchecked reads skip validation and go
//! straight to the engine getter.
//!
//! ## Typed values
//!
//! The typed calling convention hands arguments over as [`TypedValue`]s.
//! Types whose signature is unwrapped (booleans, 32-bit integers, doubles,
//! 64-bit integers, pointers) override [`ToJs::to_typed`] and
//! [`FromJs::from_typed`]; everything else travels as a boxed value.

mod buffer;
mod container;
mod handle;
mod pointer;
mod primitive;
mod string;

pub(crate) use buffer::{copy_to_arraybuffer, plain_bytes};
pub use handle::CheckedKind;
pub use string::{FixedUtf8, FixedUtf16, Utf16String};

use jsbind_core::{
    Env, Error, Handle, JsValue, Kind, RawValue, Result, Signature, TypedValue, ValueType,
};

use crate::error::throw_type_error;
use crate::options::TypeOptions;

/// Static description of how a native type is represented.
pub trait JsType {
    /// Category tag used in call signatures.
    const SIGNATURE: Signature;

    /// Whether a typed-path result of this type is a boxed value that must
    /// be escaped from the callback's scope.
    const TYPED_AS_VALUE: bool = !Self::SIGNATURE.is_unwrapped();

    /// Whether this type stands for the call receiver rather than an argument.
    const IS_RECEIVER: bool = false;
}

/// Conversion from native to engine values.
pub trait ToJs {
    fn to_js(&self, env: &Env, options: TypeOptions) -> Result<RawValue>;

    /// Representation for the typed calling convention.
    fn to_typed(&self, env: &Env, options: TypeOptions) -> Result<TypedValue> {
        self.to_js(env, options).map(TypedValue::Value)
    }
}

/// Conversion from engine to native values.
pub trait FromJs: Sized {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self>;

    /// Read an argument delivered through the typed calling convention.
    fn from_typed(env: &Env, value: TypedValue, options: TypeOptions) -> Result<Self> {
        from_boxed(env, value, options)
    }
}

/// Default [`FromJs::from_typed`]: accept only boxed values.
pub(crate) fn from_boxed<T: FromJs>(
    env: &Env,
    value: TypedValue,
    options: TypeOptions,
) -> Result<T> {
    match value {
        TypedValue::Value(raw) => T::from_js(env, raw, options),
        _ => Err(Error::InvalidArgument("unexpected unwrapped typed value")),
    }
}

impl<T: JsType + ?Sized> JsType for &T {
    const SIGNATURE: Signature = T::SIGNATURE;
    const TYPED_AS_VALUE: bool = T::TYPED_AS_VALUE;
}

impl<T: ToJs + ?Sized> ToJs for &T {
    fn to_js(&self, env: &Env, options: TypeOptions) -> Result<RawValue> {
        (**self).to_js(env, options)
    }

    fn to_typed(&self, env: &Env, options: TypeOptions) -> Result<TypedValue> {
        (**self).to_typed(env, options)
    }
}

/// Raise `TypeError: Value is not of type '<label>'` unless `valid`.
///
/// Does nothing for unchecked options.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn check_value(
    env: &Env,
    value: RawValue,
    options: TypeOptions,
    label: &str,
    valid: impl FnOnce(&Env, RawValue) -> Result<bool>,
) -> Result<()> {
    if !options.checked || valid(env, value)? {
        return Ok(());
    }
    Err(throw_type_error(env, &format!("Value is not of type '{label}'")))
}

/// Predicate for [`check_value`] comparing `typeof`.
pub(crate) fn is_type(expected: ValueType) -> impl FnOnce(&Env, RawValue) -> Result<bool> {
    move |env, value| Ok(env.type_of(value)? == expected)
}

/// Predicate for [`check_value`] accepting any object, functions included.
pub(crate) fn is_object(env: &Env, value: RawValue) -> Result<bool> {
    Ok(env.type_of(value)?.is_object_like())
}

/// Convert a native value with default options.
pub fn marshal<T: ToJs + ?Sized>(env: &Env, value: &T) -> Result<JsValue> {
    marshal_with(env, value, TypeOptions::default())
}

pub fn marshal_with<T: ToJs + ?Sized>(
    env: &Env,
    value: &T,
    options: TypeOptions,
) -> Result<JsValue> {
    value.to_js(env, options).map(Handle::from_raw)
}

/// Convert an engine value with default options.
pub fn unmarshal<T: FromJs, K: Kind>(env: &Env, value: Handle<K>) -> Result<T> {
    unmarshal_with(env, value, TypeOptions::default())
}

pub fn unmarshal_with<T: FromJs, K: Kind>(
    env: &Env,
    value: Handle<K>,
    options: TypeOptions,
) -> Result<T> {
    T::from_js(env, value.to_raw()?, options)
}
