//! Handles convert to themselves; reading one validates its category.

use jsbind_core::element::ElementKind;
use jsbind_core::{Env, Handle, Kind, RawValue, Result, Signature, ValueType, kind};

use super::{FromJs, JsType, ToJs, check_value};
use crate::options::TypeOptions;

/// A handle kind the registry can validate.
pub trait CheckedKind: Kind {
    /// Tag used when the handle appears in a call signature.
    const SIGNATURE: Signature;
    const IS_RECEIVER: bool = false;

    /// Whether `value` belongs to this kind.
    fn matches(env: &Env, value: RawValue) -> Result<bool>;
}

macro_rules! checked_kinds {
    ($($kind:ty => $signature:ident, |$env:ident, $value:ident| $body:expr;)*) => {
        $(
            impl CheckedKind for $kind {
                const SIGNATURE: Signature = Signature::$signature;

                fn matches($env: &Env, $value: RawValue) -> Result<bool> {
                    $body
                }
            }
        )*
    };
}

checked_kinds! {
    kind::Value => Any, |_env, _value| Ok(true);
    kind::Primitive => Any, |env, value| {
        let ty = env.type_of(value)?;
        Ok(!ty.is_object_like() && ty != ValueType::External)
    };
    kind::Boolean => Any, |env, value| Ok(env.type_of(value)? == ValueType::Boolean);
    kind::Numeric => Any, |env, value| {
        Ok(matches!(env.type_of(value)?, ValueType::Number | ValueType::BigInt))
    };
    kind::Number => Any, |env, value| Ok(env.type_of(value)? == ValueType::Number);
    kind::Integer => Any, |env, value| Ok(env.is_int32(value)? || env.is_uint32(value)?);
    kind::Bigint => BigInt, |env, value| Ok(env.type_of(value)? == ValueType::BigInt);
    kind::Name => Any, |env, value| {
        Ok(matches!(env.type_of(value)?, ValueType::String | ValueType::Symbol))
    };
    kind::String => String, |env, value| Ok(env.type_of(value)? == ValueType::String);
    kind::Symbol => Symbol, |env, value| Ok(env.type_of(value)? == ValueType::Symbol);
    kind::Object => Object, |env, value| Ok(env.type_of(value)?.is_object_like());
    kind::Array => Object, |env, value| env.is_array(value);
    kind::ArrayBuffer => Object, |env, value| env.is_arraybuffer(value);
}

impl CheckedKind for kind::Receiver {
    const SIGNATURE: Signature = Signature::Any;
    const IS_RECEIVER: bool = true;

    fn matches(_: &Env, _: RawValue) -> Result<bool> {
        Ok(true)
    }
}

impl<E: ElementKind> CheckedKind for kind::TypedArray<E> {
    const SIGNATURE: Signature = Signature::Object;

    fn matches(env: &Env, value: RawValue) -> Result<bool> {
        if !env.is_typedarray(value)? {
            return Ok(false);
        }
        match E::TYPE {
            Some(expected) => Ok(env.get_typedarray_info(value)?.kind == expected),
            None => Ok(true),
        }
    }
}

impl<R: 'static, A: 'static> CheckedKind for kind::Function<R, A> {
    const SIGNATURE: Signature = Signature::Function;

    fn matches(env: &Env, value: RawValue) -> Result<bool> {
        Ok(env.type_of(value)? == ValueType::Function)
    }
}

// Externals travel boxed so the handle itself reaches the callback.
impl<T: 'static> CheckedKind for kind::External<T> {
    const SIGNATURE: Signature = Signature::Any;

    fn matches(env: &Env, value: RawValue) -> Result<bool> {
        Ok(env.type_of(value)? == ValueType::External)
    }
}

impl<K: CheckedKind> JsType for Handle<K> {
    const SIGNATURE: Signature = K::SIGNATURE;
    const TYPED_AS_VALUE: bool = true;
    const IS_RECEIVER: bool = K::IS_RECEIVER;
}

impl<K: CheckedKind> ToJs for Handle<K> {
    fn to_js(&self, _: &Env, _: TypeOptions) -> Result<RawValue> {
        self.to_raw()
    }
}

impl<K: CheckedKind> FromJs for Handle<K> {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        check_value(env, value, options, K::LABEL, K::matches)?;
        Ok(Handle::from_raw(value))
    }
}
