//! Scalars: unit, booleans, numbers, and 64-bit integers as BigInt.

use jsbind_core::{Env, RawValue, Result, Signature, TypedValue, ValueType};

use super::{FromJs, JsType, ToJs, check_value, from_boxed, is_type};
use crate::error::throw_range_error;
use crate::options::TypeOptions;

impl JsType for () {
    const SIGNATURE: Signature = Signature::Undefined;
}

impl ToJs for () {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.get_undefined()
    }

    fn to_typed(&self, _: &Env, _: TypeOptions) -> Result<TypedValue> {
        Ok(TypedValue::Undefined)
    }
}

/// Any value reads as `()`; the result of a `void` call is ignored.
impl FromJs for () {
    fn from_js(_: &Env, _: RawValue, _: TypeOptions) -> Result<Self> {
        Ok(())
    }

    fn from_typed(_: &Env, _: TypedValue, _: TypeOptions) -> Result<Self> {
        Ok(())
    }
}

impl JsType for bool {
    const SIGNATURE: Signature = Signature::Boolean;
}

impl ToJs for bool {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.get_boolean(*self)
    }

    fn to_typed(&self, _: &Env, _: TypeOptions) -> Result<TypedValue> {
        Ok(TypedValue::Bool(*self))
    }
}

impl FromJs for bool {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        check_value(env, value, options, "boolean", is_type(ValueType::Boolean))?;
        env.get_value_bool(value)
    }

    fn from_typed(env: &Env, value: TypedValue, options: TypeOptions) -> Result<Self> {
        match value {
            TypedValue::Bool(b) => Ok(b),
            other => from_boxed(env, other, options),
        }
    }
}

impl JsType for i32 {
    const SIGNATURE: Signature = Signature::Int32;
}

impl ToJs for i32 {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.create_int32(*self)
    }

    fn to_typed(&self, _: &Env, _: TypeOptions) -> Result<TypedValue> {
        Ok(TypedValue::Int32(*self))
    }
}

impl FromJs for i32 {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        check_value(env, value, options, "int32", |env, value| env.is_int32(value))?;
        env.get_value_int32(value)
    }

    fn from_typed(env: &Env, value: TypedValue, options: TypeOptions) -> Result<Self> {
        match value {
            TypedValue::Int32(n) => Ok(n),
            other => from_boxed(env, other, options),
        }
    }
}

impl JsType for u32 {
    const SIGNATURE: Signature = Signature::Uint32;
}

impl ToJs for u32 {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.create_uint32(*self)
    }

    fn to_typed(&self, _: &Env, _: TypeOptions) -> Result<TypedValue> {
        Ok(TypedValue::Uint32(*self))
    }
}

impl FromJs for u32 {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        check_value(env, value, options, "uint32", |env, value| env.is_uint32(value))?;
        env.get_value_uint32(value)
    }

    fn from_typed(env: &Env, value: TypedValue, options: TypeOptions) -> Result<Self> {
        match value {
            TypedValue::Uint32(n) => Ok(n),
            other => from_boxed(env, other, options),
        }
    }
}

impl JsType for f64 {
    const SIGNATURE: Signature = Signature::Float64;
}

impl ToJs for f64 {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.create_double(*self)
    }

    fn to_typed(&self, _: &Env, _: TypeOptions) -> Result<TypedValue> {
        Ok(TypedValue::Float64(*self))
    }
}

impl FromJs for f64 {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        check_value(env, value, options, "double", is_type(ValueType::Number))?;
        env.get_value_double(value)
    }

    fn from_typed(env: &Env, value: TypedValue, options: TypeOptions) -> Result<Self> {
        match value {
            TypedValue::Float64(n) => Ok(n),
            other => from_boxed(env, other, options),
        }
    }
}

impl JsType for f32 {
    const SIGNATURE: Signature = Signature::Float64;
}

impl ToJs for f32 {
    fn to_js(&self, env: &Env, options: TypeOptions) -> Result<RawValue> {
        f64::from(*self).to_js(env, options)
    }

    fn to_typed(&self, _: &Env, _: TypeOptions) -> Result<TypedValue> {
        Ok(TypedValue::Float64(f64::from(*self)))
    }
}

impl FromJs for f32 {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        f64::from_js(env, value, options).map(|n| n as f32)
    }

    fn from_typed(env: &Env, value: TypedValue, options: TypeOptions) -> Result<Self> {
        f64::from_typed(env, value, options).map(|n| n as f32)
    }
}

// Narrow integers travel as int32/uint32 and are range-checked on the way in.
macro_rules! impl_narrow_int {
    ($($ty:ty => $wide:ty;)*) => {
        $(
            impl JsType for $ty {
                const SIGNATURE: Signature = <$wide as JsType>::SIGNATURE;
            }

            impl ToJs for $ty {
                fn to_js(&self, env: &Env, options: TypeOptions) -> Result<RawValue> {
                    <$wide>::from(*self).to_js(env, options)
                }

                fn to_typed(&self, env: &Env, options: TypeOptions) -> Result<TypedValue> {
                    <$wide>::from(*self).to_typed(env, options)
                }
            }

            impl FromJs for $ty {
                fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
                    narrow(env, <$wide>::from_js(env, value, options)?, options)
                }

                fn from_typed(env: &Env, value: TypedValue, options: TypeOptions) -> Result<Self> {
                    narrow(env, <$wide>::from_typed(env, value, options)?, options)
                }
            }
        )*
    };
}

impl_narrow_int! {
    i8 => i32;
    i16 => i32;
    u8 => u32;
    u16 => u32;
}

fn narrow<W, N>(env: &Env, wide: W, options: TypeOptions) -> Result<N>
where
    W: Copy + std::fmt::Display + TryInto<N>,
    N: Default,
{
    match wide.try_into() {
        Ok(n) => Ok(n),
        Err(_) if options.checked => Err(throw_range_error(
            env,
            &format!("{wide} is out of range for {}", std::any::type_name::<N>()),
        )),
        Err(_) => Ok(N::default()),
    }
}

impl JsType for i64 {
    const SIGNATURE: Signature = Signature::BigInt64;
}

impl ToJs for i64 {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.create_bigint_int64(*self)
    }

    fn to_typed(&self, _: &Env, _: TypeOptions) -> Result<TypedValue> {
        Ok(TypedValue::BigInt64(*self))
    }
}

impl FromJs for i64 {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        check_value(env, value, options, "bigint", is_type(ValueType::BigInt))?;
        let (n, lossless) = env.get_value_bigint_int64(value)?;
        lossless_or_range_error(env, n, lossless, options)
    }

    fn from_typed(env: &Env, value: TypedValue, options: TypeOptions) -> Result<Self> {
        match value {
            TypedValue::BigInt64(n) => Ok(n),
            other => from_boxed(env, other, options),
        }
    }
}

impl JsType for u64 {
    const SIGNATURE: Signature = Signature::BigUint64;
}

impl ToJs for u64 {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.create_bigint_uint64(*self)
    }

    fn to_typed(&self, _: &Env, _: TypeOptions) -> Result<TypedValue> {
        Ok(TypedValue::BigUint64(*self))
    }
}

impl FromJs for u64 {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        check_value(env, value, options, "bigint", is_type(ValueType::BigInt))?;
        let (n, lossless) = env.get_value_bigint_uint64(value)?;
        lossless_or_range_error(env, n, lossless, options)
    }

    fn from_typed(env: &Env, value: TypedValue, options: TypeOptions) -> Result<Self> {
        match value {
            TypedValue::BigUint64(n) => Ok(n),
            other => from_boxed(env, other, options),
        }
    }
}

fn lossless_or_range_error<N>(env: &Env, n: N, lossless: bool, options: TypeOptions) -> Result<N> {
    if lossless || !options.checked {
        return Ok(n);
    }
    Err(throw_range_error(env, "BigInt does not fit in 64 bits"))
}

#[cfg(test)]
mod tests {
    use jsbind_core::{Engine, Error};
    use jsbind_sandbox::MemoryEngine;

    use super::*;

    fn round_trip<T: ToJs + FromJs>(env: &Env, value: T) -> T {
        let raw = value.to_js(env, TypeOptions::CHECKED).unwrap();
        T::from_js(env, raw, TypeOptions::CHECKED).unwrap()
    }

    #[test]
    fn scalars_round_trip() {
        let engine = MemoryEngine::new();
        assert!(round_trip(&engine, true));
        assert_eq!(round_trip(&engine, -12i32), -12);
        assert_eq!(round_trip(&engine, u32::MAX), u32::MAX);
        assert_eq!(round_trip(&engine, 0.25f64), 0.25);
        assert_eq!(round_trip(&engine, 1.5f32), 1.5);
        assert_eq!(round_trip(&engine, i64::MIN), i64::MIN);
        assert_eq!(round_trip(&engine, u64::MAX), u64::MAX);
        assert_eq!(round_trip(&engine, -3i8), -3);
        assert_eq!(round_trip(&engine, 65_000u16), 65_000);
    }

    #[test]
    fn sixty_four_bit_integers_are_bigints() {
        let engine = MemoryEngine::new();
        let raw = 7i64.to_js(&engine, TypeOptions::CHECKED).unwrap();
        assert_eq!(engine.type_of(raw).unwrap(), ValueType::BigInt);
    }

    #[test]
    fn checked_rejects_number_for_bigint() {
        let engine = MemoryEngine::new();
        let raw = engine.create_double(7.0).unwrap();
        assert_eq!(
            i64::from_js(&engine, raw, TypeOptions::CHECKED),
            Err(Error::PendingException)
        );
        assert_eq!(
            engine.take_exception_message().as_deref(),
            Some("Value is not of type 'bigint'")
        );
    }

    #[test]
    fn checked_rejects_fractional_int32() {
        let engine = MemoryEngine::new();
        let raw = engine.create_double(1.5).unwrap();
        assert_eq!(
            i32::from_js(&engine, raw, TypeOptions::CHECKED),
            Err(Error::PendingException)
        );
        engine.take_exception_message();
    }

    #[test]
    fn unchecked_reads_do_not_validate() {
        let engine = MemoryEngine::new();
        let raw = engine.create_double(1.5).unwrap();
        assert_eq!(i32::from_js(&engine, raw, TypeOptions::UNCHECKED), Ok(1));

        let string = engine.create_string_utf8(b"x").unwrap();
        let _ = bool::from_js(&engine, string, TypeOptions::UNCHECKED);
        assert!(!engine.is_exception_pending().unwrap());
    }

    #[test]
    fn narrow_integers_range_check() {
        let engine = MemoryEngine::new();
        let raw = 300i32.to_js(&engine, TypeOptions::CHECKED).unwrap();
        assert_eq!(u8::from_js(&engine, raw, TypeOptions::CHECKED), Err(Error::PendingException));
        assert_eq!(
            engine.take_exception_message().as_deref(),
            Some("300 is out of range for u8")
        );
    }

    #[test]
    fn typed_values_unwrap_directly() {
        let engine = MemoryEngine::new();
        let options = TypeOptions::UNCHECKED;
        assert_eq!(i32::from_typed(&engine, TypedValue::Int32(4), options), Ok(4));
        assert_eq!(bool::from_typed(&engine, TypedValue::Bool(true), options), Ok(true));
        assert_eq!(u64::from_typed(&engine, TypedValue::BigUint64(9), options), Ok(9));
        assert_eq!(7u16.to_typed(&engine, options), Ok(TypedValue::Uint32(7)));
        assert_eq!(().to_typed(&engine, options), Ok(TypedValue::Undefined));
    }

    #[test]
    fn unit_ignores_value() {
        let engine = MemoryEngine::new();
        let raw = engine.create_object().unwrap();
        assert_eq!(<()>::from_js(&engine, raw, TypeOptions::CHECKED), Ok(()));
        assert_eq!(<() as JsType>::SIGNATURE, Signature::Undefined);
        assert!(!<i32 as JsType>::TYPED_AS_VALUE);
    }
}
