//! Aggregates: optional values, sequences, fixed arrays, and tuples.
//!
//! Every container maps to a JavaScript array (or `undefined` for an absent
//! option) and converts its elements through their own registry entries.
//! Conversion stops at the first failing element; array elements written
//! before the failure are left in place.

use jsbind_core::{Env, Error, RawValue, Result, Signature, ValueType};

use super::{FromJs, JsType, ToJs, check_value};
use crate::options::TypeOptions;

/// Read the elements of an array, asserting a fixed length if given.
fn read_elements(
    env: &Env,
    value: RawValue,
    options: TypeOptions,
    fixed: Option<usize>,
) -> Result<Vec<RawValue>> {
    check_value(env, value, options, "array", |env, value| env.is_array(value))?;
    let len = env.get_array_length(value)? as usize;
    if let Some(fixed) = fixed {
        assert_eq!(len, fixed, "array length does not match the fixed length");
    }
    env.get_array_elements(value, 0, len)
}

fn write_elements(env: &Env, values: &[RawValue]) -> Result<RawValue> {
    let array = env.create_array_with_length(values.len())?;
    env.set_array_elements(array, values, 0)?;
    Ok(array)
}

// ============================================================================
// Option
// ============================================================================

// Optionals travel boxed so `undefined` can reach the native side.
impl<T: JsType> JsType for Option<T> {
    const SIGNATURE: Signature = Signature::Any;
}

impl<T: ToJs> ToJs for Option<T> {
    fn to_js(&self, env: &Env, options: TypeOptions) -> Result<RawValue> {
        match self {
            Some(value) => value.to_js(env, options),
            None => env.get_undefined(),
        }
    }
}

/// `undefined` is absence; anything else, falsy or not, is decoded by `T`.
impl<T: FromJs> FromJs for Option<T> {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        if env.type_of(value)? == ValueType::Undefined {
            return Ok(None);
        }
        T::from_js(env, value, options).map(Some)
    }
}

// ============================================================================
// Sequences
// ============================================================================

impl<T: JsType> JsType for [T] {
    const SIGNATURE: Signature = Signature::Object;
}

impl<T: ToJs> ToJs for [T] {
    fn to_js(&self, env: &Env, options: TypeOptions) -> Result<RawValue> {
        let values = self
            .iter()
            .map(|value| value.to_js(env, options))
            .collect::<Result<Vec<_>>>()?;
        write_elements(env, &values)
    }
}

impl<T: JsType> JsType for Vec<T> {
    const SIGNATURE: Signature = Signature::Object;
}

impl<T: ToJs> ToJs for Vec<T> {
    fn to_js(&self, env: &Env, options: TypeOptions) -> Result<RawValue> {
        self.as_slice().to_js(env, options)
    }
}

impl<T: FromJs> FromJs for Vec<T> {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        read_elements(env, value, options, None)?
            .into_iter()
            .map(|element| T::from_js(env, element, options))
            .collect()
    }
}

impl<T: JsType, const N: usize> JsType for [T; N] {
    const SIGNATURE: Signature = Signature::Object;
}

impl<T: ToJs, const N: usize> ToJs for [T; N] {
    fn to_js(&self, env: &Env, options: TypeOptions) -> Result<RawValue> {
        self.as_slice().to_js(env, options)
    }
}

impl<T: FromJs, const N: usize> FromJs for [T; N] {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        let values = read_elements(env, value, options, Some(N))?
            .into_iter()
            .map(|element| T::from_js(env, element, options))
            .collect::<Result<Vec<_>>>()?;
        values
            .try_into()
            .map_err(|_| Error::InvalidArgument("array length changed during conversion"))
    }
}

// ============================================================================
// Tuples
// ============================================================================

macro_rules! impl_tuple {
    ($len:literal => $($name:ident $index:tt),+) => {
        impl<$($name: JsType),+> JsType for ($($name,)+) {
            const SIGNATURE: Signature = Signature::Object;
        }

        impl<$($name: ToJs),+> ToJs for ($($name,)+) {
            fn to_js(&self, env: &Env, options: TypeOptions) -> Result<RawValue> {
                let values = [$(self.$index.to_js(env, options)?),+];
                write_elements(env, &values)
            }
        }

        impl<$($name: FromJs),+> FromJs for ($($name,)+) {
            fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
                let elements = read_elements(env, value, options, Some($len))?;
                Ok(($($name::from_js(env, elements[$index], options)?,)+))
            }
        }
    };
}

impl_tuple!(1 => A 0);
impl_tuple!(2 => A 0, B 1);
impl_tuple!(3 => A 0, B 1, C 2);
impl_tuple!(4 => A 0, B 1, C 2, D 3);
impl_tuple!(5 => A 0, B 1, C 2, D 3, E 4);
impl_tuple!(6 => A 0, B 1, C 2, D 3, E 4, F 5);
impl_tuple!(7 => A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_tuple!(8 => A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);
