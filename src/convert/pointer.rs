//! Raw pointers as externals, shared pointers as wrapped objects.

use std::ffi::c_void;
use std::rc::Rc;
use std::sync::Arc;

use jsbind_core::{Env, Error, RawValue, Result, Signature, TypeTag, TypedValue, ValueType};

use super::{FromJs, JsType, ToJs, check_value, from_boxed, is_object, is_type};
use crate::error::throw_type_error;
use crate::options::TypeOptions;

// ============================================================================
// Raw pointers
// ============================================================================

fn read_external(env: &Env, value: RawValue, options: TypeOptions) -> Result<*mut c_void> {
    check_value(env, value, options, "external", is_type(ValueType::External))?;
    env.get_value_external(value)
}

/// Marshalled as an external without a finalizer; no ownership moves.
impl<T> JsType for *mut T {
    const SIGNATURE: Signature = Signature::External;
}

impl<T> ToJs for *mut T {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.create_external(self.cast(), None)
    }

    fn to_typed(&self, _: &Env, _: TypeOptions) -> Result<TypedValue> {
        Ok(TypedValue::Pointer(self.cast()))
    }
}

impl<T> FromJs for *mut T {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        read_external(env, value, options).map(<*mut c_void>::cast)
    }

    fn from_typed(env: &Env, value: TypedValue, options: TypeOptions) -> Result<Self> {
        match value {
            TypedValue::Pointer(data) => Ok(data.cast()),
            other => from_boxed(env, other, options),
        }
    }
}

impl<T> JsType for *const T {
    const SIGNATURE: Signature = Signature::External;
}

impl<T> ToJs for *const T {
    fn to_js(&self, env: &Env, options: TypeOptions) -> Result<RawValue> {
        self.cast_mut().to_js(env, options)
    }

    fn to_typed(&self, env: &Env, options: TypeOptions) -> Result<TypedValue> {
        self.cast_mut().to_typed(env, options)
    }
}

impl<T> FromJs for *const T {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        <*mut T>::from_js(env, value, options).map(<*mut T>::cast_const)
    }

    fn from_typed(env: &Env, value: TypedValue, options: TypeOptions) -> Result<Self> {
        <*mut T>::from_typed(env, value, options).map(<*mut T>::cast_const)
    }
}

// ============================================================================
// Shared pointers
// ============================================================================

// Each marshal wraps a fresh object holding one strong count. The wrap
// finalizer gives that count back, so the value lives at least as long as
// any wrapper is reachable. The wrapper is type-tagged with the exact
// pointer type; reads refuse any object without that tag.
macro_rules! impl_shared {
    ($($ptr:ident),*) => {
        $(
            impl<T: 'static> JsType for $ptr<T> {
                const SIGNATURE: Signature = Signature::Object;
            }

            impl<T: 'static> ToJs for $ptr<T> {
                fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
                    let object = env.create_object()?;
                    env.type_tag_object(object, TypeTag::of::<$ptr<T>>())?;
                    let data = $ptr::into_raw($ptr::clone(self));
                    let released = env.wrap(
                        object,
                        data.cast_mut().cast(),
                        Some(Box::new(|_: &Env, data: *mut c_void| unsafe {
                            $ptr::decrement_strong_count(data.cast_const().cast::<T>())
                        })),
                    );
                    if let Err(err) = released {
                        unsafe { $ptr::decrement_strong_count(data) };
                        return Err(err);
                    }
                    Ok(object)
                }
            }

            /// Accepts only objects produced by marshalling a pointer of this
            /// exact type.
            impl<T: 'static> FromJs for $ptr<T> {
                fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
                    check_value(env, value, options, "object", is_object)?;
                    if !env.check_object_type_tag(value, TypeTag::of::<$ptr<T>>())? {
                        return Err(mismatched_shared(env, options));
                    }
                    let data = env.unwrap(value)?.cast_const().cast::<T>();
                    if data.is_null() {
                        return Err(Error::InvalidArgument("wrapped pointer is null"));
                    }
                    unsafe {
                        $ptr::increment_strong_count(data);
                        Ok($ptr::from_raw(data))
                    }
                }
            }
        )*
    };
}

impl_shared!(Rc, Arc);

fn mismatched_shared(env: &Env, options: TypeOptions) -> Error {
    if options.checked {
        throw_type_error(env, "Value is not of type 'object'")
    } else {
        Error::InvalidArgument("object does not hold a shared pointer of this type")
    }
}
