//! Buffer and typed array spans.
//!
//! Reads alias the engine's backing store; writes copy into a new buffer.

use std::mem::size_of_val;
use std::ptr;
use std::slice;

use jsbind_core::{Env, Error, Plain, RawValue, Result, Signature, TypedArrayElement, kind};

use super::handle::CheckedKind;
use super::{FromJs, JsType, ToJs, check_value};
use crate::options::TypeOptions;
use crate::span::{
    AnyTypedArraySpan, ArrayBufferRef, ArrayBufferSpan, ArrayBufferSpanOf, TypedArraySpan,
};

/// Allocate an `ArrayBuffer` holding a copy of `bytes`.
pub(crate) fn copy_to_arraybuffer(env: &Env, bytes: &[u8]) -> Result<RawValue> {
    let (buffer, data) = env.create_arraybuffer(bytes.len())?;
    if !bytes.is_empty() {
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), data, bytes.len()) };
    }
    Ok(buffer)
}

pub(crate) fn plain_bytes<T: Plain>(values: &[T]) -> &[u8] {
    unsafe { slice::from_raw_parts(values.as_ptr().cast(), size_of_val(values)) }
}

fn arraybuffer_info(env: &Env, value: RawValue, options: TypeOptions) -> Result<(*mut u8, usize)> {
    check_value(env, value, options, "arraybuffer", |env, value| env.is_arraybuffer(value))?;
    env.get_arraybuffer_info(value)
}

impl JsType for ArrayBufferSpan {
    const SIGNATURE: Signature = Signature::Object;
}

impl ToJs for ArrayBufferSpan {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        copy_to_arraybuffer(env, self)
    }
}

impl FromJs for ArrayBufferSpan {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        let (data, len) = arraybuffer_info(env, value, options)?;
        Ok(unsafe { ArrayBufferSpan::from_raw_parts(data, len) })
    }
}

impl<T: Plain> JsType for ArrayBufferSpanOf<T> {
    const SIGNATURE: Signature = Signature::Object;
}

impl<T: Plain> ToJs for ArrayBufferSpanOf<T> {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        copy_to_arraybuffer(env, plain_bytes(self))
    }
}

impl<T: Plain> FromJs for ArrayBufferSpanOf<T> {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        let (data, len) = arraybuffer_info(env, value, options)?;
        Ok(unsafe { ArrayBufferSpanOf::from_bytes(data, len) })
    }
}

impl<T: Plain> JsType for ArrayBufferRef<T> {
    const SIGNATURE: Signature = Signature::Object;
}

impl<T: Plain> ToJs for ArrayBufferRef<T> {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        copy_to_arraybuffer(env, plain_bytes(slice::from_ref(&**self)))
    }
}

impl<T: Plain> FromJs for ArrayBufferRef<T> {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        let (data, len) = arraybuffer_info(env, value, options)?;
        Ok(unsafe { ArrayBufferRef::from_bytes(data, len) })
    }
}

impl<E: TypedArrayElement> JsType for TypedArraySpan<E> {
    const SIGNATURE: Signature = Signature::Object;
}

impl<E: TypedArrayElement> ToJs for TypedArraySpan<E> {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        let buffer = copy_to_arraybuffer(env, plain_bytes(self))?;
        env.create_typedarray(E::KIND, self.len(), buffer, 0)
    }
}

impl<E: TypedArrayElement> FromJs for TypedArraySpan<E> {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        check_value(env, value, options, E::LABEL, kind::TypedArray::<E>::matches)?;
        let info = env.get_typedarray_info(value)?;
        if info.kind != E::KIND {
            return Err(Error::InvalidArgument("typed array has a different element kind"));
        }
        Ok(unsafe { TypedArraySpan::from_raw_parts(info.data.cast(), info.len) })
    }
}

impl JsType for AnyTypedArraySpan {
    const SIGNATURE: Signature = Signature::Object;
}

/// Written back with the same kind and byte length.
impl ToJs for AnyTypedArraySpan {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        let buffer = copy_to_arraybuffer(env, self)?;
        env.create_typedarray(self.kind(), self.len(), buffer, 0)
    }
}

impl FromJs for AnyTypedArraySpan {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        check_value(env, value, options, "typedarray", |env, value| env.is_typedarray(value))?;
        let info = env.get_typedarray_info(value)?;
        Ok(unsafe { AnyTypedArraySpan::from_raw_parts(info.data, info.byte_len(), info.kind) })
    }
}

#[cfg(test)]
mod tests {
    use jsbind_core::{Engine, TypedArrayType};
    use jsbind_sandbox::MemoryEngine;

    use super::*;

    #[test]
    fn arraybuffer_span_copies_out_and_aliases_in() {
        let engine = MemoryEngine::new();
        let mut source = *b"hello";
        let span = unsafe { ArrayBufferSpan::from_raw_parts(source.as_mut_ptr(), source.len()) };
        let raw = span.to_js(&engine, TypeOptions::CHECKED).unwrap();

        source[0] = b'j';
        let mut view = ArrayBufferSpan::from_js(&engine, raw, TypeOptions::CHECKED).unwrap();
        assert_eq!(&*view, b"hello");

        view[0] = b'c';
        let again = ArrayBufferSpan::from_js(&engine, raw, TypeOptions::CHECKED).unwrap();
        assert_eq!(&*again, b"cello");
    }

    #[test]
    fn empty_arraybuffer_span() {
        let engine = MemoryEngine::new();
        let (raw, _) = engine.create_arraybuffer(0).unwrap();
        let span = ArrayBufferSpan::from_js(&engine, raw, TypeOptions::CHECKED).unwrap();
        assert!(span.is_empty());
        assert!(!span.as_ptr().is_null());
    }

    #[test]
    fn span_of_reads_elements() {
        let engine = MemoryEngine::new();
        let mut values = [1.5f64, -2.0];
        let span = unsafe { ArrayBufferSpanOf::from_raw_parts(values.as_mut_ptr(), 2) };
        let raw = span.to_js(&engine, TypeOptions::CHECKED).unwrap();
        let back = ArrayBufferSpanOf::<f64>::from_js(&engine, raw, TypeOptions::CHECKED).unwrap();
        assert_eq!(&*back, &[1.5, -2.0]);
    }

    #[test]
    fn typed_array_span_keeps_kind() {
        let engine = MemoryEngine::new();
        let mut values = [3i16, -4, 5];
        let span = unsafe { TypedArraySpan::from_raw_parts(values.as_mut_ptr(), 3) };
        let raw = span.to_js(&engine, TypeOptions::CHECKED).unwrap();

        let info = engine.get_typedarray_info(raw).unwrap();
        assert_eq!(info.kind, TypedArrayType::Int16);
        assert_eq!(info.len, 3);

        let back = TypedArraySpan::<i16>::from_js(&engine, raw, TypeOptions::CHECKED).unwrap();
        assert_eq!(&*back, &[3, -4, 5]);

        assert_eq!(
            TypedArraySpan::<u8>::from_js(&engine, raw, TypeOptions::CHECKED).err(),
            Some(Error::PendingException)
        );
        assert_eq!(
            engine.take_exception_message().as_deref(),
            Some("Value is not of type 'uint8array'")
        );
        assert!(matches!(
            TypedArraySpan::<f64>::from_js(&engine, raw, TypeOptions::UNCHECKED),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn any_typed_array_span_preserves_byte_length() {
        let engine = MemoryEngine::new();
        let (buffer, _) = engine.create_arraybuffer(8).unwrap();
        let raw = engine.create_typedarray(TypedArrayType::Uint16, 4, buffer, 0).unwrap();

        let span = AnyTypedArraySpan::from_js(&engine, raw, TypeOptions::CHECKED).unwrap();
        assert_eq!(span.byte_len(), 8);
        assert_eq!(span.len(), 4);
        assert_eq!(span.kind(), TypedArrayType::Uint16);

        let copy = span.to_js(&engine, TypeOptions::CHECKED).unwrap();
        let info = engine.get_typedarray_info(copy).unwrap();
        assert_eq!((info.kind, info.len), (TypedArrayType::Uint16, 4));
    }

    #[test]
    fn non_buffer_is_rejected() {
        let engine = MemoryEngine::new();
        let raw = engine.create_object().unwrap();
        assert_eq!(
            ArrayBufferSpan::from_js(&engine, raw, TypeOptions::CHECKED).err(),
            Some(Error::PendingException)
        );
        assert_eq!(
            engine.take_exception_message().as_deref(),
            Some("Value is not of type 'arraybuffer'")
        );
    }
}
