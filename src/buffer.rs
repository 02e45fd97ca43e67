//! `ArrayBuffer` and typed array constructors and accessors.
//!
//! Constructors that allocate return the new value together with a span
//! over its zero-filled backing store, so the caller can fill it in place.

use std::mem::size_of;

use jsbind_core::{
    AnyElement, Env, Error, Handle, JsArrayBuffer, JsTypedArray, Plain, Result, TypedArrayElement,
    TypedArrayType,
};

use crate::convert::{FromJs, copy_to_arraybuffer, plain_bytes};
use crate::options::TypeOptions;
use crate::span::{
    AnyTypedArraySpan, ArrayBufferRef, ArrayBufferSpan, ArrayBufferSpanOf, TypedArraySpan,
};
use crate::wrap::Finalizer;

// ============================================================================
// ArrayBuffer
// ============================================================================

/// Allocate a zero-filled buffer of `len` bytes.
pub fn create_arraybuffer(env: &Env, len: usize) -> Result<(JsArrayBuffer, ArrayBufferSpan)> {
    let (buffer, data) = env.create_arraybuffer(len)?;
    Ok((Handle::from_raw(buffer), unsafe { ArrayBufferSpan::from_raw_parts(data, len) }))
}

/// Allocate a zero-filled buffer of `len` values of `T`.
pub fn create_arraybuffer_of<T: Plain>(
    env: &Env,
    len: usize,
) -> Result<(JsArrayBuffer, ArrayBufferSpanOf<T>)> {
    let byte_len = len
        .checked_mul(size_of::<T>())
        .ok_or(Error::InvalidArgument("buffer length overflows usize"))?;
    let (buffer, data) = env.create_arraybuffer(byte_len)?;
    Ok((Handle::from_raw(buffer), unsafe { ArrayBufferSpanOf::from_bytes(data, byte_len) }))
}

/// Allocate a zero-filled buffer sized for one `T`.
pub fn create_arraybuffer_for<T: Plain>(env: &Env) -> Result<(JsArrayBuffer, ArrayBufferRef<T>)> {
    let byte_len = size_of::<T>();
    let (buffer, data) = env.create_arraybuffer(byte_len)?;
    Ok((Handle::from_raw(buffer), unsafe { ArrayBufferRef::from_bytes(data, byte_len) }))
}

/// Allocate a buffer holding a copy of `values`.
pub fn create_arraybuffer_from<T: Plain>(env: &Env, values: &[T]) -> Result<JsArrayBuffer> {
    copy_to_arraybuffer(env, plain_bytes(values)).map(Handle::from_raw)
}

/// Expose `len` bytes at `data` without copying.
///
/// # Safety
///
/// `data` must stay valid for reads and writes of `len` bytes until the
/// finalizer runs, or for the life of the environment if there is none.
pub unsafe fn create_external_arraybuffer(
    env: &Env,
    data: *mut u8,
    len: usize,
    finalizer: Option<Finalizer<u8>>,
) -> Result<JsArrayBuffer> {
    env.create_external_arraybuffer(data, len, finalizer.map(Finalizer::into_callback))
        .map(Handle::from_raw)
}

/// Hand a vector to the engine without copying; it is freed on collection.
pub fn create_arraybuffer_from_vec(env: &Env, bytes: Vec<u8>) -> Result<JsArrayBuffer> {
    let len = bytes.len();
    let data = Box::into_raw(bytes.into_boxed_slice()).cast::<u8>();
    let finalizer = Finalizer::new(move |_, data: *mut u8| {
        drop(unsafe { Box::from_raw(std::ptr::slice_from_raw_parts_mut(data, len)) })
    });
    unsafe { create_external_arraybuffer(env, data, len, Some(finalizer)) }
}

/// Detach `buffer`; its length becomes zero.
pub fn detach_arraybuffer(env: &Env, buffer: JsArrayBuffer) -> Result<()> {
    env.detach_arraybuffer(buffer.to_raw()?)
}

/// The bytes of `buffer`.
pub fn get_arraybuffer_info(env: &Env, buffer: JsArrayBuffer) -> Result<ArrayBufferSpan> {
    ArrayBufferSpan::from_js(env, buffer.to_raw()?, TypeOptions::default())
}

/// The contents of `buffer` as values of `T`.
pub fn get_arraybuffer_info_of<T: Plain>(
    env: &Env,
    buffer: JsArrayBuffer,
) -> Result<ArrayBufferSpanOf<T>> {
    ArrayBufferSpanOf::from_js(env, buffer.to_raw()?, TypeOptions::default())
}

// ============================================================================
// Typed arrays
// ============================================================================

/// Allocate a zero-filled typed array of `len` elements.
pub fn create_typedarray<E: TypedArrayElement>(
    env: &Env,
    len: usize,
) -> Result<(JsTypedArray<E>, TypedArraySpan<E>)> {
    let (buffer, _) = create_arraybuffer_of::<E>(env, len)?;
    let array = create_typedarray_on::<E>(env, buffer, 0, len)?;
    let span = get_typedarray_info(env, array)?;
    Ok((array, span))
}

/// View `len` elements of `buffer` starting at byte `offset`.
///
/// A misaligned offset or a view past the end raises a `RangeError`.
pub fn create_typedarray_on<E: TypedArrayElement>(
    env: &Env,
    buffer: JsArrayBuffer,
    offset: usize,
    len: usize,
) -> Result<JsTypedArray<E>> {
    env.create_typedarray(E::KIND, len, buffer.to_raw()?, offset)
        .map(Handle::from_raw)
}

/// Allocate a typed array holding a copy of `values`.
pub fn create_typedarray_from<E: TypedArrayElement>(
    env: &Env,
    values: &[E],
) -> Result<JsTypedArray<E>> {
    let buffer = create_arraybuffer_from(env, values)?;
    create_typedarray_on(env, buffer, 0, values.len())
}

/// View `len` elements of kind `kind` over `buffer`.
pub fn create_any_typedarray(
    env: &Env,
    kind: TypedArrayType,
    buffer: JsArrayBuffer,
    offset: usize,
    len: usize,
) -> Result<JsTypedArray<AnyElement>> {
    env.create_typedarray(kind, len, buffer.to_raw()?, offset)
        .map(Handle::from_raw)
}

/// The elements of `array`.
pub fn get_typedarray_info<E: TypedArrayElement>(
    env: &Env,
    array: JsTypedArray<E>,
) -> Result<TypedArraySpan<E>> {
    TypedArraySpan::from_js(env, array.to_raw()?, TypeOptions::default())
}

/// The bytes and element kind of `array`.
pub fn get_any_typedarray_info(
    env: &Env,
    array: JsTypedArray<AnyElement>,
) -> Result<AnyTypedArraySpan> {
    AnyTypedArraySpan::from_js(env, array.to_raw()?, TypeOptions::default())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use jsbind_sandbox::MemoryEngine;

    use super::*;
    use crate::scope::HandleScope;

    #[test]
    fn arraybuffer_of_rejects_overflowing_length() {
        let engine = MemoryEngine::new();
        let result = create_arraybuffer_of::<u64>(&engine, usize::MAX / 4);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn arraybuffer_is_zero_filled_and_writable() {
        let engine = MemoryEngine::new();
        let (buffer, mut span) = create_arraybuffer(&engine, 4).unwrap();
        assert_eq!(&*span, &[0, 0, 0, 0]);
        span.copy_from_slice(b"abcd");
        assert_eq!(&*get_arraybuffer_info(&engine, buffer).unwrap(), b"abcd");
    }

    #[test]
    fn arraybuffer_of_and_for() {
        let engine = MemoryEngine::new();
        let (buffer, mut words) = create_arraybuffer_of::<u32>(&engine, 3).unwrap();
        words[2] = 9;
        assert_eq!(&*get_arraybuffer_info_of::<u32>(&engine, buffer).unwrap(), &[0, 0, 9]);
        assert_eq!(get_arraybuffer_info(&engine, buffer).unwrap().len(), 12);

        let (single, mut value) = create_arraybuffer_for::<[f32; 2]>(&engine).unwrap();
        *value = [1.0, 2.0];
        assert_eq!(get_arraybuffer_info(&engine, single).unwrap().len(), 8);
    }

    #[test]
    fn arraybuffer_from_copies() {
        let engine = MemoryEngine::new();
        let buffer = create_arraybuffer_from(&engine, &[1u16, 2]).unwrap();
        assert_eq!(get_arraybuffer_info(&engine, buffer).unwrap().len(), 4);
        assert_eq!(&*get_arraybuffer_info_of::<u16>(&engine, buffer).unwrap(), &[1, 2]);
    }

    #[test]
    fn detached_buffer_is_empty() {
        let engine = MemoryEngine::new();
        let (buffer, _) = create_arraybuffer(&engine, 16).unwrap();
        detach_arraybuffer(&engine, buffer).unwrap();
        let span = get_arraybuffer_info(&engine, buffer).unwrap();
        assert!(span.is_empty());
        assert!(!span.as_ptr().is_null());
    }

    #[test]
    fn external_buffer_finalizer_runs_on_collection() {
        let engine = MemoryEngine::new();
        let freed = Rc::new(Cell::new(false));
        {
            let _scope = HandleScope::open(&engine);
            let data = Box::into_raw(Box::new([7u8; 3])).cast::<u8>();
            let flag = freed.clone();
            let finalizer = Finalizer::new(move |_, data: *mut u8| {
                drop(unsafe { Box::from_raw(data.cast::<[u8; 3]>()) });
                flag.set(true);
            });
            let buffer =
                unsafe { create_external_arraybuffer(&engine, data, 3, Some(finalizer)) }.unwrap();
            assert_eq!(&*get_arraybuffer_info(&engine, buffer).unwrap(), &[7, 7, 7]);
        }
        assert!(!freed.get());
        engine.collect_garbage();
        assert!(freed.get());
    }

    #[test]
    fn vec_backed_buffer() {
        let engine = MemoryEngine::new();
        let buffer = create_arraybuffer_from_vec(&engine, b"hello".to_vec()).unwrap();
        assert_eq!(&*get_arraybuffer_info(&engine, buffer).unwrap(), b"hello");
    }

    #[test]
    fn typed_arrays() {
        let engine = MemoryEngine::new();
        let (array, mut span) = create_typedarray::<i32>(&engine, 3).unwrap();
        span[1] = -8;
        assert_eq!(&*get_typedarray_info(&engine, array).unwrap(), &[0, -8, 0]);

        let copy = create_typedarray_from(&engine, &[0.5f64, 1.5]).unwrap();
        assert_eq!(&*get_typedarray_info(&engine, copy).unwrap(), &[0.5, 1.5]);
    }

    #[test]
    fn typed_array_on_offset() {
        let engine = MemoryEngine::new();
        let buffer = create_arraybuffer_from(&engine, &[1u16, 2, 3, 4]).unwrap();
        let tail = create_typedarray_on::<u16>(&engine, buffer, 4, 2).unwrap();
        assert_eq!(&*get_typedarray_info(&engine, tail).unwrap(), &[3, 4]);

        assert_eq!(
            create_typedarray_on::<u32>(&engine, buffer, 2, 1),
            Err(Error::PendingException)
        );
        assert_eq!(
            engine.take_exception_message().as_deref(),
            Some("start offset of Uint32Array should be a multiple of 4")
        );
    }

    #[test]
    fn any_typedarray_info_recomputes_length() {
        let engine = MemoryEngine::new();
        let (buffer, _) = create_arraybuffer(&engine, 8).unwrap();
        let array = create_any_typedarray(&engine, TypedArrayType::Uint16, buffer, 0, 4).unwrap();
        let span = get_any_typedarray_info(&engine, array).unwrap();
        assert_eq!(span.kind(), TypedArrayType::Uint16);
        assert_eq!(span.byte_len(), 8);
        assert_eq!(span.len(), 4);
        assert_eq!(span.len_of::<u64>(), 1);
    }
}
