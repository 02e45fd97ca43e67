//! Views over engine-owned buffer memory.
//!
//! A span is a pointer and a length into the backing store of an
//! `ArrayBuffer` or typed array. Reading a span from an engine value never
//! copies; the span aliases the engine's memory and is valid only while that
//! buffer is alive, rooted, and not detached. Writing a span to the engine
//! allocates a fresh buffer and copies the bytes in.
//!
//! Zero-length spans always carry a dangling, well-aligned pointer rather
//! than null, so slicing them is sound.

use std::fmt;
use std::mem::size_of;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::slice;

use jsbind_core::{Plain, TypedArrayElement, TypedArrayType};

fn non_null<T>(data: *mut T, len: usize) -> NonNull<T> {
    match NonNull::new(data) {
        Some(data) if len > 0 => data,
        _ => NonNull::dangling(),
    }
}

// ============================================================================
// Raw bytes
// ============================================================================

/// The bytes of an `ArrayBuffer`.
pub struct ArrayBufferSpan {
    data: NonNull<u8>,
    len: usize,
}

impl ArrayBufferSpan {
    /// # Safety
    ///
    /// `data` must be valid for reads and writes of `len` bytes for as long as
    /// the span is used. It may be null only when `len` is zero.
    pub unsafe fn from_raw_parts(data: *mut u8, len: usize) -> Self {
        Self {
            data: non_null(data, len),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.data.as_ptr()
    }
}

impl Deref for ArrayBufferSpan {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }
}

impl DerefMut for ArrayBufferSpan {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }
}

impl fmt::Debug for ArrayBufferSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayBufferSpan")
            .field("data", &self.data)
            .field("len", &self.len)
            .finish()
    }
}

// ============================================================================
// Elements of a plain type
// ============================================================================

/// The bytes of an `ArrayBuffer` reinterpreted as `[T]`.
///
/// The element count is the byte length divided by `size_of::<T>()`, which
/// must divide it exactly.
pub struct ArrayBufferSpanOf<T: Plain> {
    data: NonNull<T>,
    len: usize,
}

impl<T: Plain> ArrayBufferSpanOf<T> {
    /// # Safety
    ///
    /// `data` must be aligned for `T` and valid for reads and writes of `len`
    /// elements for as long as the span is used.
    pub unsafe fn from_raw_parts(data: *mut T, len: usize) -> Self {
        Self {
            data: non_null(data, len),
            len,
        }
    }

    /// View raw buffer bytes as elements.
    ///
    /// # Safety
    ///
    /// As for [`ArrayBufferSpan::from_raw_parts`].
    ///
    /// # Panics
    ///
    /// If `byte_len` is not a multiple of the element size or `data` is
    /// misaligned.
    pub unsafe fn from_bytes(data: *mut u8, byte_len: usize) -> Self {
        let size = size_of::<T>();
        assert!(
            size > 0 && byte_len % size == 0,
            "buffer length {byte_len} is not a multiple of element size {size}"
        );
        let data = non_null(data, byte_len).cast::<T>();
        assert!(data.is_aligned(), "buffer is not aligned for its element type");
        Self {
            data,
            len: byte_len / size,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len * size_of::<T>()
    }

    pub fn as_ptr(&self) -> *mut T {
        self.data.as_ptr()
    }
}

impl<T: Plain> Deref for ArrayBufferSpanOf<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }
}

impl<T: Plain> DerefMut for ArrayBufferSpanOf<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }
}

impl<T: Plain + fmt::Debug> fmt::Debug for ArrayBufferSpanOf<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

// ============================================================================
// A single value
// ============================================================================

/// An `ArrayBuffer` holding exactly one `T`.
pub struct ArrayBufferRef<T: Plain> {
    data: NonNull<T>,
}

impl<T: Plain> ArrayBufferRef<T> {
    /// # Safety
    ///
    /// As for [`ArrayBufferSpan::from_raw_parts`].
    ///
    /// # Panics
    ///
    /// If `byte_len` differs from `size_of::<T>()` or `data` is misaligned.
    pub unsafe fn from_bytes(data: *mut u8, byte_len: usize) -> Self {
        assert_eq!(
            byte_len,
            size_of::<T>(),
            "buffer length does not match the referenced type"
        );
        let data = non_null(data, byte_len).cast::<T>();
        assert!(data.is_aligned(), "buffer is not aligned for its element type");
        Self { data }
    }

    pub fn as_ptr(&self) -> *mut T {
        self.data.as_ptr()
    }
}

impl<T: Plain> Deref for ArrayBufferRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.data.as_ref() }
    }
}

impl<T: Plain> DerefMut for ArrayBufferRef<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.data.as_mut() }
    }
}

impl<T: Plain + fmt::Debug> fmt::Debug for ArrayBufferRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ArrayBufferRef").field(&**self).finish()
    }
}

// ============================================================================
// Typed arrays
// ============================================================================

/// The elements of a typed array of element type `E`.
pub struct TypedArraySpan<E: TypedArrayElement> {
    data: NonNull<E>,
    len: usize,
}

impl<E: TypedArrayElement> TypedArraySpan<E> {
    /// # Safety
    ///
    /// As for [`ArrayBufferSpanOf::from_raw_parts`].
    pub unsafe fn from_raw_parts(data: *mut E, len: usize) -> Self {
        Self {
            data: non_null(data, len),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *mut E {
        self.data.as_ptr()
    }
}

impl<E: TypedArrayElement> Deref for TypedArraySpan<E> {
    type Target = [E];

    fn deref(&self) -> &[E] {
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }
}

impl<E: TypedArrayElement> DerefMut for TypedArraySpan<E> {
    fn deref_mut(&mut self) -> &mut [E] {
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }
}

impl<E: TypedArrayElement + fmt::Debug> fmt::Debug for TypedArraySpan<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// The bytes of a typed array of any element kind.
///
/// The byte length is kept as reported; the element count is derived from
/// the kind's element size.
pub struct AnyTypedArraySpan {
    data: NonNull<u8>,
    byte_len: usize,
    kind: TypedArrayType,
}

impl AnyTypedArraySpan {
    /// # Safety
    ///
    /// `data` must be valid for reads and writes of `byte_len` bytes for as
    /// long as the span is used.
    pub unsafe fn from_raw_parts(data: *mut u8, byte_len: usize, kind: TypedArrayType) -> Self {
        Self {
            data: non_null(data, byte_len),
            byte_len,
            kind,
        }
    }

    pub fn kind(&self) -> TypedArrayType {
        self.kind
    }

    /// Number of elements of the array's own kind.
    pub fn len(&self) -> usize {
        self.byte_len / self.kind.element_size()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len == 0
    }

    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    /// Number of whole `T` values the bytes hold.
    pub fn len_of<T: Plain>(&self) -> usize {
        self.byte_len / size_of::<T>()
    }

    /// Reinterpret the bytes as `[T]`.
    ///
    /// # Panics
    ///
    /// If the byte length is not a multiple of `size_of::<T>()` or the data
    /// is misaligned for `T`.
    pub fn as_slice_of<T: Plain>(&self) -> &[T] {
        if self.byte_len == 0 {
            return &[];
        }
        let size = size_of::<T>();
        assert!(
            self.byte_len % size == 0,
            "typed array length {} is not a multiple of element size {size}",
            self.byte_len
        );
        let data = self.data.cast::<T>();
        assert!(data.is_aligned(), "typed array is not aligned for the element type");
        unsafe { slice::from_raw_parts(data.as_ptr(), self.byte_len / size) }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.data.as_ptr()
    }
}

impl Deref for AnyTypedArraySpan {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.data.as_ptr(), self.byte_len) }
    }
}

impl DerefMut for AnyTypedArraySpan {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.data.as_ptr(), self.byte_len) }
    }
}

impl fmt::Debug for AnyTypedArraySpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyTypedArraySpan")
            .field("kind", &self.kind)
            .field("byte_len", &self.byte_len)
            .finish()
    }
}
