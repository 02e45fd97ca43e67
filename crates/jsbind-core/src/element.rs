//! Element types that may be viewed inside engine-owned buffers.

use crate::value::TypedArrayType;

/// Types that can be reinterpreted from raw buffer bytes.
///
/// # Safety
///
/// Implementors must be `Copy`, contain no padding-dependent invariants and
/// no pointers that the engine heap could invalidate, and every bit pattern
/// of `size_of::<Self>()` bytes must be a valid value.
pub unsafe trait Plain: Copy + 'static {}

macro_rules! impl_plain {
    ($($ty:ty),* $(,)?) => {
        $(unsafe impl Plain for $ty {})*
    };
}

impl_plain!(u8, i8, u16, i16, u32, i32, u64, i64, usize, isize, f32, f64);

unsafe impl<T: Plain, const N: usize> Plain for [T; N] {}

/// Element parameter of a typed array handle or span.
pub trait ElementKind: 'static {
    /// Name used in type errors.
    const LABEL: &'static str;
    /// Concrete typed array kind, `None` for [`AnyElement`].
    const TYPE: Option<TypedArrayType>;
}

/// A concrete numeric element with a matching typed array kind.
pub trait TypedArrayElement: ElementKind + Plain {
    const KIND: TypedArrayType;
}

/// Element marker for typed arrays of any kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnyElement {}

impl ElementKind for AnyElement {
    const LABEL: &'static str = "typedarray";
    const TYPE: Option<TypedArrayType> = None;
}

macro_rules! impl_element {
    ($($ty:ty => $kind:ident, $label:literal;)*) => {
        $(
            impl ElementKind for $ty {
                const LABEL: &'static str = $label;
                const TYPE: Option<TypedArrayType> = Some(TypedArrayType::$kind);
            }

            impl TypedArrayElement for $ty {
                const KIND: TypedArrayType = TypedArrayType::$kind;
            }
        )*
    };
}

impl_element! {
    i8 => Int8, "int8array";
    u8 => Uint8, "uint8array";
    i16 => Int16, "int16array";
    u16 => Uint16, "uint16array";
    i32 => Int32, "int32array";
    u32 => Uint32, "uint32array";
    i64 => BigInt64, "bigint64array";
    u64 => BigUint64, "biguint64array";
    f32 => Float32, "float32array";
    f64 => Float64, "float64array";
}
