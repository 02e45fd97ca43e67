//! Raw engine values and the tags used to describe them.
//!
//! [`RawValue`] is the untyped, non-owning reference an engine hands out
//! for a value living in its heap. [`Signature`] tags describe the category
//! a native type maps to, and [`TypedValue`] carries arguments and results
//! across the typed (fast) calling convention.

use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroU64;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Opaque reference to a value inside an engine heap.
///
/// The bit pattern is chosen by the engine. The binding layer never
/// interprets it; it only passes it back to the engine that produced it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawValue(NonZeroU64);

impl RawValue {
    /// Build a value reference from engine-chosen bits.
    #[inline]
    pub const fn from_bits(bits: NonZeroU64) -> Self {
        Self(bits)
    }

    /// The engine-chosen bits of this reference.
    #[inline]
    pub const fn to_bits(self) -> NonZeroU64 {
        self.0
    }
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawValue({:#x})", self.0.get())
    }
}

/// Runtime category of a value, as reported by `typeof`-style inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum ValueType {
    Undefined = 0,
    Null = 1,
    Boolean = 2,
    Number = 3,
    String = 4,
    Symbol = 5,
    Object = 6,
    External = 7,
    BigInt = 8,
    Function = 9,
}

impl ValueType {
    /// Whether values of this type can carry properties.
    pub fn is_object_like(self) -> bool {
        matches!(self, ValueType::Object | ValueType::Function)
    }
}

/// Category tag a native type declares for call signatures.
///
/// The engine uses these tags to decide whether a call site can take the
/// typed path and how to unwrap arguments for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum Signature {
    Undefined = 0,
    Boolean = 1,
    Int32 = 2,
    Uint32 = 3,
    Float64 = 4,
    BigInt = 5,
    BigInt64 = 6,
    BigUint64 = 7,
    String = 8,
    Symbol = 9,
    Object = 10,
    Function = 11,
    External = 12,
    Any = 13,
}

impl Signature {
    /// Whether a typed-path value of this category arrives unwrapped
    /// (as a native scalar or pointer) rather than as a [`RawValue`].
    pub const fn is_unwrapped(self) -> bool {
        matches!(
            self,
            Signature::Boolean
                | Signature::Int32
                | Signature::Uint32
                | Signature::Float64
                | Signature::BigInt64
                | Signature::BigUint64
                | Signature::External
        )
    }
}

/// Argument and result tags of a registered function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSignature {
    /// Result category.
    pub result: Signature,
    /// Positional argument categories, excluding the receiver.
    pub args: Vec<Signature>,
    /// Whether the native function takes the receiver as its first argument.
    pub receiver: bool,
}

impl CallSignature {
    /// Number of positional arguments a typed call site must supply.
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// A value passed through the typed calling convention.
///
/// Arguments whose [`Signature`] is unwrapped arrive as the matching
/// scalar or pointer variant; everything else arrives as [`TypedValue::Value`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypedValue {
    Undefined,
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Float64(f64),
    BigInt64(i64),
    BigUint64(u64),
    Pointer(*mut c_void),
    Value(RawValue),
}

impl TypedValue {
    /// The raw value, if this is a boxed value.
    pub fn as_value(&self) -> Option<RawValue> {
        match self {
            TypedValue::Value(value) => Some(*value),
            _ => None,
        }
    }
}

/// Element kind of a typed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum TypedArrayType {
    Int8 = 0,
    Uint8 = 1,
    Uint8Clamped = 2,
    Int16 = 3,
    Uint16 = 4,
    Int32 = 5,
    Uint32 = 6,
    Float16 = 7,
    Float32 = 8,
    Float64 = 9,
    BigInt64 = 10,
    BigUint64 = 11,
}

impl TypedArrayType {
    /// Size in bytes of one element of this kind.
    pub const fn element_size(self) -> usize {
        match self {
            TypedArrayType::Int8 | TypedArrayType::Uint8 | TypedArrayType::Uint8Clamped => 1,
            TypedArrayType::Int16 | TypedArrayType::Uint16 | TypedArrayType::Float16 => 2,
            TypedArrayType::Int32 | TypedArrayType::Uint32 | TypedArrayType::Float32 => 4,
            TypedArrayType::Float64 | TypedArrayType::BigInt64 | TypedArrayType::BigUint64 => 8,
        }
    }

    /// Element size for an optional kind; unknown kinds count as bytes.
    pub fn element_size_of(kind: Option<TypedArrayType>) -> usize {
        kind.map_or(1, TypedArrayType::element_size)
    }
}

/// What an engine reports about a typed array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypedArrayInfo {
    pub kind: TypedArrayType,
    /// First element of the view (already offset into the buffer).
    pub data: *mut u8,
    /// Length in elements.
    pub len: usize,
    pub arraybuffer: RawValue,
    /// Byte offset of the view into its buffer.
    pub offset: usize,
}

impl TypedArrayInfo {
    /// Length of the view in bytes.
    pub fn byte_len(&self) -> usize {
        self.len * self.kind.element_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_value_round_trips_bits() {
        let bits = NonZeroU64::new(0x1234).unwrap();
        assert_eq!(RawValue::from_bits(bits).to_bits(), bits);
    }

    #[test]
    fn element_sizes() {
        assert_eq!(TypedArrayType::Uint8Clamped.element_size(), 1);
        assert_eq!(TypedArrayType::Float16.element_size(), 2);
        assert_eq!(TypedArrayType::Float32.element_size(), 4);
        assert_eq!(TypedArrayType::BigUint64.element_size(), 8);
        assert_eq!(TypedArrayType::element_size_of(None), 1);
    }

    #[test]
    fn unwrapped_signatures() {
        assert!(Signature::Int32.is_unwrapped());
        assert!(Signature::External.is_unwrapped());
        assert!(!Signature::String.is_unwrapped());
        assert!(!Signature::BigInt.is_unwrapped());
        assert!(!Signature::Any.is_unwrapped());
    }

    #[test]
    fn signature_tags_are_stable() {
        assert_eq!(i32::from(Signature::Any), 13);
        assert_eq!(Signature::try_from(2).ok(), Some(Signature::Int32));
        assert!(Signature::try_from(99).is_err());
    }

    #[test]
    fn value_type_object_like() {
        assert!(ValueType::Function.is_object_like());
        assert!(!ValueType::External.is_object_like());
    }

    #[test]
    fn typed_value_as_value() {
        let raw = RawValue::from_bits(NonZeroU64::new(7).unwrap());
        assert_eq!(TypedValue::Value(raw).as_value(), Some(raw));
        assert_eq!(TypedValue::Int32(1).as_value(), None);
    }
}
