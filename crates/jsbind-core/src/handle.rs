//! Statically-typed handles over engine values.
//!
//! Every handle has the same representation: an optional [`RawValue`].
//! The kind parameter only narrows what the binding layer lets you do with
//! it. Moving up the lattice (`JsString` to `JsName` to `JsValue`) is free
//! and infallible through `From`; moving down is a reinterpretation with
//! [`Handle::cast`], normally validated once by a checked conversion.
//!
//! ```text
//! Value
//! ├── Primitive
//! │   ├── Boolean
//! │   ├── Numeric ── Number ── Integer
//! │   │           └─ Bigint
//! │   └── Name ── String
//! │            └─ Symbol
//! ├── Object
//! │   ├── Array
//! │   ├── ArrayBuffer
//! │   ├── TypedArray<E>
//! │   └── Function<R, A>
//! ├── External<T>
//! └── Receiver
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::element::{AnyElement, ElementKind};
use crate::error::{Error, Result};
use crate::value::RawValue;

/// Capability marker for a [`Handle`].
pub trait Kind: 'static {
    /// Category name used in type errors.
    const LABEL: &'static str;
}

/// `Self` is a narrower kind than `P`.
pub trait Extends<P: Kind>: Kind {}

/// Non-owning reference to an engine value of kind `K`.
///
/// Handles are only meaningful while the value is rooted, either by an open
/// handle scope or by a persistent reference.
pub struct Handle<K: Kind = kind::Value> {
    raw: Option<RawValue>,
    _kind: PhantomData<K>,
}

impl<K: Kind> Handle<K> {
    /// Wrap a raw value without checking its category.
    #[inline]
    pub const fn from_raw(raw: RawValue) -> Self {
        Self {
            raw: Some(raw),
            _kind: PhantomData,
        }
    }

    /// A handle referring to nothing.
    #[inline]
    pub const fn empty() -> Self {
        Self {
            raw: None,
            _kind: PhantomData,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
    }

    /// The underlying value, if any.
    #[inline]
    pub fn raw(&self) -> Option<RawValue> {
        self.raw
    }

    /// The underlying value, failing for an empty handle.
    #[inline]
    pub fn to_raw(&self) -> Result<RawValue> {
        self.raw.ok_or(Error::InvalidArgument("empty handle"))
    }

    /// Reinterpret as another kind without validation.
    #[inline]
    pub fn cast<T: Kind>(self) -> Handle<T> {
        Handle {
            raw: self.raw,
            _kind: PhantomData,
        }
    }

    /// Widen to a broader kind.
    #[inline]
    pub fn upcast<P: Kind>(self) -> Handle<P>
    where
        K: Extends<P>,
    {
        self.cast()
    }

    /// Widen to the root kind.
    #[inline]
    pub fn as_value(self) -> JsValue {
        self.cast()
    }
}

impl<K: Kind> Clone for Handle<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: Kind> Copy for Handle<K> {}

impl<K: Kind> Default for Handle<K> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K: Kind> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<K: Kind> Eq for Handle<K> {}

impl<K: Kind> Hash for Handle<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<K: Kind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw {
            Some(raw) => write!(f, "Js<{}>({:#x})", K::LABEL, raw.to_bits().get()),
            None => write!(f, "Js<{}>(empty)", K::LABEL),
        }
    }
}

impl<E: ElementKind> Handle<kind::TypedArray<E>> {
    /// Forget the element kind.
    #[inline]
    pub fn erase(self) -> JsTypedArray<AnyElement> {
        self.cast()
    }
}

impl<R: 'static, A: 'static> Handle<kind::Function<R, A>> {
    /// Forget the native signature.
    #[inline]
    pub fn erase(self) -> JsFunction {
        self.cast()
    }
}

impl JsReceiver {
    /// Use any handle as a call receiver.
    #[inline]
    pub fn of<K: Kind>(handle: Handle<K>) -> Self {
        handle.cast()
    }
}

/// Kind markers.
pub mod kind {
    use std::marker::PhantomData;

    use super::{Extends, Kind};
    use crate::element::{AnyElement, ElementKind};

    macro_rules! kinds {
        ($($name:ident => $label:literal;)*) => {
            $(
                #[derive(Debug)]
                pub enum $name {}

                impl Kind for $name {
                    const LABEL: &'static str = $label;
                }
            )*
        };
    }

    kinds! {
        Value => "value";
        Primitive => "primitive";
        Boolean => "boolean";
        Numeric => "numeric";
        Number => "number";
        Integer => "integer";
        Bigint => "bigint";
        Name => "name";
        String => "string";
        Symbol => "symbol";
        Object => "object";
        Array => "array";
        ArrayBuffer => "arraybuffer";
        Receiver => "receiver";
    }

    /// Typed array with element kind `E`.
    #[derive(Debug)]
    pub struct TypedArray<E: ElementKind = AnyElement>(PhantomData<E>);

    impl<E: ElementKind> Kind for TypedArray<E> {
        const LABEL: &'static str = E::LABEL;
    }

    /// Function whose native side returns `R` and takes the argument tuple `A`.
    #[derive(Debug)]
    pub struct Function<R = (), A = ()>(PhantomData<fn(A) -> R>);

    impl<R: 'static, A: 'static> Kind for Function<R, A> {
        const LABEL: &'static str = "function";
    }

    /// External wrapping a `*mut T`.
    #[derive(Debug)]
    pub struct External<T = ()>(PhantomData<*mut T>);

    impl<T: 'static> Kind for External<T> {
        const LABEL: &'static str = "external";
    }

    macro_rules! extends {
        ($($child:ident => $($parent:ident),+;)*) => {
            $($(impl Extends<$parent> for $child {})+)*
        };
    }

    extends! {
        Primitive => Value;
        Boolean => Primitive, Value;
        Numeric => Primitive, Value;
        Number => Numeric, Primitive, Value;
        Integer => Number, Numeric, Primitive, Value;
        Bigint => Numeric, Primitive, Value;
        Name => Primitive, Value;
        String => Name, Primitive, Value;
        Symbol => Name, Primitive, Value;
        Object => Value;
        Array => Object, Value;
        ArrayBuffer => Object, Value;
        Receiver => Value;
    }

    impl<E: ElementKind> Extends<Object> for TypedArray<E> {}
    impl<E: ElementKind> Extends<Value> for TypedArray<E> {}
    impl<R: 'static, A: 'static> Extends<Object> for Function<R, A> {}
    impl<R: 'static, A: 'static> Extends<Value> for Function<R, A> {}
    impl<T: 'static> Extends<Value> for External<T> {}
}

macro_rules! widen {
    ($($child:ident => $($parent:ident),+;)*) => {
        $($(
            impl From<Handle<kind::$child>> for Handle<kind::$parent> {
                #[inline]
                fn from(handle: Handle<kind::$child>) -> Self {
                    handle.cast()
                }
            }
        )+)*
    };
}

widen! {
    Primitive => Value;
    Boolean => Primitive, Value;
    Numeric => Primitive, Value;
    Number => Numeric, Primitive, Value;
    Integer => Number, Numeric, Primitive, Value;
    Bigint => Numeric, Primitive, Value;
    Name => Primitive, Value;
    String => Name, Primitive, Value;
    Symbol => Name, Primitive, Value;
    Object => Value;
    Array => Object, Value;
    ArrayBuffer => Object, Value;
    Receiver => Value;
}

impl<E: ElementKind> From<JsTypedArray<E>> for JsObject {
    fn from(handle: JsTypedArray<E>) -> Self {
        handle.cast()
    }
}

impl<E: ElementKind> From<JsTypedArray<E>> for JsValue {
    fn from(handle: JsTypedArray<E>) -> Self {
        handle.cast()
    }
}

impl<R: 'static, A: 'static> From<JsFunction<R, A>> for JsObject {
    fn from(handle: JsFunction<R, A>) -> Self {
        handle.cast()
    }
}

impl<R: 'static, A: 'static> From<JsFunction<R, A>> for JsValue {
    fn from(handle: JsFunction<R, A>) -> Self {
        handle.cast()
    }
}

impl<T: 'static> From<JsExternal<T>> for JsValue {
    fn from(handle: JsExternal<T>) -> Self {
        handle.cast()
    }
}

pub type JsValue = Handle<kind::Value>;
pub type JsPrimitive = Handle<kind::Primitive>;
pub type JsBoolean = Handle<kind::Boolean>;
pub type JsNumeric = Handle<kind::Numeric>;
pub type JsNumber = Handle<kind::Number>;
pub type JsInteger = Handle<kind::Integer>;
pub type JsBigint = Handle<kind::Bigint>;
pub type JsName = Handle<kind::Name>;
pub type JsString = Handle<kind::String>;
pub type JsSymbol = Handle<kind::Symbol>;
pub type JsObject = Handle<kind::Object>;
pub type JsArray = Handle<kind::Array>;
pub type JsArrayBuffer = Handle<kind::ArrayBuffer>;
pub type JsTypedArray<E = AnyElement> = Handle<kind::TypedArray<E>>;
pub type JsFunction<R = (), A = ()> = Handle<kind::Function<R, A>>;
pub type JsExternal<T = ()> = Handle<kind::External<T>>;
pub type JsReceiver = Handle<kind::Receiver>;
