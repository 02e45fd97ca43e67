//! The capability interface a JavaScript engine exposes to native code.
//!
//! The binding layer is written entirely against [`Engine`]. It never
//! creates, inspects, or collects values itself; it asks the engine. An
//! engine is single-threaded: every method is called on the thread that
//! runs the environment, and callbacks re-enter the engine through the
//! `&Env` they receive.

use std::any::TypeId;
use std::ffi::c_void;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::error::Result;
use crate::value::{CallSignature, RawValue, TypedArrayInfo, TypedArrayType, TypedValue, ValueType};

/// The environment type callbacks receive.
pub type Env = dyn Engine;

/// Called once by the collector with the data pointer it was registered for.
pub type FinalizeCallback = Box<dyn FnOnce(&Env, *mut c_void)>;

/// Slow-path entry point: receives the boxed receiver and arguments.
///
/// Returning `None` yields `undefined`.
pub type UntypedCallback = Rc<dyn Fn(&Env, &CallbackInfo) -> Option<RawValue>>;

/// Fast-path entry point: receives arguments unwrapped per [`CallSignature`].
///
/// When the signature declares a receiver, it is passed first as
/// [`TypedValue::Value`].
pub type TypedCallback = Rc<dyn Fn(&Env, &[TypedValue]) -> TypedValue>;

/// Called when the environment is torn down.
pub type TeardownCallback = Box<dyn FnOnce(&Env)>;

/// Called when the environment is torn down; teardown completes only once
/// the handle it receives is finished.
pub type DeferredTeardownCallback = Box<dyn FnOnce(&Env, DeferredTeardown)>;

/// Outstanding work of a deferred teardown callback.
///
/// The environment keeps its remaining values, and their finalizers, until
/// every handle it gave out is finished. Dropping an unfinished handle
/// finishes it.
pub struct DeferredTeardown {
    finish: Option<Box<dyn FnOnce()>>,
}

impl DeferredTeardown {
    /// A handle that runs `finish` once it is finished or dropped.
    pub fn new(finish: impl FnOnce() + 'static) -> Self {
        Self {
            finish: Some(Box::new(finish)),
        }
    }

    /// Signal that the deferred work is done.
    pub fn finish(mut self) {
        if let Some(finish) = self.finish.take() {
            finish();
        }
    }
}

impl Drop for DeferredTeardown {
    fn drop(&mut self) {
        if let Some(finish) = self.finish.take() {
            finish();
        }
    }
}

impl fmt::Debug for DeferredTeardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredTeardown")
            .field("finished", &self.finish.is_none())
            .finish()
    }
}

/// Typed entry point plus the signature the engine validates call sites against.
#[derive(Clone)]
pub struct TypedEntry {
    pub signature: CallSignature,
    pub callback: TypedCallback,
}

impl fmt::Debug for TypedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedEntry")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// Receiver and positional arguments of an untyped call.
#[derive(Debug, Clone)]
pub struct CallbackInfo {
    receiver: RawValue,
    args: Vec<RawValue>,
}

impl CallbackInfo {
    pub fn new(receiver: RawValue, args: Vec<RawValue>) -> Self {
        Self { receiver, args }
    }

    /// The `this` value of the call.
    pub fn receiver(&self) -> RawValue {
        self.receiver
    }

    pub fn args(&self) -> &[RawValue] {
        &self.args
    }

    /// Number of arguments the caller actually passed.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }
}

bitflags! {
    /// Attributes of a defined property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyAttributes: u32 {
        const WRITABLE = 1 << 0;
        const ENUMERABLE = 1 << 1;
        const CONFIGURABLE = 1 << 2;
        const STATIC = 1 << 10;
    }
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        PropertyAttributes::WRITABLE
            | PropertyAttributes::ENUMERABLE
            | PropertyAttributes::CONFIGURABLE
    }
}

/// A data property to define on an object.
#[derive(Debug, Clone, Copy)]
pub struct PropertyDescriptor {
    /// Property key: a string or symbol.
    pub name: RawValue,
    pub value: RawValue,
    pub attributes: PropertyAttributes,
}

/// Identifies an open handle scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// Identifies a reference created by [`Engine::create_reference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceId(pub u64);

/// Identifies a registered teardown callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TeardownId(pub u64);

/// Identifies the native type whose data an object carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeTag(TypeId);

impl TypeTag {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(TypeId::of::<T>())
    }
}

/// Primitive operations of an embedded JavaScript engine.
pub trait Engine {
    // ========================================================================
    // Singletons and primitives
    // ========================================================================

    fn get_undefined(&self) -> Result<RawValue>;
    fn get_null(&self) -> Result<RawValue>;
    fn get_global(&self) -> Result<RawValue>;
    fn get_boolean(&self, value: bool) -> Result<RawValue>;

    fn create_int32(&self, value: i32) -> Result<RawValue>;
    fn create_uint32(&self, value: u32) -> Result<RawValue>;
    fn create_double(&self, value: f64) -> Result<RawValue>;
    fn create_bigint_int64(&self, value: i64) -> Result<RawValue>;
    fn create_bigint_uint64(&self, value: u64) -> Result<RawValue>;
    fn create_string_utf8(&self, value: &[u8]) -> Result<RawValue>;
    fn create_string_utf16le(&self, value: &[u16]) -> Result<RawValue>;
    fn create_symbol(&self, description: Option<RawValue>) -> Result<RawValue>;

    fn get_value_bool(&self, value: RawValue) -> Result<bool>;
    fn get_value_int32(&self, value: RawValue) -> Result<i32>;
    fn get_value_uint32(&self, value: RawValue) -> Result<u32>;
    fn get_value_double(&self, value: RawValue) -> Result<f64>;
    /// Returns the value truncated to 64 bits and whether that was lossless.
    fn get_value_bigint_int64(&self, value: RawValue) -> Result<(i64, bool)>;
    /// Returns the value truncated to 64 bits and whether that was lossless.
    fn get_value_bigint_uint64(&self, value: RawValue) -> Result<(u64, bool)>;
    /// Copies UTF-8 into `buf` if given and returns the full length in bytes.
    fn get_value_string_utf8(&self, value: RawValue, buf: Option<&mut [u8]>) -> Result<usize>;
    /// Copies UTF-16 into `buf` if given and returns the full length in code units.
    fn get_value_string_utf16le(&self, value: RawValue, buf: Option<&mut [u16]>) -> Result<usize>;

    // ========================================================================
    // Inspection
    // ========================================================================

    fn type_of(&self, value: RawValue) -> Result<ValueType>;
    fn is_int32(&self, value: RawValue) -> Result<bool>;
    fn is_uint32(&self, value: RawValue) -> Result<bool>;
    fn is_array(&self, value: RawValue) -> Result<bool>;
    fn is_arraybuffer(&self, value: RawValue) -> Result<bool>;
    fn is_typedarray(&self, value: RawValue) -> Result<bool>;
    fn strict_equals(&self, a: RawValue, b: RawValue) -> Result<bool>;

    // ========================================================================
    // Objects and arrays
    // ========================================================================

    fn create_object(&self) -> Result<RawValue>;
    fn get_property(&self, object: RawValue, key: RawValue) -> Result<RawValue>;
    fn set_property(&self, object: RawValue, key: RawValue, value: RawValue) -> Result<()>;
    fn has_property(&self, object: RawValue, key: RawValue) -> Result<bool>;
    fn delete_property(&self, object: RawValue, key: RawValue) -> Result<bool>;
    fn get_named_property(&self, object: RawValue, name: &str) -> Result<RawValue>;
    fn set_named_property(&self, object: RawValue, name: &str, value: RawValue) -> Result<()>;
    fn define_properties(&self, object: RawValue, properties: &[PropertyDescriptor]) -> Result<()>;
    fn get_element(&self, object: RawValue, index: u32) -> Result<RawValue>;
    fn set_element(&self, object: RawValue, index: u32, value: RawValue) -> Result<()>;

    fn create_array_with_length(&self, len: usize) -> Result<RawValue>;
    fn get_array_length(&self, array: RawValue) -> Result<u32>;
    /// Reads up to `len` elements starting at `offset`.
    fn get_array_elements(&self, array: RawValue, offset: u32, len: usize) -> Result<Vec<RawValue>>;
    fn set_array_elements(&self, array: RawValue, values: &[RawValue], offset: u32) -> Result<()>;

    // ========================================================================
    // Buffers
    // ========================================================================

    /// Allocates a zero-filled buffer and returns it with its backing store.
    ///
    /// The backing store is aligned to 8 bytes.
    fn create_arraybuffer(&self, len: usize) -> Result<(RawValue, *mut u8)>;
    /// Exposes caller-owned memory as a buffer without copying.
    fn create_external_arraybuffer(
        &self,
        data: *mut u8,
        len: usize,
        finalize: Option<FinalizeCallback>,
    ) -> Result<RawValue>;
    fn detach_arraybuffer(&self, arraybuffer: RawValue) -> Result<()>;
    fn get_arraybuffer_info(&self, arraybuffer: RawValue) -> Result<(*mut u8, usize)>;
    fn create_typedarray(
        &self,
        kind: TypedArrayType,
        len: usize,
        arraybuffer: RawValue,
        offset: usize,
    ) -> Result<RawValue>;
    fn get_typedarray_info(&self, typedarray: RawValue) -> Result<TypedArrayInfo>;

    // ========================================================================
    // Handle scopes
    // ========================================================================

    fn open_handle_scope(&self) -> Result<ScopeId>;
    fn close_handle_scope(&self, scope: ScopeId) -> Result<()>;
    fn open_escapable_handle_scope(&self) -> Result<ScopeId>;
    fn close_escapable_handle_scope(&self, scope: ScopeId) -> Result<()>;
    /// Roots `value` in the scope enclosing `scope`. Allowed once per scope.
    fn escape_handle(&self, scope: ScopeId, value: RawValue) -> Result<RawValue>;

    // ========================================================================
    // Functions
    // ========================================================================

    /// Creates a function object. The engine may call `typed` for call sites
    /// that match its signature and must call `untyped` otherwise.
    fn create_function(
        &self,
        name: &str,
        untyped: UntypedCallback,
        typed: Option<TypedEntry>,
    ) -> Result<RawValue>;
    fn call_function(
        &self,
        receiver: RawValue,
        function: RawValue,
        args: &[RawValue],
    ) -> Result<RawValue>;

    // ========================================================================
    // Exceptions
    // ========================================================================

    fn throw(&self, error: RawValue) -> Result<()>;
    fn throw_error(&self, code: Option<&str>, message: &str) -> Result<()>;
    fn throw_type_error(&self, code: Option<&str>, message: &str) -> Result<()>;
    fn throw_range_error(&self, code: Option<&str>, message: &str) -> Result<()>;
    fn is_exception_pending(&self) -> Result<bool>;
    fn get_and_clear_last_exception(&self) -> Result<Option<RawValue>>;

    // ========================================================================
    // References
    // ========================================================================

    /// Creates a reference with initial count `count`. A count of zero is weak.
    fn create_reference(&self, value: RawValue, count: u32) -> Result<ReferenceId>;
    fn delete_reference(&self, reference: ReferenceId) -> Result<()>;
    fn reference_ref(&self, reference: ReferenceId) -> Result<u32>;
    fn reference_unref(&self, reference: ReferenceId) -> Result<u32>;
    /// `None` once a weak target has been collected.
    fn get_reference_value(&self, reference: ReferenceId) -> Result<Option<RawValue>>;

    // ========================================================================
    // Externals, wrapping, and finalization
    // ========================================================================

    fn create_external(
        &self,
        data: *mut c_void,
        finalize: Option<FinalizeCallback>,
    ) -> Result<RawValue>;
    fn get_value_external(&self, value: RawValue) -> Result<*mut c_void>;
    fn wrap(
        &self,
        object: RawValue,
        data: *mut c_void,
        finalize: Option<FinalizeCallback>,
    ) -> Result<()>;
    fn unwrap(&self, object: RawValue) -> Result<*mut c_void>;
    /// Detaches the wrapped pointer. Its finalizer will not run.
    fn remove_wrap(&self, object: RawValue) -> Result<*mut c_void>;
    fn add_finalizer(
        &self,
        object: RawValue,
        data: *mut c_void,
        finalize: FinalizeCallback,
    ) -> Result<()>;
    /// Mark `object` with `tag`. An object can be tagged once.
    fn type_tag_object(&self, object: RawValue, tag: TypeTag) -> Result<()>;
    /// Whether `object` was tagged with exactly `tag`.
    fn check_object_type_tag(&self, object: RawValue, tag: TypeTag) -> Result<bool>;

    // ========================================================================
    // Environment lifecycle
    // ========================================================================

    fn add_teardown_callback(&self, callback: TeardownCallback) -> Result<TeardownId>;
    fn add_deferred_teardown_callback(
        &self,
        callback: DeferredTeardownCallback,
    ) -> Result<TeardownId>;
    /// Unregister a plain or deferred teardown callback.
    fn remove_teardown_callback(&self, id: TeardownId) -> Result<()>;
    /// Debug hook: collect unreachable values now.
    fn request_garbage_collection(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU64;

    use super::*;

    #[test]
    fn default_attributes_are_permissive() {
        let attributes = PropertyAttributes::default();
        assert!(attributes.contains(PropertyAttributes::WRITABLE));
        assert!(attributes.contains(PropertyAttributes::ENUMERABLE));
        assert!(attributes.contains(PropertyAttributes::CONFIGURABLE));
        assert!(!attributes.contains(PropertyAttributes::STATIC));
    }

    #[test]
    fn deferred_teardown_finishes_once() {
        let finished = Rc::new(std::cell::Cell::new(0));
        let counter = finished.clone();
        let handle = DeferredTeardown::new(move || counter.set(counter.get() + 1));
        handle.finish();
        assert_eq!(finished.get(), 1);

        let counter = finished.clone();
        drop(DeferredTeardown::new(move || counter.set(counter.get() + 1)));
        assert_eq!(finished.get(), 2);
    }

    #[test]
    fn callback_info_counts_arguments() {
        let raw = |bits| RawValue::from_bits(NonZeroU64::new(bits).unwrap());
        let info = CallbackInfo::new(raw(1), vec![raw(2), raw(3)]);
        assert_eq!(info.receiver(), raw(1));
        assert_eq!(info.len(), 2);
        assert!(!info.is_empty());
        assert_eq!(info.args()[1], raw(3));
    }
}
