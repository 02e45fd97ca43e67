//! [`MemoryEngine`]: an in-process implementation of [`Engine`].

use std::cell::{Cell, RefCell};
use std::collections::hash_map::Entry;
use std::ffi::c_void;
use std::fmt;
use std::rc::Rc;

use jsbind_core::{
    CallSignature, CallbackInfo, DeferredTeardown, DeferredTeardownCallback, Engine, Env, Error,
    FinalizeCallback, PropertyAttributes,
    PropertyDescriptor, RawValue, ReferenceId, Result, ScopeId, Signature, TeardownCallback,
    TeardownId, TypeTag, TypedArrayInfo, TypedArrayType, TypedEntry, TypedValue, UntypedCallback,
    ValueType,
};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::heap::{
    Attached, BufferData, Class, FunctionData, Heap, HeapValue, Key, ObjectData, Property,
    Storage, TypedArrayData,
};
use crate::number;

/// Configuration of a [`MemoryEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxOptions {
    /// Take the typed path for call sites that match a function's signature.
    pub fast_calls: bool,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self { fast_calls: true }
    }
}

struct Scope {
    id: ScopeId,
    escapable: bool,
    escaped: bool,
    handles: Vec<RawValue>,
}

impl Scope {
    fn new(id: ScopeId, escapable: bool) -> Self {
        Self {
            id,
            escapable,
            escaped: false,
            handles: Vec::new(),
        }
    }
}

enum Teardown {
    Immediate(TeardownCallback),
    Deferred(DeferredTeardownCallback),
}

/// Teardown waiting on deferred callbacks. Counts one extra for the
/// teardown itself until every callback has run.
struct PendingTeardown {
    outstanding: Cell<usize>,
    rest: RefCell<Option<MemoryEngine>>,
}

impl PendingTeardown {
    fn release(&self) {
        let outstanding = self.outstanding.get() - 1;
        self.outstanding.set(outstanding);
        if outstanding == 0 {
            let rest = self.rest.borrow_mut().take();
            if rest.is_some() {
                debug!("deferred teardown finished");
            }
            drop(rest);
        }
    }
}

pub(crate) struct Reference {
    pub value: Option<RawValue>,
    pub count: u32,
}

/// Values that are never collected.
pub(crate) struct Permanent {
    pub undefined: RawValue,
    pub null: RawValue,
    pub true_value: RawValue,
    pub false_value: RawValue,
    pub global: RawValue,
}

impl Permanent {
    pub(crate) fn all(&self) -> [RawValue; 5] {
        [
            self.undefined,
            self.null,
            self.true_value,
            self.false_value,
            self.global,
        ]
    }
}

/// Element read out of a lookup before the heap borrow ends.
enum Found {
    Value(RawValue),
    Number(f64),
    Text(String),
    Element(usize),
    Missing,
}

pub(crate) struct State {
    pub heap: Heap,
    scopes: Vec<Scope>,
    next_scope: u32,
    pub references: FxHashMap<u64, Reference>,
    next_reference: u64,
    pub pending: Option<RawValue>,
    pub permanent: Permanent,
    teardown: Vec<(TeardownId, Teardown)>,
    next_teardown: u64,
}

impl State {
    fn new() -> Self {
        let mut heap = Heap::new();
        let permanent = Permanent {
            undefined: heap.allocate(HeapValue::Undefined),
            null: heap.allocate(HeapValue::Null),
            true_value: heap.allocate(HeapValue::Boolean(true)),
            false_value: heap.allocate(HeapValue::Boolean(false)),
            global: heap.allocate(HeapValue::Object(Box::new(ObjectData::new(Class::Plain)))),
        };

        Self {
            heap,
            scopes: vec![Scope::new(ScopeId(0), false)],
            next_scope: 1,
            references: FxHashMap::default(),
            next_reference: 1,
            pending: None,
            permanent,
            teardown: Vec::new(),
            next_teardown: 1,
        }
    }

    /// Every value a scope currently roots.
    pub(crate) fn scoped_handles(&self) -> impl Iterator<Item = RawValue> + '_ {
        self.scopes.iter().flat_map(|scope| scope.handles.iter().copied())
    }

    fn root(&mut self, raw: RawValue) -> RawValue {
        if let Some(scope) = self.scopes.last_mut() {
            scope.handles.push(raw);
        }
        raw
    }

    fn alloc(&mut self, value: HeapValue) -> RawValue {
        let raw = self.heap.allocate(value);
        self.root(raw)
    }

    fn alloc_object(&mut self, class: Class) -> RawValue {
        self.alloc(HeapValue::Object(Box::new(ObjectData::new(class))))
    }

    fn alloc_string(&mut self, text: &str) -> RawValue {
        self.alloc(HeapValue::String(text.encode_utf16().collect()))
    }

    fn boolean(&self, value: bool) -> RawValue {
        if value {
            self.permanent.true_value
        } else {
            self.permanent.false_value
        }
    }

    fn key(&self, raw: RawValue) -> Result<Key> {
        match self.heap.get(raw)? {
            HeapValue::String(units) => Ok(Key::String(units.clone())),
            HeapValue::Symbol(_) => Ok(Key::Symbol(raw)),
            HeapValue::Number(n) => Ok(Key::name(&number::to_key(*n))),
            _ => Err(Error::InvalidArgument("property key must be a string or symbol")),
        }
    }

    fn get_by_key(&mut self, object: RawValue, key: &Key) -> Result<RawValue> {
        let found = {
            let data = self.heap.object(object)?;
            let own = || {
                data.properties
                    .get(key)
                    .map_or(Found::Missing, |property| Found::Value(property.value))
            };
            match &data.class {
                Class::Array(elements) => match key.index() {
                    Some(index) => elements
                        .get(index as usize)
                        .map_or(Found::Missing, |value| Found::Value(*value)),
                    None if key.is_name("length") => Found::Number(elements.len() as f64),
                    None => own(),
                },
                Class::TypedArray(array) => match key.index() {
                    Some(index) => Found::Element(index as usize),
                    None if key.is_name("length") => Found::Number(array.len as f64),
                    None => own(),
                },
                Class::ArrayBuffer(buffer) if key.is_name("byteLength") => {
                    Found::Number(buffer.byte_len() as f64)
                }
                Class::Function(function) if key.is_name("name") => {
                    Found::Text(function.name.clone())
                }
                _ => own(),
            }
        };

        match found {
            Found::Value(value) => Ok(self.root(value)),
            Found::Number(n) => Ok(self.alloc(HeapValue::Number(n))),
            Found::Text(text) => Ok(self.alloc_string(&text)),
            Found::Element(index) => match self.typed_element(object, index)? {
                Some((kind, ptr)) => {
                    let value = read_element(kind, ptr)?;
                    Ok(self.alloc(value))
                }
                None => Ok(self.permanent.undefined),
            },
            Found::Missing => Ok(self.permanent.undefined),
        }
    }

    fn set_by_key(&mut self, object: RawValue, key: Key, value: RawValue) -> Result<()> {
        let undefined = self.permanent.undefined;

        if matches!(self.heap.object(object)?.class, Class::TypedArray(_)) {
            if let Some(index) = key.index() {
                let element = self.heap.get(value)?;
                let element = match element {
                    HeapValue::Number(n) => Element::Number(*n),
                    HeapValue::BigInt(n) => Element::BigInt(*n),
                    _ => return Err(Error::InvalidArgument("number or bigint expected")),
                };
                if let Some((kind, ptr)) = self.typed_element(object, index as usize)? {
                    write_element(kind, ptr, element)?;
                }
                return Ok(());
            }
        }

        let data = self.heap.object_mut(object)?;
        if let Class::Array(elements) = &mut data.class {
            if let Some(index) = key.index() {
                let index = index as usize;
                if index >= elements.len() {
                    elements.resize(index + 1, undefined);
                }
                elements[index] = value;
                return Ok(());
            }
        }

        match data.properties.entry(key) {
            Entry::Occupied(mut entry) => {
                if entry.get().attributes.contains(PropertyAttributes::WRITABLE) {
                    entry.get_mut().value = value;
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Property {
                    value,
                    attributes: PropertyAttributes::default(),
                });
            }
        }
        Ok(())
    }

    /// Kind and address of element `index` of a typed array, if in bounds.
    fn typed_element(
        &mut self,
        array: RawValue,
        index: usize,
    ) -> Result<Option<(TypedArrayType, *mut u8)>> {
        let info = self.typedarray_info(array)?;
        if index >= info.len {
            return Ok(None);
        }
        Ok(Some((
            info.kind,
            info.data.wrapping_add(index * info.kind.element_size()),
        )))
    }

    fn arraybuffer_info(&mut self, arraybuffer: RawValue) -> Result<(*mut u8, usize)> {
        match &mut self.heap.object_mut(arraybuffer)?.class {
            Class::ArrayBuffer(buffer) => Ok((buffer.data(), buffer.byte_len())),
            _ => Err(Error::InvalidArgument("arraybuffer expected")),
        }
    }

    fn typedarray_info(&mut self, typedarray: RawValue) -> Result<TypedArrayInfo> {
        let (kind, buffer, offset, len) = match &self.heap.object(typedarray)?.class {
            Class::TypedArray(array) => (array.kind, array.buffer, array.offset, array.len),
            _ => return Err(Error::InvalidArgument("typedarray expected")),
        };
        let (data, byte_len) = self.arraybuffer_info(buffer)?;
        let len = if byte_len == 0 && len > 0 { 0 } else { len };
        Ok(TypedArrayInfo {
            kind,
            data: data.wrapping_add(offset),
            len,
            arraybuffer: buffer,
            offset,
        })
    }

    fn throw_new(&mut self, name: &str, code: Option<&str>, message: &str) {
        if self.pending.is_some() {
            return;
        }

        let name = self.alloc_string(name);
        let message = self.alloc_string(message);
        let mut data = ObjectData::new(Class::Error);
        let property = |value| Property {
            value,
            attributes: PropertyAttributes::WRITABLE | PropertyAttributes::CONFIGURABLE,
        };
        data.properties.insert(Key::name("name"), property(name));
        data.properties.insert(Key::name("message"), property(message));
        if let Some(code) = code {
            let code = self.alloc_string(code);
            data.properties.insert(Key::name("code"), property(code));
        }

        let error = self.alloc(HeapValue::Object(Box::new(data)));
        self.pending = Some(error);
    }
}

enum Element {
    Number(f64),
    BigInt(i128),
}

fn read_element(kind: TypedArrayType, ptr: *mut u8) -> Result<HeapValue> {
    // SAFETY: callers pass an in-bounds element address of a live buffer.
    let value = unsafe {
        match kind {
            TypedArrayType::Int8 => HeapValue::Number(f64::from(ptr.cast::<i8>().read())),
            TypedArrayType::Uint8 | TypedArrayType::Uint8Clamped => {
                HeapValue::Number(f64::from(ptr.read()))
            }
            TypedArrayType::Int16 => {
                HeapValue::Number(f64::from(ptr.cast::<i16>().read_unaligned()))
            }
            TypedArrayType::Uint16 => {
                HeapValue::Number(f64::from(ptr.cast::<u16>().read_unaligned()))
            }
            TypedArrayType::Int32 => {
                HeapValue::Number(f64::from(ptr.cast::<i32>().read_unaligned()))
            }
            TypedArrayType::Uint32 => {
                HeapValue::Number(f64::from(ptr.cast::<u32>().read_unaligned()))
            }
            TypedArrayType::Float32 => {
                HeapValue::Number(f64::from(ptr.cast::<f32>().read_unaligned()))
            }
            TypedArrayType::Float64 => HeapValue::Number(ptr.cast::<f64>().read_unaligned()),
            TypedArrayType::BigInt64 => {
                HeapValue::BigInt(i128::from(ptr.cast::<i64>().read_unaligned()))
            }
            TypedArrayType::BigUint64 => {
                HeapValue::BigInt(i128::from(ptr.cast::<u64>().read_unaligned()))
            }
            TypedArrayType::Float16 => {
                return Err(Error::InvalidArgument("float16 elements are not supported"));
            }
        }
    };
    Ok(value)
}

fn write_element(kind: TypedArrayType, ptr: *mut u8, value: Element) -> Result<()> {
    let n = match value {
        Element::Number(n) => n,
        Element::BigInt(big) => {
            // SAFETY: callers pass an in-bounds element address of a live buffer.
            unsafe {
                match kind {
                    TypedArrayType::BigInt64 => ptr.cast::<i64>().write_unaligned(big as i64),
                    TypedArrayType::BigUint64 => ptr.cast::<u64>().write_unaligned(big as u64),
                    _ => return Err(Error::InvalidArgument("number expected")),
                }
            }
            return Ok(());
        }
    };

    // SAFETY: as above.
    unsafe {
        match kind {
            TypedArrayType::Int8 => ptr.cast::<i8>().write(number::to_int32(n) as i8),
            TypedArrayType::Uint8 => ptr.write(number::to_uint32(n) as u8),
            TypedArrayType::Uint8Clamped => {
                let clamped = if n.is_nan() { 0.0 } else { n.clamp(0.0, 255.0) };
                ptr.write(clamped.round_ties_even() as u8)
            }
            TypedArrayType::Int16 => ptr.cast::<i16>().write_unaligned(number::to_int32(n) as i16),
            TypedArrayType::Uint16 => {
                ptr.cast::<u16>().write_unaligned(number::to_uint32(n) as u16)
            }
            TypedArrayType::Int32 => ptr.cast::<i32>().write_unaligned(number::to_int32(n)),
            TypedArrayType::Uint32 => ptr.cast::<u32>().write_unaligned(number::to_uint32(n)),
            TypedArrayType::Float32 => ptr.cast::<f32>().write_unaligned(n as f32),
            TypedArrayType::Float64 => ptr.cast::<f64>().write_unaligned(n),
            TypedArrayType::BigInt64 | TypedArrayType::BigUint64 => {
                return Err(Error::InvalidArgument("bigint expected"));
            }
            TypedArrayType::Float16 => {
                return Err(Error::InvalidArgument("float16 elements are not supported"));
            }
        }
    }
    Ok(())
}

/// In-memory engine with a generational heap and mark-and-sweep collection.
///
/// It implements the full [`Engine`] capability set without a language
/// runtime: values are created and inspected only through the trait.
/// Collection happens only on [`Engine::request_garbage_collection`]; roots
/// are open handle scopes, strong references, the pending exception, and
/// the global object. Dropping the engine runs teardown callbacks in
/// reverse registration order and then every outstanding finalizer.
pub struct MemoryEngine {
    pub(crate) state: RefCell<State>,
    fast_calls: Cell<bool>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::with_options(SandboxOptions::default())
    }

    pub fn with_options(options: SandboxOptions) -> Self {
        Self {
            state: RefCell::new(State::new()),
            fast_calls: Cell::new(options.fast_calls),
        }
    }

    /// Enable or disable the typed calling convention.
    pub fn set_fast_calls(&self, enabled: bool) {
        self.fast_calls.set(enabled);
    }

    /// Number of values currently allocated, including permanent ones.
    pub fn live_values(&self) -> usize {
        self.state.borrow().heap.live_count()
    }

    /// Number of open handle scopes, not counting the implicit outer scope.
    pub fn scope_depth(&self) -> usize {
        self.state.borrow().scopes.len() - 1
    }

    /// Collect unreachable values now and return how many were freed.
    pub fn collect_garbage(&self) -> usize {
        self.collect()
    }

    /// Clear the pending exception and return its `message` property.
    pub fn take_exception_message(&self) -> Option<String> {
        let error = self.get_and_clear_last_exception().ok().flatten()?;
        let message = self.get_named_property(error, "message").ok()?;
        let len = self.get_value_string_utf8(message, None).ok()?;
        let mut buf = vec![0; len];
        self.get_value_string_utf8(message, Some(&mut buf)).ok()?;
        String::from_utf8(buf).ok()
    }

    /// Run release callbacks of freed values. Returns how many ran.
    pub(crate) fn finalize(&self, dead: Vec<HeapValue>) -> usize {
        let env: &Env = self;
        let mut count = 0;
        for value in dead {
            for attached in value.into_finalizers() {
                if let Some(finalize) = attached.finalize {
                    finalize(env, attached.data);
                    count += 1;
                }
            }
        }
        count
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> Result<R>) -> Result<R> {
        f(&mut self.state.borrow_mut())
    }

    fn alloc(&self, value: HeapValue) -> Result<RawValue> {
        Ok(self.state.borrow_mut().alloc(value))
    }

    /// Unwrap `args` for the typed path, or `None` if the call site does
    /// not match `signature`.
    fn unwrap_typed(
        &self,
        receiver: RawValue,
        signature: &CallSignature,
        args: &[RawValue],
    ) -> Result<Option<Vec<TypedValue>>> {
        if args.len() != signature.arity() {
            return Ok(None);
        }

        let state = self.state.borrow();
        let mut argv = Vec::with_capacity(args.len() + 1);
        if signature.receiver {
            argv.push(TypedValue::Value(receiver));
        }

        for (&arg, &tag) in args.iter().zip(&signature.args) {
            let typed = match (tag, state.heap.get(arg)?) {
                (Signature::Any, _) => TypedValue::Value(arg),
                (Signature::Undefined, HeapValue::Undefined) => TypedValue::Value(arg),
                (Signature::Boolean, HeapValue::Boolean(b)) => TypedValue::Bool(*b),
                (Signature::Int32, HeapValue::Number(n)) if number::is_int32(*n) => {
                    TypedValue::Int32(*n as i32)
                }
                (Signature::Uint32, HeapValue::Number(n)) if number::is_uint32(*n) => {
                    TypedValue::Uint32(*n as u32)
                }
                (Signature::Float64, HeapValue::Number(n)) => TypedValue::Float64(*n),
                (Signature::BigInt64, HeapValue::BigInt(n)) => match i64::try_from(*n) {
                    Ok(n) => TypedValue::BigInt64(n),
                    Err(_) => return Ok(None),
                },
                (Signature::BigUint64, HeapValue::BigInt(n)) => match u64::try_from(*n) {
                    Ok(n) => TypedValue::BigUint64(n),
                    Err(_) => return Ok(None),
                },
                (Signature::BigInt, HeapValue::BigInt(_))
                | (Signature::String, HeapValue::String(_))
                | (Signature::Symbol, HeapValue::Symbol(_))
                | (Signature::Object, HeapValue::Object(_)) => TypedValue::Value(arg),
                (Signature::Function, HeapValue::Object(object))
                    if matches!(object.class, Class::Function(_)) =>
                {
                    TypedValue::Value(arg)
                }
                (Signature::External, HeapValue::External(attached)) => {
                    TypedValue::Pointer(attached.data)
                }
                _ => return Ok(None),
            };
            argv.push(typed);
        }

        Ok(Some(argv))
    }

    fn box_typed(&self, value: TypedValue) -> Result<RawValue> {
        match value {
            TypedValue::Undefined => self.get_undefined(),
            TypedValue::Bool(b) => self.get_boolean(b),
            TypedValue::Int32(n) => self.create_int32(n),
            TypedValue::Uint32(n) => self.create_uint32(n),
            TypedValue::Float64(n) => self.create_double(n),
            TypedValue::BigInt64(n) => self.create_bigint_int64(n),
            TypedValue::BigUint64(n) => self.create_bigint_uint64(n),
            TypedValue::Pointer(data) => self.create_external(data, None),
            TypedValue::Value(value) => Ok(value),
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryEngine")
            .field("heap", &state.heap)
            .field("scopes", &state.scopes.len())
            .field("references", &state.references.len())
            .field("fast_calls", &self.fast_calls.get())
            .finish()
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        let this: &MemoryEngine = self;
        let env: &Env = this;

        let teardown = std::mem::take(&mut this.state.borrow_mut().teardown);
        debug!(callbacks = teardown.len(), "tearing down environment");
        let pending = Rc::new(PendingTeardown {
            outstanding: Cell::new(1),
            rest: RefCell::new(None),
        });
        for (_, callback) in teardown.into_iter().rev() {
            match callback {
                Teardown::Immediate(callback) => callback(env),
                Teardown::Deferred(callback) => {
                    pending.outstanding.set(pending.outstanding.get() + 1);
                    let handle = pending.clone();
                    callback(env, DeferredTeardown::new(move || handle.release()));
                }
            }
        }

        if pending.outstanding.get() > 1 {
            debug!(outstanding = pending.outstanding.get() - 1, "teardown deferred");
            let state = std::mem::replace(&mut *this.state.borrow_mut(), State::new());
            *pending.rest.borrow_mut() = Some(MemoryEngine {
                state: RefCell::new(state),
                fast_calls: Cell::new(this.fast_calls.get()),
            });
            pending.release();
            return;
        }

        let dead = {
            let mut state = this.state.borrow_mut();
            state.scopes.truncate(1);
            state.scopes[0].handles.clear();
            state.references.clear();
            state.pending = None;
            state.heap.drain()
        };
        let finalized = this.finalize(dead);
        debug!(finalized, "environment destroyed");
    }
}

impl Engine for MemoryEngine {
    fn get_undefined(&self) -> Result<RawValue> {
        Ok(self.state.borrow().permanent.undefined)
    }

    fn get_null(&self) -> Result<RawValue> {
        Ok(self.state.borrow().permanent.null)
    }

    fn get_global(&self) -> Result<RawValue> {
        Ok(self.state.borrow().permanent.global)
    }

    fn get_boolean(&self, value: bool) -> Result<RawValue> {
        Ok(self.state.borrow().boolean(value))
    }

    fn create_int32(&self, value: i32) -> Result<RawValue> {
        self.alloc(HeapValue::Number(f64::from(value)))
    }

    fn create_uint32(&self, value: u32) -> Result<RawValue> {
        self.alloc(HeapValue::Number(f64::from(value)))
    }

    fn create_double(&self, value: f64) -> Result<RawValue> {
        self.alloc(HeapValue::Number(value))
    }

    fn create_bigint_int64(&self, value: i64) -> Result<RawValue> {
        self.alloc(HeapValue::BigInt(i128::from(value)))
    }

    fn create_bigint_uint64(&self, value: u64) -> Result<RawValue> {
        self.alloc(HeapValue::BigInt(i128::from(value)))
    }

    fn create_string_utf8(&self, value: &[u8]) -> Result<RawValue> {
        let units = String::from_utf8_lossy(value).encode_utf16().collect();
        self.alloc(HeapValue::String(units))
    }

    fn create_string_utf16le(&self, value: &[u16]) -> Result<RawValue> {
        self.alloc(HeapValue::String(value.to_vec()))
    }

    fn create_symbol(&self, description: Option<RawValue>) -> Result<RawValue> {
        self.with_state(|state| {
            if let Some(description) = description
                && !matches!(state.heap.get(description)?, HeapValue::String(_))
            {
                return Err(Error::InvalidArgument("symbol description must be a string"));
            }
            Ok(state.alloc(HeapValue::Symbol(description)))
        })
    }

    fn get_value_bool(&self, value: RawValue) -> Result<bool> {
        match self.state.borrow().heap.get(value)? {
            HeapValue::Boolean(b) => Ok(*b),
            _ => Err(Error::InvalidArgument("boolean expected")),
        }
    }

    fn get_value_int32(&self, value: RawValue) -> Result<i32> {
        self.get_value_double(value).map(number::to_int32)
    }

    fn get_value_uint32(&self, value: RawValue) -> Result<u32> {
        self.get_value_double(value).map(number::to_uint32)
    }

    fn get_value_double(&self, value: RawValue) -> Result<f64> {
        match self.state.borrow().heap.get(value)? {
            HeapValue::Number(n) => Ok(*n),
            _ => Err(Error::InvalidArgument("number expected")),
        }
    }

    fn get_value_bigint_int64(&self, value: RawValue) -> Result<(i64, bool)> {
        match self.state.borrow().heap.get(value)? {
            HeapValue::BigInt(n) => Ok((*n as i64, i64::try_from(*n).is_ok())),
            _ => Err(Error::InvalidArgument("bigint expected")),
        }
    }

    fn get_value_bigint_uint64(&self, value: RawValue) -> Result<(u64, bool)> {
        match self.state.borrow().heap.get(value)? {
            HeapValue::BigInt(n) => Ok((*n as u64, u64::try_from(*n).is_ok())),
            _ => Err(Error::InvalidArgument("bigint expected")),
        }
    }

    fn get_value_string_utf8(&self, value: RawValue, buf: Option<&mut [u8]>) -> Result<usize> {
        let text = match self.state.borrow().heap.get(value)? {
            HeapValue::String(units) => String::from_utf16_lossy(units),
            _ => return Err(Error::InvalidArgument("string expected")),
        };
        let bytes = text.as_bytes();
        if let Some(buf) = buf {
            let n = buf.len().min(bytes.len());
            buf[..n].copy_from_slice(&bytes[..n]);
        }
        Ok(bytes.len())
    }

    fn get_value_string_utf16le(&self, value: RawValue, buf: Option<&mut [u16]>) -> Result<usize> {
        match self.state.borrow().heap.get(value)? {
            HeapValue::String(units) => {
                if let Some(buf) = buf {
                    let n = buf.len().min(units.len());
                    buf[..n].copy_from_slice(&units[..n]);
                }
                Ok(units.len())
            }
            _ => Err(Error::InvalidArgument("string expected")),
        }
    }

    fn type_of(&self, value: RawValue) -> Result<ValueType> {
        Ok(self.state.borrow().heap.get(value)?.value_type())
    }

    fn is_int32(&self, value: RawValue) -> Result<bool> {
        let state = self.state.borrow();
        Ok(matches!(state.heap.get(value)?, HeapValue::Number(n) if number::is_int32(*n)))
    }

    fn is_uint32(&self, value: RawValue) -> Result<bool> {
        let state = self.state.borrow();
        Ok(matches!(state.heap.get(value)?, HeapValue::Number(n) if number::is_uint32(*n)))
    }

    fn is_array(&self, value: RawValue) -> Result<bool> {
        Ok(matches!(
            self.state.borrow().heap.get(value)?,
            HeapValue::Object(object) if matches!(object.class, Class::Array(_))
        ))
    }

    fn is_arraybuffer(&self, value: RawValue) -> Result<bool> {
        Ok(matches!(
            self.state.borrow().heap.get(value)?,
            HeapValue::Object(object) if matches!(object.class, Class::ArrayBuffer(_))
        ))
    }

    fn is_typedarray(&self, value: RawValue) -> Result<bool> {
        Ok(matches!(
            self.state.borrow().heap.get(value)?,
            HeapValue::Object(object) if matches!(object.class, Class::TypedArray(_))
        ))
    }

    fn strict_equals(&self, a: RawValue, b: RawValue) -> Result<bool> {
        let state = self.state.borrow();
        let equal = match (state.heap.get(a)?, state.heap.get(b)?) {
            (HeapValue::Undefined, HeapValue::Undefined) | (HeapValue::Null, HeapValue::Null) => {
                true
            }
            (HeapValue::Boolean(x), HeapValue::Boolean(y)) => x == y,
            (HeapValue::Number(x), HeapValue::Number(y)) => x == y,
            (HeapValue::BigInt(x), HeapValue::BigInt(y)) => x == y,
            (HeapValue::String(x), HeapValue::String(y)) => x == y,
            _ => a == b,
        };
        Ok(equal)
    }

    fn create_object(&self) -> Result<RawValue> {
        Ok(self.state.borrow_mut().alloc_object(Class::Plain))
    }

    fn get_property(&self, object: RawValue, key: RawValue) -> Result<RawValue> {
        self.with_state(|state| {
            let key = state.key(key)?;
            state.get_by_key(object, &key)
        })
    }

    fn set_property(&self, object: RawValue, key: RawValue, value: RawValue) -> Result<()> {
        self.with_state(|state| {
            let key = state.key(key)?;
            state.set_by_key(object, key, value)
        })
    }

    fn has_property(&self, object: RawValue, key: RawValue) -> Result<bool> {
        self.with_state(|state| {
            let key = state.key(key)?;
            let data = state.heap.object(object)?;
            let indexed = match (&data.class, key.index()) {
                (Class::Array(elements), Some(index)) => (index as usize) < elements.len(),
                (Class::Array(_) | Class::TypedArray(_), None) => key.is_name("length"),
                _ => false,
            };
            Ok(indexed || data.properties.contains_key(&key))
        })
    }

    fn delete_property(&self, object: RawValue, key: RawValue) -> Result<bool> {
        self.with_state(|state| {
            let key = state.key(key)?;
            let data = state.heap.object_mut(object)?;
            let configurable = data
                .properties
                .get(&key)
                .is_none_or(|property| {
                    property.attributes.contains(PropertyAttributes::CONFIGURABLE)
                });
            if configurable {
                data.properties.remove(&key);
            }
            Ok(configurable)
        })
    }

    fn get_named_property(&self, object: RawValue, name: &str) -> Result<RawValue> {
        self.with_state(|state| state.get_by_key(object, &Key::name(name)))
    }

    fn set_named_property(&self, object: RawValue, name: &str, value: RawValue) -> Result<()> {
        self.with_state(|state| state.set_by_key(object, Key::name(name), value))
    }

    fn define_properties(&self, object: RawValue, properties: &[PropertyDescriptor]) -> Result<()> {
        self.with_state(|state| {
            let keys = properties
                .iter()
                .map(|descriptor| state.key(descriptor.name))
                .collect::<Result<Vec<_>>>()?;
            let data = state.heap.object_mut(object)?;
            for (key, descriptor) in keys.into_iter().zip(properties) {
                data.properties.insert(
                    key,
                    Property {
                        value: descriptor.value,
                        attributes: descriptor.attributes,
                    },
                );
            }
            Ok(())
        })
    }

    fn get_element(&self, object: RawValue, index: u32) -> Result<RawValue> {
        self.with_state(|state| state.get_by_key(object, &Key::name(&index.to_string())))
    }

    fn set_element(&self, object: RawValue, index: u32, value: RawValue) -> Result<()> {
        self.with_state(|state| state.set_by_key(object, Key::name(&index.to_string()), value))
    }

    fn create_array_with_length(&self, len: usize) -> Result<RawValue> {
        self.with_state(|state| {
            let elements = vec![state.permanent.undefined; len];
            Ok(state.alloc_object(Class::Array(elements)))
        })
    }

    fn get_array_length(&self, array: RawValue) -> Result<u32> {
        match &self.state.borrow().heap.object(array)?.class {
            Class::Array(elements) => Ok(elements.len() as u32),
            _ => Err(Error::InvalidArgument("array expected")),
        }
    }

    fn get_array_elements(
        &self,
        array: RawValue,
        offset: u32,
        len: usize,
    ) -> Result<Vec<RawValue>> {
        self.with_state(|state| {
            let values = match &state.heap.object(array)?.class {
                Class::Array(elements) => elements
                    .iter()
                    .skip(offset as usize)
                    .take(len)
                    .copied()
                    .collect::<Vec<_>>(),
                _ => return Err(Error::InvalidArgument("array expected")),
            };
            for value in &values {
                state.root(*value);
            }
            Ok(values)
        })
    }

    fn set_array_elements(&self, array: RawValue, values: &[RawValue], offset: u32) -> Result<()> {
        self.with_state(|state| {
            let undefined = state.permanent.undefined;
            match &mut state.heap.object_mut(array)?.class {
                Class::Array(elements) => {
                    let offset = offset as usize;
                    let end = offset + values.len();
                    if end > elements.len() {
                        elements.resize(end, undefined);
                    }
                    elements[offset..end].copy_from_slice(values);
                    Ok(())
                }
                _ => Err(Error::InvalidArgument("array expected")),
            }
        })
    }

    fn create_arraybuffer(&self, len: usize) -> Result<(RawValue, *mut u8)> {
        let mut buffer = BufferData::owned(len);
        let data = buffer.data();
        let raw = self.state.borrow_mut().alloc_object(Class::ArrayBuffer(buffer));
        Ok((raw, data))
    }

    fn create_external_arraybuffer(
        &self,
        data: *mut u8,
        len: usize,
        finalize: Option<FinalizeCallback>,
    ) -> Result<RawValue> {
        let buffer = BufferData {
            storage: Storage::External(Attached::new(data.cast(), finalize)),
            len,
            detached: false,
        };
        Ok(self.state.borrow_mut().alloc_object(Class::ArrayBuffer(buffer)))
    }

    fn detach_arraybuffer(&self, arraybuffer: RawValue) -> Result<()> {
        match &mut self.state.borrow_mut().heap.object_mut(arraybuffer)?.class {
            Class::ArrayBuffer(buffer) => {
                buffer.detached = true;
                if let Storage::Owned(words) = &mut buffer.storage {
                    *words = Vec::new();
                }
                Ok(())
            }
            _ => Err(Error::InvalidArgument("arraybuffer expected")),
        }
    }

    fn get_arraybuffer_info(&self, arraybuffer: RawValue) -> Result<(*mut u8, usize)> {
        self.state.borrow_mut().arraybuffer_info(arraybuffer)
    }

    fn create_typedarray(
        &self,
        kind: TypedArrayType,
        len: usize,
        arraybuffer: RawValue,
        offset: usize,
    ) -> Result<RawValue> {
        self.with_state(|state| {
            let (_, byte_len) = state.arraybuffer_info(arraybuffer)?;
            let size = kind.element_size();
            if offset % size != 0 {
                state.throw_new(
                    "RangeError",
                    None,
                    &format!("start offset of {kind:?}Array should be a multiple of {size}"),
                );
                return Err(Error::PendingException);
            }
            if offset + len * size > byte_len {
                state.throw_new("RangeError", None, &format!("Invalid typed array length: {len}"));
                return Err(Error::PendingException);
            }
            Ok(state.alloc_object(Class::TypedArray(TypedArrayData {
                kind,
                buffer: arraybuffer,
                offset,
                len,
            })))
        })
    }

    fn get_typedarray_info(&self, typedarray: RawValue) -> Result<TypedArrayInfo> {
        self.with_state(|state| {
            let info = state.typedarray_info(typedarray)?;
            state.root(info.arraybuffer);
            Ok(info)
        })
    }

    fn open_handle_scope(&self) -> Result<ScopeId> {
        let mut state = self.state.borrow_mut();
        let id = ScopeId(state.next_scope);
        state.next_scope += 1;
        state.scopes.push(Scope::new(id, false));
        trace!(scope = id.0, "open handle scope");
        Ok(id)
    }

    fn close_handle_scope(&self, scope: ScopeId) -> Result<()> {
        let mut state = self.state.borrow_mut();
        match state.scopes.last() {
            Some(top) if state.scopes.len() > 1 && top.id == scope && !top.escapable => {
                state.scopes.pop();
                trace!(scope = scope.0, "close handle scope");
                Ok(())
            }
            _ => Err(Error::InvalidArgument("handle scope closed out of order")),
        }
    }

    fn open_escapable_handle_scope(&self) -> Result<ScopeId> {
        let mut state = self.state.borrow_mut();
        let id = ScopeId(state.next_scope);
        state.next_scope += 1;
        state.scopes.push(Scope::new(id, true));
        trace!(scope = id.0, "open escapable handle scope");
        Ok(id)
    }

    fn close_escapable_handle_scope(&self, scope: ScopeId) -> Result<()> {
        let mut state = self.state.borrow_mut();
        match state.scopes.last() {
            Some(top) if top.id == scope && top.escapable => {
                state.scopes.pop();
                trace!(scope = scope.0, "close escapable handle scope");
                Ok(())
            }
            _ => Err(Error::InvalidArgument("handle scope closed out of order")),
        }
    }

    fn escape_handle(&self, scope: ScopeId, value: RawValue) -> Result<RawValue> {
        let mut state = self.state.borrow_mut();
        let position = state
            .scopes
            .iter()
            .position(|candidate| candidate.id == scope && candidate.escapable)
            .ok_or(Error::InvalidArgument("not an open escapable scope"))?;
        if state.scopes[position].escaped {
            return Err(Error::InvalidArgument("escape called twice"));
        }
        state.scopes[position].escaped = true;
        state.scopes[position - 1].handles.push(value);
        Ok(value)
    }

    fn create_function(
        &self,
        name: &str,
        untyped: UntypedCallback,
        typed: Option<TypedEntry>,
    ) -> Result<RawValue> {
        let function = FunctionData {
            name: name.to_owned(),
            untyped,
            typed,
        };
        Ok(self.state.borrow_mut().alloc_object(Class::Function(function)))
    }

    fn call_function(
        &self,
        receiver: RawValue,
        function: RawValue,
        args: &[RawValue],
    ) -> Result<RawValue> {
        if self.is_exception_pending()? {
            return Err(Error::PendingException);
        }

        let (untyped, typed) = match &self.state.borrow().heap.object(function)?.class {
            Class::Function(data) => (data.untyped.clone(), data.typed.clone()),
            _ => return Err(Error::InvalidArgument("function expected")),
        };

        let fast = match &typed {
            Some(entry) if self.fast_calls.get() => {
                self.unwrap_typed(receiver, &entry.signature, args)?
            }
            _ => None,
        };

        let env: &Env = self;
        let result = match (typed, fast) {
            (Some(entry), Some(argv)) => {
                trace!(argc = args.len(), "typed call");
                let result = (entry.callback)(env, &argv[..]);
                self.box_typed(result)?
            }
            _ => {
                trace!(argc = args.len(), "untyped call");
                let info = CallbackInfo::new(receiver, args.to_vec());
                match untyped(env, &info) {
                    Some(value) => value,
                    None => self.get_undefined()?,
                }
            }
        };

        if self.is_exception_pending()? {
            return Err(Error::PendingException);
        }
        Ok(result)
    }

    fn throw(&self, error: RawValue) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.heap.get(error)?;
        if state.pending.is_none() {
            state.pending = Some(error);
        }
        Ok(())
    }

    fn throw_error(&self, code: Option<&str>, message: &str) -> Result<()> {
        self.state.borrow_mut().throw_new("Error", code, message);
        Ok(())
    }

    fn throw_type_error(&self, code: Option<&str>, message: &str) -> Result<()> {
        self.state.borrow_mut().throw_new("TypeError", code, message);
        Ok(())
    }

    fn throw_range_error(&self, code: Option<&str>, message: &str) -> Result<()> {
        self.state.borrow_mut().throw_new("RangeError", code, message);
        Ok(())
    }

    fn is_exception_pending(&self) -> Result<bool> {
        Ok(self.state.borrow().pending.is_some())
    }

    fn get_and_clear_last_exception(&self) -> Result<Option<RawValue>> {
        let mut state = self.state.borrow_mut();
        Ok(state.pending.take().map(|error| state.root(error)))
    }

    fn create_reference(&self, value: RawValue, count: u32) -> Result<ReferenceId> {
        let mut state = self.state.borrow_mut();
        state.heap.get(value)?;
        let id = state.next_reference;
        state.next_reference += 1;
        state.references.insert(
            id,
            Reference {
                value: Some(value),
                count,
            },
        );
        Ok(ReferenceId(id))
    }

    fn delete_reference(&self, reference: ReferenceId) -> Result<()> {
        self.state
            .borrow_mut()
            .references
            .remove(&reference.0)
            .map(|_| ())
            .ok_or(Error::InvalidArgument("unknown reference"))
    }

    fn reference_ref(&self, reference: ReferenceId) -> Result<u32> {
        let mut state = self.state.borrow_mut();
        let entry = state
            .references
            .get_mut(&reference.0)
            .ok_or(Error::InvalidArgument("unknown reference"))?;
        entry.count += 1;
        Ok(entry.count)
    }

    fn reference_unref(&self, reference: ReferenceId) -> Result<u32> {
        let mut state = self.state.borrow_mut();
        let entry = state
            .references
            .get_mut(&reference.0)
            .ok_or(Error::InvalidArgument("unknown reference"))?;
        if entry.count == 0 {
            return Err(Error::InvalidArgument("reference count is already zero"));
        }
        entry.count -= 1;
        Ok(entry.count)
    }

    fn get_reference_value(&self, reference: ReferenceId) -> Result<Option<RawValue>> {
        let mut state = self.state.borrow_mut();
        let value = state
            .references
            .get(&reference.0)
            .ok_or(Error::InvalidArgument("unknown reference"))?
            .value
            .filter(|value| state.heap.is_live(*value));
        Ok(value.map(|value| state.root(value)))
    }

    fn create_external(
        &self,
        data: *mut c_void,
        finalize: Option<FinalizeCallback>,
    ) -> Result<RawValue> {
        self.alloc(HeapValue::External(Attached::new(data, finalize)))
    }

    fn get_value_external(&self, value: RawValue) -> Result<*mut c_void> {
        match self.state.borrow().heap.get(value)? {
            HeapValue::External(attached) => Ok(attached.data),
            _ => Err(Error::InvalidArgument("external expected")),
        }
    }

    fn wrap(
        &self,
        object: RawValue,
        data: *mut c_void,
        finalize: Option<FinalizeCallback>,
    ) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let object = state.heap.object_mut(object)?;
        if object.wrap.is_some() {
            return Err(Error::InvalidArgument("object is already wrapped"));
        }
        object.wrap = Some(Attached::new(data, finalize));
        Ok(())
    }

    fn unwrap(&self, object: RawValue) -> Result<*mut c_void> {
        self.state
            .borrow()
            .heap
            .object(object)?
            .wrap
            .as_ref()
            .map(|wrap| wrap.data)
            .ok_or(Error::InvalidArgument("object is not wrapped"))
    }

    fn remove_wrap(&self, object: RawValue) -> Result<*mut c_void> {
        let wrap = self
            .state
            .borrow_mut()
            .heap
            .object_mut(object)?
            .wrap
            .take()
            .ok_or(Error::InvalidArgument("object is not wrapped"))?;
        Ok(wrap.data)
    }

    fn add_finalizer(
        &self,
        object: RawValue,
        data: *mut c_void,
        finalize: FinalizeCallback,
    ) -> Result<()> {
        self.state
            .borrow_mut()
            .heap
            .object_mut(object)?
            .finalizers
            .push(Attached::new(data, Some(finalize)));
        Ok(())
    }

    fn type_tag_object(&self, object: RawValue, tag: TypeTag) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let object = state.heap.object_mut(object)?;
        if object.tag.is_some() {
            return Err(Error::InvalidArgument("object is already type-tagged"));
        }
        object.tag = Some(tag);
        Ok(())
    }

    fn check_object_type_tag(&self, object: RawValue, tag: TypeTag) -> Result<bool> {
        Ok(self.state.borrow().heap.object(object)?.tag == Some(tag))
    }

    fn add_teardown_callback(&self, callback: TeardownCallback) -> Result<TeardownId> {
        let mut state = self.state.borrow_mut();
        let id = TeardownId(state.next_teardown);
        state.next_teardown += 1;
        state.teardown.push((id, Teardown::Immediate(callback)));
        Ok(id)
    }

    fn add_deferred_teardown_callback(
        &self,
        callback: DeferredTeardownCallback,
    ) -> Result<TeardownId> {
        let mut state = self.state.borrow_mut();
        let id = TeardownId(state.next_teardown);
        state.next_teardown += 1;
        state.teardown.push((id, Teardown::Deferred(callback)));
        Ok(id)
    }

    fn remove_teardown_callback(&self, id: TeardownId) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let position = state
            .teardown
            .iter()
            .position(|(candidate, _)| *candidate == id)
            .ok_or(Error::InvalidArgument("unknown teardown callback"))?;
        state.teardown.remove(position);
        Ok(())
    }

    fn request_garbage_collection(&self) -> Result<()> {
        self.collect();
        Ok(())
    }
}

