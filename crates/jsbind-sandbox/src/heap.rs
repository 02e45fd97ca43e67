//! Generational slot heap backing the sandbox engine.
//!
//! Values live in a `Vec` of slots. A [`RawValue`] encodes the slot index
//! and the slot's generation; freeing a slot bumps its generation so stale
//! references are detected instead of aliasing a newer value.

use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroU64;

use jsbind_core::{
    Error, FinalizeCallback, PropertyAttributes, RawValue, Result, TypeTag, TypedArrayType,
    TypedEntry, UntypedCallback, ValueType,
};
use rustc_hash::FxHashMap;

/// Property key after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Key {
    String(Vec<u16>),
    Symbol(RawValue),
}

impl Key {
    pub(crate) fn name(name: &str) -> Self {
        Key::String(name.encode_utf16().collect())
    }

    /// The array index this key denotes, if any.
    pub(crate) fn index(&self) -> Option<u32> {
        let Key::String(units) = self else {
            return None;
        };
        let text = String::from_utf16(units).ok()?;
        if text.len() > 1 && text.starts_with('0') {
            return None;
        }
        text.parse::<u32>().ok().filter(|index| *index != u32::MAX)
    }

    pub(crate) fn is_name(&self, name: &str) -> bool {
        matches!(self, Key::String(units) if units.iter().copied().eq(name.encode_utf16()))
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Property {
    pub value: RawValue,
    pub attributes: PropertyAttributes,
}

/// A pointer with the callback that releases it.
pub(crate) struct Attached {
    pub data: *mut c_void,
    pub finalize: Option<FinalizeCallback>,
}

impl Attached {
    pub(crate) fn new(data: *mut c_void, finalize: Option<FinalizeCallback>) -> Self {
        Self { data, finalize }
    }
}

pub(crate) enum Storage {
    /// Engine-owned bytes. Stored as `u64` words for 8-byte alignment.
    Owned(Vec<u64>),
    External(Attached),
}

pub(crate) struct BufferData {
    pub storage: Storage,
    pub len: usize,
    pub detached: bool,
}

impl BufferData {
    pub(crate) fn owned(len: usize) -> Self {
        Self {
            storage: Storage::Owned(vec![0; len.div_ceil(8)]),
            len,
            detached: false,
        }
    }

    pub(crate) fn data(&mut self) -> *mut u8 {
        match &mut self.storage {
            Storage::Owned(words) => words.as_mut_ptr().cast(),
            Storage::External(attached) => attached.data.cast(),
        }
    }

    pub(crate) fn byte_len(&self) -> usize {
        if self.detached { 0 } else { self.len }
    }
}

pub(crate) struct TypedArrayData {
    pub kind: TypedArrayType,
    pub buffer: RawValue,
    pub offset: usize,
    pub len: usize,
}

pub(crate) struct FunctionData {
    pub name: String,
    pub untyped: UntypedCallback,
    pub typed: Option<TypedEntry>,
}

pub(crate) enum Class {
    Plain,
    Error,
    Array(Vec<RawValue>),
    ArrayBuffer(BufferData),
    TypedArray(TypedArrayData),
    Function(FunctionData),
}

pub(crate) struct ObjectData {
    pub class: Class,
    pub properties: FxHashMap<Key, Property>,
    pub wrap: Option<Attached>,
    pub tag: Option<TypeTag>,
    pub finalizers: Vec<Attached>,
}

impl ObjectData {
    pub(crate) fn new(class: Class) -> Self {
        Self {
            class,
            properties: FxHashMap::default(),
            wrap: None,
            tag: None,
            finalizers: Vec::new(),
        }
    }

    /// Every pending release callback of this object.
    pub(crate) fn into_finalizers(self) -> Vec<Attached> {
        let mut finalizers = Vec::new();
        if let Some(wrap) = self.wrap {
            finalizers.push(wrap);
        }
        finalizers.extend(self.finalizers);
        if let Class::ArrayBuffer(BufferData {
            storage: Storage::External(attached),
            ..
        }) = self.class
        {
            finalizers.push(attached);
        }
        finalizers
    }
}

pub(crate) enum HeapValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    BigInt(i128),
    String(Vec<u16>),
    Symbol(Option<RawValue>),
    External(Attached),
    Object(Box<ObjectData>),
}

impl HeapValue {
    pub(crate) fn value_type(&self) -> ValueType {
        match self {
            HeapValue::Undefined => ValueType::Undefined,
            HeapValue::Null => ValueType::Null,
            HeapValue::Boolean(_) => ValueType::Boolean,
            HeapValue::Number(_) => ValueType::Number,
            HeapValue::BigInt(_) => ValueType::BigInt,
            HeapValue::String(_) => ValueType::String,
            HeapValue::Symbol(_) => ValueType::Symbol,
            HeapValue::External(_) => ValueType::External,
            HeapValue::Object(object) => match object.class {
                Class::Function(_) => ValueType::Function,
                _ => ValueType::Object,
            },
        }
    }

    pub(crate) fn as_object(&self) -> Result<&ObjectData> {
        match self {
            HeapValue::Object(object) => Ok(object),
            _ => Err(Error::InvalidArgument("object expected")),
        }
    }

    pub(crate) fn as_object_mut(&mut self) -> Result<&mut ObjectData> {
        match self {
            HeapValue::Object(object) => Ok(object),
            _ => Err(Error::InvalidArgument("object expected")),
        }
    }

    /// Release callbacks owned by this value.
    pub(crate) fn into_finalizers(self) -> Vec<Attached> {
        match self {
            HeapValue::External(attached) => vec![attached],
            HeapValue::Object(object) => object.into_finalizers(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Debug for HeapValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapValue::Undefined => write!(f, "Undefined"),
            HeapValue::Null => write!(f, "Null"),
            HeapValue::Boolean(b) => write!(f, "Boolean({b})"),
            HeapValue::Number(n) => write!(f, "Number({n})"),
            HeapValue::BigInt(n) => write!(f, "BigInt({n})"),
            HeapValue::String(units) => write!(f, "String({:?})", String::from_utf16_lossy(units)),
            HeapValue::Symbol(_) => write!(f, "Symbol"),
            HeapValue::External(attached) => write!(f, "External({:p})", attached.data),
            HeapValue::Object(_) => write!(f, "Object"),
        }
    }
}

struct HeapSlot {
    generation: u32,
    value: Option<HeapValue>,
    marked: bool,
}

/// Slot storage with generational indices.
pub(crate) struct Heap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
}

impl Heap {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
        }
    }

    fn encode(index: u32, generation: u32) -> RawValue {
        let bits = (u64::from(generation) << 32) | (u64::from(index) + 1);
        match NonZeroU64::new(bits) {
            Some(bits) => RawValue::from_bits(bits),
            None => unreachable!("slot bits always include index + 1"),
        }
    }

    fn decode(raw: RawValue) -> (usize, u32) {
        let bits = raw.to_bits().get();
        let index = (bits & 0xffff_ffff) - 1;
        (index as usize, (bits >> 32) as u32)
    }

    pub(crate) fn allocate(&mut self, value: HeapValue) -> RawValue {
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            slot.marked = false;
            Self::encode(index, slot.generation)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                value: Some(value),
                marked: false,
            });
            Self::encode(index, 0)
        }
    }

    fn slot(&self, raw: RawValue) -> Option<&HeapSlot> {
        let (index, generation) = Self::decode(raw);
        self.slots
            .get(index)
            .filter(|slot| slot.generation == generation && slot.value.is_some())
    }

    pub(crate) fn is_live(&self, raw: RawValue) -> bool {
        self.slot(raw).is_some()
    }

    pub(crate) fn get(&self, raw: RawValue) -> Result<&HeapValue> {
        self.slot(raw)
            .and_then(|slot| slot.value.as_ref())
            .ok_or(Error::InvalidArgument("stale handle"))
    }

    pub(crate) fn get_mut(&mut self, raw: RawValue) -> Result<&mut HeapValue> {
        let (index, generation) = Self::decode(raw);
        self.slots
            .get_mut(index)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_mut())
            .ok_or(Error::InvalidArgument("stale handle"))
    }

    pub(crate) fn object(&self, raw: RawValue) -> Result<&ObjectData> {
        self.get(raw)?.as_object()
    }

    pub(crate) fn object_mut(&mut self, raw: RawValue) -> Result<&mut ObjectData> {
        self.get_mut(raw)?.as_object_mut()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    pub(crate) fn clear_marks(&mut self) {
        for slot in &mut self.slots {
            slot.marked = false;
        }
    }

    /// Mark `raw` reachable. Returns `true` the first time.
    pub(crate) fn mark(&mut self, raw: RawValue) -> bool {
        let (index, generation) = Self::decode(raw);
        match self.slots.get_mut(index) {
            Some(slot) if slot.generation == generation && slot.value.is_some() && !slot.marked => {
                slot.marked = true;
                true
            }
            _ => false,
        }
    }

    /// Free every unmarked slot and return the values it held.
    pub(crate) fn sweep(&mut self) -> Vec<HeapValue> {
        let mut dead = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.marked || slot.value.is_none() {
                continue;
            }
            if let Some(value) = slot.value.take() {
                dead.push(value);
            }
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(index as u32);
        }
        dead
    }

    /// Free every slot.
    pub(crate) fn drain(&mut self) -> Vec<HeapValue> {
        self.clear_marks();
        self.sweep()
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("slot_count", &self.slots.len())
            .field("free_count", &self.free_list.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_get() {
        let mut heap = Heap::new();
        let raw = heap.allocate(HeapValue::Number(1.5));
        assert!(matches!(heap.get(raw), Ok(HeapValue::Number(n)) if *n == 1.5));
        assert_eq!(heap.live_count(), 1);
    }

    #[test]
    fn sweep_invalidates_unmarked() {
        let mut heap = Heap::new();
        let kept = heap.allocate(HeapValue::Boolean(true));
        let dropped = heap.allocate(HeapValue::Null);

        heap.clear_marks();
        assert!(heap.mark(kept));
        assert!(!heap.mark(kept));
        let dead = heap.sweep();

        assert_eq!(dead.len(), 1);
        assert!(heap.is_live(kept));
        assert!(!heap.is_live(dropped));
        assert_eq!(
            heap.get(dropped).map(|_| ()),
            Err(Error::InvalidArgument("stale handle"))
        );
    }

    #[test]
    fn reused_slot_gets_new_generation() {
        let mut heap = Heap::new();
        let first = heap.allocate(HeapValue::Undefined);
        heap.drain();
        let second = heap.allocate(HeapValue::Null);

        assert_ne!(first, second);
        assert!(!heap.is_live(first));
        assert!(heap.is_live(second));
    }

    #[test]
    fn key_indices() {
        assert_eq!(Key::name("0").index(), Some(0));
        assert_eq!(Key::name("42").index(), Some(42));
        assert_eq!(Key::name("042").index(), None);
        assert_eq!(Key::name("length").index(), None);
        assert!(Key::name("length").is_name("length"));
    }

    #[test]
    fn owned_buffers_are_word_aligned() {
        let mut buffer = BufferData::owned(5);
        assert_eq!(buffer.data() as usize % 8, 0);
        assert_eq!(buffer.byte_len(), 5);
        buffer.detached = true;
        assert_eq!(buffer.byte_len(), 0);
    }
}
