//! Mark-and-sweep collection for the sandbox heap.

use jsbind_core::RawValue;
use tracing::debug;

use crate::engine::{MemoryEngine, State};
use crate::heap::{Class, HeapValue, Key};

impl State {
    /// Values reachable without going through another value.
    fn roots(&self) -> Vec<RawValue> {
        let mut roots = self.permanent.all().to_vec();
        roots.extend(self.scoped_handles());
        roots.extend(
            self.references
                .values()
                .filter(|reference| reference.count > 0)
                .filter_map(|reference| reference.value),
        );
        roots.extend(self.pending);
        roots
    }

    /// Values directly referenced by `raw`.
    fn children(&self, raw: RawValue) -> Vec<RawValue> {
        let Ok(value) = self.heap.get(raw) else {
            return Vec::new();
        };

        match value {
            HeapValue::Symbol(description) => description.iter().copied().collect(),
            HeapValue::Object(object) => {
                let mut children = Vec::with_capacity(object.properties.len());
                for (key, property) in &object.properties {
                    if let Key::Symbol(symbol) = key {
                        children.push(*symbol);
                    }
                    children.push(property.value);
                }
                match &object.class {
                    Class::Array(elements) => children.extend(elements.iter().copied()),
                    Class::TypedArray(array) => children.push(array.buffer),
                    _ => {}
                }
                children
            }
            _ => Vec::new(),
        }
    }

    fn mark(&mut self) {
        self.heap.clear_marks();
        let mut worklist = self.roots();
        while let Some(raw) = worklist.pop() {
            if self.heap.mark(raw) {
                worklist.extend(self.children(raw));
            }
        }
    }

    /// Empty weak references whose target did not survive.
    fn clear_weak(&mut self) {
        for reference in self.references.values_mut() {
            if let Some(value) = reference.value
                && !self.heap.is_live(value)
            {
                reference.value = None;
            }
        }
    }
}

impl MemoryEngine {
    /// Collect unreachable values and run their finalizers.
    pub(crate) fn collect(&self) -> usize {
        let dead = {
            let mut state = self.state.borrow_mut();
            state.mark();
            let dead = state.heap.sweep();
            state.clear_weak();
            dead
        };

        let collected = dead.len();
        let finalized = self.finalize(dead);
        debug!(collected, finalized, "garbage collection");
        collected
    }
}
