//! Per-function call counters.

use std::cell::Cell;

/// Which entry point handled a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// The fast path with engine-unwrapped arguments.
    Typed,
    /// The fallback path with boxed arguments.
    Untyped,
}

/// Call counts of one registered function, split by entry point.
///
/// Shared with the function through an `Rc`; every invocation increments
/// exactly one counter, on the path that actually ran.
#[derive(Debug, Default)]
pub struct FunctionStatistics {
    typed: Cell<u64>,
    untyped: Cell<u64>,
}

impl FunctionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total calls on either path.
    pub fn calls(&self) -> u64 {
        self.typed.get() + self.untyped.get()
    }

    pub fn calls_of(&self, kind: CallKind) -> u64 {
        match kind {
            CallKind::Typed => self.typed.get(),
            CallKind::Untyped => self.untyped.get(),
        }
    }

    /// Record one call.
    pub fn record(&self, kind: CallKind) {
        let counter = match kind {
            CallKind::Typed => &self.typed,
            CallKind::Untyped => &self.untyped,
        };
        counter.set(counter.get() + 1);
    }
}
