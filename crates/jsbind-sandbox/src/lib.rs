//! In-process JavaScript value engine for exercising `jsbind`.
//!
//! [`MemoryEngine`] implements every [`jsbind_core::Engine`] capability on
//! top of a generational slot heap. It has no parser and no interpreter:
//! values are created, inspected, and called only through the trait, which
//! is all the binding layer needs for tests and benchmarks.
//!
//! ```ignore
//! use jsbind_core::{Engine, Env};
//! use jsbind_sandbox::MemoryEngine;
//!
//! let engine = MemoryEngine::new();
//! let env: &Env = &engine;
//! let scope = env.open_handle_scope()?;
//! let value = env.create_int32(42)?;
//! assert_eq!(env.get_value_int32(value)?, 42);
//! env.close_handle_scope(scope)?;
//! ```

mod engine;
mod gc;
mod heap;
mod number;

pub use engine::{MemoryEngine, SandboxOptions};
