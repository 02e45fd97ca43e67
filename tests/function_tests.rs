//! Integration tests for registering native functions and calling them
//! through the engine, on both the typed and the untyped path.

use std::cell::Cell;
use std::rc::Rc;

use jsbind::prelude::*;
use jsbind::{RawValue, kind};
use jsbind_sandbox::MemoryEngine;

/// Call `function` the way JavaScript would, with raw argument values.
fn call_raw<R: 'static, A: 'static>(
    engine: &MemoryEngine,
    function: &JsFunction<R, A>,
    args: &[RawValue],
) -> Result<RawValue> {
    let global = engine.get_global()?;
    engine.call_function(global, function.to_raw()?, args)
}

fn string_value(engine: &MemoryEngine, text: &str) -> RawValue {
    engine.create_string_utf8(text.as_bytes()).unwrap()
}

/// Counts how often it is dropped.
struct Tracked {
    value: i32,
    drops: Rc<Cell<u32>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

// =============================================================================
// Basic Calls
// =============================================================================

#[test]
fn test_hello_world() {
    let engine = MemoryEngine::new();
    let hello = create_function(
        &engine,
        "hello",
        |_: &Env| -> Result<String> { Ok("hello world".to_string()) },
        FunctionOptions::new(),
    )
    .unwrap();

    assert_eq!(call_function(&engine, &hello, ()).as_deref(), Ok("hello world"));
}

#[test]
fn test_plain_function_on_both_paths() {
    let engine = MemoryEngine::new();
    let scale = create_function(
        &engine,
        "scale",
        |x: f64, by: u32| x * f64::from(by),
        FunctionOptions::new(),
    )
    .unwrap();

    assert_eq!(call_function(&engine, &scale, (1.5, 4)), Ok(6.0));
    engine.set_fast_calls(false);
    assert_eq!(call_function(&engine, &scale, (1.5, 4)), Ok(6.0));
}

#[test]
fn test_function_stored_on_object() {
    let engine = MemoryEngine::new();
    let math = create_object(&engine).unwrap();
    let negate = set_function_property(
        &engine,
        math,
        "negate",
        |x: i32| -x,
        FunctionOptions::new(),
    )
    .unwrap();

    assert_eq!(has_property(&engine, math, "negate"), Ok(true));
    assert_eq!(call_function(&engine, &negate, (7,)), Ok(-7));
}

#[test]
fn test_method_reads_receiver() {
    let engine = MemoryEngine::new();
    let describe = create_function(
        &engine,
        "describe",
        |env: &Env, this: JsReceiver, suffix: String| -> Result<String> {
            let object = this.cast::<kind::Object>();
            let name: String = get_property(env, object, "name")?;
            Ok(format!("{name}{suffix}"))
        },
        FunctionOptions::new(),
    )
    .unwrap();

    let object = create_object(&engine).unwrap();
    set_property(&engine, object, "name", "gizmo").unwrap();
    let this = JsReceiver::from_raw(object.to_raw().unwrap());

    assert_eq!(function_arity(&describe), 1);
    assert_eq!(
        call_function(&engine, &describe, (this, "!".to_string())).as_deref(),
        Ok("gizmo!")
    );
}

#[test]
fn test_pointer_round_trips_unchanged() {
    let engine = MemoryEngine::new();
    let mut slot = 17u32;
    let slot_ptr: *mut u32 = &mut slot;
    let get = create_function(&engine, "get", move || slot_ptr, FunctionOptions::new()).unwrap();

    let first = call_raw(&engine, &get, &[]).unwrap();
    let second = call_raw(&engine, &get, &[]).unwrap();
    assert_eq!(engine.get_value_external(first).unwrap(), slot_ptr.cast());
    assert_eq!(engine.get_value_external(first), engine.get_value_external(second));

    engine.set_fast_calls(false);
    assert_eq!(call_function(&engine, &get, ()), Ok(slot_ptr));
}

// =============================================================================
// Statistics
// =============================================================================

#[test]
fn test_statistics_count_each_path() {
    let engine = MemoryEngine::new();
    let statistics = Rc::new(FunctionStatistics::new());
    let add = create_function(
        &engine,
        "add",
        |a: i32, b: i32| a.wrapping_add(b),
        FunctionOptions::new().statistics(statistics.clone()),
    )
    .unwrap();

    for n in 0..3 {
        assert_eq!(call_function(&engine, &add, (n, 1)), Ok(n + 1));
    }
    engine.set_fast_calls(false);
    for n in 0..2 {
        assert_eq!(call_function(&engine, &add, (n, 1)), Ok(n + 1));
    }

    assert_eq!(statistics.calls_of(CallKind::Typed), 3);
    assert_eq!(statistics.calls_of(CallKind::Untyped), 2);
    assert_eq!(statistics.calls(), 5);
}

#[test]
fn test_mismatched_argument_falls_back_to_untyped() {
    let engine = MemoryEngine::new();
    let statistics = Rc::new(FunctionStatistics::new());
    let half = create_function(
        &engine,
        "half",
        |x: f64| x / 2.0,
        FunctionOptions::new().unchecked().statistics(statistics.clone()),
    )
    .unwrap();

    let number = engine.create_double(3.0).unwrap();
    let result = call_raw(&engine, &half, &[number]).unwrap();
    assert_eq!(engine.get_value_double(result), Ok(1.5));
    assert_eq!(statistics.calls_of(CallKind::Typed), 1);

    let text = string_value(&engine, "3");
    assert!(call_raw(&engine, &half, &[text]).is_err());
    assert_eq!(statistics.calls_of(CallKind::Untyped), 1);
    engine.take_exception_message();
}

// =============================================================================
// Argument Checking
// =============================================================================

#[test]
fn test_checked_function_rejects_wrong_type() {
    let engine = MemoryEngine::new();
    let double = create_function(
        &engine,
        "double",
        |x: i32| x * 2,
        FunctionOptions::new().checked(),
    )
    .unwrap();

    let text = string_value(&engine, "ten");
    assert_eq!(call_raw(&engine, &double, &[text]), Err(Error::PendingException));
    assert_eq!(
        engine.take_exception_message().as_deref(),
        Some("Value is not of type 'int32'")
    );
}

#[test]
fn test_unchecked_function_fails_without_crashing() {
    let engine = MemoryEngine::new();
    let double = create_function(
        &engine,
        "double",
        |x: i32| x * 2,
        FunctionOptions::new().unchecked(),
    )
    .unwrap();

    let text = string_value(&engine, "ten");
    assert_eq!(call_raw(&engine, &double, &[text]), Err(Error::PendingException));
    let message = engine.take_exception_message().unwrap();
    assert!(message.starts_with("native call failed"), "unexpected message: {message}");
}

#[test]
fn test_checked_typed_array_argument_rejects_other_kind() {
    for fast in [true, false] {
        let engine = MemoryEngine::new();
        engine.set_fast_calls(fast);
        let statistics = Rc::new(FunctionStatistics::new());
        let count = create_function(
            &engine,
            "count",
            |values: TypedArraySpan<f64>| values.len() as u32,
            FunctionOptions::new().checked().statistics(statistics.clone()),
        )
        .unwrap();

        let bytes = create_typedarray_from(&engine, &[0u8; 8]).unwrap();
        assert_eq!(
            call_raw(&engine, &count, &[bytes.to_raw().unwrap()]),
            Err(Error::PendingException)
        );
        assert_eq!(
            engine.take_exception_message().as_deref(),
            Some("Value is not of type 'float64array'")
        );

        let path = if fast { CallKind::Typed } else { CallKind::Untyped };
        assert_eq!(statistics.calls_of(path), 1);
    }
}

#[test]
fn test_checked_array_argument_rejects_plain_object() {
    for fast in [true, false] {
        let engine = MemoryEngine::new();
        engine.set_fast_calls(fast);
        let total = create_function(
            &engine,
            "total",
            |values: Vec<i32>| values.iter().sum::<i32>(),
            FunctionOptions::new().checked(),
        )
        .unwrap();

        let object = create_object(&engine).unwrap();
        assert_eq!(
            call_raw(&engine, &total, &[object.to_raw().unwrap()]),
            Err(Error::PendingException)
        );
        assert_eq!(
            engine.take_exception_message().as_deref(),
            Some("Value is not of type 'array'")
        );
    }
}

#[test]
fn test_checked_shared_pointer_argument_rejects_other_type() {
    for fast in [true, false] {
        let engine = MemoryEngine::new();
        engine.set_fast_calls(fast);
        let read = create_function(
            &engine,
            "read",
            |_: &Env, value: Rc<u64>| -> Result<u64> { Ok(*value) },
            FunctionOptions::new().checked(),
        )
        .unwrap();

        let text = Rc::new(String::from("not a number"));
        let wrapper = marshal(&engine, &text).unwrap();
        assert_eq!(
            call_raw(&engine, &read, &[wrapper.to_raw().unwrap()]),
            Err(Error::PendingException)
        );
        assert_eq!(
            engine.take_exception_message().as_deref(),
            Some("Value is not of type 'object'")
        );
        assert_eq!(Rc::strong_count(&text), 2);
    }
}

#[test]
#[should_panic(expected = "native function called with 0 arguments, expects 1")]
fn test_wrong_argument_count_panics() {
    let engine = MemoryEngine::new();
    let identity =
        create_function(&engine, "identity", |x: i32| x, FunctionOptions::new()).unwrap();
    let _ = call_raw(&engine, &identity, &[]);
}

// =============================================================================
// Exceptions
// =============================================================================

#[test]
fn test_thrown_exception_reaches_caller() {
    let engine = MemoryEngine::new();
    let sqrt = create_function(
        &engine,
        "sqrt",
        |env: &Env, x: f64| -> Result<f64> {
            if x < 0.0 {
                return Err(throw_range_error(env, "negative input"));
            }
            Ok(x.sqrt())
        },
        FunctionOptions::new(),
    )
    .unwrap();

    assert_eq!(call_function(&engine, &sqrt, (16.0,)), Ok(4.0));
    assert_eq!(call_function(&engine, &sqrt, (-1.0,)), Err(Error::PendingException));
    assert_eq!(engine.take_exception_message().as_deref(), Some("negative input"));
}

#[test]
fn test_plain_error_becomes_exception() {
    let engine = MemoryEngine::new();
    let fail = create_function(
        &engine,
        "fail",
        |_: &Env| -> Result<()> { Err(Error::InvalidArgument("broken handle")) },
        FunctionOptions::new(),
    )
    .unwrap();

    assert_eq!(call_function(&engine, &fail, ()), Err(Error::PendingException));
    assert_eq!(
        engine.take_exception_message().as_deref(),
        Some("native call failed: invalid argument: broken handle")
    );
}

#[test]
fn test_call_with_pending_exception_is_refused() {
    let engine = MemoryEngine::new();
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let tick = create_function(
        &engine,
        "tick",
        move || counter.set(counter.get() + 1),
        FunctionOptions::new(),
    )
    .unwrap();

    throw_error(&engine, "already failing");
    assert_eq!(call_function(&engine, &tick, ()), Err(Error::PendingException));
    assert_eq!(runs.get(), 0);
    assert_eq!(engine.take_exception_message().as_deref(), Some("already failing"));
}

// =============================================================================
// Scopes
// =============================================================================

#[test]
fn test_scoped_call_releases_temporaries() {
    let engine = MemoryEngine::new();
    let build = create_function(
        &engine,
        "build",
        |env: &Env, count: u32| -> Result<JsObject> {
            for _ in 0..count {
                create_object(env)?;
            }
            let result = create_object(env)?;
            set_property(env, result, "count", &count)?;
            Ok(result)
        },
        FunctionOptions::new().scoped(true),
    )
    .unwrap();

    let object = call_function(&engine, &build, (10,)).unwrap();
    assert_eq!(engine.scope_depth(), 0);
    assert!(engine.collect_garbage() >= 10);
    assert_eq!(get_property::<u32>(&engine, object, "count"), Ok(10));
}

#[test]
fn test_scoped_untyped_call_escapes_result() {
    let engine = MemoryEngine::new();
    engine.set_fast_calls(false);
    let label = create_function(
        &engine,
        "label",
        |env: &Env, n: i32| -> Result<JsString> { create_string(env, &format!("item {n}")) },
        FunctionOptions::new(),
    )
    .unwrap();

    let text = call_function(&engine, &label, (3,)).unwrap();
    engine.collect_garbage();
    assert_eq!(unmarshal::<String, _>(&engine, text).as_deref(), Ok("item 3"));
}

// =============================================================================
// Shared Pointers
// =============================================================================

#[test]
fn test_returned_rc_released_once_after_collection() {
    for fast in [true, false] {
        let engine = MemoryEngine::new();
        engine.set_fast_calls(fast);
        let drops = Rc::new(Cell::new(0));
        {
            let _scope = HandleScope::open(&engine);
            let counter = drops.clone();
            let make = create_function(
                &engine,
                "make",
                move |_: &Env| -> Result<Rc<Tracked>> {
                    Ok(Rc::new(Tracked {
                        value: 42,
                        drops: counter.clone(),
                    }))
                },
                FunctionOptions::new(),
            )
            .unwrap();

            let result = call_function(&engine, &make, ()).unwrap();
            assert_eq!(result.value, 42);
            assert_eq!(Rc::strong_count(&result), 2);
            drop(result);
            assert_eq!(drops.get(), 0);
        }

        engine.collect_garbage();
        assert_eq!(drops.get(), 1);
        engine.collect_garbage();
        assert_eq!(drops.get(), 1);
    }
}

// =============================================================================
// Buffers
// =============================================================================

#[test]
fn test_buffer_argument_aliases_engine_memory() {
    let engine = MemoryEngine::new();
    let shout = create_function(
        &engine,
        "shout",
        |_: &Env, mut bytes: ArrayBufferSpan| -> Result<u32> {
            bytes.make_ascii_uppercase();
            Ok(bytes.len() as u32)
        },
        FunctionOptions::new(),
    )
    .unwrap();

    let buffer = create_arraybuffer_from(&engine, &b"hello"[..]).unwrap();
    let result = call_raw(&engine, &shout, &[buffer.to_raw().unwrap()]).unwrap();

    assert_eq!(engine.get_value_uint32(result), Ok(5));
    assert_eq!(&*get_arraybuffer_info(&engine, buffer).unwrap(), b"HELLO");
}

#[test]
fn test_any_typed_array_argument() {
    let engine = MemoryEngine::new();
    let sum = create_function(
        &engine,
        "sum",
        |array: AnyTypedArraySpan| -> u32 {
            assert_eq!(array.kind(), TypedArrayType::Uint16);
            assert_eq!(array.len(), 4);
            array.as_slice_of::<u16>().iter().map(|&n| u32::from(n)).sum()
        },
        FunctionOptions::new(),
    )
    .unwrap();

    let (buffer, _) = create_arraybuffer(&engine, 8).unwrap();
    let words = create_any_typedarray(&engine, TypedArrayType::Uint16, buffer, 0, 4).unwrap();
    get_arraybuffer_info_of::<u16>(&engine, buffer)
        .unwrap()
        .copy_from_slice(&[1, 2, 3, 4]);

    let result = call_raw(&engine, &sum, &[words.to_raw().unwrap()]).unwrap();
    assert_eq!(engine.get_value_uint32(result), Ok(10));
}
