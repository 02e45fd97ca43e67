//! Integration tests for the conversion registry: composed types, checked
//! and unchecked reads, and shared pointers.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use jsbind::convert::unmarshal_with;
use jsbind::prelude::*;
use jsbind_sandbox::MemoryEngine;

/// Counts how often it is dropped.
struct Tracked {
    id: u32,
    drops: Rc<Cell<u32>>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

// =============================================================================
// Composed Types
// =============================================================================

#[test]
fn test_nested_containers() {
    let engine = MemoryEngine::new();
    let rows = vec![
        ("alpha".to_string(), Some(1u32)),
        ("beta".to_string(), None),
        ("gamma".to_string(), Some(3)),
    ];

    let value = marshal(&engine, &rows).unwrap();
    assert!(engine.is_array(value.to_raw().unwrap()).unwrap());

    let back: Vec<(String, Option<u32>)> = unmarshal(&engine, value).unwrap();
    assert_eq!(back, rows);
}

#[test]
fn test_fixed_array_of_tuples() {
    let engine = MemoryEngine::new();
    let points = [(1.0f64, -1.0f64), (0.5, 2.5)];
    let value = marshal(&engine, &points).unwrap();
    assert_eq!(unmarshal::<[(f64, f64); 2], _>(&engine, value), Ok(points));
}

#[test]
fn test_array_read_through_object_helpers() {
    let engine = MemoryEngine::new();
    let value = marshal(&engine, &vec![4i32, 5, 6]).unwrap();
    let array = value.cast::<jsbind::kind::Array>();

    assert_eq!(get_array_length(&engine, array), Ok(3));
    assert_eq!(get_element::<i32>(&engine, array, 2), Ok(6));
}

#[test]
fn test_object_properties_hold_converted_values() {
    let engine = MemoryEngine::new();
    let record = create_object_with(
        &engine,
        &[
            Property::new(&"name", &"sensor"),
            Property::new(&"readings", &[1.5f32, 2.5]),
            Property::new(&"offset", &-3i64),
        ],
    )
    .unwrap();

    assert_eq!(get_property::<String>(&engine, record, "name").as_deref(), Ok("sensor"));
    assert_eq!(get_property::<Vec<f32>>(&engine, record, "readings"), Ok(vec![1.5, 2.5]));
    assert_eq!(get_property::<i64>(&engine, record, "offset"), Ok(-3));
}

#[test]
fn test_wide_and_fixed_strings() {
    let engine = MemoryEngine::new();
    let value = marshal(&engine, "caf\u{e9}").unwrap();

    let wide: Utf16String = unmarshal(&engine, value).unwrap();
    assert_eq!(wide.as_slice(), &[0x63, 0x61, 0x66, 0xe9]);

    let fixed: FixedUtf16<4> = unmarshal(&engine, value).unwrap();
    assert_eq!(fixed.as_slice(), wide.as_slice());

    let bytes: FixedUtf8<5> = unmarshal(&engine, value).unwrap();
    assert_eq!(bytes.as_str(), Some("caf\u{e9}"));
}

#[test]
fn test_optional_values() {
    let engine = MemoryEngine::new();
    let missing = marshal(&engine, &None::<String>).unwrap();
    assert_eq!(engine.type_of(missing.to_raw().unwrap()), Ok(jsbind::ValueType::Undefined));
    assert_eq!(unmarshal::<Option<String>, _>(&engine, missing), Ok(None));

    let present = marshal(&engine, &Some(12u32)).unwrap();
    assert_eq!(unmarshal::<Option<u32>, _>(&engine, present), Ok(Some(12)));
}

// =============================================================================
// Fixed Lengths
// =============================================================================

#[test]
#[should_panic(expected = "array length does not match the fixed length")]
fn test_tuple_from_longer_array_panics() {
    let engine = MemoryEngine::new();
    let value = marshal(&engine, &vec![1i32, 2, 3]).unwrap();
    let _ = unmarshal::<(i32, i32), _>(&engine, value);
}

#[test]
#[should_panic(expected = "array length does not match the fixed length")]
fn test_fixed_array_from_shorter_array_panics() {
    let engine = MemoryEngine::new();
    let value = marshal(&engine, &vec![1u32]).unwrap();
    let _ = unmarshal::<[u32; 4], _>(&engine, value);
}

// =============================================================================
// Checked And Unchecked Reads
// =============================================================================

#[test]
fn test_checked_read_names_expected_type() {
    let engine = MemoryEngine::new();
    let number = marshal(&engine, &8.0f64).unwrap();

    let cases: [(fn(&MemoryEngine, JsValue) -> Result<()>, &str); 4] = [
        (|e, v| unmarshal_with::<String, _>(e, v, TypeOptions::CHECKED).map(drop), "string"),
        (|e, v| unmarshal_with::<bool, _>(e, v, TypeOptions::CHECKED).map(drop), "boolean"),
        (|e, v| unmarshal_with::<Vec<i32>, _>(e, v, TypeOptions::CHECKED).map(drop), "array"),
        (|e, v| unmarshal_with::<JsObject, _>(e, v, TypeOptions::CHECKED).map(drop), "object"),
    ];

    for (read, label) in cases {
        assert_eq!(read(&engine, number), Err(Error::PendingException));
        assert_eq!(
            engine.take_exception_message(),
            Some(format!("Value is not of type '{label}'"))
        );
    }
}

#[test]
fn test_checked_read_accepts_matching_values() {
    let engine = MemoryEngine::new();
    let number = marshal(&engine, &8i32).unwrap();
    assert_eq!(unmarshal_with::<i32, _>(&engine, number, TypeOptions::CHECKED), Ok(8));
    assert_eq!(unmarshal_with::<f64, _>(&engine, number, TypeOptions::CHECKED), Ok(8.0));
    assert!(unmarshal_with::<JsNumber, _>(&engine, number, TypeOptions::CHECKED).is_ok());
    assert!(!is_exception_pending(&engine).unwrap());
}

#[test]
fn test_unchecked_read_of_wrong_type_does_not_crash() {
    let engine = MemoryEngine::new();
    let text = marshal(&engine, "not a number").unwrap();

    let result = unmarshal_with::<i32, _>(&engine, text, TypeOptions::UNCHECKED);
    assert!(result.is_err());
    assert!(!is_exception_pending(&engine).unwrap());
}

#[test]
fn test_unchecked_narrowing_truncates_to_default() {
    let engine = MemoryEngine::new();
    let big = marshal(&engine, &70_000u32).unwrap();
    assert_eq!(unmarshal_with::<u16, _>(&engine, big, TypeOptions::UNCHECKED), Ok(0));
    assert_eq!(
        unmarshal_with::<u16, _>(&engine, big, TypeOptions::CHECKED),
        Err(Error::PendingException)
    );
    assert_eq!(
        engine.take_exception_message().as_deref(),
        Some("70000 is out of range for u16")
    );
}

// =============================================================================
// Shared Pointers
// =============================================================================

#[test]
fn test_rc_outlives_engine_wrapper_while_native_holds_it() {
    let engine = MemoryEngine::new();
    let drops = Rc::new(Cell::new(0));
    let shared = Rc::new(Tracked { id: 9, drops: drops.clone() });

    {
        let _scope = HandleScope::open(&engine);
        let value = marshal(&engine, &shared).unwrap();
        assert_eq!(Rc::strong_count(&shared), 2);

        let back: Rc<Tracked> = unmarshal(&engine, value).unwrap();
        assert!(Rc::ptr_eq(&back, &shared));
        assert_eq!(back.id, 9);
    }

    assert_eq!(Rc::strong_count(&shared), 2);
    engine.collect_garbage();
    assert_eq!(Rc::strong_count(&shared), 1);
    assert_eq!(drops.get(), 0);

    drop(shared);
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_rc_released_exactly_once_by_collection() {
    let engine = MemoryEngine::new();
    let drops = Rc::new(Cell::new(0));

    {
        let _scope = HandleScope::open(&engine);
        let shared = Rc::new(Tracked { id: 1, drops: drops.clone() });
        marshal(&engine, &shared).unwrap();
        marshal(&engine, &shared).unwrap();
    }

    assert_eq!(drops.get(), 0);
    engine.collect_garbage();
    assert_eq!(drops.get(), 1);
    engine.collect_garbage();
    assert_eq!(drops.get(), 1);
}

#[test]
fn test_arc_round_trip() {
    let engine = MemoryEngine::new();
    let shared = Arc::new(vec![1u8, 2, 3]);
    let value = marshal(&engine, &shared).unwrap();

    let back: Arc<Vec<u8>> = unmarshal(&engine, value).unwrap();
    assert!(Arc::ptr_eq(&back, &shared));
    assert_eq!(Arc::strong_count(&shared), 3);
}

#[test]
fn test_engine_teardown_releases_shared_pointers() {
    let drops = Rc::new(Cell::new(0));
    let shared = Rc::new(Tracked { id: 2, drops: drops.clone() });
    {
        let engine = MemoryEngine::new();
        marshal(&engine, &shared).unwrap();
        assert_eq!(Rc::strong_count(&shared), 2);
    }
    assert_eq!(Rc::strong_count(&shared), 1);
    assert_eq!(drops.get(), 0);
}
