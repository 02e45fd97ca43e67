//! Objects, properties, and arrays.
//!
//! These helpers combine the engine's object operations with the conversion
//! registry, so property values and array elements are read and written as
//! native types. Conversions use [`TypeOptions::default`].

use jsbind_core::{
    Env, Handle, JsArray, JsBigint, JsName, JsObject, JsString, JsSymbol, PropertyAttributes,
    PropertyDescriptor, RawValue, Result,
};

use crate::convert::{FromJs, ToJs};
use crate::options::TypeOptions;

// ============================================================================
// Keys
// ============================================================================

/// Something usable as a property key.
pub trait PropertyKey {
    fn to_key(&self, env: &Env) -> Result<RawValue>;
}

impl PropertyKey for str {
    fn to_key(&self, env: &Env) -> Result<RawValue> {
        env.create_string_utf8(self.as_bytes())
    }
}

impl PropertyKey for String {
    fn to_key(&self, env: &Env) -> Result<RawValue> {
        self.as_str().to_key(env)
    }
}

impl<K: PropertyKey + ?Sized> PropertyKey for &K {
    fn to_key(&self, env: &Env) -> Result<RawValue> {
        (**self).to_key(env)
    }
}

macro_rules! handle_keys {
    ($($handle:ty),*) => {
        $(
            impl PropertyKey for $handle {
                fn to_key(&self, _: &Env) -> Result<RawValue> {
                    self.to_raw()
                }
            }
        )*
    };
}

handle_keys!(JsName, JsString, JsSymbol);

// ============================================================================
// Objects and properties
// ============================================================================

/// A data property for [`create_object_with`] and [`define_properties`].
pub struct Property<'a> {
    pub name: &'a dyn PropertyKey,
    pub value: &'a dyn ToJs,
    pub attributes: PropertyAttributes,
}

impl<'a> Property<'a> {
    /// A writable, enumerable, configurable property.
    pub fn new(name: &'a dyn PropertyKey, value: &'a dyn ToJs) -> Self {
        Self {
            name,
            value,
            attributes: PropertyAttributes::default(),
        }
    }

    pub fn attributes(mut self, attributes: PropertyAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

pub fn create_object(env: &Env) -> Result<JsObject> {
    env.create_object().map(Handle::from_raw)
}

/// Create an object with a fixed set of properties.
pub fn create_object_with(env: &Env, properties: &[Property<'_>]) -> Result<JsObject> {
    let object = create_object(env)?;
    define_properties(env, object, properties)?;
    Ok(object)
}

pub fn define_properties(
    env: &Env,
    object: impl Into<JsObject>,
    properties: &[Property<'_>],
) -> Result<()> {
    let options = TypeOptions::default();
    let descriptors = properties
        .iter()
        .map(|property| {
            Ok(PropertyDescriptor {
                name: property.name.to_key(env)?,
                value: property.value.to_js(env, options)?,
                attributes: property.attributes,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    env.define_properties(object.into().to_raw()?, &descriptors)
}

pub fn get_property<T: FromJs>(
    env: &Env,
    object: impl Into<JsObject>,
    key: impl PropertyKey,
) -> Result<T> {
    let value = env.get_property(object.into().to_raw()?, key.to_key(env)?)?;
    T::from_js(env, value, TypeOptions::default())
}

pub fn set_property<V: ToJs + ?Sized>(
    env: &Env,
    object: impl Into<JsObject>,
    key: impl PropertyKey,
    value: &V,
) -> Result<()> {
    let value = value.to_js(env, TypeOptions::default())?;
    env.set_property(object.into().to_raw()?, key.to_key(env)?, value)
}

pub fn has_property(env: &Env, object: impl Into<JsObject>, key: impl PropertyKey) -> Result<bool> {
    env.has_property(object.into().to_raw()?, key.to_key(env)?)
}

/// Returns whether the property is gone afterwards.
pub fn delete_property(
    env: &Env,
    object: impl Into<JsObject>,
    key: impl PropertyKey,
) -> Result<bool> {
    env.delete_property(object.into().to_raw()?, key.to_key(env)?)
}

pub fn get_element<T: FromJs>(env: &Env, object: impl Into<JsObject>, index: u32) -> Result<T> {
    let value = env.get_element(object.into().to_raw()?, index)?;
    T::from_js(env, value, TypeOptions::default())
}

pub fn set_element<V: ToJs + ?Sized>(
    env: &Env,
    object: impl Into<JsObject>,
    index: u32,
    value: &V,
) -> Result<()> {
    let value = value.to_js(env, TypeOptions::default())?;
    env.set_element(object.into().to_raw()?, index, value)
}

// ============================================================================
// Arrays
// ============================================================================

pub fn create_array(env: &Env) -> Result<JsArray> {
    create_array_with_length(env, 0)
}

/// Create an array of `len` `undefined` elements.
pub fn create_array_with_length(env: &Env, len: usize) -> Result<JsArray> {
    env.create_array_with_length(len).map(Handle::from_raw)
}

/// Create an array holding the converted `values`.
pub fn create_array_from<T: ToJs>(env: &Env, values: &[T]) -> Result<JsArray> {
    values.to_js(env, TypeOptions::default()).map(Handle::from_raw)
}

pub fn get_array_length(env: &Env, array: JsArray) -> Result<u32> {
    env.get_array_length(array.to_raw()?)
}

/// Read up to `len` elements starting at `offset`.
pub fn get_array_elements<T: FromJs>(
    env: &Env,
    array: JsArray,
    offset: u32,
    len: usize,
) -> Result<Vec<T>> {
    let options = TypeOptions::default();
    env.get_array_elements(array.to_raw()?, offset, len)?
        .into_iter()
        .map(|value| T::from_js(env, value, options))
        .collect()
}

/// Write `values` starting at `offset`, growing the array if needed.
pub fn set_array_elements<T: ToJs>(
    env: &Env,
    array: JsArray,
    values: &[T],
    offset: u32,
) -> Result<()> {
    let options = TypeOptions::default();
    let values = values
        .iter()
        .map(|value| value.to_js(env, options))
        .collect::<Result<Vec<_>>>()?;
    env.set_array_elements(array.to_raw()?, &values, offset)
}

// ============================================================================
// Values
// ============================================================================

pub fn get_global(env: &Env) -> Result<JsObject> {
    env.get_global().map(Handle::from_raw)
}

pub fn create_string(env: &Env, value: &str) -> Result<JsString> {
    env.create_string_utf8(value.as_bytes()).map(Handle::from_raw)
}

pub fn create_symbol(env: &Env, description: Option<&str>) -> Result<JsSymbol> {
    let description = description.map(|text| text.to_key(env)).transpose()?;
    env.create_symbol(description).map(Handle::from_raw)
}

pub fn create_bigint(env: &Env, value: i64) -> Result<JsBigint> {
    env.create_bigint_int64(value).map(Handle::from_raw)
}
