//! Strings in UTF-8 and UTF-16, dynamic and fixed length.
//!
//! Dynamic reads ask the engine for the length first, then allocate and
//! fill an owned buffer. Fixed reads have their size in the type and assert
//! that the string has exactly that many code units.

use std::ffi::{CStr, CString};
use std::fmt;

use jsbind_core::{Env, Error, RawValue, Result, Signature, ValueType};

use super::{FromJs, JsType, ToJs, check_value, is_type};
use crate::error::throw_type_error;
use crate::options::TypeOptions;

const LABEL: &str = "string";

fn read_utf8(env: &Env, value: RawValue, options: TypeOptions) -> Result<Vec<u8>> {
    check_value(env, value, options, LABEL, is_type(ValueType::String))?;
    let len = env.get_value_string_utf8(value, None)?;
    let mut buf = vec![0; len];
    env.get_value_string_utf8(value, Some(&mut buf))?;
    Ok(buf)
}

fn read_utf16(env: &Env, value: RawValue, options: TypeOptions) -> Result<Vec<u16>> {
    check_value(env, value, options, LABEL, is_type(ValueType::String))?;
    let len = env.get_value_string_utf16le(value, None)?;
    let mut buf = vec![0; len];
    env.get_value_string_utf16le(value, Some(&mut buf))?;
    Ok(buf)
}

impl JsType for str {
    const SIGNATURE: Signature = Signature::String;
}

impl ToJs for str {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.create_string_utf8(self.as_bytes())
    }
}

impl JsType for String {
    const SIGNATURE: Signature = Signature::String;
}

impl ToJs for String {
    fn to_js(&self, env: &Env, options: TypeOptions) -> Result<RawValue> {
        self.as_str().to_js(env, options)
    }
}

impl FromJs for String {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        let bytes = read_utf8(env, value, options)?;
        String::from_utf8(bytes)
            .map_err(|_| Error::InvalidArgument("engine returned invalid utf-8"))
    }
}

impl JsType for CStr {
    const SIGNATURE: Signature = Signature::String;
}

impl ToJs for CStr {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.create_string_utf8(self.to_bytes())
    }
}

impl JsType for CString {
    const SIGNATURE: Signature = Signature::String;
}

impl ToJs for CString {
    fn to_js(&self, env: &Env, options: TypeOptions) -> Result<RawValue> {
        self.as_c_str().to_js(env, options)
    }
}

impl FromJs for CString {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        let bytes = read_utf8(env, value, options)?;
        CString::new(bytes).map_err(|_| throw_type_error(env, "string contains a nul character"))
    }
}

/// An owned UTF-16 string, converted without transcoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Utf16String(pub Vec<u16>);

impl Utf16String {
    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }
}

impl From<&str> for Utf16String {
    fn from(value: &str) -> Self {
        Self(value.encode_utf16().collect())
    }
}

impl fmt::Display for Utf16String {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl JsType for Utf16String {
    const SIGNATURE: Signature = Signature::String;
}

impl ToJs for Utf16String {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.create_string_utf16le(&self.0)
    }
}

impl FromJs for Utf16String {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        read_utf16(env, value, options).map(Self)
    }
}

/// A UTF-8 string of exactly `N` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedUtf8<const N: usize>(pub [u8; N]);

impl<const N: usize> FixedUtf8<N> {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl<const N: usize> JsType for FixedUtf8<N> {
    const SIGNATURE: Signature = Signature::String;
}

impl<const N: usize> ToJs for FixedUtf8<N> {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.create_string_utf8(&self.0)
    }
}

impl<const N: usize> FromJs for FixedUtf8<N> {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        check_value(env, value, options, LABEL, is_type(ValueType::String))?;
        let mut buf = [0; N];
        let len = env.get_value_string_utf8(value, Some(&mut buf))?;
        assert_eq!(len, N, "fixed-length string has the wrong length");
        Ok(Self(buf))
    }
}

/// A UTF-16 string of exactly `N` code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedUtf16<const N: usize>(pub [u16; N]);

impl<const N: usize> FixedUtf16<N> {
    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }
}

impl<const N: usize> JsType for FixedUtf16<N> {
    const SIGNATURE: Signature = Signature::String;
}

impl<const N: usize> ToJs for FixedUtf16<N> {
    fn to_js(&self, env: &Env, _: TypeOptions) -> Result<RawValue> {
        env.create_string_utf16le(&self.0)
    }
}

impl<const N: usize> FromJs for FixedUtf16<N> {
    fn from_js(env: &Env, value: RawValue, options: TypeOptions) -> Result<Self> {
        check_value(env, value, options, LABEL, is_type(ValueType::String))?;
        let mut buf = [0; N];
        let len = env.get_value_string_utf16le(value, Some(&mut buf))?;
        assert_eq!(len, N, "fixed-length string has the wrong length");
        Ok(Self(buf))
    }
}

#[cfg(test)]
mod tests {
    use jsbind_sandbox::MemoryEngine;

    use super::*;

    #[test]
    fn utf8_round_trip() {
        let engine = MemoryEngine::new();
        let raw = "héllo wörld".to_js(&engine, TypeOptions::CHECKED).unwrap();
        let back = String::from_js(&engine, raw, TypeOptions::CHECKED).unwrap();
        assert_eq!(back, "héllo wörld");
    }

    #[test]
    fn utf16_round_trip() {
        let engine = MemoryEngine::new();
        let text = Utf16String::from("snow ☃");
        let raw = text.to_js(&engine, TypeOptions::CHECKED).unwrap();
        let back = Utf16String::from_js(&engine, raw, TypeOptions::CHECKED).unwrap();
        assert_eq!(back, text);
        assert_eq!(back.to_string(), "snow ☃");
    }

    #[test]
    fn c_strings() {
        let engine = MemoryEngine::new();
        let raw = c"native".to_js(&engine, TypeOptions::CHECKED).unwrap();
        let back = CString::from_js(&engine, raw, TypeOptions::CHECKED).unwrap();
        assert_eq!(back.as_c_str(), c"native");
    }

    #[test]
    fn fixed_length_strings() {
        let engine = MemoryEngine::new();
        let raw = "abcd".to_js(&engine, TypeOptions::CHECKED).unwrap();
        let fixed = FixedUtf8::<4>::from_js(&engine, raw, TypeOptions::CHECKED).unwrap();
        assert_eq!(fixed.as_str(), Some("abcd"));

        let wide = FixedUtf16::<4>::from_js(&engine, raw, TypeOptions::CHECKED).unwrap();
        assert_eq!(wide.as_slice(), &[0x61, 0x62, 0x63, 0x64]);
    }

    #[test]
    #[should_panic(expected = "fixed-length string has the wrong length")]
    fn fixed_length_mismatch_panics() {
        let engine = MemoryEngine::new();
        let raw = "abc".to_js(&engine, TypeOptions::CHECKED).unwrap();
        let _ = FixedUtf8::<4>::from_js(&engine, raw, TypeOptions::CHECKED);
    }

    #[test]
    fn non_string_is_rejected() {
        let engine = MemoryEngine::new();
        let raw = true.to_js(&engine, TypeOptions::CHECKED).unwrap();
        assert_eq!(
            String::from_js(&engine, raw, TypeOptions::CHECKED),
            Err(Error::PendingException)
        );
        assert_eq!(
            engine.take_exception_message().as_deref(),
            Some("Value is not of type 'string'")
        );
    }
}
