//! Handle scope guards.
//!
//! Scopes are a stack resource: every value the engine hands out while a
//! scope is open stays rooted until that scope closes. The guards here close
//! their scope when dropped, so every exit path of a callback (including
//! early returns through `?`) releases it.

use jsbind_core::{Env, Handle, Kind, RawValue, Result, ScopeId};

/// A plain handle scope, closed on drop.
pub struct HandleScope<'e> {
    env: &'e Env,
    id: ScopeId,
}

impl<'e> HandleScope<'e> {
    pub fn new(env: &'e Env) -> Result<Self> {
        let id = env.open_handle_scope()?;
        Ok(Self { env, id })
    }

    /// Open a scope, treating failure as a broken engine contract.
    pub fn open(env: &'e Env) -> Self {
        match Self::new(env) {
            Ok(scope) => scope,
            Err(err) => panic!("failed to open handle scope: {err}"),
        }
    }
}

impl Drop for HandleScope<'_> {
    fn drop(&mut self) {
        let result = self.env.close_handle_scope(self.id);
        if let Err(err) = result
            && !std::thread::panicking()
        {
            panic!("failed to close handle scope: {err}");
        }
    }
}

/// A handle scope that can promote one value to its parent, closed on drop.
pub struct EscapableHandleScope<'e> {
    env: &'e Env,
    id: ScopeId,
}

impl<'e> EscapableHandleScope<'e> {
    pub fn new(env: &'e Env) -> Result<Self> {
        let id = env.open_escapable_handle_scope()?;
        Ok(Self { env, id })
    }

    /// Open a scope, treating failure as a broken engine contract.
    pub fn open(env: &'e Env) -> Self {
        match Self::new(env) {
            Ok(scope) => scope,
            Err(err) => panic!("failed to open escapable handle scope: {err}"),
        }
    }

    /// Keep `value` alive after this scope closes. Allowed once.
    pub fn escape(&self, value: RawValue) -> Result<RawValue> {
        self.env.escape_handle(self.id, value)
    }

    pub fn escape_handle<K: Kind>(&self, handle: Handle<K>) -> Result<Handle<K>> {
        let raw = self.escape(handle.to_raw()?)?;
        Ok(Handle::from_raw(raw))
    }
}

impl Drop for EscapableHandleScope<'_> {
    fn drop(&mut self) {
        let result = self.env.close_escapable_handle_scope(self.id);
        if let Err(err) = result
            && !std::thread::panicking()
        {
            panic!("failed to close escapable handle scope: {err}");
        }
    }
}
