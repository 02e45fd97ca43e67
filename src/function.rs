//! Registering native functions and calling functions from native code.

use std::rc::Rc;

use jsbind_core::{Env, Handle, JsFunction, JsObject, Result};
use tracing::debug;

use crate::callback::{Arguments, IntoArguments, NativeFunction, typed_entry, untyped_entry};
use crate::convert::FromJs;
use crate::options::{FunctionOptions, TypeOptions};

/// Expose `f` to JavaScript as a function named `name`.
///
/// The engine receives both entry points and the signature derived from the
/// parameter and result types. The returned handle remembers the native
/// signature, so [`call_function`] can marshal arguments for it.
///
/// ```ignore
/// let greet = create_function(env, "greet", |_: &Env| -> Result<String> {
///     Ok("hello world".into())
/// }, FunctionOptions::new())?;
/// assert_eq!(call_function(env, &greet, ())?, "hello world");
/// ```
pub fn create_function<F, M>(
    env: &Env,
    name: &str,
    f: F,
    options: FunctionOptions,
) -> Result<JsFunction<F::Output, F::Args>>
where
    F: NativeFunction<M>,
    M: 'static,
{
    let signature = F::signature();
    debug!(
        function = name,
        ?signature,
        checked = options.checked,
        scoped = options.scoped,
        "registering native function"
    );

    let f = Rc::new(f);
    let untyped = untyped_entry(f.clone(), options.clone());
    let typed = typed_entry(f, options);
    let function = env.create_function(name, untyped, Some(typed))?;
    Ok(Handle::from_raw(function))
}

/// Create a function and store it on `object` under `name`.
pub fn set_function_property<F, M>(
    env: &Env,
    object: JsObject,
    name: &str,
    f: F,
    options: FunctionOptions,
) -> Result<JsFunction<F::Output, F::Args>>
where
    F: NativeFunction<M>,
    M: 'static,
{
    let function = create_function(env, name, f, options)?;
    env.set_named_property(object.to_raw()?, name, function.to_raw()?)?;
    Ok(function)
}

/// Call `function` from native code.
///
/// Arguments are marshalled according to the function's native signature.
/// If that signature starts with a receiver, the first argument becomes
/// `this`; otherwise `this` is the global object. An exception thrown by the
/// callee is left pending and reported as [`Error::PendingException`].
///
/// [`Error::PendingException`]: jsbind_core::Error::PendingException
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn call_function<R, A>(env: &Env, function: &JsFunction<R, A>, args: A) -> Result<R>
where
    R: FromJs + 'static,
    A: IntoArguments,
{
    let options = TypeOptions::default();
    let mut values = args.to_values(env, options)?;
    let receiver = if A::HAS_RECEIVER {
        values.remove(0)
    } else {
        env.get_global()?
    };
    let result = env.call_function(receiver, function.to_raw()?, &values)?;
    R::from_js(env, result, options)
}

/// Number of positional arguments `function` expects.
pub fn function_arity<R: 'static, A: Arguments>(_: &JsFunction<R, A>) -> usize {
    A::arity()
}

#[cfg(test)]
mod tests {
    use jsbind_core::{Engine, JsReceiver, ValueType};
    use jsbind_sandbox::MemoryEngine;

    use super::*;

    #[test]
    fn create_and_call_plain_function() {
        let engine = MemoryEngine::new();
        let add = create_function(
            &engine,
            "add",
            |a: i32, b: i32| a + b,
            FunctionOptions::new(),
        )
        .unwrap();
        assert_eq!(engine.type_of(add.to_raw().unwrap()).unwrap(), ValueType::Function);
        assert_eq!(call_function(&engine, &add, (2, 3)), Ok(5));
        assert_eq!(function_arity(&add), 2);
    }

    #[test]
    fn function_property_is_reachable_by_name() {
        let engine = MemoryEngine::new();
        let object = JsObject::from_raw(engine.create_object().unwrap());
        set_function_property(&engine, object, "answer", || 42u32, FunctionOptions::new()).unwrap();

        let stored = engine.get_named_property(object.to_raw().unwrap(), "answer").unwrap();
        assert_eq!(engine.type_of(stored).unwrap(), ValueType::Function);
    }

    #[test]
    fn receiver_is_first_argument() {
        let engine = MemoryEngine::new();
        let this_name = |env: &Env, this: JsReceiver| -> Result<String> {
            let name = env.get_named_property(this.to_raw()?, "name")?;
            String::from_js(env, name, TypeOptions::CHECKED)
        };
        let function =
            create_function(&engine, "thisName", this_name, FunctionOptions::new()).unwrap();

        let object = engine.create_object().unwrap();
        let name = engine.create_string_utf8(b"widget").unwrap();
        engine.set_named_property(object, "name", name).unwrap();

        let this = JsReceiver::from_raw(object);
        assert_eq!(call_function(&engine, &function, (this,)).as_deref(), Ok("widget"));
        assert_eq!(function_arity(&function), 0);
    }
}
