//! Adapting native functions into engine callbacks.
//!
//! A native function with a statically-known signature is turned into two
//! entry points:
//!
//! - the **untyped** entry receives a boxed receiver and argument vector,
//!   unmarshals every argument with the function's checking options, calls
//!   the function, and marshals the result. The engine always has it.
//! - the **typed** entry receives arguments the engine has already unwrapped
//!   according to the derived [`CallSignature`]. Unwrapped scalars arrive
//!   ready to use; boxed arguments only match a coarse tag (any object
//!   satisfies `Object`), so they are read with the same options as on the
//!   untyped path.
//!
//! Both entries open a handle scope around the call when the function takes
//! `&Env` and the options ask for it, record statistics, and turn any error
//! into a pending exception before returning to the engine.
//!
//! Two shapes of native function are accepted, each with up to eight
//! arguments:
//!
//! ```ignore
//! // Takes the environment; may fail.
//! fn greet(env: &Env, name: String) -> Result<JsString> { .. }
//! // Pure; never fails and is never scoped.
//! fn add(a: i32, b: i32) -> i32 { a + b }
//! ```
//!
//! A first argument of type [`JsReceiver`](jsbind_core::JsReceiver) receives
//! the call's `this` instead of a positional argument.

use std::rc::Rc;

use jsbind_core::{
    CallSignature, CallbackInfo, Env, Error, RawValue, Result, Signature, TypedCallback, TypedEntry,
    TypedValue, UntypedCallback,
};
use tracing::trace;

use crate::convert::{FromJs, JsType, ToJs};
use crate::error::ensure_pending;
use crate::options::{FunctionOptions, TypeOptions};
use crate::scope::{EscapableHandleScope, HandleScope};
use crate::statistics::CallKind;

// ============================================================================
// Argument tuples
// ============================================================================

/// The parameter list of a native function, as a tuple.
pub trait Arguments: Sized + 'static {
    /// Number of parameters, the receiver included.
    const LEN: usize;
    /// Whether the first parameter is the receiver.
    const HAS_RECEIVER: bool;

    /// Number of positional arguments a caller passes.
    fn arity() -> usize {
        Self::LEN - usize::from(Self::HAS_RECEIVER)
    }

    /// Signature tags of the positional arguments.
    fn signatures() -> Vec<Signature>;

    fn from_untyped(
        env: &Env,
        receiver: RawValue,
        args: &[RawValue],
        options: TypeOptions,
    ) -> Result<Self>;

    /// Read typed arguments; a receiver, if any, comes first.
    fn from_typed(env: &Env, args: &[TypedValue], options: TypeOptions) -> Result<Self>;
}

/// A parameter tuple whose values can also be marshalled, for calling a
/// function from native code.
pub trait IntoArguments: Arguments {
    /// Every value in order, the receiver included.
    fn to_values(&self, env: &Env, options: TypeOptions) -> Result<Vec<RawValue>>;
}

fn next<T>(values: &mut impl Iterator<Item = T>) -> Result<T> {
    values.next().ok_or(Error::InvalidArgument("missing argument"))
}

impl Arguments for () {
    const LEN: usize = 0;
    const HAS_RECEIVER: bool = false;

    fn signatures() -> Vec<Signature> {
        Vec::new()
    }

    fn from_untyped(_: &Env, _: RawValue, _: &[RawValue], _: TypeOptions) -> Result<Self> {
        Ok(())
    }

    fn from_typed(_: &Env, _: &[TypedValue], _: TypeOptions) -> Result<Self> {
        Ok(())
    }
}

impl IntoArguments for () {
    fn to_values(&self, _: &Env, _: TypeOptions) -> Result<Vec<RawValue>> {
        Ok(Vec::new())
    }
}

macro_rules! impl_arguments {
    ($len:literal => $first:ident $first_index:tt $(, $name:ident $index:tt)*) => {
        impl<$first, $($name),*> Arguments for ($first, $($name,)*)
        where
            $first: FromJs + JsType + 'static,
            $($name: FromJs + JsType + 'static,)*
        {
            const LEN: usize = $len;
            const HAS_RECEIVER: bool = <$first as JsType>::IS_RECEIVER;

            fn signatures() -> Vec<Signature> {
                let all = [<$first as JsType>::SIGNATURE, $(<$name as JsType>::SIGNATURE),*];
                all[usize::from(Self::HAS_RECEIVER)..].to_vec()
            }

            fn from_untyped(
                env: &Env,
                receiver: RawValue,
                args: &[RawValue],
                options: TypeOptions,
            ) -> Result<Self> {
                let mut values = Self::HAS_RECEIVER
                    .then_some(receiver)
                    .into_iter()
                    .chain(args.iter().copied());
                Ok((
                    $first::from_js(env, next(&mut values)?, options)?,
                    $($name::from_js(env, next(&mut values)?, options)?,)*
                ))
            }

            fn from_typed(env: &Env, args: &[TypedValue], options: TypeOptions) -> Result<Self> {
                let mut values = args.iter().copied();
                Ok((
                    $first::from_typed(env, next(&mut values)?, options)?,
                    $($name::from_typed(env, next(&mut values)?, options)?,)*
                ))
            }
        }

        impl<$first, $($name),*> IntoArguments for ($first, $($name,)*)
        where
            $first: ToJs + FromJs + JsType + 'static,
            $($name: ToJs + FromJs + JsType + 'static,)*
        {
            fn to_values(&self, env: &Env, options: TypeOptions) -> Result<Vec<RawValue>> {
                Ok(vec![
                    self.$first_index.to_js(env, options)?,
                    $(self.$index.to_js(env, options)?,)*
                ])
            }
        }
    };
}

impl_arguments!(1 => A 0);
impl_arguments!(2 => A 0, B 1);
impl_arguments!(3 => A 0, B 1, C 2);
impl_arguments!(4 => A 0, B 1, C 2, D 3);
impl_arguments!(5 => A 0, B 1, C 2, D 3, E 4);
impl_arguments!(6 => A 0, B 1, C 2, D 3, E 4, F 5);
impl_arguments!(7 => A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_arguments!(8 => A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

// ============================================================================
// Native functions
// ============================================================================

/// Marker for functions taking `&Env` first and returning `Result`.
#[derive(Debug)]
pub enum WithEnv {}

/// Marker for functions that take only converted arguments.
#[derive(Debug)]
pub enum Pure {}

/// A native function the adapter can expose.
///
/// `Marker` distinguishes the accepted shapes and is always inferred.
pub trait NativeFunction<Marker>: 'static {
    type Output: ToJs + JsType + 'static;
    type Args: Arguments;

    /// Whether the function takes the environment, and may therefore be scoped.
    const USES_ENV: bool;

    fn invoke(&self, env: &Env, args: Self::Args) -> Result<Self::Output>;

    /// The call signature derived from the parameter and result types.
    fn signature() -> CallSignature
    where
        Self: Sized,
    {
        CallSignature {
            result: <Self::Output as JsType>::SIGNATURE,
            args: <Self::Args as Arguments>::signatures(),
            receiver: <Self::Args as Arguments>::HAS_RECEIVER,
        }
    }
}

macro_rules! impl_native_function {
    ($($name:ident $index:tt),*) => {
        impl<Func, R, $($name),*> NativeFunction<(WithEnv, fn($($name),*) -> R)> for Func
        where
            Func: Fn(&Env, $($name),*) -> Result<R> + 'static,
            R: ToJs + JsType + 'static,
            ($($name,)*): Arguments,
        {
            type Output = R;
            type Args = ($($name,)*);
            const USES_ENV: bool = true;

            #[allow(unused_variables)]
            fn invoke(&self, env: &Env, args: Self::Args) -> Result<R> {
                self(env, $(args.$index),*)
            }
        }

        impl<Func, R, $($name),*> NativeFunction<(Pure, fn($($name),*) -> R)> for Func
        where
            Func: Fn($($name),*) -> R + 'static,
            R: ToJs + JsType + 'static,
            ($($name,)*): Arguments,
        {
            type Output = R;
            type Args = ($($name,)*);
            const USES_ENV: bool = false;

            #[allow(unused_variables)]
            fn invoke(&self, _: &Env, args: Self::Args) -> Result<R> {
                Ok(self($(args.$index),*))
            }
        }
    };
}

impl_native_function!();
impl_native_function!(A 0);
impl_native_function!(A 0, B 1);
impl_native_function!(A 0, B 1, C 2);
impl_native_function!(A 0, B 1, C 2, D 3);
impl_native_function!(A 0, B 1, C 2, D 3, E 4);
impl_native_function!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_native_function!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_native_function!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

// ============================================================================
// Entry points
// ============================================================================

/// The scope wrapped around one call.
enum CallScope<'e> {
    None,
    Plain(HandleScope<'e>),
    Escapable(EscapableHandleScope<'e>),
}

impl<'e> CallScope<'e> {
    fn open(env: &'e Env, scoped: bool, escapable: bool) -> Self {
        match (scoped, escapable) {
            (false, _) => CallScope::None,
            (true, false) => CallScope::Plain(HandleScope::open(env)),
            (true, true) => CallScope::Escapable(EscapableHandleScope::open(env)),
        }
    }

    /// Make `value` outlive the scope.
    fn finish(&self, value: RawValue) -> Result<RawValue> {
        match self {
            CallScope::Escapable(scope) => scope.escape(value),
            CallScope::None | CallScope::Plain(_) => Ok(value),
        }
    }
}

fn record(options: &FunctionOptions, kind: CallKind) {
    if let Some(statistics) = &options.statistics {
        statistics.record(kind);
    }
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn call_untyped<F, M>(
    f: &F,
    env: &Env,
    info: &CallbackInfo,
    options: TypeOptions,
) -> Result<RawValue>
where
    F: NativeFunction<M>,
{
    let arity = F::Args::arity();
    assert_eq!(
        info.len(),
        arity,
        "native function called with {} arguments, expects {arity}",
        info.len()
    );
    let args = F::Args::from_untyped(env, info.receiver(), info.args(), options)?;
    let output = f.invoke(env, args)?;
    output.to_js(env, options)
}

#[cfg_attr(feature = "profiling", profiling::function)]
fn call_typed<F, M>(
    f: &F,
    env: &Env,
    args: &[TypedValue],
    options: TypeOptions,
) -> Result<TypedValue>
where
    F: NativeFunction<M>,
{
    let args = F::Args::from_typed(env, args, options)?;
    let output = f.invoke(env, args)?;
    output.to_typed(env, options)
}

/// Build the untyped entry point for `f`.
pub(crate) fn untyped_entry<F, M>(f: Rc<F>, options: FunctionOptions) -> UntypedCallback
where
    F: NativeFunction<M>,
    M: 'static,
{
    Rc::new(move |env: &Env, info: &CallbackInfo| {
        record(&options, CallKind::Untyped);
        trace!(kind = ?CallKind::Untyped, argc = info.len(), "native call");

        let scope = CallScope::open(env, F::USES_ENV && options.scoped, true);
        let result = call_untyped(&*f, env, info, options.type_options())
            .and_then(|value| scope.finish(value));
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                ensure_pending(env, err);
                None
            }
        }
    })
}

/// Build the typed entry point for `f`.
pub(crate) fn typed_entry<F, M>(f: Rc<F>, options: FunctionOptions) -> TypedEntry
where
    F: NativeFunction<M>,
    M: 'static,
{
    let callback: TypedCallback = Rc::new(move |env: &Env, args: &[TypedValue]| {
        record(&options, CallKind::Typed);
        trace!(kind = ?CallKind::Typed, argc = args.len(), "native call");

        let escapable = <F::Output as JsType>::TYPED_AS_VALUE;
        let scope = CallScope::open(env, F::USES_ENV && options.scoped, escapable);
        let result =
            call_typed(&*f, env, args, options.type_options()).and_then(|value| match value {
                TypedValue::Value(raw) => scope.finish(raw).map(TypedValue::Value),
                other => Ok(other),
            });
        match result {
            Ok(value) => value,
            Err(err) => {
                ensure_pending(env, err);
                TypedValue::Undefined
            }
        }
    });

    TypedEntry {
        signature: F::signature(),
        callback,
    }
}
