use crate::Error;
use crate::ast::{Number, Value};
use std::iter::FusedIterator;
use std::sync::Arc;

// Adapter layer that turns strongly-typed Rust functions into the erased
// `OperationFn` every procedure is called through. The evaluator only ever
// sees `Vec<Value> -> Result<Value, Error>`; arity and operand-kind checks
// happen here, once, on the way in.

/// Canonical erased builtin function type used by the evaluator.
///
/// Builtins receive ownership of their argument vector, so they can move
/// operands into the result without cloning.
pub type OperationFn = dyn Fn(Vec<Value>) -> Result<Value, Error> + Send + Sync;

// =====================================================================
// Fixed parameters
// =====================================================================

/// Turns one evaluated argument into a typed parameter.
///
/// `Param<'a>` is the type the builtin actually receives for a given
/// lifetime of the argument slot, which lets iterator parameters borrow
/// while scalar parameters take ownership.
pub trait FromParam {
    type Param<'a>;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error>;
}

impl FromParam for Value {
    type Param<'a> = Value;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        // Move the argument out; the slot is dropped right after the call.
        Ok(std::mem::replace(value, Value::Nil))
    }
}

impl FromParam for Number {
    type Param<'a> = Number;

    fn from_arg<'a>(value: &'a mut Value) -> Result<Self::Param<'a>, Error> {
        Number::try_from(std::mem::replace(value, Value::Nil))
    }
}

// =====================================================================
// Rest parameters
// =====================================================================

/// Borrowed iterator over the trailing arguments of a variadic call.
pub struct ValueIter<'a> {
    inner: std::slice::Iter<'a, Value>,
}

impl<'a> Iterator for ValueIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for ValueIter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl ExactSizeIterator for ValueIter<'_> {}
impl FusedIterator for ValueIter<'_> {}

/// Builds a rest parameter from the argument tail.
pub trait FromRest {
    type Param<'a>;

    fn from_rest<'a>(slice: &'a [Value]) -> Result<Self::Param<'a>, Error>;
}

impl FromRest for ValueIter<'static> {
    type Param<'a> = ValueIter<'a>;

    fn from_rest<'a>(slice: &'a [Value]) -> Result<Self::Param<'a>, Error> {
        Ok(ValueIter {
            inner: slice.iter(),
        })
    }
}

// =====================================================================
// Return values
// =====================================================================

/// Normalizes builtin return types to `Result<Value, Error>`.
pub trait IntoValueResult {
    fn into_value_result(self) -> Result<Value, Error>;
}

impl<T> IntoValueResult for Result<T, Error>
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<T> IntoValueResult for T
where
    T: Into<Value>,
{
    fn into_value_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// Converts a fixed-arity typed function into an [`OperationFn`].
/// `Args` is the tuple of parameter types, used only to pick the impl.
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;
}

/// Converts a function whose last parameter is a rest iterator into an
/// [`OperationFn`].
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Arc<OperationFn>;
}

// =====================================================================
// Variadic adapters
// =====================================================================

impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromRest,
    F: for<'a> Fn(<I as FromRest>::Param<'a>) -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_variadic_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            let rest_param: <I as FromRest>::Param<'_> = <I as FromRest>::from_rest(&args[..])?;
            (self)(rest_param).into_value_result()
        })
    }
}

/// Implements `IntoVariadicOperation` for a fixed prefix of `FromParam`
/// parameters followed by one rest parameter.
macro_rules! impl_into_variadic_operation_for_prefix_and_rest {
    ($prefix:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, I, R, $( $A ),+> IntoVariadicOperation<( $( $A, )+ I, )> for F
        where
            I: FromRest,
            $( $A: FromParam, )+
            F: for<'a> Fn(
                    $( <$A as FromParam>::Param<'a> ),+,
                    <I as FromRest>::Param<'a>,
                ) -> R
                + Send
                + Sync
                + 'static,
            R: IntoValueResult,
        {
            fn into_variadic_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+, ref mut rest @ .. ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let rest_param: <I as FromRest>::Param<'_> =
                                <I as FromRest>::from_rest(&*rest)?;

                            (self)( $( $p ),+, rest_param ).into_value_result()
                        }
                        _ => Err(Error::arity_error($prefix, len)),
                    }
                })
            }
        }
    };
}

impl_into_variadic_operation_for_prefix_and_rest!(1, v0, p0: A1);
impl_into_variadic_operation_for_prefix_and_rest!(2, v0, p0: A1, v1, p1: A2);

// =====================================================================
// Fixed-arity adapters
// =====================================================================

/// Implements `IntoOperation` for one arity: checks the argument count,
/// then converts each slot with `FromParam` before calling the function.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( <$A as FromParam>::Param<'a> ),+ ) -> R
                + Send
                + Sync
                + 'static,
            $( $A: FromParam, )+
            R: IntoValueResult,
        {
            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Value>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+ ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            (self)( $( $p ),+ ).into_value_result()
                        }
                        _ => Err(Error::arity_error($arity, len)),
                    }
                })
            }
        }
    };
}

impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoValueResult,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Value>| {
            if !args.is_empty() {
                return Err(Error::arity_error(0, args.len()));
            }
            (self)().into_value_result()
        })
    }
}

impl_into_operation_for_arity!(1, v0, p0: A1);
impl_into_operation_for_arity!(2, v0, p0: A1, v1, p1: A2);
impl_into_operation_for_arity!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    fn number_kind(n: Number) -> Value {
        match n {
            Number::Integer(_) => Value::symbol("integer"),
            Number::Float(_) => Value::symbol("float"),
        }
    }

    fn forty_two() -> i64 {
        42
    }

    fn list_all(rest: ValueIter<'_>) -> Value {
        Value::list(rest.cloned().collect::<Vec<_>>())
    }

    fn count_after_first(first: Value, rest: ValueIter<'_>) -> Result<Value, Error> {
        let count = i64::try_from(rest.count())
            .map_err(|_| Error::EvalError("too many arguments".into()))?;
        Ok(Value::list([first, Value::Integer(count)]))
    }

    #[test]
    fn test_fixed_arity_adapter() {
        let op = <_ as IntoOperation<(Number,)>>::into_operation(number_kind);

        assert_eq!(op(vec![val(1)]).unwrap(), Value::symbol("integer"));
        assert_eq!(op(vec![val(1.0)]).unwrap(), Value::symbol("float"));
        assert!(matches!(op(vec![val(true)]), Err(Error::TypeError(_))));
        assert!(matches!(
            op(vec![]),
            Err(Error::ArityError {
                expected: 1,
                got: 0,
                ..
            })
        ));
        assert!(matches!(
            op(vec![val(1), val(2)]),
            Err(Error::ArityError { got: 2, .. })
        ));
    }

    #[test]
    fn test_zero_arity_adapter() {
        let op = <_ as IntoOperation<()>>::into_operation(forty_two);
        assert_eq!(op(vec![]).unwrap(), val(42));
        assert!(op(vec![val(1)]).is_err());
    }

    #[test]
    fn test_variadic_adapters() {
        let list_op =
            <_ as IntoVariadicOperation<(ValueIter<'static>,)>>::into_variadic_operation(list_all);
        assert_eq!(list_op(vec![]).unwrap(), Value::Nil);
        assert_eq!(list_op(vec![val(1), val(2)]).unwrap(), val([1, 2]));

        let prefixed = <_ as IntoVariadicOperation<(Value, ValueIter<'static>)>>::into_variadic_operation(
            count_after_first,
        );
        assert_eq!(
            prefixed(vec![val(9), val(1), val(2)]).unwrap(),
            val([9, 2])
        );
        assert!(matches!(
            prefixed(vec![]),
            Err(Error::ArityError { expected: 1, .. })
        ));
    }
}
