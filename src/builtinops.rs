//! Built-in operations registry.
//!
//! One table lists every name the evaluator gives meaning to without a user
//! definition: the three special forms and the primitive procedures.
//!
//! ## Functions vs Special Forms
//!
//! - **Functions**: all operands are evaluated left to right before the call
//!   (e.g. `+`, `car`, `list`). They are bound in the root environment as
//!   [`Value::BuiltinFunction`] and can be passed around like any value.
//! - **Special Forms**: receive their operands unevaluated (`if`, `define`,
//!   `quote`). They are recognized by the literal head symbol of a form and are
//!   never bound in an environment.
//!
//! ## Strict Typing
//!
//! - Arithmetic and comparison take exactly two operands of the *same* numeric
//!   kind; `(+ 1 1.5)` is a type error, there is no coercion
//! - Integer arithmetic is checked: overflow and division by zero are errors
//! - `car`/`cdr` reject the empty list and every non-pair
//! - `=` is deep structural equality and never fails on mixed kinds

use crate::Error;
use crate::ast::{self, Number, Value};
use crate::evaluator::intooperation::{
    IntoOperation, IntoVariadicOperation, OperationFn, ValueIter,
};
use crate::evaluator::{Arity, Depth, Environment, eval_define, eval_if, eval_quote};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Signature shared by all special forms: unevaluated operands, the current
/// frame, and the depth budget of the enclosing evaluation.
pub type SpecialFormFn = fn(&[Value], &mut Environment, Depth) -> Result<Value, Error>;

/// How a built-in is invoked
#[derive(Clone)]
pub enum OpKind {
    /// Takes evaluated arguments through the canonical erased signature
    Function(Arc<OperationFn>),
    /// Takes unevaluated operands and the environment
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The name this operation is reached by
    pub id: &'static str,
    pub op_kind: OpKind,
    /// Expected number of operands
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    pub fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }
}

//
// Builtin Function Implementations
//

fn mismatched_kinds(op: &str, a: Number, b: Number) -> Error {
    Error::TypeError(format!(
        "{op} requires two operands of the same numeric kind, got {} and {}",
        a.kind_name(),
        b.kind_name()
    ))
}

// Integers use the named checked operation, floats the plain IEEE operator.
macro_rules! numeric_arithmetic {
    ($name:ident, $op_str:literal, $checked:ident, $op:tt, $overflow:literal) => {
        fn $name(a: Number, b: Number) -> Result<Number, Error> {
            match (a, b) {
                (Number::Integer(x), Number::Integer(y)) => x
                    .$checked(y)
                    .map(Number::Integer)
                    .ok_or_else(|| Error::EvalError($overflow.into())),
                (Number::Float(x), Number::Float(y)) => Ok(Number::Float(x $op y)),
                (a, b) => Err(mismatched_kinds($op_str, a, b)),
            }
        }
    };
}

numeric_arithmetic!(builtin_add, "+", checked_add, +, "Integer overflow in addition");
numeric_arithmetic!(builtin_sub, "-", checked_sub, -, "Integer overflow in subtraction");
numeric_arithmetic!(builtin_mul, "*", checked_mul, *, "Integer overflow in multiplication");

// Integer division truncates toward zero. Float division follows IEEE, so a
// zero divisor yields an infinity or NaN rather than an error.
fn builtin_div(a: Number, b: Number) -> Result<Number, Error> {
    match (a, b) {
        (Number::Integer(_), Number::Integer(0)) => {
            Err(Error::EvalError("division by zero".into()))
        }
        (Number::Integer(x), Number::Integer(y)) => x
            .checked_div(y)
            .map(Number::Integer)
            .ok_or_else(|| Error::EvalError("Integer overflow in division".into())),
        (Number::Float(x), Number::Float(y)) => Ok(Number::Float(x / y)),
        (a, b) => Err(mismatched_kinds("/", a, b)),
    }
}

macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:literal) => {
        fn $name(a: Number, b: Number) -> Result<bool, Error> {
            match (a, b) {
                (Number::Integer(x), Number::Integer(y)) => Ok(x $op y),
                (Number::Float(x), Number::Float(y)) => Ok(x $op y),
                (a, b) => Err(mismatched_kinds($op_str, a, b)),
            }
        }
    };
}

numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");

fn builtin_abs(n: Number) -> Result<Number, Error> {
    match n {
        Number::Integer(i) => i
            .checked_abs()
            .map(Number::Integer)
            .ok_or_else(|| Error::EvalError("Integer overflow in abs".into())),
        Number::Float(x) => Ok(Number::Float(x.abs())),
    }
}

fn builtin_equal(a: Value, b: Value) -> bool {
    a == b
}

fn builtin_car(pair: Value) -> Result<Value, Error> {
    match &pair {
        Value::Pair(car, _) => Ok(Value::clone(car)),
        other => Err(Error::TypeError(format!(
            "car requires a pair, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_cdr(pair: Value) -> Result<Value, Error> {
    match &pair {
        Value::Pair(_, cdr) => Ok(Value::clone(cdr)),
        other => Err(Error::TypeError(format!(
            "cdr requires a pair, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_cadr(list: Value) -> Result<Value, Error> {
    builtin_car(builtin_cdr(list)?)
}

fn builtin_caddr(list: Value) -> Result<Value, Error> {
    builtin_cadr(builtin_cdr(list)?)
}

fn builtin_cadddr(list: Value) -> Result<Value, Error> {
    builtin_caddr(builtin_cdr(list)?)
}

fn builtin_cons(car: Value, cdr: Value) -> Value {
    Value::cons(car, cdr)
}

fn builtin_list(args: ValueIter<'_>) -> Value {
    Value::list(args.cloned())
}

fn builtin_append(list: Value, element: Value) -> Result<Value, Error> {
    ast::append(&list, element)
}

/// Global registry of all built-in operations, built once on first use.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn builtin_fixed<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoOperation<Args>,
    {
        <F as IntoOperation<Args>>::into_operation(f)
    }

    fn builtin_variadic<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoVariadicOperation<Args>,
    {
        <F as IntoVariadicOperation<Args>>::into_variadic_operation(f)
    }

    fn function(id: &'static str, arity: Arity, func: Arc<OperationFn>) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind: OpKind::Function(func),
            arity,
        }
    }

    fn special_form(id: &'static str, arity: Arity, form: SpecialFormFn) -> BuiltinOp {
        BuiltinOp {
            id,
            op_kind: OpKind::SpecialForm(form),
            arity,
        }
    }

    vec![
        // Special forms
        special_form("if", Arity::Exact(3), eval_if),
        special_form("define", Arity::Exact(2), eval_define),
        special_form("quote", Arity::Exact(1), eval_quote),
        // Arithmetic
        function("+", Arity::Exact(2), builtin_fixed::<(Number, Number), _>(builtin_add)),
        function("-", Arity::Exact(2), builtin_fixed::<(Number, Number), _>(builtin_sub)),
        function("*", Arity::Exact(2), builtin_fixed::<(Number, Number), _>(builtin_mul)),
        function("/", Arity::Exact(2), builtin_fixed::<(Number, Number), _>(builtin_div)),
        function("abs", Arity::Exact(1), builtin_fixed::<(Number,), _>(builtin_abs)),
        // Comparison
        function("<", Arity::Exact(2), builtin_fixed::<(Number, Number), _>(builtin_lt)),
        function(">", Arity::Exact(2), builtin_fixed::<(Number, Number), _>(builtin_gt)),
        function("=", Arity::Exact(2), builtin_fixed::<(Value, Value), _>(builtin_equal)),
        // Pairs and lists
        function("car", Arity::Exact(1), builtin_fixed::<(Value,), _>(builtin_car)),
        function("cdr", Arity::Exact(1), builtin_fixed::<(Value,), _>(builtin_cdr)),
        function("cadr", Arity::Exact(1), builtin_fixed::<(Value,), _>(builtin_cadr)),
        function("caddr", Arity::Exact(1), builtin_fixed::<(Value,), _>(builtin_caddr)),
        function("cadddr", Arity::Exact(1), builtin_fixed::<(Value,), _>(builtin_cadddr)),
        function("cons", Arity::Exact(2), builtin_fixed::<(Value, Value), _>(builtin_cons)),
        function(
            "list",
            Arity::Any,
            builtin_variadic::<(ValueIter<'static>,), _>(builtin_list),
        ),
        function(
            "append",
            Arity::Exact(2),
            builtin_fixed::<(Value, Value), _>(builtin_append),
        ),
    ]
});

/// Lazy static map from id to BuiltinOp (private - use find_builtin_op)
static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by name
pub fn find_builtin_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}

/// Find a special form by the head symbol of a form
pub(crate) fn find_special_form(id: &str) -> Option<(&'static BuiltinOp, SpecialFormFn)> {
    let op = find_builtin_op(id)?;
    match op.op_kind {
        OpKind::SpecialForm(form) => Some((op, form)),
        OpKind::Function(_) => None,
    }
}
