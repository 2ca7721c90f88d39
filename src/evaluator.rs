use crate::DEFAULT_MAX_EVAL_DEPTH;
use crate::Error;
use crate::ast::Value;
use crate::builtinops::{OpKind, find_special_form, get_builtin_ops};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

pub mod intooperation;

use intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};

/// Expected operand count of a built-in operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    /// Inclusive on both ends
    Range(usize, usize),
    Any,
}

impl Arity {
    /// Check an argument count, reporting the smallest acceptable count on failure.
    pub fn validate(self, got: usize) -> Result<(), Error> {
        let ok = match self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Range(min, max) => (min..=max).contains(&got),
            Arity::Any => true,
        };
        if ok {
            return Ok(());
        }
        let expected = match self {
            Arity::Exact(n) | Arity::AtLeast(n) => n,
            Arity::Range(min, max) => {
                if got < min {
                    min
                } else {
                    max
                }
            }
            Arity::Any => 0,
        };
        Err(Error::arity_error(expected, got))
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "between {min} and {max}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Limits applied to a single top-level evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvalConfig {
    /// Maximum nesting of forms being evaluated at once. `None` leaves the
    /// host stack as the only bound.
    pub max_depth: Option<usize>,
}

impl EvalConfig {
    /// Configuration capped at [`DEFAULT_MAX_EVAL_DEPTH`].
    pub fn bounded() -> Self {
        EvalConfig {
            max_depth: Some(DEFAULT_MAX_EVAL_DEPTH),
        }
    }
}

/// Depth budget threaded through evaluation and into special forms.
#[derive(Debug, Clone, Copy)]
pub struct Depth {
    current: usize,
    limit: Option<usize>,
}

impl Depth {
    fn root(config: &EvalConfig) -> Self {
        Depth {
            current: 0,
            limit: config.max_depth,
        }
    }

    fn enter(self) -> Result<Self, Error> {
        let current = self.current + 1;
        match self.limit {
            Some(max) if current > max => Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {max})"
            ))),
            _ => Ok(Depth { current, ..self }),
        }
    }
}

/// One frame of variable bindings, with an optional shared parent.
///
/// A frame only ever writes to its own map; the parent is reachable for
/// lookup but never mutated through the child.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: HashMap<String, Value>,
    parent: Option<Arc<Environment>>,
}

impl Environment {
    /// An empty root frame with no bindings at all.
    /// Use [`create_global_env`] for a frame with the primitive library.
    pub fn new() -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: None,
        }
    }

    pub fn with_parent(parent: Arc<Environment>) -> Self {
        Environment {
            bindings: HashMap::new(),
            parent: Some(parent),
        }
    }

    /// Bind `name` in this frame, replacing any previous binding here.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let mut frame = self;
        loop {
            if let Some(value) = frame.bindings.get(name) {
                return Some(value);
            }
            frame = frame.parent.as_deref()?;
        }
    }

    /// Like [`Environment::get`], failing with `UnboundVariable` when no frame
    /// in the chain binds `name`.
    pub fn lookup(&self, name: &str) -> Result<&Value, Error> {
        self.get(name)
            .ok_or_else(|| Error::UnboundVariable(name.to_owned()))
    }

    /// Whether `name` is bound in this frame, ignoring parents
    pub fn contains_local(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    fn frame_depth(&self) -> usize {
        std::iter::successors(self.parent.as_deref(), |frame| frame.parent.as_deref()).count()
    }

    /// Register a function that already works on raw argument slices.
    ///
    /// # Example
    /// ```
    /// use minilisp::evaluator::create_global_env;
    /// use minilisp::ast::Value;
    /// use minilisp::{Error, eval, read};
    ///
    /// fn arg_count(args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::from(i64::try_from(args.len()).unwrap_or(i64::MAX)))
    /// }
    ///
    /// let mut env = create_global_env();
    /// env.register_builtin_function("arg-count", arg_count);
    /// let expr = read("(arg-count 1 2 3)").unwrap();
    /// assert_eq!(eval(&expr, &mut env).unwrap(), Value::from(3));
    /// ```
    pub fn register_builtin_function(
        &mut self,
        name: &str,
        func: fn(&[Value]) -> Result<Value, Error>,
    ) {
        let wrapped: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| func(&args));
        self.define_builtin(name, wrapped);
    }

    /// Register a strongly-typed Rust function as a primitive.
    ///
    /// Parameters may be [`Value`] (any operand) or [`crate::ast::Number`]
    /// (integer or float); the return type may be anything convertible into a
    /// `Value`, or a `Result` of one. The operand count is checked against
    /// the Rust signature and a mismatch is an `ArityError`.
    ///
    /// ```
    /// use minilisp::ast::{Number, Value};
    /// use minilisp::evaluator::create_global_env;
    /// use minilisp::{eval, read};
    ///
    /// fn is_integer(n: Number) -> bool {
    ///     matches!(n, Number::Integer(_))
    /// }
    ///
    /// let mut env = create_global_env();
    /// env.register_builtin_operation::<(Number,), _>("integer?", is_integer);
    /// let expr = read("(integer? 2.5)").unwrap();
    /// assert_eq!(eval(&expr, &mut env).unwrap(), Value::from(false));
    /// ```
    pub fn register_builtin_operation<Args, F>(&mut self, name: &str, func: F)
    where
        F: IntoOperation<Args>,
    {
        self.define_builtin(name, func.into_operation());
    }

    /// Register a primitive whose last parameter collects the remaining
    /// operands as a [`intooperation::ValueIter`].
    ///
    /// The given [`Arity`] is checked against the total operand count before
    /// the function runs, since a rest parameter says nothing about bounds.
    pub fn register_variadic_builtin_operation<Args, F>(
        &mut self,
        name: &str,
        arity: Arity,
        func: F,
    ) where
        F: IntoVariadicOperation<Args>,
    {
        self.define_builtin(name, with_arity_check(arity, func.into_variadic_operation()));
    }

    fn define_builtin(&mut self, name: &str, func: Arc<OperationFn>) {
        self.bindings.insert(
            name.to_owned(),
            Value::BuiltinFunction {
                id: name.to_owned(),
                func,
            },
        );
    }

    /// Get all bindings in this environment and its parents
    /// Returns a Vec of (name, value) pairs sorted by name
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = HashMap::new();

        // Parents first so that inner frames shadow them
        if let Some(parent) = &self.parent {
            bindings.extend(parent.get_all_bindings());
        }
        for (name, value) in &self.bindings {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

fn with_arity_check(arity: Arity, inner: Arc<OperationFn>) -> Arc<OperationFn> {
    Arc::new(move |args: Vec<Value>| {
        arity.validate(args.len())?;
        inner(args)
    })
}

/// Evaluate an expression without a depth limit.
pub fn eval(expr: &Value, env: &mut Environment) -> Result<Value, Error> {
    eval_with_config(expr, env, &EvalConfig::default())
}

/// Evaluate an expression under the limits in `config`.
pub fn eval_with_config(
    expr: &Value,
    env: &mut Environment,
    config: &EvalConfig,
) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, Depth::root(config))
}

fn eval_with_depth_tracking(
    expr: &Value,
    env: &mut Environment,
    depth: Depth,
) -> Result<Value, Error> {
    let depth = depth.enter()?;
    match expr {
        Value::Integer(_) | Value::Float(_) => Ok(expr.clone()),

        Value::Symbol(name) => env.lookup(name).cloned(),

        Value::Pair(head, tail) => eval_form(expr, head, tail, env, depth),

        // The reader never produces these as the head of an evaluation, and
        // `()` is not self-evaluating.
        Value::Nil | Value::Bool(_) | Value::BuiltinFunction { .. } => Err(Error::EvalError(
            format!(
                "interpreter bug: cannot evaluate {} {expr}",
                expr.type_name()
            ),
        )),
    }
}

/// Operands of a form, which must be a proper list
fn form_operands<'a>(form: &Value, tail: &'a Value) -> Result<Vec<&'a Value>, Error> {
    tail.list_elements()
        .ok_or_else(|| Error::MalformedForm(format!("improper argument list in {form}")))
}

fn eval_form(
    form: &Value,
    head: &Value,
    tail: &Value,
    env: &mut Environment,
    depth: Depth,
) -> Result<Value, Error> {
    // Special forms are keyed on the literal head symbol, before any lookup,
    // so rebinding `if` does not change what `(if ...)` means.
    if let Value::Symbol(name) = head
        && let Some((op, special_form)) = find_special_form(name)
    {
        let operands: Vec<Value> = form_operands(form, tail)?.into_iter().cloned().collect();
        op.arity.validate(operands.len()).map_err(|_| {
            Error::MalformedForm(format!(
                "{name} takes {} operands, got {}: {form}",
                op.arity,
                operands.len()
            ))
        })?;
        trace!(form = name.as_str(), "special form");
        return special_form(&operands, env, depth);
    }

    let operands = form_operands(form, tail)?;
    let procedure = eval_with_depth_tracking(head, env, depth)?;
    let args = operands
        .into_iter()
        .map(|operand| eval_with_depth_tracking(operand, env, depth))
        .collect::<Result<Vec<_>, _>>()?;

    match &procedure {
        Value::BuiltinFunction { id, func } => {
            debug!(procedure = id.as_str(), args = args.len(), "apply primitive");
            func(args).map_err(|err| match err {
                Error::ArityError {
                    expected,
                    got,
                    expression: None,
                } => Error::arity_error_with_expr(expected, got, form.to_string()),
                other => other,
            })
        }
        other => Err(Error::TypeError(format!(
            "Cannot apply non-procedure: {other}"
        ))),
    }
}

/// Evaluate quote special form
pub(crate) fn eval_quote(
    args: &[Value],
    _env: &mut Environment,
    _depth: Depth,
) -> Result<Value, Error> {
    match args {
        [expr] => Ok(expr.clone()),
        _ => Err(Error::MalformedForm(format!(
            "quote takes exactly 1 operand, got {}",
            args.len()
        ))),
    }
}

/// Evaluate define special form
pub(crate) fn eval_define(
    args: &[Value],
    env: &mut Environment,
    depth: Depth,
) -> Result<Value, Error> {
    match args {
        [Value::Symbol(name), expr] => {
            let value = eval_with_depth_tracking(expr, env, depth)?;
            debug!(name = name.as_str(), frame = env.frame_depth(), "define");
            env.define(name.clone(), value);
            Ok(Value::symbol("ok"))
        }
        [other, _] => Err(Error::TypeError(format!(
            "define requires a symbol, got {}",
            other.type_name()
        ))),
        _ => Err(Error::MalformedForm(format!(
            "define takes exactly 2 operands, got {}",
            args.len()
        ))),
    }
}

/// Evaluate if special form
pub(crate) fn eval_if(args: &[Value], env: &mut Environment, depth: Depth) -> Result<Value, Error> {
    match args {
        [test_expr, consequent, alternative] => {
            match eval_with_depth_tracking(test_expr, env, depth)? {
                Value::Bool(true) => eval_with_depth_tracking(consequent, env, depth),
                Value::Bool(false) => eval_with_depth_tracking(alternative, env, depth),
                other => Err(Error::TypeError(format!(
                    "if test must be a boolean, got {}",
                    other.type_name()
                ))),
            }
        }
        _ => Err(Error::MalformedForm(format!(
            "if takes exactly 3 operands, got {}",
            args.len()
        ))),
    }
}

/// Create the root environment: every primitive procedure plus the
/// constants `true`, `false` and `nil`.
pub fn create_global_env() -> Environment {
    let mut env = Environment::new();

    for builtin_op in get_builtin_ops() {
        if let OpKind::Function(func) = &builtin_op.op_kind {
            env.define_builtin(builtin_op.id, with_arity_check(builtin_op.arity, Arc::clone(func)));
        }
    }

    env.define("true", Value::Bool(true));
    env.define("false", Value::Bool(false));
    env.define("nil", Value::Nil);

    env
}
