//! This module defines the runtime value model. The main enum, [`Value`], is a
//! closed tagged union covering integers, floats, symbols, booleans, immutable
//! pairs, the empty-list sentinel and built-in procedures. Lists are chains of
//! [`Value::Pair`] cells ending in [`Value::Nil`]; pairs share their slots
//! through `Arc`, so cloning a list is cheap and structural sharing is safe.
//!
//! Display produces the canonical printed form (`(a b c)`, `(a . b)`), which the
//! reader accepts back for every value the reader itself can produce.

use crate::Error;
use crate::evaluator::intooperation::OperationFn;
use std::iter::FusedIterator;
use std::sync::{Arc, LazyLock};

/// Type alias for exact numbers in the interpreter
pub(crate) type IntegerType = i64;

/// Type alias for inexact numbers in the interpreter
pub(crate) type FloatType = f64;

/// Core value type in the interpreter
///
/// To build values in code, use the constructors on `Value` (`Value::cons`,
/// `Value::list`, `Value::symbol`) or the `From` conversions:
/// - `Value::from(42)`, `Value::from(1.5)`, `Value::from(true)`
/// - `Value::from([1, 2, 3])` for homogeneous proper lists
#[derive(Clone)]
pub enum Value {
    /// Exact whole numbers
    Integer(IntegerType),
    /// IEEE double-precision numbers
    Float(FloatType),
    /// Identifiers, also used for any token that is not a number
    Symbol(String),
    /// Boolean values (only reachable through the `true`/`false` bindings)
    Bool(bool),
    /// An immutable `(first . rest)` cell
    Pair(Arc<Value>, Arc<Value>),
    /// The empty-list sentinel, printed as `()`
    Nil,
    /// Built-in procedures, compared by id rather than by function pointer
    BuiltinFunction {
        id: String,
        // Trait object so typed Rust functions can be wrapped into the single
        // canonical signature the evaluator calls through.
        func: Arc<OperationFn>,
    },
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Float(n) => write!(f, "Float({n:?})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            // A whole spine is shown as one `Pair(..)`, with ` . tail` when improper.
            Value::Pair(..) => {
                write!(f, "Pair(")?;
                let mut iter = self.iter();
                if let Some(first) = iter.next() {
                    write!(f, "{first:?}")?;
                }
                for item in iter.by_ref() {
                    write!(f, ", {item:?}")?;
                }
                match iter.remainder() {
                    Value::Nil => write!(f, ")"),
                    tail => write!(f, " . {tail:?})"),
                }
            }
            Value::Nil => write!(f, "Nil"),
            Value::BuiltinFunction { id, .. } => write!(f, "BuiltinFunction({id})"),
        }
    }
}

/// Shared `()` swapped into a cell's cdr while its spine is being torn down
static DETACHED_TAIL: LazyLock<Arc<Value>> = LazyLock::new(|| Arc::new(Value::Nil));

impl Drop for Value {
    // Frees a list spine one cell at a time. Only car slots are dropped
    // recursively, so depth is bounded by nesting rather than by length.
    fn drop(&mut self) {
        let Value::Pair(_, cdr) = self else {
            return;
        };
        let mut next = std::mem::replace(cdr, Arc::clone(&DETACHED_TAIL));
        while let Some(mut cell) = Arc::into_inner(next) {
            let Value::Pair(_, rest) = &mut cell else {
                break;
            };
            next = std::mem::replace(rest, Arc::clone(&DETACHED_TAIL));
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            // Debug formatting keeps a fractional part or exponent, so the printed
            // form re-reads as a float rather than an integer.
            Value::Float(n) => write!(f, "{n:?}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Nil => write!(f, "()"),
            Value::Pair(car, cdr) => {
                write!(f, "({car}")?;
                let mut rest: &Value = cdr.as_ref();
                loop {
                    match rest {
                        Value::Pair(car, cdr) => {
                            write!(f, " {car}")?;
                            rest = cdr.as_ref();
                        }
                        Value::Nil => break,
                        tail => {
                            write!(f, " . {tail}")?;
                            break;
                        }
                    }
                }
                write!(f, ")")
            }
            Value::BuiltinFunction { id, .. } => write!(f, "#<builtin:{id}>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let (mut left, mut right) = (self, other);
        // Walk list spines iteratively; only the car side recurses.
        loop {
            match (left, right) {
                (Value::Pair(a1, d1), Value::Pair(a2, d2)) => {
                    if a1 != a2 {
                        return false;
                    }
                    left = d1.as_ref();
                    right = d2.as_ref();
                }
                (Value::Integer(a), Value::Integer(b)) => return a == b,
                (Value::Float(a), Value::Float(b)) => return a == b,
                (Value::Symbol(a), Value::Symbol(b)) => return a == b,
                (Value::Bool(a), Value::Bool(b)) => return a == b,
                (Value::Nil, Value::Nil) => return true,
                (Value::BuiltinFunction { id: id1, .. }, Value::BuiltinFunction { id: id2, .. }) => {
                    return id1 == id2;
                }
                _ => return false, // Different variants are never equal
            }
        }
    }
}

impl Value {
    /// Build a new pair. Always succeeds.
    pub fn cons(car: impl Into<Value>, cdr: impl Into<Value>) -> Value {
        Value::Pair(Arc::new(car.into()), Arc::new(cdr.into()))
    }

    pub fn symbol(name: impl Into<String>) -> Value {
        Value::Symbol(name.into())
    }

    /// Build a proper list right-to-left; zero items yield [`Value::Nil`].
    pub fn list<I>(items: I) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(Value::Nil, |tail, item| Value::cons(item, tail))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn car(&self) -> Option<&Value> {
        match self {
            Value::Pair(car, _) => Some(car.as_ref()),
            _ => None,
        }
    }

    pub fn cdr(&self) -> Option<&Value> {
        match self {
            Value::Pair(_, cdr) => Some(cdr.as_ref()),
            _ => None,
        }
    }

    /// Iterate over the cars of a pair chain. Stops at the first non-pair;
    /// [`ListIter::remainder`] tells whether that was `()`.
    pub fn iter(&self) -> ListIter<'_> {
        ListIter { rest: self }
    }

    /// Elements of a proper list, or `None` if the chain ends in anything but `()`.
    pub fn list_elements(&self) -> Option<Vec<&Value>> {
        let mut iter = self.iter();
        let elements: Vec<&Value> = iter.by_ref().collect();
        iter.remainder().is_nil().then_some(elements)
    }

    /// Variant name used in type error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Symbol(_) => "symbol",
            Value::Bool(_) => "boolean",
            Value::Pair(..) => "pair",
            Value::Nil => "empty list",
            Value::BuiltinFunction { .. } => "procedure",
        }
    }
}

/// Append a single element to the end of a proper list, producing a new list.
///
/// This is not two-list concatenation: `(append (list 1 2) (list 3))` yields
/// `(1 2 (3))`. The input list is left untouched; the new spine is rebuilt
/// right-to-left and ends in a fresh one-element tail holding `element`.
pub fn append(list: &Value, element: Value) -> Result<Value, Error> {
    let Some(prefix) = list.list_elements() else {
        return Err(Error::TypeError(format!(
            "append requires a proper list as first argument, got {}",
            list.type_name()
        )));
    };

    Ok(prefix
        .into_iter()
        .rev()
        .fold(Value::cons(element, Value::Nil), |tail, item| {
            Value::cons(item.clone(), tail)
        }))
}

/// Iterator over the elements of a pair chain
pub struct ListIter<'a> {
    rest: &'a Value,
}

impl<'a> ListIter<'a> {
    /// What is left of the chain: `()` once a proper list is exhausted, the
    /// dotted tail for an improper one.
    pub fn remainder(&self) -> &'a Value {
        self.rest
    }
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rest {
            Value::Pair(car, cdr) => {
                self.rest = cdr.as_ref();
                Some(car.as_ref())
            }
            _ => None,
        }
    }
}

impl FusedIterator for ListIter<'_> {}

/// Numeric view of a [`Value`], used by the arithmetic primitives to dispatch
/// on the two numeric kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(IntegerType),
    Float(FloatType),
}

impl Number {
    pub fn kind_name(self) -> &'static str {
        match self {
            Number::Integer(_) => "integer",
            Number::Float(_) => "float",
        }
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Integer(i) => Value::Integer(i),
            Number::Float(x) => Value::Float(x),
        }
    }
}

// Fallible conversions from `Value` back into Rust-side types.

impl TryFrom<Value> for Number {
    type Error = Error;

    fn try_from(value: Value) -> Result<Number, Error> {
        match value {
            Value::Integer(i) => Ok(Number::Integer(i)),
            Value::Float(x) => Ok(Number::Float(x)),
            other => Err(Error::TypeError(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<FloatType> for Value {
    fn from(x: FloatType) -> Self {
        Value::Float(x)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(IntegerType::from(n))
            }
        }
    };
}

// Generate From implementations for lossless integer types
impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntegerType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::list(arr.into_iter().map(Into::into))
    }
}

/// Helper function for creating symbols in mixed lists
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating Values from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    #[test]
    fn test_value_construction_data_driven() {
        // (helper_result, expected_value)
        let test_cases = vec![
            (val(42), Value::Integer(42)),
            (val(-17), Value::Integer(-17)),
            (val(255u8), Value::Integer(255)),
            (val(-32768i16), Value::Integer(-32768)),
            (val(IntegerType::MAX), Value::Integer(IntegerType::MAX)),
            (val(1.5), Value::Float(1.5)),
            (val(true), Value::Bool(true)),
            (sym("foo-bar?"), Value::Symbol("foo-bar?".to_owned())),
            (Value::symbol(String::from("x")), Value::Symbol("x".to_owned())),
            (val(Vec::<Value>::new()), Value::Nil),
            (
                val([1, 2]),
                Value::cons(1, Value::cons(2, Value::Nil)),
            ),
            (
                val(vec![sym("op"), val(1.5), val([3])]),
                Value::cons(
                    sym("op"),
                    Value::cons(1.5, Value::cons(Value::cons(3, Value::Nil), Value::Nil)),
                ),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_display_canonical_form() {
        let test_cases = vec![
            (val(5), "5"),
            (val(-3), "-3"),
            (val(1.5), "1.5"),
            (val(2.0), "2.0"),
            (val(f64::INFINITY), "inf"),
            (sym("5+5"), "5+5"),
            (val(true), "true"),
            (Value::Nil, "()"),
            (Value::cons(sym("a"), sym("b")), "(a . b)"),
            (
                Value::cons(sym("a"), Value::cons(sym("b"), sym("c"))),
                "(a b . c)",
            ),
            (
                val(vec![sym("a"), sym("b"), sym("c"), sym("d")]),
                "(a b c d)",
            ),
            (
                Value::cons(
                    sym("a"),
                    Value::cons(sym("b"), Value::cons(sym("c"), Value::cons(sym("d"), sym("x")))),
                ),
                "(a b c d . x)",
            ),
            (Value::cons(sym("a"), Value::Nil), "(a)"),
            (val(vec![val([1, 2]), Value::Nil]), "((1 2) ())"),
        ];

        for (value, expected) in test_cases {
            assert_eq!(format!("{value}"), expected, "display of {value:?}");
        }
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(val([1, 2, 3]), val([1, 2, 3]));
        assert_ne!(val([1, 2, 3]), val([1, 2]));
        assert_ne!(val([1, 2]), Value::cons(1, 2));
        assert_ne!(val(1), val(1.0));
        assert_ne!(Value::Nil, val(false));
        assert_eq!(Value::Nil, Value::Nil);
        assert_ne!(sym("a"), sym("b"));
        assert_ne!(val(f64::NAN), val(f64::NAN));
    }

    #[test]
    fn test_list_iteration() {
        let proper = val([1, 2, 3]);
        let mut iter = proper.iter();
        assert_eq!(iter.by_ref().count(), 3);
        assert!(iter.remainder().is_nil());

        let dotted = Value::cons(1, Value::cons(2, 3));
        let mut iter = dotted.iter();
        assert_eq!(iter.by_ref().cloned().collect::<Vec<_>>(), vec![val(1), val(2)]);
        assert_eq!(iter.remainder(), &val(3));
        assert!(dotted.list_elements().is_none());

        assert_eq!(Value::Nil.list_elements(), Some(vec![]));
        assert!(val(7).list_elements().is_none());
    }

    #[test]
    fn test_debug_shows_whole_spine() {
        let test_cases = vec![
            (Value::cons(1, 2), "Pair(Integer(1) . Integer(2))"),
            (val([1, 2]), "Pair(Integer(1), Integer(2))"),
            (
                Value::cons(1, Value::cons(2, 3)),
                "Pair(Integer(1), Integer(2) . Integer(3))",
            ),
            (
                val(vec![val([1]), sym("a"), Value::Nil]),
                "Pair(Pair(Integer(1)), Symbol(a), Nil)",
            ),
            (val(0.5), "Float(0.5)"),
        ];

        for (value, expected) in test_cases {
            assert_eq!(format!("{value:?}"), expected);
        }

        let long = Value::list(vec![val(1); 300_000]);
        let text = format!("{long:?}");
        assert!(text.starts_with("Pair(Integer(1), Integer(1)"));
        assert!(text.ends_with("Integer(1))"));
        assert_eq!(text.matches("Integer(1)").count(), 300_000);
    }

    #[test]
    fn test_long_list_drop() {
        let long = Value::list(vec![val(1); 300_000]);
        let copy = long.clone();
        let tail = long.cdr().unwrap().clone();

        // Shared cells outlive the first owner to be dropped
        drop(long);
        assert_eq!(copy.iter().count(), 300_000);
        drop(copy);
        assert_eq!(tail.iter().count(), 299_999);
        assert!(tail.list_elements().is_some());
        drop(tail);

        let dotted = (0..300_000).rev().fold(sym("end"), |tail, n| Value::cons(n, tail));
        assert_eq!(dotted.iter().remainder(), &sym("end"));
        drop(dotted);
    }

    #[test]
    fn test_append_single_element() {
        let test_cases = vec![
            (Value::Nil, val(3), Some(val([3]))),
            (val([3, 4]), val(5), Some(val([3, 4, 5]))),
            (val([1]), val([2, 3]), Some(val(vec![val(1), val([2, 3])]))),
            (Value::Nil, Value::Nil, Some(val(vec![Value::Nil]))),
            (val(4), val(5), None),
            (Value::cons(1, 2), val(3), None),
        ];

        for (list, element, expected) in test_cases {
            let result = append(&list, element.clone());
            match (result, expected) {
                (Ok(actual), Some(expected)) => assert_eq!(actual, expected),
                (Err(Error::TypeError(_)), None) => {}
                (actual, expected) => {
                    panic!("append({list}, {element}): got {actual:?}, expected {expected:?}")
                }
            }
        }
    }

    #[test]
    fn test_append_leaves_input_untouched() {
        let original = val([1, 2]);
        let extended = append(&original, val(3)).unwrap();
        assert_eq!(original, val([1, 2]));
        assert_eq!(extended, val([1, 2, 3]));
    }

    #[test]
    fn test_number_conversion() {
        assert_eq!(Number::try_from(val(4)), Ok(Number::Integer(4)));
        assert_eq!(Number::try_from(val(0.5)), Ok(Number::Float(0.5)));
        assert!(matches!(
            Number::try_from(sym("x")),
            Err(Error::TypeError(_))
        ));
        assert_eq!(Value::from(Number::Float(2.5)), val(2.5));
    }
}
