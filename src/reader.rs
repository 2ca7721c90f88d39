use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    combinator::all_consuming,
    multi::many0,
    sequence::{preceded, terminated},
};
use tracing::trace;

use crate::ast::{FloatType, IntegerType, Value};
use crate::{DEFAULT_MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Limits applied while reading one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseConfig {
    /// Maximum number of simultaneously open parentheses. `None` leaves the
    /// host stack as the only bound.
    pub max_depth: Option<usize>,
}

impl ParseConfig {
    /// Configuration capped at [`DEFAULT_MAX_PARSE_DEPTH`].
    pub fn bounded() -> Self {
        ParseConfig {
            max_depth: Some(DEFAULT_MAX_PARSE_DEPTH),
        }
    }
}

fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')'
}

/// Any run of Unicode whitespace, possibly empty
fn whitespace(input: &str) -> IResult<&str, &str> {
    take_while(char::is_whitespace).parse(input)
}

/// A single token: a parenthesis, or a maximal run of anything else that
/// is not whitespace.
fn parse_token(input: &str) -> IResult<&str, &str> {
    alt((tag("("), tag(")"), take_while1(is_atom_char))).parse(input)
}

/// Split a line into tokens. Parentheses always stand alone, so `(a(b))`
/// and `( a ( b ) )` produce the same sequence.
fn tokenize(input: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(terminated(many0(preceded(whitespace, parse_token)), whitespace)).parse(input)
}

/// Integer if the token parses as one, then float, otherwise a symbol.
///
/// Float syntax is Rust's: `inf` and `nan` are floats, in any case, while
/// hexadecimal floats such as `0x1p4` stay symbols. A NaN prints as `NaN`
/// and reads back as a float, but never compares equal to itself.
fn parse_atom(token: &str) -> Value {
    if let Ok(n) = token.parse::<IntegerType>() {
        Value::Integer(n)
    } else if let Ok(x) = token.parse::<FloatType>() {
        Value::Float(x)
    } else {
        Value::Symbol(token.to_owned())
    }
}

struct TokenReader<'a> {
    tokens: &'a [&'a str],
    position: usize,
    max_depth: Option<usize>,
}

impl<'a> TokenReader<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.position).copied()
    }

    fn error_here(&self, kind: ParseErrorKind, message: impl Into<String>) -> ParseError {
        ParseError::with_token_context(kind, message, self.tokens, self.position)
    }

    fn read_expr(&mut self, depth: usize) -> Result<Value, ParseError> {
        match self.peek() {
            None => Err(ParseError::from_message(
                ParseErrorKind::EmptyExpression,
                "empty expression",
            )),
            Some(")") => Err(self.error_here(
                ParseErrorKind::UnexpectedCloseParen,
                "unexpected closing parenthesis",
            )),
            Some("(") => {
                if let Some(max) = self.max_depth
                    && depth >= max
                {
                    return Err(self.error_here(
                        ParseErrorKind::TooDeeplyNested,
                        format!("expression nested too deeply (max depth: {max})"),
                    ));
                }
                self.position += 1;
                self.read_list(depth + 1)
            }
            Some(token) => {
                self.position += 1;
                Ok(parse_atom(token))
            }
        }
    }

    /// Elements up to the matching `)`, which is consumed.
    fn read_list(&mut self, depth: usize) -> Result<Value, ParseError> {
        let mut elements = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error_here(
                        ParseErrorKind::Incomplete,
                        "unexpected end of input",
                    ));
                }
                Some(")") => {
                    self.position += 1;
                    return Ok(Value::list(elements));
                }
                Some(_) => elements.push(self.read_expr(depth)?),
            }
        }
    }
}

/// Read exactly one expression from a line of text, with no depth limit.
///
/// ```
/// use minilisp::ast::Value;
/// use minilisp::read;
///
/// assert_eq!(read("(5)").unwrap(), Value::cons(5, Value::Nil));
/// assert_eq!(read("5+5").unwrap(), Value::symbol("5+5"));
/// assert!(read("5 5").is_err());
/// ```
pub fn read(input: &str) -> Result<Value, ParseError> {
    read_with_config(input, &ParseConfig::default())
}

/// Read exactly one expression under the limits in `config`.
pub fn read_with_config(input: &str, config: &ParseConfig) -> Result<Value, ParseError> {
    let (_, tokens) = tokenize(input).map_err(|e| {
        ParseError::from_message(
            ParseErrorKind::TrailingContent,
            format!("unreadable input: {e}"),
        )
    })?;
    trace!(tokens = tokens.len(), "tokenized line");

    let mut reader = TokenReader {
        tokens: &tokens,
        position: 0,
        max_depth: config.max_depth,
    };
    let value = reader.read_expr(0)?;

    if reader.position < tokens.len() {
        return Err(reader.error_here(ParseErrorKind::TrailingContent, "trailing garbage"));
    }
    Ok(value)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};

    /// Test result variants for parsing tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Value),              // Parsing should succeed with this value
        Failure(ParseErrorKind),     // Parsing should fail with this kind
        SpecificError(&'static str), // Parsing should fail with a message containing this string
    }
    use ParseTestResult::*;

    fn success<T: Into<Value>>(value: T) -> ParseTestResult {
        Success(value.into())
    }

    /// Run parse tests, checking that every success also survives a
    /// display -> read round trip.
    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{}", i + 1);
            let result = read(input);

            match (result, expected) {
                (Ok(actual), Success(expected_val)) => {
                    assert_eq!(actual, *expected_val, "{test_id}: value mismatch for '{input}'");

                    let displayed = format!("{actual}");
                    let reparsed = read(&displayed).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip read failed for '{displayed}': {e}")
                    });
                    assert_eq!(
                        reparsed, actual,
                        "{test_id}: round-trip mismatch for '{input}' via '{displayed}'"
                    );
                }
                (Err(err), Failure(kind)) => {
                    assert_eq!(err.kind, *kind, "{test_id}: wrong error kind for '{input}'");
                }
                (Err(err), SpecificError(text)) => {
                    let message = err.to_string();
                    assert!(
                        message.contains(text),
                        "{test_id}: error should contain '{text}', got: {message}"
                    );
                }
                (Ok(actual), expected) => {
                    panic!("{test_id}: expected {expected:?} for '{input}', got {actual:?}");
                }
                (Err(err), Success(expected_val)) => {
                    panic!("{test_id}: expected {expected_val:?} for '{input}', got error {err}");
                }
            }
        }
    }

    #[test]
    fn test_read_data_driven() {
        let test_cases = vec![
            // === ATOMS ===
            ("5", success(5)),
            ("55", success(55)),
            ("-17", success(-17)),
            ("+8", success(8)),
            ("0", success(0)),
            ("9223372036854775807", success(i64::MAX)),
            // Too large for an integer, still a valid float
            ("9223372036854775808", success(9_223_372_036_854_775_808.0)),
            ("2.5", success(2.5)),
            ("-0.125", success(-0.125)),
            ("1e3", success(1000.0)),
            ("3.", success(3.0)),
            ("a", success(sym("a"))),
            ("hello-world", success(sym("hello-world"))),
            ("5+5", success(sym("5+5"))),
            ("1.2.3", success(sym("1.2.3"))),
            ("true", success(sym("true"))),
            ("#t", success(sym("#t"))),
            ("\"quoted\"", success(sym("\"quoted\""))),
            ("'x", success(sym("'x"))),
            (".", success(sym("."))),
            // === WHITESPACE ===
            ("  42  ", success(42)),
            ("\tfoo\n", success(sym("foo"))),
            // === LISTS ===
            ("()", Success(Value::Nil)),
            ("(5)", Success(Value::cons(5, Value::Nil))),
            ("(1 2 3)", success([1, 2, 3])),
            ("(+ 1 2)", success(vec![sym("+"), val(1), val(2)])),
            ("(list 3 4 5)", success(vec![sym("list"), val(3), val(4), val(5)])),
            ("(a (b c) d)", success(vec![sym("a"), val([sym("b"), sym("c")]), sym("d")])),
            ("(())", success(vec![Value::Nil])),
            ("((1) (2))", success(vec![val([1]), val([2])])),
            ("(1.5 x)", success(vec![val(1.5), sym("x")])),
            // Parentheses need no surrounding whitespace
            ("(a(b)c)", success(vec![sym("a"), val([sym("b")]), sym("c")])),
            ("( a  b )", success(vec![sym("a"), sym("b")])),
            ("(quote(1 2))", success(vec![sym("quote"), val([1, 2])])),
            // A dot is just a symbol, there is no dotted-pair syntax
            ("(a . b)", success(vec![sym("a"), sym("."), sym("b")])),
            // === SYNTAX ERRORS ===
            ("", Failure(ParseErrorKind::EmptyExpression)),
            ("   ", Failure(ParseErrorKind::EmptyExpression)),
            ("(", Failure(ParseErrorKind::Incomplete)),
            ("(1 (2 3)", Failure(ParseErrorKind::Incomplete)),
            (")", Failure(ParseErrorKind::UnexpectedCloseParen)),
            ("5 5", Failure(ParseErrorKind::TrailingContent)),
            ("(1) (2)", Failure(ParseErrorKind::TrailingContent)),
            ("(1))", Failure(ParseErrorKind::TrailingContent)),
            ("a b c", SpecificError("trailing garbage")),
            ("", SpecificError("SyntaxError: empty expression")),
            (")", SpecificError("unexpected closing parenthesis")),
            ("((", SpecificError("unexpected end of input")),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_tokenize() {
        let cases: Vec<(&str, Vec<&str>)> = vec![
            ("", vec![]),
            ("5", vec!["5"]),
            ("(+ 1 2)", vec!["(", "+", "1", "2", ")"]),
            ("((a)b)", vec!["(", "(", "a", ")", "b", ")"]),
            ("  x\t y \n", vec!["x", "y"]),
            ("a\u{a0}b\u{b}c", vec!["a", "b", "c"]),
            ("5+5", vec!["5+5"]),
        ];
        for (input, expected) in cases {
            let (rest, tokens) = tokenize(input).unwrap();
            assert_eq!(tokens, expected, "tokens for '{input}'");
            assert_eq!(rest, "", "leftover for '{input}'");
        }
    }

    #[test]
    fn test_error_context() {
        let err = read("(1 2) 3").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TrailingContent);
        assert_eq!(err.found.as_deref(), Some("3"));
        assert_eq!(err.context.as_deref(), Some("( 1 2 ) 3"));

        let err = read("(a b").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Incomplete);
        assert_eq!(err.found, None);

        let err = read("").unwrap_err();
        assert_eq!(err.context, None);
        assert_eq!(err.to_string(), "SyntaxError: empty expression");
    }

    #[test]
    fn test_non_finite_and_hex_tokens() {
        let nan = read("nan").unwrap();
        assert!(matches!(nan, Value::Float(x) if x.is_nan()));
        let same_bits = nan.clone();
        assert_ne!(nan, same_bits);
        assert_eq!(nan.to_string(), "NaN");

        let reread = read(&nan.to_string()).unwrap();
        assert!(matches!(reread, Value::Float(x) if x.is_nan()));
        assert_ne!(reread, nan);

        assert_eq!(read("-inf").unwrap(), val(f64::NEG_INFINITY));
        assert_eq!(read("0x1p4").unwrap(), sym("0x1p4"));
        assert_eq!(read("0x10").unwrap(), sym("0x10"));
    }

    #[test]
    fn test_depth_limit() {
        let config = ParseConfig { max_depth: Some(2) };
        assert_eq!(read_with_config("((1))", &config).unwrap(), val(vec![val([1])]));
        assert_eq!(
            read_with_config("(((1)))", &config).unwrap_err().kind,
            ParseErrorKind::TooDeeplyNested
        );
        assert_eq!(read_with_config("1", &ParseConfig { max_depth: Some(0) }).unwrap(), val(1));

        let deep = format!("{}{}", "(".repeat(300), ")".repeat(300));
        assert!(read(&deep).is_ok());
        assert_eq!(
            read_with_config(&deep, &ParseConfig::bounded()).unwrap_err().kind,
            ParseErrorKind::TooDeeplyNested
        );
    }
}
