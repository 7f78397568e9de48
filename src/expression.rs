//! Variables and filter expressions.
//!
//! A filter expression is what appears inside `{{ ... }}` and in most tag
//! arguments: a literal or a dotted variable path followed by any number of
//! `|filter` or `|filter:argument` applications.
use std::fmt;

use crate::compiler::parser::Parser;
use crate::error::{Error, ErrorKind};
use crate::filters::Filter;
use crate::runtime::State;
use crate::tags::inheritance::render_block_super;
use crate::utils::unescape_string_literal;
use crate::value::{StringType, Value};

fn scan_constant(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    let quote = match chars.next() {
        Some((_, c @ ('"' | '\''))) => c,
        _ => return None,
    };
    let mut escaped = false;
    for (idx, c) in chars {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(idx + 1);
        }
    }
    None
}

fn scan_number(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut idx = usize::from(matches!(bytes.first(), Some(b'-' | b'+' | b'.')));
    if !bytes.get(idx).map_or(false, u8::is_ascii_digit) {
        return None;
    }
    idx += 1;
    while bytes
        .get(idx)
        .map_or(false, |b| b.is_ascii_digit() || *b == b'.' || *b == b'e')
    {
        idx += 1;
    }
    Some(idx)
}

fn is_var_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn scan_variable(s: &str) -> Option<usize> {
    let len = s.find(|c| !is_var_char(c)).unwrap_or(s.len());
    (len > 0).then_some(len)
}

fn scan_operand(s: &str) -> Option<usize> {
    scan_constant(s)
        .or_else(|| scan_variable(s))
        .or_else(|| scan_number(s))
}

/// A literal or a dotted lookup path.
#[derive(Debug, Clone)]
pub enum Variable {
    /// A number or a string constant.  String constants are marked safe.
    Literal(Value),
    /// A dotted path like `user.groups.0`.
    Lookup(Vec<String>),
}

impl Variable {
    /// Compiles a single variable or literal.
    pub fn compile(var: &str) -> Result<Variable, Error> {
        if var.ends_with('.') {
            return Err(Error::new(
                ErrorKind::TagSyntaxError,
                format!("Variable may not end with a dot: {var}"),
            ));
        }
        if let Ok(num) = var.parse::<i64>() {
            return Ok(Variable::Literal(Value::from(num)));
        }
        if var.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | '.')) {
            if let Ok(num) = var.parse::<f64>() {
                return Ok(Variable::Literal(Value::from(num)));
            }
        }
        if var.starts_with('"') || var.starts_with('\'') {
            let unescaped = ok!(unescape_string_literal(var));
            return Ok(Variable::Literal(Value::from_safe_string(unescaped)));
        }
        if var.starts_with('_') || var.contains("._") {
            return Err(Error::new(
                ErrorKind::TagSyntaxError,
                format!("Variables and attributes may not begin with underscores: {var}"),
            ));
        }
        Ok(Variable::Lookup(var.split('.').map(String::from).collect()))
    }

    /// Returns `true` if this is a literal.
    pub fn is_literal(&self) -> bool {
        matches!(self, Variable::Literal(_))
    }

    /// Resolves the variable against the current context.
    ///
    /// Lookups that fail produce undefined.  `block.super` renders the
    /// parent block.
    pub fn resolve(&self, state: &mut State) -> Result<Value, Error> {
        let path = match self {
            Variable::Literal(value) => return Ok(value.clone()),
            Variable::Lookup(path) => path,
        };
        let mut rv = state.lookup(&path[0]);
        for segment in &path[1..] {
            if rv.is_undefined() {
                break;
            }
            rv = match rv.as_block_ref() {
                Some(name) if segment == "super" => {
                    let name = name.to_string();
                    ok!(render_block_super(state, &name))
                }
                _ => rv.get_attr(segment),
            };
        }
        Ok(rv)
    }
}

#[derive(Clone)]
struct FilterCall {
    name: String,
    filter: Filter,
    arg: Option<Variable>,
}

impl fmt::Debug for FilterCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterCall")
            .field("name", &self.name)
            .field("arg", &self.arg)
            .finish()
    }
}

/// A variable followed by a chain of filters.
#[derive(Debug, Clone)]
pub struct FilterExpression {
    source: String,
    variable: Variable,
    filters: Vec<FilterCall>,
}

impl FilterExpression {
    /// Compiles a filter expression using the filters known to the parser.
    pub fn compile(expr: &str, parser: &Parser) -> Result<FilterExpression, Error> {
        let remainder_error = |rest: &str| {
            Error::new(
                ErrorKind::TagSyntaxError,
                format!("Could not parse the remainder, {rest} from {expr}"),
            )
        };

        let len = match scan_operand(expr) {
            Some(len) => len,
            None => {
                return Err(Error::new(
                    ErrorKind::TagSyntaxError,
                    format!("Could not parse some characters: \"{expr}\""),
                ))
            }
        };
        let variable = ok!(Variable::compile(&expr[..len]));
        let mut filters = Vec::new();
        let mut rest = &expr[len..];

        loop {
            let trimmed = rest.trim_start();
            if trimmed.is_empty() {
                break;
            }
            rest = match trimmed.strip_prefix('|') {
                Some(after) => after.trim_start(),
                None => return Err(remainder_error(rest)),
            };
            let name_len = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if name_len == 0 {
                return Err(remainder_error(rest));
            }
            let name = &rest[..name_len];
            let filter = ok!(parser.get_filter(name));
            rest = &rest[name_len..];

            let mut arg = None;
            if let Some(after) = rest.strip_prefix(':') {
                if after.is_empty() || after.starts_with('|') {
                    return Err(Error::new(
                        ErrorKind::EmptyVariableError,
                        format!("Missing argument to filter: {name}"),
                    ));
                }
                let arg_len = match scan_operand(after) {
                    Some(len) => len,
                    None => return Err(remainder_error(rest)),
                };
                arg = Some(ok!(Variable::compile(&after[..arg_len])));
                rest = &after[arg_len..];
            }
            filters.push(FilterCall {
                name: name.to_string(),
                filter,
                arg,
            });
        }

        Ok(FilterExpression {
            source: expr.to_string(),
            variable,
            filters,
        })
    }

    /// Creates an expression for a constant without filters.
    pub(crate) fn from_literal(value: Value, source: &str) -> FilterExpression {
        FilterExpression {
            source: source.to_string(),
            variable: Variable::Literal(value),
            filters: Vec::new(),
        }
    }

    /// Returns the source of the expression.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the variable part of the expression.
    pub fn variable(&self) -> &Variable {
        &self.variable
    }

    /// Returns the names of the applied filters in order.
    pub fn filter_names(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|x| x.name.as_str())
    }

    /// Returns `true` if this is a literal without filters.
    pub fn is_literal(&self) -> bool {
        self.filters.is_empty() && self.variable.is_literal()
    }

    /// Resolves the variable and runs it through the filters.
    pub fn resolve(&self, state: &mut State) -> Result<Value, Error> {
        let value = ok!(self.variable.resolve(state));
        self.apply_filters(value, state)
    }

    /// Resolves the expression and returns its truthiness.  Failures count
    /// as false.
    pub fn is_true(&self, state: &mut State) -> bool {
        self.resolve(state).map_or(false, |value| value.is_true())
    }

    /// Runs a value through the filter chain of this expression, ignoring
    /// the variable part.
    pub fn apply_filters(&self, mut value: Value, state: &mut State) -> Result<Value, Error> {
        for call in &self.filters {
            let arg = match call.arg {
                Some(ref arg) => Some(ok!(arg.resolve(state))),
                None => None,
            };
            let was_safe = value.is_safe();
            let needs_escape = value.needs_escape();
            let rv = ok!(call.filter.apply(&value, arg.as_ref(), state.autoescape()));
            value = if rv.is_string() && call.filter.is_safe() && was_safe {
                rv.with_string_type(StringType::Safe)
            } else if rv.is_string() && needs_escape && !rv.is_safe() {
                rv.with_string_type(StringType::Escape)
            } else {
                rv
            };
        }
        Ok(value)
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_scanners() {
        assert_eq!(scan_constant(r#""a\"b" rest"#), Some(6));
        assert_eq!(scan_constant("'open"), None);
        assert_eq!(scan_number("-1.5e3|x"), Some(6));
        assert_eq!(scan_number("abc"), None);
        assert_eq!(scan_variable("user.name|upper"), Some(9));
        assert_eq!(scan_operand("|upper"), None);
    }

    #[test]
    fn test_variable_compile() {
        assert!(matches!(
            Variable::compile("42").unwrap(),
            Variable::Literal(ref v) if v.as_i64() == Some(42)
        ));
        assert!(matches!(
            Variable::compile("-1.5").unwrap(),
            Variable::Literal(ref v) if v.as_f64() == Some(-1.5)
        ));
        match Variable::compile(r#""it\"s""#).unwrap() {
            Variable::Literal(value) => {
                assert_eq!(value.as_str(), Some("it\"s"));
                assert!(value.is_safe());
            }
            other => panic!("unexpected {other:?}"),
        }
        match Variable::compile("user.groups.0").unwrap() {
            Variable::Lookup(path) => assert_eq!(path, vec!["user", "groups", "0"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_variable_errors() {
        let err = Variable::compile("user.").unwrap_err();
        assert_eq!(err.detail(), Some("Variable may not end with a dot: user."));
        let err = Variable::compile("_private").unwrap_err();
        assert_eq!(
            err.detail(),
            Some("Variables and attributes may not begin with underscores: _private")
        );
        assert!(Variable::compile("user._private").is_err());
        assert!(matches!(
            Variable::compile("nan").unwrap(),
            Variable::Lookup(_)
        ));
    }
}
