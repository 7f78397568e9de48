use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::value::{StringType, Value, ValueRepr};

enum Coerced<'a> {
    I64(i64, i64),
    F64(f64, f64),
    Str(&'a str, &'a str),
}

fn coerce<'x>(a: &'x Value, b: &'x Value) -> Option<Coerced<'x>> {
    match (&a.0, &b.0) {
        (ValueRepr::I64(a), ValueRepr::I64(b)) => Some(Coerced::I64(*a, *b)),
        (ValueRepr::String(a, _), ValueRepr::String(b, _)) => Some(Coerced::Str(a, b)),
        (ValueRepr::F64(a), ValueRepr::F64(b)) => Some(Coerced::F64(*a, *b)),
        (ValueRepr::F64(a), ValueRepr::I64(b)) => Some(Coerced::F64(*a, *b as f64)),
        (ValueRepr::I64(a), ValueRepr::F64(b)) => Some(Coerced::F64(*a as f64, *b)),
        _ => None,
    }
}

/// Compares two values for equality.
///
/// Numbers compare by value across integer and float, strings compare by
/// content regardless of their escaping marker, undefined equals none.
pub fn equals(a: &Value, b: &Value) -> bool {
    if let Some(coerced) = coerce(a, b) {
        return match coerced {
            Coerced::I64(a, b) => a == b,
            Coerced::F64(a, b) => a == b,
            Coerced::Str(a, b) => a == b,
        };
    }
    match (&a.0, &b.0) {
        (
            ValueRepr::Undefined | ValueRepr::None,
            ValueRepr::Undefined | ValueRepr::None,
        ) => true,
        (ValueRepr::Bool(a), ValueRepr::Bool(b)) => a == b,
        (ValueRepr::Seq(a), ValueRepr::Seq(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(a, b)| equals(a, b))
        }
        (ValueRepr::Map(a), ValueRepr::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).map_or(false, |other| equals(v, other)))
        }
        (ValueRepr::Template(a), ValueRepr::Template(b)) => Arc::ptr_eq(a, b),
        (ValueRepr::Block(a), ValueRepr::Block(b)) => a == b,
        _ => false,
    }
}

/// Orders two values if they are comparable (numbers with numbers, strings
/// with strings, sequences element wise).
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    if let Some(coerced) = coerce(a, b) {
        return match coerced {
            Coerced::I64(a, b) => Some(a.cmp(&b)),
            Coerced::F64(a, b) => a.partial_cmp(&b),
            Coerced::Str(a, b) => Some(a.cmp(b)),
        };
    }
    match (&a.0, &b.0) {
        (ValueRepr::Bool(a), ValueRepr::Bool(b)) => Some(a.cmp(b)),
        (ValueRepr::Seq(a), ValueRepr::Seq(b)) => {
            for (a, b) in a.iter().zip(b.iter()) {
                match some!(compare(a, b)) {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        (ValueRepr::Undefined | ValueRepr::None, ValueRepr::Undefined | ValueRepr::None) => {
            Some(Ordering::Equal)
        }
        // undefined sorts first so that `dictsort` keeps missing keys up front
        (ValueRepr::Undefined | ValueRepr::None, _) => Some(Ordering::Less),
        (_, ValueRepr::Undefined | ValueRepr::None) => Some(Ordering::Greater),
        _ => None,
    }
}

/// Implements the `in` operator: substring test for strings, membership for
/// sequences, key test for maps.
pub fn contains(container: &Value, needle: &Value) -> bool {
    match container.0 {
        ValueRepr::String(ref s, _) => match needle.as_str() {
            Some(needle) => s.contains(needle),
            None if needle.is_undefined() => false,
            None => s.contains(needle.to_string().as_str()),
        },
        ValueRepr::Seq(ref items) => items.iter().any(|item| equals(item, needle)),
        ValueRepr::Map(ref map) => match needle.as_str() {
            Some(key) => map.contains_key(key),
            None => map.contains_key(&needle.to_string()),
        },
        _ => false,
    }
}

/// Coerces a value into an integer.  Strings are parsed, floats are
/// truncated, booleans count as 0 and 1.  Anything else is `None`.
pub fn to_int(value: &Value) -> Option<i64> {
    match value.0 {
        ValueRepr::I64(val) => Some(val),
        ValueRepr::F64(val) if val.is_finite() => Some(val as i64),
        ValueRepr::Bool(val) => Some(val as i64),
        ValueRepr::String(ref s, _) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|x| x.is_finite()).map(|x| x as i64))
        }
        _ => None,
    }
}

/// Coerces a value into a float.  Strings are parsed.
pub fn to_float(value: &Value) -> Option<f64> {
    match value.0 {
        ValueRepr::I64(val) => Some(val as f64),
        ValueRepr::F64(val) => Some(val),
        ValueRepr::Bool(val) => Some(val as i64 as f64),
        ValueRepr::String(ref s, _) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Resolves a possibly negative index against a length.
pub fn normalize_index(idx: i64, len: usize) -> Option<usize> {
    if idx < 0 {
        let idx = len as i64 + idx;
        (idx >= 0).then_some(idx as usize)
    } else {
        Some(idx as usize).filter(|&idx| idx < len)
    }
}

fn clamp_bound(idx: i64, len: usize) -> usize {
    if idx < 0 {
        (len as i64 + idx).max(0) as usize
    } else {
        (idx as usize).min(len)
    }
}

/// Python style slicing of sequences and strings.
///
/// `start` and `stop` may be negative in which case they count from the end.
/// A missing bound means the respective end of the value.
pub fn slice(value: &Value, start: Option<i64>, stop: Option<i64>) -> Value {
    let range = |len: usize| {
        let start = start.map_or(0, |x| clamp_bound(x, len));
        let stop = stop.map_or(len, |x| clamp_bound(x, len));
        (start, stop.max(start))
    };
    match value.0 {
        ValueRepr::String(ref s, ty) => {
            let (start, stop) = range(s.chars().count());
            let rv: String = s.chars().skip(start).take(stop - start).collect();
            Value(ValueRepr::String(Arc::from(rv), ty))
        }
        ValueRepr::Seq(ref items) => {
            let (start, stop) = range(items.len());
            Value::from(items[start..stop].to_vec())
        }
        _ => Value::UNDEFINED,
    }
}

/// Formats floats the way the engine prints numbers: integral floats print
/// without a fractional part.
pub fn fmt_float(val: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if val.is_nan() {
        f.write_str("nan")
    } else if val.is_infinite() {
        f.write_str(if val > 0.0 { "inf" } else { "-inf" })
    } else {
        write!(f, "{val}")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

pub(crate) fn title_case(s: &str) -> String {
    let mut rv = String::with_capacity(s.len());
    let mut upper = true;
    for c in s.chars() {
        if upper {
            rv.extend(c.to_uppercase());
        } else {
            rv.extend(c.to_lowercase());
        }
        upper = c.is_whitespace();
    }
    rv
}

fn is_title(s: &str) -> bool {
    let mut seen_cased = false;
    let mut expect_upper = true;
    for c in s.chars() {
        if c.is_uppercase() {
            if !expect_upper {
                return false;
            }
            seen_cased = true;
            expect_upper = false;
        } else if c.is_lowercase() {
            if expect_upper {
                return false;
            }
            seen_cased = true;
        } else {
            expect_upper = true;
        }
    }
    seen_cased
}

/// Properties available on every string value.
pub fn string_property(s: &Arc<str>, ty: StringType, name: &str) -> Option<Value> {
    let string = |rv: String| Some(Value(ValueRepr::String(Arc::from(rv), ty)));
    let all = |f: fn(char) -> bool| Some(Value::from(!s.is_empty() && s.chars().all(f)));
    match name {
        "capitalize" => string(capitalize(s)),
        "isalnum" => all(char::is_alphanumeric),
        "isalpha" => all(char::is_alphabetic),
        "isdigit" => all(|c| c.is_ascii_digit()),
        "isspace" => all(char::is_whitespace),
        "islower" => Some(Value::from(
            s.chars().any(char::is_lowercase) && !s.chars().any(char::is_uppercase),
        )),
        "isupper" => Some(Value::from(
            s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase),
        )),
        "istitle" => Some(Value::from(is_title(s))),
        "lower" => string(s.to_lowercase()),
        "upper" => string(s.to_uppercase()),
        "strip" => string(s.trim().to_string()),
        "swapcase" => string(
            s.chars()
                .flat_map(|c| -> Box<dyn Iterator<Item = char>> {
                    if c.is_uppercase() {
                        Box::new(c.to_lowercase())
                    } else {
                        Box::new(c.to_uppercase())
                    }
                })
                .collect(),
        ),
        "title" => string(title_case(s)),
        "splitlines" => Some(Value::from(
            s.lines().map(Value::from).collect::<Vec<_>>(),
        )),
        "size" | "count" => Some(Value::from(s.chars().count())),
        _ => None,
    }
}
