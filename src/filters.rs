//! Filter functions and the filter registry type.
//!
//! Filters are functions that take a value, an optional argument and the
//! current autoescape state and return a new value:
//!
//! ```text
//! {{ name|default:"anonymous"|upper }}
//! ```
//!
//! Custom filters are registered on the environment:
//!
//! ```
//! # use minidtl::{context, Environment, Value};
//! let mut env = Environment::new();
//! env.add_filter("shout", |value: &Value, _arg: Option<&Value>, _autoescape: bool| {
//!     Ok(Value::from(format!("{}!", value.to_string().to_uppercase())))
//! });
//! let rv = env.render_str("{{ word|shout }}", context!{ word => "hey" }).unwrap();
//! assert_eq!(rv, "HEY!");
//! ```
//!
//! # Safe filters
//!
//! A filter registered with
//! [`add_safe_filter`](crate::Environment::add_safe_filter) promises not to
//! introduce characters that need escaping.  If its input was a safe string
//! its string output stays safe.  Input that was explicitly marked for
//! escaping stays marked for escaping for all filters.
use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::utils::HtmlEscape;
use crate::value::{ops, Value};

type FilterFunc = dyn Fn(&Value, Option<&Value>, bool) -> Result<Value, Error> + Send + Sync;

/// A registered filter.
#[derive(Clone)]
pub struct Filter {
    func: Arc<FilterFunc>,
    is_safe: bool,
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("is_safe", &self.is_safe)
            .finish()
    }
}

impl Filter {
    /// Wraps a filter function.
    pub fn new<F>(f: F) -> Filter
    where
        F: Fn(&Value, Option<&Value>, bool) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Filter {
            func: Arc::new(f),
            is_safe: false,
        }
    }

    /// Wraps a filter function that preserves safe strings.
    pub fn new_safe<F>(f: F) -> Filter
    where
        F: Fn(&Value, Option<&Value>, bool) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Filter {
            func: Arc::new(f),
            is_safe: true,
        }
    }

    /// Returns `true` if the filter preserves safe strings.
    pub fn is_safe(&self) -> bool {
        self.is_safe
    }

    /// Invokes the filter.
    pub fn apply(&self, value: &Value, arg: Option<&Value>, autoescape: bool) -> Result<Value, Error> {
        (self.func)(value, arg, autoescape)
    }
}

fn text(value: &Value) -> String {
    value.to_output_string()
}

fn int_arg(arg: Option<&Value>) -> Option<i64> {
    arg.and_then(ops::to_int)
}

/// Escapes the text of `value` unless it is already safe or autoescaping
/// is off.
fn conditional_escape(value: &Value, autoescape: bool) -> String {
    let s = text(value);
    if autoescape && !value.is_safe() {
        HtmlEscape(&s).to_string()
    } else {
        s
    }
}

pub use self::builtins::*;

mod builtins {
    use super::*;

    use std::cmp::Ordering;
    use std::fmt::Write;

    use crate::error::ErrorKind;

    /// Marks a value as safe.  This converts it into a string.
    ///
    /// When a value is marked as safe, no further auto escaping will take place.
    pub fn safe(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(Value::from_safe_string(text(value)))
    }

    /// Marks every item of a sequence as safe.
    pub fn safeseq(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(match value.as_slice() {
            Some(items) => items
                .iter()
                .map(|item| Value::from_safe_string(text(item)))
                .collect(),
            None => value.clone(),
        })
    }

    /// Marks a string for escaping.
    ///
    /// The escaping happens on output, even with autoescaping disabled.
    /// Values that are already safe are returned unchanged.
    pub fn escape(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        if value.is_safe() {
            return Ok(value.clone());
        }
        Ok(Value::from_escaped_string(text(value)))
    }

    /// Escapes a string right away and marks the result as safe.
    pub fn force_escape(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(Value::from_safe_string(HtmlEscape(&text(value)).to_string()))
    }

    /// Adds the argument to the value.
    ///
    /// Both sides are coerced to integers, anything non-numeric counts as
    /// `0`.  Two sequences are concatenated instead.
    ///
    /// ```text
    /// {{ 4|add:"2" }} -> 6
    /// ```
    pub fn add(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        if let (Some(a), Some(b)) = (value.as_slice(), arg.and_then(|x| x.as_slice())) {
            return Ok(a.iter().chain(b.iter()).cloned().collect());
        }
        let a = ops::to_int(value).unwrap_or(0);
        let b = int_arg(arg).unwrap_or(0);
        Ok(Value::from(a.saturating_add(b)))
    }

    /// Puts a backslash in front of quotes and backslashes.
    pub fn addslashes(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(Value::from(
            text(value)
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\'', "\\'"),
        ))
    }

    /// Uppercases the first character.
    pub fn capfirst(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        let s = text(value);
        let mut chars = s.chars();
        Ok(Value::from(match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        }))
    }

    fn pad(s: &str, width: Option<i64>, align: fmt::Alignment) -> String {
        let len = s.chars().count();
        let width = width.unwrap_or(0).max(0) as usize;
        if len >= width {
            return s.to_string();
        }
        let total = width - len;
        let (left, right) = match align {
            fmt::Alignment::Left => (0, total),
            fmt::Alignment::Right => (total, 0),
            fmt::Alignment::Center => (total / 2, total - total / 2),
        };
        let mut rv = String::with_capacity(s.len() + total);
        rv.extend(std::iter::repeat(' ').take(left));
        rv.push_str(s);
        rv.extend(std::iter::repeat(' ').take(right));
        rv
    }

    /// Centers the value in a field of the given width.
    pub fn center(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(Value::from(pad(&text(value), int_arg(arg), fmt::Alignment::Center)))
    }

    /// Left aligns the value in a field of the given width.
    pub fn ljust(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(Value::from(pad(&text(value), int_arg(arg), fmt::Alignment::Left)))
    }

    /// Right aligns the value in a field of the given width.
    pub fn rjust(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(Value::from(pad(&text(value), int_arg(arg), fmt::Alignment::Right)))
    }

    /// Removes all occurrences of the argument.
    pub fn cut(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        let needle = arg.map(text).unwrap_or_default();
        let s = text(value);
        if needle.is_empty() {
            return Ok(Value::from(s));
        }
        Ok(Value::from(s.replace(&needle, "")))
    }

    /// Returns the argument if the value is falsy.
    ///
    /// ```text
    /// {{ user.nickname|default:"anonymous" }}
    /// ```
    pub fn default(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        if value.is_true() {
            Ok(value.clone())
        } else {
            Ok(arg.cloned().unwrap_or(Value::UNDEFINED))
        }
    }

    /// Returns the argument if the value is none or undefined.
    pub fn default_if_none(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        if value.is_none() || value.is_undefined() {
            Ok(arg.cloned().unwrap_or(Value::UNDEFINED))
        } else {
            Ok(value.clone())
        }
    }

    /// Sorts a sequence of maps by the attribute path in the argument.
    ///
    /// ```text
    /// {% for person in people|dictsort:"address.city" %}
    /// ```
    pub fn dictsort(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        let path = match arg {
            Some(arg) => text(arg),
            None => {
                return Err(Error::new(
                    ErrorKind::InvalidArguments,
                    "dictsort requires the attribute to sort by",
                ))
            }
        };
        let items = match value.try_iter() {
            Some(items) => items,
            None => return Ok(Value::UNDEFINED),
        };
        let mut keyed: Vec<(Value, Value)> = items
            .into_iter()
            .map(|item| {
                let key = path
                    .split('.')
                    .fold(item.clone(), |value, segment| value.get_attr(segment));
                (key, item)
            })
            .collect();
        keyed.sort_by(|a, b| ops::compare(&a.0, &b.0).unwrap_or(Ordering::Equal));
        Ok(keyed.into_iter().map(|(_, item)| item).collect())
    }

    /// Returns `true` if the value is divisible by the argument.  Division
    /// by zero is `false`.
    pub fn divisibleby(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(Value::from(match (ops::to_int(value), int_arg(arg)) {
            (Some(_), Some(0)) | (None, _) | (_, None) => false,
            (Some(a), Some(b)) => a.checked_rem(b).map_or(true, |r| r == 0),
        }))
    }

    /// Escapes characters for use in JavaScript strings.
    pub fn escapejs(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        let s = text(value);
        let mut rv = String::with_capacity(s.len());
        for c in s.chars() {
            match c {
                '\\' | '\'' | '"' | '>' | '<' | '&' | '=' | '-' | ';' | '`' | '\u{2028}'
                | '\u{2029}' => {
                    ok!(write!(rv, "\\u{:04X}", c as u32).map_err(Error::from));
                }
                c if (c as u32) < 32 => {
                    ok!(write!(rv, "\\u{:04X}", c as u32).map_err(Error::from));
                }
                c => rv.push(c),
            }
        }
        Ok(Value::from(rv))
    }

    /// Returns the first item of a sequence or the first character of a
    /// string.
    pub fn first(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(value
            .try_iter()
            .and_then(|items| items.into_iter().next())
            .unwrap_or(Value::UNDEFINED))
    }

    /// Returns the last item of a sequence or the last character of a
    /// string.
    pub fn last(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(value
            .try_iter()
            .and_then(|items| items.into_iter().last())
            .unwrap_or(Value::UNDEFINED))
    }

    /// Replaces ampersands that do not start an entity with `&amp;`.
    pub fn fix_ampersands(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        let s = text(value);
        let mut rv = String::with_capacity(s.len());
        for (idx, c) in s.char_indices() {
            if c == '&' && !starts_entity(&s[idx + 1..]) {
                rv.push_str("&amp;");
            } else {
                rv.push(c);
            }
        }
        Ok(Value::from(rv))
    }

    fn starts_entity(s: &str) -> bool {
        let (body, numeric) = match s.strip_prefix('#') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let len = body
            .find(|c: char| {
                if numeric {
                    !c.is_ascii_digit()
                } else {
                    !(c.is_alphanumeric() || c == '_')
                }
            })
            .unwrap_or(body.len());
        len > 0 && body[len..].starts_with(';')
    }

    /// Decimal places beyond what an f64 can carry are not printed.
    const MAX_FLOAT_PRECISION: u64 = 20;

    /// Rounds a floating point number.
    ///
    /// Without an argument the number is rounded to one decimal place but
    /// printed without decimals if it is integral.  A positive argument
    /// always prints that many decimals, a negative one only if the number
    /// is not integral.  Values that are not numbers produce an empty
    /// string.
    pub fn floatformat(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        let num = match ops::to_float(value) {
            Some(num) if num.is_finite() => num,
            _ => return Ok(Value::from("")),
        };
        let digits = int_arg(arg).unwrap_or(-1);
        let precision = digits.unsigned_abs().min(MAX_FLOAT_PRECISION) as usize;
        let factor = 10f64.powi(precision as i32);
        let scaled = num * factor;
        // past the range of f64 there is nothing left to round
        let rounded = if scaled.is_finite() {
            scaled.round() / factor
        } else {
            num
        };
        if digits < 0 && rounded.fract() == 0.0 {
            return Ok(Value::from(format!("{rounded:.0}")));
        }
        Ok(Value::from(format!("{rounded:.precision$}")))
    }

    /// Returns the digit at the given position counting from the right,
    /// starting at 1.
    pub fn get_digit(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        let (num, pos) = match (ops::to_int(value), int_arg(arg)) {
            (Some(num), Some(pos)) if pos >= 1 => (num, pos as usize),
            _ => return Ok(value.clone()),
        };
        let digits = num.unsigned_abs().to_string();
        Ok(Value::from(
            digits
                .chars()
                .rev()
                .nth(pos - 1)
                .and_then(|c| c.to_digit(10))
                .unwrap_or(0),
        ))
    }

    /// Joins a sequence with the argument as separator.
    ///
    /// Items and separator are escaped if autoescaping is on; the result is
    /// safe.
    pub fn join(value: &Value, arg: Option<&Value>, autoescape: bool) -> Result<Value, Error> {
        let items = match value.try_iter() {
            Some(items) => items,
            None => return Ok(value.clone()),
        };
        let sep = arg
            .map(|x| conditional_escape(x, autoescape))
            .unwrap_or_default();
        let mut rv = String::new();
        for (idx, item) in items.iter().enumerate() {
            if idx > 0 {
                rv.push_str(&sep);
            }
            rv.push_str(&conditional_escape(item, autoescape));
        }
        Ok(Value::from_safe_string(rv))
    }

    /// Returns the length of a sequence, map or string.  Undefined for
    /// everything else.
    pub fn length(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(value.len().map_or(Value::UNDEFINED, Value::from))
    }

    /// Returns `true` if the length of the value equals the argument.
    pub fn length_is(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(match (value.len(), int_arg(arg)) {
            (Some(len), Some(expected)) => Value::from(len as i64 == expected),
            _ => Value::UNDEFINED,
        })
    }

    fn normalize_newlines(s: &str) -> String {
        s.replace("\r\n", "\n").replace('\r', "\n")
    }

    /// Wraps paragraphs in `<p>` and converts single newlines to `<br />`.
    pub fn linebreaks(value: &Value, _: Option<&Value>, autoescape: bool) -> Result<Value, Error> {
        let s = normalize_newlines(&text(value));
        let mut paragraphs = Vec::new();
        let mut current = String::new();
        let mut newlines = 0;
        for c in s.chars() {
            if c == '\n' {
                newlines += 1;
                continue;
            }
            if newlines >= 2 {
                paragraphs.push(std::mem::take(&mut current));
            } else if newlines == 1 {
                current.push('\n');
            }
            newlines = 0;
            current.push(c);
        }
        paragraphs.push(current);
        let rv: Vec<String> = paragraphs
            .into_iter()
            .map(|para| {
                let para = if autoescape && !value.is_safe() {
                    HtmlEscape(&para).to_string()
                } else {
                    para
                };
                format!("<p>{}</p>", para.replace('\n', "<br />"))
            })
            .collect();
        Ok(Value::from_safe_string(rv.join("\n\n")))
    }

    /// Converts newlines to `<br />`.
    pub fn linebreaksbr(value: &Value, _: Option<&Value>, autoescape: bool) -> Result<Value, Error> {
        let s = normalize_newlines(&text(value));
        let s = if autoescape && !value.is_safe() {
            HtmlEscape(&s).to_string()
        } else {
            s
        };
        Ok(Value::from_safe_string(s.replace('\n', "<br />")))
    }

    /// Prefixes every line with its line number.
    pub fn linenumbers(value: &Value, _: Option<&Value>, autoescape: bool) -> Result<Value, Error> {
        let s = text(value);
        let lines: Vec<&str> = s.split('\n').collect();
        let width = lines.len().to_string().len();
        let escape = autoescape && !value.is_safe();
        let mut rv = String::new();
        for (idx, line) in lines.iter().enumerate() {
            if idx > 0 {
                rv.push('\n');
            }
            if escape {
                ok!(write!(rv, "{:0width$}. {}", idx + 1, HtmlEscape(line)).map_err(Error::from));
            } else {
                ok!(write!(rv, "{:0width$}. {}", idx + 1, line).map_err(Error::from));
            }
        }
        Ok(Value::from_safe_string(rv))
    }

    /// Converts a value to lowercase.
    pub fn lower(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(Value::from(text(value).to_lowercase()))
    }

    /// Converts a value to uppercase.
    pub fn upper(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(Value::from(text(value).to_uppercase()))
    }

    /// Converts a value to title case: every character after whitespace is
    /// uppercased, every other one lowercased.
    pub fn title(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(Value::from(ops::title_case(&text(value))))
    }

    /// Turns a string or number into a list of characters.  Sequences are
    /// returned as they are.
    pub fn make_list(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        if value.as_slice().is_some() {
            return Ok(value.clone());
        }
        if value.is_undefined() || value.is_none() {
            return Ok(Value::UNDEFINED);
        }
        Ok(text(value).chars().map(|c| Value::from(c.to_string())).collect())
    }

    fn tag_name_at(s: &str) -> (bool, &str) {
        let (closing, rest) = match s.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        (closing, &rest[..len])
    }

    /// Removes the listed (space separated) HTML tags.
    ///
    /// ```text
    /// {{ "<b>bold</b> <i>x</i>"|removetags:"b" }} -> bold <i>x</i>
    /// ```
    pub fn removetags(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        let tags = arg.map(text).unwrap_or_default();
        let tags: Vec<&str> = tags.split_whitespace().collect();
        let s = text(value);
        let mut rv = String::with_capacity(s.len());
        let mut rest = s.as_str();
        while let Some(idx) = rest.find('<') {
            rv.push_str(&rest[..idx]);
            let after = &rest[idx + 1..];
            let (closing, name) = tag_name_at(after);
            let end = after.find('>');
            let tail = &after[(closing as usize) + name.len()..];
            let well_formed = match end {
                Some(_) if closing => tail.starts_with('>'),
                Some(_) => {
                    tail.starts_with('>')
                        || tail.starts_with("/>")
                        || tail.starts_with(char::is_whitespace)
                }
                None => false,
            };
            match end {
                Some(end) if well_formed && tags.contains(&name) => {
                    rest = &after[end + 1..];
                }
                _ => {
                    rv.push('<');
                    rest = after;
                }
            }
        }
        rv.push_str(rest);
        Ok(Value::from(rv))
    }

    /// Removes all HTML tags.
    pub fn striptags(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        let s = text(value);
        let mut rv = String::with_capacity(s.len());
        let mut rest = s.as_str();
        while let Some(start) = rest.find('<') {
            match rest[start..].find('>') {
                Some(end) => {
                    rv.push_str(&rest[..start]);
                    rest = &rest[start + end + 1..];
                }
                None => break,
            }
        }
        rv.push_str(rest);
        Ok(Value::from(rv))
    }

    /// Slices a sequence or string.
    ///
    /// The argument is either `start:stop` with optional, possibly negative
    /// bounds, or a single index which selects one item.
    ///
    /// ```text
    /// {{ "abcdef"|slice:"1:-1" }} -> bcde
    /// {{ items|slice:"0" }} -> first item
    /// ```
    pub fn slice(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        let spec = match arg {
            Some(arg) => text(arg),
            None => return Ok(value.clone()),
        };
        if let Some((start, stop)) = spec.split_once(':') {
            let bound = |s: &str| s.trim().parse::<i64>().ok();
            return Ok(ops::slice(value, bound(start), bound(stop)));
        }
        let idx = match spec.trim().parse::<i64>() {
            Ok(idx) => idx,
            Err(_) => return Ok(Value::UNDEFINED),
        };
        Ok(value
            .try_iter()
            .and_then(|items| {
                ops::normalize_index(idx, items.len()).and_then(|idx| items.into_iter().nth(idx))
            })
            .unwrap_or(Value::UNDEFINED))
    }

    fn is_word_char(c: char) -> bool {
        #[cfg(feature = "unicode")]
        {
            unicode_ident::is_xid_continue(c)
        }
        #[cfg(not(feature = "unicode"))]
        {
            c.is_ascii_alphanumeric() || c == '_'
        }
    }

    /// Converts to lowercase, removes non-word characters and turns runs of
    /// spaces and hyphens into single hyphens.
    ///
    /// ```text
    /// {{ " Joel is a slug "|slugify }} -> joel-is-a-slug
    /// ```
    pub fn slugify(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        let s = text(value);
        let cleaned: String = s
            .chars()
            .filter(|&c| is_word_char(c) || c.is_whitespace() || c == '-')
            .collect::<String>()
            .trim()
            .to_lowercase();
        let mut rv = String::with_capacity(cleaned.len());
        let mut in_sep = false;
        for c in cleaned.chars() {
            if c.is_whitespace() || c == '-' {
                if !in_sep {
                    rv.push('-');
                }
                in_sep = true;
            } else {
                rv.push(c);
                in_sep = false;
            }
        }
        Ok(Value::from(rv))
    }

    /// Formats the value with a printf style conversion like `s`, `05d`,
    /// `.2f` or `x`.  An unsupported specifier produces an empty string.
    pub fn stringformat(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        let spec = arg.map(text).unwrap_or_default();
        Ok(Value::from(format_printf(&spec, value).unwrap_or_default()))
    }

    fn format_printf(spec: &str, value: &Value) -> Option<String> {
        let spec = spec.strip_prefix('%').unwrap_or(spec);
        let conv = some!(spec.chars().last());
        let body = &spec[..spec.len() - conv.len_utf8()];
        let flag_end = body
            .find(|c: char| !matches!(c, '-' | '+' | '0' | ' ' | '#'))
            .unwrap_or(body.len());
        let (flags, rest) = body.split_at(flag_end);
        let (width, precision) = match rest.split_once('.') {
            Some((width, precision)) => (width, Some(precision)),
            None => (rest, None),
        };
        let width: usize = if width.is_empty() {
            0
        } else {
            some!(width.parse().ok())
        };
        let precision: Option<usize> = match precision {
            Some("") => Some(0),
            Some(p) => Some(some!(p.parse().ok())),
            None => None,
        };

        let (negative, digits) = match conv {
            's' | 'r' => {
                let s = text(value);
                let s = match precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s,
                };
                let align = if flags.contains('-') {
                    fmt::Alignment::Left
                } else {
                    fmt::Alignment::Right
                };
                return Some(pad(&s, Some(width as i64), align));
            }
            'd' | 'i' | 'u' => {
                let num = some!(ops::to_int(value));
                (num < 0, num.unsigned_abs().to_string())
            }
            'x' | 'X' | 'o' => {
                let num = some!(ops::to_int(value));
                let abs = num.unsigned_abs();
                let digits = match conv {
                    'x' => format!("{abs:x}"),
                    'X' => format!("{abs:X}"),
                    _ => format!("{abs:o}"),
                };
                (num < 0, digits)
            }
            'f' | 'F' => {
                let num = some!(ops::to_float(value));
                let p = precision.unwrap_or(6);
                (num.is_sign_negative() && num != 0.0, format!("{:.p$}", num.abs()))
            }
            'e' | 'E' => {
                let num = some!(ops::to_float(value));
                let p = precision.unwrap_or(6);
                let raw = format!("{:.p$e}", num.abs());
                let (mantissa, exp) = some!(raw.split_once('e'));
                let exp: i32 = some!(exp.parse().ok());
                let sign = if exp < 0 { '-' } else { '+' };
                let mut rv = format!("{mantissa}e{sign}{:02}", exp.unsigned_abs());
                if conv == 'E' {
                    rv = rv.to_uppercase();
                }
                (num.is_sign_negative() && num != 0.0, rv)
            }
            _ => return None,
        };

        let sign = if negative {
            "-"
        } else if flags.contains('+') {
            "+"
        } else if flags.contains(' ') {
            " "
        } else {
            ""
        };
        let len = sign.len() + digits.len();
        if len >= width {
            return Some(format!("{sign}{digits}"));
        }
        let fill = width - len;
        Some(if flags.contains('-') {
            format!("{sign}{digits}{}", " ".repeat(fill))
        } else if flags.contains('0') {
            format!("{sign}{}{digits}", "0".repeat(fill))
        } else {
            format!("{}{sign}{digits}", " ".repeat(fill))
        })
    }

    /// Truncates after the given number of words and appends `...`.
    pub fn truncatewords(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        let count = match int_arg(arg) {
            Some(count) => count.max(0) as usize,
            None => return Ok(value.clone()),
        };
        let s = text(value);
        let mut words: Vec<&str> = s.split_whitespace().collect();
        if words.len() > count {
            words.truncate(count);
            if !words.last().map_or(false, |w| w.ends_with("...")) {
                words.push("...");
            }
        }
        Ok(Value::from(words.join(" ")))
    }

    /// Renders a nested sequence as HTML list items without the outer
    /// `<ul>`.
    ///
    /// An item followed by a sequence gets that sequence as its sub list.
    pub fn unordered_list(
        value: &Value,
        _: Option<&Value>,
        autoescape: bool,
    ) -> Result<Value, Error> {
        match value.as_slice() {
            Some(items) => Ok(Value::from_safe_string(list_items(items, 1, autoescape))),
            None => Ok(Value::UNDEFINED),
        }
    }

    fn list_items(items: &[Value], tabs: usize, autoescape: bool) -> String {
        let indent = "\t".repeat(tabs);
        let mut output = Vec::new();
        let mut idx = 0;
        while idx < items.len() {
            let item = &items[idx];
            let (title, sublist) = match item.as_slice() {
                Some(children) => (String::new(), Some(children)),
                None => {
                    let next = items.get(idx + 1).and_then(|x| x.as_slice());
                    if next.is_some() {
                        idx += 1;
                    }
                    (conditional_escape(item, autoescape), next)
                }
            };
            let sublist = match sublist {
                Some(children) => format!(
                    "\n{indent}<ul>\n{}\n{indent}</ul>\n{indent}",
                    list_items(children, tabs + 1, autoescape)
                ),
                None => String::new(),
            };
            output.push(format!("{indent}<li>{title}{sublist}</li>"));
            idx += 1;
        }
        output.join("\n")
    }

    /// Returns the number of words.
    pub fn wordcount(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        Ok(Value::from(text(value).split_whitespace().count()))
    }

    /// Wraps words at the given line length.  Existing newlines are kept
    /// and words longer than the width are not split.
    pub fn wordwrap(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        let width = int_arg(arg).unwrap_or(0).max(0) as usize;
        let s = text(value);
        let mut parts = s.split(' ').filter(|x| !x.is_empty());
        let mut output = match parts.next() {
            Some(first) => first.to_string(),
            None => return Ok(Value::from("")),
        };
        let mut pos = output.len() - output.rfind('\n').map_or(0, |x| x + 1);
        for part in parts {
            let first_line = part.split('\n').next().unwrap_or("");
            let last_line = part.rsplit('\n').next().unwrap_or("");
            pos += first_line.chars().count() + 1;
            if pos > width {
                output.push('\n');
                pos = last_line.chars().count();
            } else {
                output.push(' ');
                if part.contains('\n') {
                    pos = last_line.chars().count();
                }
            }
            output.push_str(part);
        }
        Ok(Value::from(output))
    }

    /// Maps truthy, falsy and none to the comma separated words in the
    /// argument (default `yes,no,maybe`).
    ///
    /// With only two words the second is used for none as well.
    pub fn yesno(value: &Value, arg: Option<&Value>, _: bool) -> Result<Value, Error> {
        let spec = arg.map(text).unwrap_or_else(|| "yes,no,maybe".to_string());
        let words: Vec<&str> = spec.split(',').collect();
        let (yes, no, maybe) = match words[..] {
            [yes, no] => (yes, no, no),
            [yes, no, maybe] => (yes, no, maybe),
            _ => return Ok(value.clone()),
        };
        Ok(Value::from(if value.is_none() || value.is_undefined() {
            maybe
        } else if value.is_true() {
            yes
        } else {
            no
        }))
    }

    /// URL encodes a value.
    ///
    /// If given a map it encodes the parameters into a query set, otherwise it
    /// encodes the stringified value.  If the value is none or undefined, an
    /// empty string is returned.
    #[cfg_attr(docsrs, doc(cfg(feature = "urlencode")))]
    #[cfg(feature = "urlencode")]
    pub fn urlencode(value: &Value, _: Option<&Value>, _: bool) -> Result<Value, Error> {
        const SET: &percent_encoding::AsciiSet = &percent_encoding::NON_ALPHANUMERIC
            .remove(b'/')
            .remove(b'.')
            .remove(b'-')
            .remove(b'_')
            .add(b' ');

        if let Some(map) = value.as_map() {
            let mut rv = String::new();
            for (k, v) in map.iter() {
                if v.is_none() || v.is_undefined() {
                    continue;
                }
                if !rv.is_empty() {
                    rv.push('&');
                }
                ok!(write!(
                    rv,
                    "{}={}",
                    percent_encoding::utf8_percent_encode(k, SET),
                    percent_encoding::utf8_percent_encode(&text(v), SET)
                )
                .map_err(Error::from));
            }
            Ok(Value::from(rv))
        } else if value.is_none() || value.is_undefined() {
            Ok(Value::from(""))
        } else {
            Ok(Value::from(
                percent_encoding::utf8_percent_encode(&text(value), SET).to_string(),
            ))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        use similar_asserts::assert_eq;

        fn apply(
            f: fn(&Value, Option<&Value>, bool) -> Result<Value, Error>,
            value: impl Into<Value>,
            arg: Option<&str>,
        ) -> Value {
            let arg = arg.map(Value::from);
            f(&value.into(), arg.as_ref(), true).unwrap()
        }

        #[test]
        fn test_add() {
            assert_eq!(apply(add, 4, Some("2")), Value::from(6));
            assert_eq!(apply(add, "x", Some("2")), Value::from(2));
            let a = Value::from(vec![Value::from(1)]);
            let b = Value::from(vec![Value::from(2)]);
            assert_eq!(add(&a, Some(&b), true).unwrap().len(), Some(2));
        }

        #[test]
        fn test_divisibleby_zero() {
            assert_eq!(apply(divisibleby, 4, Some("2")), Value::from(true));
            assert_eq!(apply(divisibleby, 4, Some("0")), Value::from(false));
            assert_eq!(apply(divisibleby, i64::MIN, Some("-1")), Value::from(true));
            assert_eq!(apply(divisibleby, i64::MIN, Some("2")), Value::from(true));
            assert_eq!(apply(divisibleby, i64::MIN, Some("3")), Value::from(false));
        }

        #[test]
        fn test_yesno() {
            assert_eq!(apply(yesno, true, None), Value::from("yes"));
            assert_eq!(apply(yesno, Value::from(()), Some("y,n")), Value::from("n"));
            assert_eq!(apply(yesno, Value::UNDEFINED, Some("y,n,m")), Value::from("m"));
            assert_eq!(apply(yesno, 0, Some("y,n,m")), Value::from("n"));
        }

        #[test]
        fn test_slice() {
            assert_eq!(apply(slice, "abcdef", Some("1:-1")), Value::from("bcde"));
            assert_eq!(apply(slice, "abcdef", Some(":2")), Value::from("ab"));
            assert_eq!(apply(slice, "abcdef", Some("2")), Value::from("c"));
            assert_eq!(apply(slice, "abcdef", Some("-1")), Value::from("f"));
        }

        #[test]
        fn test_length() {
            assert_eq!(apply(length, "äbc", None), Value::from(3));
            assert!(apply(length, 42, None).is_undefined());
        }

        #[test]
        fn test_floatformat() {
            assert_eq!(apply(floatformat, 34.23234, None), Value::from("34.2"));
            assert_eq!(apply(floatformat, 34.0, None), Value::from("34"));
            assert_eq!(apply(floatformat, 34.26, Some("3")), Value::from("34.260"));
            assert_eq!(apply(floatformat, 34.0, Some("-3")), Value::from("34"));
            assert_eq!(apply(floatformat, "nope", None), Value::from(""));
            assert_eq!(
                apply(floatformat, 1.5, Some("400")),
                Value::from("1.50000000000000000000")
            );
            let huge = apply(floatformat, 1e300, Some("20")).to_string();
            assert!(huge.starts_with("1000000000"));
            assert!(huge.ends_with(".00000000000000000000"));
            let huge = apply(floatformat, 1e300, None).to_string();
            assert_eq!(huge.len(), 301);
            assert!(!huge.contains('.'));
        }

        #[test]
        fn test_stringformat() {
            assert_eq!(apply(stringformat, 7, Some("03d")), Value::from("007"));
            assert_eq!(apply(stringformat, 3.14159, Some(".2f")), Value::from("3.14"));
            assert_eq!(apply(stringformat, 255, Some("x")), Value::from("ff"));
            assert_eq!(apply(stringformat, "ab", Some("-4s")), Value::from("ab  "));
            assert_eq!(apply(stringformat, 1500.0, Some(".1e")), Value::from("1.5e+03"));
            assert_eq!(apply(stringformat, -5, Some("+d")), Value::from("-5"));
        }

        #[test]
        fn test_text_filters() {
            assert_eq!(
                apply(slugify, " Joel is a slug! ", None),
                Value::from("joel-is-a-slug")
            );
            assert_eq!(apply(capfirst, "hello world", None), Value::from("Hello world"));
            assert_eq!(apply(cut, "a b c", Some(" ")), Value::from("abc"));
            assert_eq!(apply(center, "ab", Some("6")), Value::from("  ab  "));
            assert_eq!(
                apply(truncatewords, "one two three", Some("2")),
                Value::from("one two ...")
            );
            assert_eq!(apply(wordcount, "one  two three", None), Value::from(3));
            assert_eq!(
                apply(wordwrap, "Joel is a slug", Some("5")),
                Value::from("Joel\nis a\nslug")
            );
            assert_eq!(
                apply(fix_ampersands, "a & b &amp; &#38;", None),
                Value::from("a &amp; b &amp; &#38;")
            );
            assert_eq!(apply(get_digit, 123456, Some("2")), Value::from(5));
        }

        #[test]
        fn test_tag_stripping() {
            assert_eq!(
                apply(striptags, "<b>bold</b> <br/>text", None),
                Value::from("bold text")
            );
            assert_eq!(
                apply(removetags, "<b>bold</b> <i class=\"x\">it</i><br/>", Some("b i")),
                Value::from("bold it<br/>")
            );
        }

        #[test]
        fn test_markup_filters() {
            let rv = apply(linebreaks, "a\nb\n\nc", None);
            assert!(rv.is_safe());
            assert_eq!(rv, Value::from("<p>a<br />b</p>\n\n<p>c</p>"));
            assert_eq!(
                apply(linebreaksbr, "<a>\nb", None),
                Value::from("&lt;a&gt;<br />b")
            );
            assert_eq!(apply(linenumbers, "a\nb", None), Value::from("1. a\n2. b"));
            let nested = Value::from_serialize(serde_json::json!(["a", ["b", "c"], "d"]));
            assert_eq!(
                unordered_list(&nested, None, true).unwrap(),
                Value::from("\t<li>a\n\t<ul>\n\t\t<li>b</li>\n\t\t<li>c</li>\n\t</ul>\n\t</li>\n\t<li>d</li>")
            );
        }

        #[test]
        fn test_escaping_filters() {
            let rv = apply(escape, "<b>", None);
            assert!(rv.needs_escape());
            let safe = Value::from_safe_string("<b>".into());
            assert!(escape(&safe, None, true).unwrap().is_safe());
            let rv = apply(force_escape, "<b>", None);
            assert!(rv.is_safe());
            assert_eq!(rv, Value::from("&lt;b&gt;"));
            assert_eq!(
                apply(escapejs, "'a'\n", None),
                Value::from("\\u0027a\\u0027\\u000A")
            );
            let items = Value::from(vec![Value::from("<a>"), Value::from("b")]);
            assert_eq!(
                join(&items, Some(&Value::from(", ")), true).unwrap(),
                Value::from("&lt;a&gt;, b")
            );
        }

        #[test]
        fn test_dictsort() {
            let people = Value::from_serialize(serde_json::json!([
                {"name": "Zed", "age": 19},
                {"name": "Amy", "age": 22},
                {"name": "Joe", "age": 31},
            ]));
            let rv = dictsort(&people, Some(&Value::from("name")), true).unwrap();
            let names: Vec<String> = rv
                .try_iter()
                .unwrap()
                .iter()
                .map(|x| x.get_attr("name").to_string())
                .collect();
            assert_eq!(names, vec!["Amy", "Joe", "Zed"]);
            assert!(dictsort(&people, None, true).is_err());
        }

        #[cfg(feature = "urlencode")]
        #[test]
        fn test_urlencode() {
            assert_eq!(apply(urlencode, "a b/c?", None), Value::from("a%20b/c%3F"));
        }
    }
}
