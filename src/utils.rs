use std::fmt;

use crate::error::{Error, ErrorKind};
use crate::output::Output;
use crate::value::{Value, ValueRepr};

/// Helper for dealing with untrusted size hints.
#[inline(always)]
pub(crate) fn untrusted_size_hint(value: usize) -> usize {
    value.min(1024)
}

/// Writes a value into the output, escaping it if needed.
///
/// Strings marked safe are never escaped, strings marked for escaping always
/// are.  Everything else is escaped only if `autoescape` is enabled.
#[inline(always)]
pub fn write_escaped(out: &mut Output, autoescape: bool, value: &Value) -> Result<(), Error> {
    if let ValueRepr::String(ref s, _) = value.0 {
        return if value.is_safe() || (!autoescape && !value.needs_escape()) {
            out.write_str(s).map_err(Error::from)
        } else {
            write!(out, "{}", HtmlEscape(s)).map_err(Error::from)
        };
    }
    if autoescape && !matches!(value.0, ValueRepr::I64(_) | ValueRepr::F64(_) | ValueRepr::Bool(_))
    {
        write!(out, "{}", HtmlEscape(&value.to_string())).map_err(Error::from)
    } else {
        write!(out, "{value}").map_err(Error::from)
    }
}

/// Defines the behavior of undefined values in the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum UndefinedBehavior {
    /// The default.  Undefined values print as empty strings, are falsy and
    /// iterate as empty sequences.
    #[default]
    Lenient,
    /// Printing an undefined value fails with
    /// [`UndefinedError`](crate::ErrorKind::UndefinedError).  Tests and
    /// iteration stay lenient so that `{% if missing %}` keeps working.
    Strict,
}

impl UndefinedBehavior {
    /// Checks a value that is about to be printed.
    #[inline]
    pub(crate) fn assert_printable(self, value: &Value, expr: &str) -> Result<(), Error> {
        if matches!(self, UndefinedBehavior::Strict) && value.is_undefined() {
            Err(Error::new(
                ErrorKind::UndefinedError,
                format!("{expr:?} is undefined"),
            ))
        } else {
            Ok(())
        }
    }
}

/// Helper to HTML escape a string.
pub struct HtmlEscape<'a>(pub &'a str);

impl<'a> fmt::Display for HtmlEscape<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[cfg(feature = "v_htmlescape")]
        {
            fmt::Display::fmt(&v_htmlescape::escape(self.0), f)
        }
        #[cfg(not(feature = "v_htmlescape"))]
        {
            let mut start = 0;
            for (idx, c) in self.0.char_indices() {
                let replacement = match c {
                    '<' => "&lt;",
                    '>' => "&gt;",
                    '&' => "&amp;",
                    '"' => "&quot;",
                    '\'' => "&#x27;",
                    '/' => "&#x2f;",
                    _ => continue,
                };
                ok!(f.write_str(&self.0[start..idx]));
                ok!(f.write_str(replacement));
                start = idx + 1;
            }
            f.write_str(&self.0[start..])
        }
    }
}

/// Removes the surrounding quotes of a string literal and resolves the
/// `\"`, `\'` and `\\` escapes.
pub fn unescape_string_literal(s: &str) -> Result<String, Error> {
    let mut chars = s.chars();
    let quote = match chars.next() {
        Some(c @ ('"' | '\'')) if s.len() >= 2 && s.ends_with(c) => c,
        _ => {
            return Err(Error::new(
                ErrorKind::TagSyntaxError,
                format!("not a string literal: {s}"),
            ))
        }
    };
    let inner = &s[1..s.len() - 1];
    let mut rv = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some(&next) if next == quote || next == '\\' || next == '"' || next == '\'' => {
                    rv.push(next);
                    chars.next();
                }
                _ => rv.push(c),
            }
        } else {
            rv.push(c);
        }
    }
    Ok(rv)
}

/// Splits tag content on whitespace, keeping quoted strings together.
///
/// `cycle 'a b' "c d"` splits into `cycle`, `'a b'` and `"c d"`.  Quotes may
/// also appear inside a word, as in `name="some value"`.
pub fn smart_split(s: &str) -> Vec<&str> {
    let mut rv = Vec::new();
    let mut chars = s.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut end = s.len();
        let mut quote = None;
        let mut escaped = false;
        while let Some(&(idx, c)) = chars.peek() {
            match quote {
                Some(q) => {
                    if escaped {
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == q {
                        quote = None;
                    }
                }
                None if c.is_whitespace() => {
                    end = idx;
                    break;
                }
                None if c == '"' || c == '\'' => quote = Some(c),
                None => {}
            }
            chars.next();
        }
        rv.push(&s[start..end]);
    }
    rv
}

/// Splits on a separator outside of quoted strings.
pub fn split_outside_quotes(s: &str, sep: char) -> Vec<&str> {
    let mut rv = Vec::new();
    let mut quote = None;
    let mut escaped = false;
    let mut start = 0;
    for (idx, c) in s.char_indices() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == sep => {
                rv.push(&s[start..idx]);
                start = idx + c.len_utf8();
            }
            None => {}
        }
    }
    rv.push(&s[start..]);
    rv
}

pub struct OnDrop<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> OnDrop<F> {
    pub fn new(f: F) -> Self {
        Self(Some(f))
    }
}

impl<F: FnOnce()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_html_escape() {
        let input = "<>&\"'/";
        let output = HtmlEscape(input).to_string();
        assert_eq!(output, "&lt;&gt;&amp;&quot;&#x27;&#x2f;");
        assert_eq!(HtmlEscape("plain ünïcode").to_string(), "plain ünïcode");
    }

    #[test]
    fn test_unescape_string_literal() {
        assert_eq!(unescape_string_literal(r#""foo""#).unwrap(), "foo");
        assert_eq!(unescape_string_literal(r#"'it\'s'"#).unwrap(), "it's");
        assert_eq!(unescape_string_literal(r#""a\\b""#).unwrap(), r"a\b");
        assert_eq!(unescape_string_literal(r#""a\nb""#).unwrap(), r"a\nb");
        assert!(unescape_string_literal("foo").is_err());
        assert!(unescape_string_literal("\"").is_err());
    }

    #[test]
    fn test_smart_split() {
        assert_eq!(
            smart_split(r#"cycle 'a b' "c \" d" plain"#),
            vec!["cycle", "'a b'", r#""c \" d""#, "plain"]
        );
        assert_eq!(
            smart_split(r#"with name="some value" other"#),
            vec!["with", r#"name="some value""#, "other"]
        );
        assert_eq!(smart_split("  a   b "), vec!["a", "b"]);
        assert!(smart_split("   ").is_empty());
    }

    #[test]
    fn test_split_outside_quotes() {
        assert_eq!(
            split_outside_quotes(r#"a|default:"x|y"|upper"#, '|'),
            vec!["a", r#"default:"x|y""#, "upper"]
        );
        assert_eq!(split_outside_quotes("a,'b,c',d", ','), vec!["a", "'b,c'", "d"]);
    }
}
