use std::fmt;

use crate::error::{Error, ErrorKind};

/// The kind of a token in the stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Raw template data.
    Text,
    /// The content of a `{{ ... }}` tag.
    Variable,
    /// The content of a `{% ... %}` tag.
    Block,
    /// The content of a `{# ... #}` tag.
    Comment,
}

/// Represents a token in the stream.
///
/// For everything but text tokens the content is trimmed and does not include
/// the delimiters.  Text tokens are kept byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'s> {
    /// The kind of the token.
    pub kind: TokenKind,
    /// The content of the token.
    pub content: &'s str,
    /// The line the token starts on (1-based).
    pub line: usize,
}

impl<'s> Token<'s> {
    /// Returns the first word of the token content (the tag name for block
    /// tokens).
    pub fn tag_name(&self) -> &'s str {
        self.content.split_whitespace().next().unwrap_or("")
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Text => f.write_str(self.content),
            TokenKind::Variable => write!(f, "{{{{ {} }}}}", self.content),
            TokenKind::Block => write!(f, "{{% {} %}}", self.content),
            TokenKind::Comment => write!(f, "{{# {} #}}", self.content),
        }
    }
}

fn find_start_marker(s: &str) -> Option<(usize, TokenKind)> {
    let bytes = s.as_bytes();
    let mut offset = 0;
    loop {
        let idx = offset + some!(bytes[offset..].iter().position(|&b| b == b'{'));
        match bytes.get(idx + 1) {
            Some(b'{') => return Some((idx, TokenKind::Variable)),
            Some(b'%') => return Some((idx, TokenKind::Block)),
            Some(b'#') => return Some((idx, TokenKind::Comment)),
            _ => offset = idx + 1,
        }
    }
}

fn end_marker(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Variable => "}}",
        TokenKind::Block => "%}",
        TokenKind::Comment => "#}",
        TokenKind::Text => "",
    }
}

/// Tokenizes templates.
struct Tokenizer<'s> {
    rest: &'s str,
    current_line: usize,
    name: &'s str,
}

impl<'s> Tokenizer<'s> {
    fn advance(&mut self, bytes: usize) -> &'s str {
        let (skipped, new_rest) = self.rest.split_at(bytes);
        self.current_line += skipped.matches('\n').count();
        self.rest = new_rest;
        skipped
    }

    fn unterminated(&self, kind: TokenKind) -> Error {
        let what = match kind {
            TokenKind::Variable => "variable",
            TokenKind::Block => "block",
            _ => "comment",
        };
        Error::new(
            ErrorKind::TagSyntaxError,
            format!("unterminated {what} tag"),
        )
        .with_location(self.name, self.current_line)
    }

    fn next_token(&mut self) -> Result<Option<Token<'s>>, Error> {
        if self.rest.is_empty() {
            return Ok(None);
        }
        let line = self.current_line;
        let (start, kind) = match find_start_marker(self.rest) {
            Some((0, kind)) => (0, kind),
            Some((start, _)) => {
                return Ok(Some(Token {
                    kind: TokenKind::Text,
                    content: self.advance(start),
                    line,
                }))
            }
            None => {
                return Ok(Some(Token {
                    kind: TokenKind::Text,
                    content: self.advance(self.rest.len()),
                    line,
                }))
            }
        };

        let inner = &self.rest[start + 2..];
        let end = match inner.find(end_marker(kind)) {
            Some(end) => end,
            None => return Err(self.unterminated(kind)),
        };
        // a closing delimiter has to come before the next opening one
        if let Some((next_start, _)) = find_start_marker(inner) {
            if next_start < end {
                return Err(self.unterminated(kind));
            }
        }
        let content = inner[..end].trim();
        self.advance(start + 2 + end + 2);
        Ok(Some(Token {
            kind,
            content,
            line,
        }))
    }
}

/// Splits a template source into tokens.
///
/// The `name` is only used for error reporting.
pub fn tokenize<'s>(source: &'s str, name: &'s str) -> Result<Vec<Token<'s>>, Error> {
    let mut tokenizer = Tokenizer {
        rest: source,
        current_line: 1,
        name,
    };
    let mut rv = Vec::new();
    while let Some(token) = ok!(tokenizer.next_token()) {
        rv.push(token);
    }
    Ok(rv)
}
