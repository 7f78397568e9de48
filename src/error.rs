use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Represents template errors.
///
/// Errors carry a [`ErrorKind`], an optional human readable detail and, once
/// the engine knows it, the name of the template and the line the error was
/// raised on.
///
/// # Example
///
/// ```rust
/// # use minidtl::{Environment, ErrorKind};
/// let env = Environment::new();
/// let tmpl = env.new_template("{% if %}{% endif %}", "broken.html");
/// let err = tmpl.error().unwrap();
/// assert_eq!(err.kind(), ErrorKind::TagSyntaxError);
/// assert!(!tmpl.error_string().is_empty());
/// ```
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    name: Option<String>,
    lineno: usize,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("detail", &self.detail)
            .field("name", &self.name)
            .field("lineno", &self.lineno)
            .field("source", &self.source)
            .finish()
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for Error {}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A tag was used with the wrong arguments, a template could not be
    /// found by `extends`, or the template source is malformed.
    TagSyntaxError,
    /// An unknown tag, or an end tag that does not match its opening tag.
    InvalidBlockTagError,
    /// A block tag was never closed.
    UnclosedBlockTagError,
    /// A `{{ }}` tag without content.
    EmptyVariableError,
    /// A `{% %}` tag without content.
    EmptyBlockTagError,
    /// A filter that is not registered was referenced.
    UnknownFilterError,
    /// A template could not be loaded.
    TemplateNotFound,
    /// Inheritance or inclusion nested deeper than allowed.
    RecursionLimit,
    /// An undefined value was printed in strict mode.
    UndefinedError,
    /// A filter or tag received arguments it cannot work with.
    InvalidArguments,
    /// A context value could not be converted.
    BadSerialization,
    /// Writing to the output failed.
    WriteFailure,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::TagSyntaxError => "tag syntax error",
            ErrorKind::InvalidBlockTagError => "invalid block tag",
            ErrorKind::UnclosedBlockTagError => "unclosed block tag",
            ErrorKind::EmptyVariableError => "empty variable tag",
            ErrorKind::EmptyBlockTagError => "empty block tag",
            ErrorKind::UnknownFilterError => "unknown filter",
            ErrorKind::TemplateNotFound => "template not found",
            ErrorKind::RecursionLimit => "template nesting too deep",
            ErrorKind::UndefinedError => "variable or attribute undefined",
            ErrorKind::InvalidArguments => "invalid arguments",
            ErrorKind::BadSerialization => "could not serialize to internal format",
            ErrorKind::WriteFailure => "failed to write output",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref detail) = self.detail {
            write!(f, "{}: {}", self.kind, detail)?;
        } else {
            write!(f, "{}", self.kind)?;
        }
        if let Some(ref filename) = self.name {
            write!(f, " (in {}:{})", filename, self.lineno)?
        }
        Ok(())
    }
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        Error {
            kind,
            detail: Some(detail.into()),
            name: None,
            lineno: 0,
            source: None,
        }
    }

    pub(crate) fn new_not_found(name: &str) -> Error {
        Error::new(
            ErrorKind::TemplateNotFound,
            format!("template {name:?} does not exist"),
        )
    }

    /// Attaches the location unless one is already known.
    pub(crate) fn set_location(&mut self, filename: &str, lineno: usize) {
        if self.name.is_none() {
            self.name = Some(filename.into());
            self.lineno = lineno;
        }
    }

    pub(crate) fn with_location(mut self, filename: &str, lineno: usize) -> Error {
        self.set_location(filename, lineno);
        self
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error detail.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the filename.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the line.
    pub fn line(&self) -> Option<usize> {
        self.name.as_ref().map(|_| self.lineno)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            detail: None,
            name: None,
            lineno: 0,
            source: None,
        }
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::new(ErrorKind::WriteFailure, "formatting failed")
    }
}

impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        Error::new(ErrorKind::BadSerialization, msg.to_string())
    }
}
