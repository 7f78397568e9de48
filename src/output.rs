use std::{fmt, io};

use crate::error::{Error, ErrorKind};

/// An abstraction over [`fmt::Write`](std::fmt::Write) for the rendering.
///
/// This is a utility type used in the engine which can be written into like one
/// can write into an [`std::fmt::Write`] value.  Nodes render into it.  It
/// keeps a stack of capture buffers so that tags like `filter`, `spaceless`
/// or `block.super` can render a node list into a string.
pub struct Output<'a> {
    w: &'a mut (dyn fmt::Write + 'a),
    capture_stack: Vec<String>,
}

impl<'a> Output<'a> {
    /// Creates a new output.
    pub(crate) fn new(w: &'a mut (dyn fmt::Write + 'a)) -> Self {
        Self {
            w,
            capture_stack: Vec::new(),
        }
    }

    /// Begins capturing into a string.
    pub(crate) fn begin_capture(&mut self) {
        self.capture_stack.push(String::new());
    }

    /// Ends capturing and returns the captured string.
    pub(crate) fn end_capture(&mut self) -> String {
        self.capture_stack.pop().unwrap_or_default()
    }

    /// Runs `f` with capturing enabled and returns what it wrote.
    ///
    /// The capture is ended even if `f` fails.
    pub(crate) fn capture<F>(&mut self, f: F) -> Result<String, Error>
    where
        F: FnOnce(&mut Output<'a>) -> Result<(), Error>,
    {
        self.begin_capture();
        let rv = f(self);
        let captured = self.end_capture();
        rv.map(|_| captured)
    }

    #[inline(always)]
    fn target(&mut self) -> &mut dyn fmt::Write {
        match self.capture_stack.last_mut() {
            Some(buf) => buf as &mut dyn fmt::Write,
            None => &mut *self.w,
        }
    }

    /// Writes some data to the underlying buffer contained within this output.
    #[inline]
    pub fn write_str(&mut self, s: &str) -> fmt::Result {
        self.target().write_str(s)
    }

    /// Writes some formatted information into this instance.
    #[inline]
    pub fn write_fmt(&mut self, a: fmt::Arguments<'_>) -> fmt::Result {
        self.target().write_fmt(a)
    }
}

impl fmt::Write for Output<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        fmt::Write::write_str(self.target(), s)
    }

    #[inline]
    fn write_char(&mut self, c: char) -> fmt::Result {
        fmt::Write::write_char(self.target(), c)
    }

    #[inline]
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        fmt::Write::write_fmt(self.target(), args)
    }
}

pub struct WriteWrapper<W> {
    pub w: W,
    pub err: Option<io::Error>,
}

impl<W> WriteWrapper<W> {
    /// Replaces the given error with the held error if available.
    pub fn take_err(&mut self, original: Error) -> Error {
        self.err
            .take()
            .map(|io_err| {
                Error::new(ErrorKind::WriteFailure, "I/O error during rendering")
                    .with_source(io_err)
            })
            .unwrap_or(original)
    }
}

impl<W: io::Write> fmt::Write for WriteWrapper<W> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.w.write_all(s.as_bytes()).map_err(|e| {
            self.err = Some(e);
            fmt::Error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_nested_capture() {
        let mut buf = String::new();
        let mut out = Output::new(&mut buf);
        out.write_str("a").unwrap();
        let captured = out
            .capture(|out| {
                out.write_str("b").unwrap();
                let inner = out.capture(|out| out.write_str("c").map_err(Error::from))?;
                assert_eq!(inner, "c");
                out.write_str("d").map_err(Error::from)
            })
            .unwrap();
        out.write_str("e").unwrap();
        assert_eq!(captured, "bd");
        drop(out);
        assert_eq!(buf, "ae");
    }
}
