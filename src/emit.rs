//! Indentation-aware text emission into named output units.
//!
//! The [`Emitter`] keeps one pending line. [`Emitter::append`] adds to it,
//! [`Emitter::write`] adds and ends it, [`Emitter::blank_line`] emits an empty line. The
//! indentation of a line is the depth at which its first piece was appended.
//!
//! Indentation is only changed through [`Emitter::indented`], which returns a guard that
//! restores the previous depth when dropped, including on early `?` returns:
//!
//! ```
//! use ipcmsgc::emit::Emitter;
//! use ipcmsgc::emit;
//!
//! let mut out = Emitter::new("    ");
//! out.open_unit("demo.h");
//! emit!(out, "typedef enum {");
//! {
//!     let mut out = out.indented();
//!     emit!(out, "A = ", 0, ",");
//! }
//! emit!(out, "} demo;");
//! out.close_unit();
//! let units = out.finish().unwrap();
//! assert_eq!(units[0].text, "typedef enum {\n    A = 0,\n} demo;\n");
//! ```
//!
//! Misuse (writing with no unit open, opening two units at once) does not panic; the first
//! such error is kept and returned by [`Emitter::finish`].

use std::fmt;
use std::ops::{Deref, DerefMut};

/// A finished output artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("unit `{opened}` opened while `{open}` is still open")]
    AlreadyOpen { opened: String, open: String },
    #[error("no open unit")]
    NoOpenUnit,
    #[error("unit `{0}` was never closed")]
    Unclosed(String),
}

#[derive(Debug)]
pub struct Emitter {
    indent_unit: String,
    depth: usize,
    current: Option<Unit>,
    line: String,
    line_depth: Option<usize>,
    units: Vec<Unit>,
    error: Option<EmitError>,
}

impl Emitter {
    pub fn new(indent_unit: impl Into<String>) -> Self {
        Emitter {
            indent_unit: indent_unit.into(),
            depth: 0,
            current: None,
            line: String::new(),
            line_depth: None,
            units: Vec::new(),
            error: None,
        }
    }

    fn fail(&mut self, error: EmitError) {
        self.error.get_or_insert(error);
    }

    pub fn open_unit(&mut self, name: impl Into<String>) {
        let name = name.into();
        if let Some(open) = &self.current {
            let error = EmitError::AlreadyOpen {
                opened: name,
                open: open.name.clone(),
            };
            self.fail(error);
            return;
        }
        self.current = Some(Unit {
            name,
            text: String::new(),
        });
    }

    pub fn close_unit(&mut self) {
        if self.line_depth.is_some() {
            self.end_line();
        }
        match self.current.take() {
            Some(unit) => self.units.push(unit),
            None => self.fail(EmitError::NoOpenUnit),
        }
    }

    /// Add text to the current line without ending it.
    pub fn append(&mut self, text: impl fmt::Display) {
        if self.current.is_none() {
            self.fail(EmitError::NoOpenUnit);
            return;
        }
        self.line_depth.get_or_insert(self.depth);
        use fmt::Write as _;
        let _ = write!(self.line, "{}", text);
    }

    /// Add text to the current line and end it.
    pub fn write(&mut self, text: impl fmt::Display) {
        self.append(text);
        self.end_line();
    }

    /// Emit an empty line. A pending line is ended first.
    pub fn blank_line(&mut self) {
        if self.line_depth.is_some() {
            self.end_line();
        }
        if let Some(unit) = self.current.as_mut() {
            unit.text.push('\n');
        } else {
            self.fail(EmitError::NoOpenUnit);
        }
    }

    fn end_line(&mut self) {
        let depth = self.line_depth.take().unwrap_or(self.depth);
        let Some(unit) = self.current.as_mut() else {
            self.line.clear();
            return;
        };
        if !self.line.is_empty() {
            for _ in 0..depth {
                unit.text.push_str(&self.indent_unit);
            }
            unit.text.push_str(&self.line);
        }
        unit.text.push('\n');
        self.line.clear();
    }

    /// One more level of indentation until the returned guard is dropped.
    pub fn indented(&mut self) -> IndentGuard<'_> {
        let restore = self.depth;
        self.depth += 1;
        IndentGuard {
            emitter: self,
            restore,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Units closed so far, in order.
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn finish(self) -> Result<Vec<Unit>, EmitError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if let Some(open) = self.current {
            return Err(EmitError::Unclosed(open.name));
        }
        Ok(self.units)
    }
}

/// Scoped indentation level; dereferences to the [`Emitter`].
pub struct IndentGuard<'a> {
    emitter: &'a mut Emitter,
    restore: usize,
}

impl Deref for IndentGuard<'_> {
    type Target = Emitter;

    fn deref(&self) -> &Emitter {
        self.emitter
    }
}

impl DerefMut for IndentGuard<'_> {
    fn deref_mut(&mut self) -> &mut Emitter {
        self.emitter
    }
}

impl Drop for IndentGuard<'_> {
    fn drop(&mut self) {
        self.emitter.depth = self.restore;
    }
}

/// Concatenate the arguments and write them as one finished line.
#[macro_export]
macro_rules! emit {
    ($out:expr $(, $part:expr)* $(,)?) => {{
        let mut line = ::std::string::String::new();
        $( ::std::fmt::Write::write_fmt(&mut line, format_args!("{}", $part)).ok(); )*
        $out.write(line)
    }};
}

/// Concatenate the arguments onto the current line without ending it.
#[macro_export]
macro_rules! emit_part {
    ($out:expr $(, $part:expr)* $(,)?) => {{
        let mut part = ::std::string::String::new();
        $( ::std::fmt::Write::write_fmt(&mut part, format_args!("{}", $part)).ok(); )*
        $out.append(part)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_unit() -> Emitter {
        let mut e = Emitter::new("  ");
        e.open_unit("t");
        e
    }

    #[test]
    fn append_then_write_builds_one_line() {
        let mut e = with_unit();
        {
            let mut e = e.indented();
            emit_part!(e, "void f(", "int a");
            emit_part!(e, ", int b");
            emit!(e, ") {");
        }
        e.write("}");
        e.close_unit();
        assert_eq!(e.finish().unwrap()[0].text, "  void f(int a, int b) {\n}\n");
    }

    #[test]
    fn blank_line_ignores_indentation() {
        let mut e = with_unit();
        let mut inner = e.indented();
        inner.write("a");
        inner.blank_line();
        inner.write("b");
        drop(inner);
        e.close_unit();
        assert_eq!(e.finish().unwrap()[0].text, "  a\n\n  b\n");
    }

    #[test]
    fn guard_restores_on_error_path() {
        fn body(e: &mut Emitter) -> Result<(), &'static str> {
            let mut e = e.indented();
            let mut e = e.indented();
            e.write("deep");
            Err("bail")
        }
        let mut e = with_unit();
        assert!(body(&mut e).is_err());
        assert_eq!(e.depth(), 0);
        e.write("top");
        e.close_unit();
        assert_eq!(e.finish().unwrap()[0].text, "    deep\ntop\n");
    }

    #[test]
    fn numbers_are_coerced() {
        let mut e = with_unit();
        emit!(e, "X = ", -3, ", Y = ", 4usize);
        e.close_unit();
        assert_eq!(e.finish().unwrap()[0].text, "X = -3, Y = 4\n");
    }

    #[test]
    fn multiple_units() {
        let mut e = Emitter::new("\t");
        e.open_unit("a.h");
        e.write("a");
        e.close_unit();
        e.open_unit("a.c");
        e.write("b");
        e.close_unit();
        let units = e.finish().unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1], Unit { name: "a.c".into(), text: "b\n".into() });
    }

    #[test]
    fn misuse_is_reported_at_finish() {
        let mut e = Emitter::new(" ");
        e.write("orphan");
        assert_eq!(e.finish().unwrap_err(), EmitError::NoOpenUnit);

        let mut e = with_unit();
        e.open_unit("u");
        assert!(matches!(e.finish().unwrap_err(), EmitError::AlreadyOpen { .. }));

        let e = with_unit();
        assert_eq!(e.finish().unwrap_err(), EmitError::Unclosed("t".into()));
    }
}
