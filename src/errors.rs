//! Ivy's structured error model.
//!
//! Every primitive that can fail reports a [`Span`]-carrying [`IvyError`] in
//! one of the seven kinds from the error handling design: Parse, Name, Type,
//! Shape, Domain, Resource, Io. The REPL catches at the top level and prints
//! a `file:line:` prefixed message via `miette`.

use miette::Diagnostic;
use thiserror::Error;

/// A source position: the line on which the offending token started.
/// Ivy reports by line, not byte offset — every AST node and token carries
/// one so the REPL can prefix `file:line:` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub col: u32,
}

impl Span {
    pub fn new(line: u32, col: u32) -> Self {
        Span { line, col }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Error, Diagnostic, Clone)]
pub enum IvyError {
    #[error("parse error at {span}: {message}")]
    Parse { message: String, span: Span },

    #[error("name error at {span}: {message}")]
    Name { message: String, span: Span },

    #[error("type error at {span}: {message}")]
    Type { message: String, span: Span },

    #[error("shape error at {span}: {message}")]
    Shape { message: String, span: Span },

    #[error("domain error at {span}: {message}")]
    Domain { message: String, span: Span },

    #[error("resource error at {span}: {message}")]
    Resource { message: String, span: Span },

    #[error("I/O error: {message}")]
    Io { message: String },

    /// Raised by a top-level interrupt (SIGINT-equivalent); unwinds the
    /// current evaluation and returns control to the REPL.
    #[error("interrupted")]
    Interrupted,
}

impl IvyError {
    pub fn parse(message: impl Into<String>, span: Span) -> Self {
        IvyError::Parse { message: message.into(), span }
    }

    pub fn name(message: impl Into<String>, span: Span) -> Self {
        IvyError::Name { message: message.into(), span }
    }

    pub fn type_err(message: impl Into<String>, span: Span) -> Self {
        IvyError::Type { message: message.into(), span }
    }

    pub fn shape(message: impl Into<String>, span: Span) -> Self {
        IvyError::Shape { message: message.into(), span }
    }

    pub fn domain(message: impl Into<String>, span: Span) -> Self {
        IvyError::Domain { message: message.into(), span }
    }

    pub fn resource(message: impl Into<String>, span: Span) -> Self {
        IvyError::Resource { message: message.into(), span }
    }

    pub fn io(message: impl Into<String>) -> Self {
        IvyError::Io { message: message.into() }
    }

    /// The span of the error, if it carries one (I/O and interrupt do not).
    pub fn span(&self) -> Option<Span> {
        match self {
            IvyError::Parse { span, .. }
            | IvyError::Name { span, .. }
            | IvyError::Type { span, .. }
            | IvyError::Shape { span, .. }
            | IvyError::Domain { span, .. }
            | IvyError::Resource { span, .. } => Some(*span),
            IvyError::Io { .. } | IvyError::Interrupted => None,
        }
    }
}

pub type IvyResult<T> = Result<T, IvyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_displays_line_col() {
        let s = Span::new(3, 7);
        assert_eq!(s.to_string(), "3:7");
    }

    #[test]
    fn error_carries_span() {
        let e = IvyError::domain("division by zero", Span::new(1, 1));
        assert_eq!(e.span(), Some(Span::new(1, 1)));
    }

    #[test]
    fn io_error_has_no_span() {
        let e = IvyError::io("cannot open file");
        assert_eq!(e.span(), None);
    }
}
