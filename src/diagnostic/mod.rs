pub mod ansi;
pub mod json;
pub mod registry;

use crate::ast::Span;
use crate::vm::{ErrorKind, VmError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic { severity: Severity::Warning, ..Diagnostic::error(message) }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: true });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl From<&crate::lexer::LexError> for Diagnostic {
    fn from(e: &crate::lexer::LexError) -> Self {
        let span = Span::new(e.position, e.position + e.snippet.len().max(1));
        let mut d = Diagnostic::error(format!("unexpected input '{}'", e.snippet))
            .with_code("HVM-L001")
            .with_span(span, "here");
        if !e.suggestion.is_empty() {
            d = d.with_suggestion(e.suggestion.clone());
        }
        d
    }
}

impl From<&crate::parser::ParseError> for Diagnostic {
    fn from(e: &crate::parser::ParseError) -> Self {
        let mut d = Diagnostic::error(&e.message).with_code(e.code).with_span(e.span, "here");
        if let Some(hint) = &e.hint {
            d = d.with_suggestion(hint.clone());
        }
        d
    }
}

impl From<&crate::parser::AssembleError> for Diagnostic {
    fn from(e: &crate::parser::AssembleError) -> Self {
        match e {
            crate::parser::AssembleError::Lex(e) => Diagnostic::from(e),
            crate::parser::AssembleError::Parse(e) => Diagnostic::from(e),
        }
    }
}

impl From<&crate::verify::VerifyError> for Diagnostic {
    fn from(e: &crate::verify::VerifyError) -> Self {
        let mut d = Diagnostic::error(&e.message)
            .with_code(e.code)
            .with_note(format!("in function '{}'", e.function));
        if !e.span.is_unknown() {
            d = d.with_span(e.span, "here");
        }
        if let Some(hint) = &e.hint {
            d = d.with_suggestion(hint.clone());
        }
        d
    }
}

/// Runtime code for each error kind.
pub fn runtime_code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Internal => "HVM-R001",
        ErrorKind::InvalidArgument => "HVM-R002",
        ErrorKind::Unimplemented => "HVM-R003",
        ErrorKind::Failure => "HVM-R004",
    }
}

impl From<&VmError> for Diagnostic {
    fn from(e: &VmError) -> Self {
        let d = Diagnostic::error(e.to_string()).with_code(runtime_code(e.kind()));
        match e.span() {
            Some(span) if !span.is_unknown() => d.with_span(span, "failed here"),
            _ => d,
        }
    }
}
