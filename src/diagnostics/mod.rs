//! Structured diagnostics shared by every compiler pass.
//!
//! A [`Diagnostic`] is a severity, a stable error code, a message, a primary
//! span and optional related labels / suggested replacements. Passes never
//! print anything themselves; they push diagnostics into the session's
//! [`DiagnosticSink`] and the driver renders them at the end, either as
//! colored text ([`render`]) or as JSON ([`json`]).

mod json;
mod render;

pub use json::render_json;
pub use render::render_text;

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::source::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Hint,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Hint => "hint",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A secondary span with a short explanation, rendered below the primary
/// excerpt ("note: first borrow occurs here").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

/// A machine-applicable replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub span: Span,
    pub replacement: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: String,
    pub message: String,
    pub primary: Span,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<Suggestion>,
    /// Stable ID of the item the diagnostic belongs to, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        code: impl Into<String>,
        message: impl Into<String>,
        primary: Span,
    ) -> Self {
        Diagnostic {
            severity,
            code: code.into(),
            message: message.into(),
            primary,
            labels: vec![],
            suggestions: vec![],
            stable_id: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>, primary: Span) -> Self {
        Diagnostic::new(Severity::Error, code, message, primary)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>, primary: Span) -> Self {
        Diagnostic::new(Severity::Warning, code, message, primary)
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label {
            span,
            message: message.into(),
        });
        self
    }

    pub fn with_suggestion(
        mut self,
        span: Span,
        replacement: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.suggestions.push(Suggestion {
            span,
            replacement: replacement.into(),
            message: message.into(),
        });
        self
    }

    pub fn with_stable_id(mut self, id: impl Into<String>) -> Self {
        self.stable_id = Some(id.into());
        self
    }
}

/// Append-only collector owned by the `Session`. Passes hold `&Session`
/// and still get to record diagnostics through the interior `RefCell`.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    entries: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        self.entries.borrow_mut().push(diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Snapshot of everything recorded so far, in emission order.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FileId, Span};

    #[test]
    fn test_sink_counts_only_errors() {
        let sink = DiagnosticSink::new();
        sink.emit(Diagnostic::warning("W0001", "unused variable", Span::default()));
        sink.emit(Diagnostic::error("E0001", "type mismatch", Span::default()));
        sink.emit(Diagnostic::error("E0002", "unknown name", Span::default()));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.error_count(), 2);
        assert!(sink.has_errors());
    }

    #[test]
    fn test_builder_attaches_labels_and_suggestions() {
        let primary = Span::new(FileId(0), 10, 12);
        let related = Span::new(FileId(0), 2, 4);
        let diagnostic = Diagnostic::error("E-BORROW-EXCLUSIVE-ALIASED", "aliasing", primary)
            .with_label(related, "first borrow occurs here")
            .with_suggestion(primary, "v.clone()", "clone the value instead")
            .with_stable_id("@a1b2c3d4");

        assert_eq!(diagnostic.labels.len(), 1);
        assert_eq!(diagnostic.suggestions[0].replacement, "v.clone()");
        assert_eq!(diagnostic.stable_id.as_deref(), Some("@a1b2c3d4"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Info > Severity::Hint);
    }
}
