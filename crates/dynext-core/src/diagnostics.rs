//! Collected registration and lifecycle messages.
//!
//! Failures are reported twice: once through `tracing`, and once into a
//! [`Diagnostics`] collector the host can inspect after a load or reload.

use std::collections::VecDeque;
use std::fmt;

/// A single message about an extension library.
///
/// # Examples
///
/// ```
/// use dynext_core::{Diagnostic, DiagnosticKind};
///
/// let diagnostic = Diagnostic::error("class 'Foo' already registered", Some("res://foo.so".into()));
/// assert_eq!(diagnostic.kind, DiagnosticKind::Error);
/// assert_eq!(diagnostic.to_string(), "res://foo.so: error: class 'Foo' already registered");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Path of the library the message is about, if any.
    pub library: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Error,
    Warning,
    Info,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, library: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            library,
        }
    }

    pub fn error(message: impl Into<String>, library: Option<String>) -> Self {
        Self::new(DiagnosticKind::Error, message, library)
    }

    pub fn warning(message: impl Into<String>, library: Option<String>) -> Self {
        Self::new(DiagnosticKind::Warning, message, library)
    }

    pub fn info(message: impl Into<String>, library: Option<String>) -> Self {
        Self::new(DiagnosticKind::Info, message, library)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind_str = match self.kind {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Info => "info",
        };

        match &self.library {
            Some(library) => write!(f, "{library}: {kind_str}: {}", self.message),
            None => write!(f, "{kind_str}: {}", self.message),
        }
    }
}

/// An ordered collection of [`Diagnostic`]s.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    diagnostics: VecDeque<Diagnostic>,
    has_errors: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        if diagnostic.kind == DiagnosticKind::Error {
            self.has_errors = true;
        }
        self.diagnostics.push_back(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Warning)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Messages about one library, in the order they were reported.
    pub fn for_library<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.diagnostics
            .iter()
            .filter(move |d| d.library.as_deref() == Some(path))
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.has_errors = false;
    }

    /// Remove and return every collected message.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        self.has_errors = false;
        self.diagnostics.drain(..).collect()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let mut diagnostics = Diagnostics::new();
        assert!(diagnostics.is_empty());
        diagnostics.add_diagnostic(Diagnostic::warning("w", None));
        assert!(!diagnostics.has_errors());
        diagnostics.add_diagnostic(Diagnostic::error("e", Some("a.so".into())));
        diagnostics.add_diagnostic(Diagnostic::info("i", None));

        assert!(diagnostics.has_errors());
        assert!(diagnostics.has_warnings());
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn filter_by_library() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_diagnostic(Diagnostic::error("a", Some("a.so".into())));
        diagnostics.add_diagnostic(Diagnostic::error("b", Some("b.so".into())));
        let messages: Vec<_> = diagnostics.for_library("b.so").map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["b"]);
    }

    #[test]
    fn drain_resets() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_diagnostic(Diagnostic::error("a", None));
        let drained = diagnostics.drain();
        assert_eq!(drained.len(), 1);
        assert!(diagnostics.is_empty());
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn display_format() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_diagnostic(Diagnostic::warning("shadowed", None));
        diagnostics.add_diagnostic(Diagnostic::error("boom", Some("x.so".into())));
        assert_eq!(diagnostics.to_string(), "warning: shadowed\nx.so: error: boom\n");
    }
}
