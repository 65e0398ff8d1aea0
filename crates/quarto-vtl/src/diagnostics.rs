/*
 * diagnostics.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Diagnostics collected while merging a template.
//!
//! Recoverable conditions never abort a merge. They are logged through
//! `tracing` and also recorded here so embedders can inspect what happened
//! during one particular merge.

use std::fmt;

use crate::ast::SourcePos;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Error,
    Warning,
}

/// A single diagnostic message with its template location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Short machine-readable code, e.g. `invalid-reference`.
    pub code: &'static str,
    pub message: String,
    pub template: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
        };
        write!(
            f,
            "{kind}[{}]: {} at {}[line {}, column {}]",
            self.code, self.message, self.template, self.line, self.column
        )
    }
}

/// Collector for diagnostic messages during a merge.
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    /// Create a new empty diagnostic collector.
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
        }
    }

    /// Add a diagnostic message.
    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Add an error with code and template location.
    pub fn error_at(
        &mut self,
        code: &'static str,
        message: impl Into<String>,
        template: &str,
        pos: SourcePos,
    ) {
        self.push(DiagnosticKind::Error, code, message.into(), template, pos);
    }

    /// Add a warning with code and template location.
    pub fn warn_at(
        &mut self,
        code: &'static str,
        message: impl Into<String>,
        template: &str,
        pos: SourcePos,
    ) {
        self.push(DiagnosticKind::Warning, code, message.into(), template, pos);
    }

    fn push(
        &mut self,
        kind: DiagnosticKind,
        code: &'static str,
        message: String,
        template: &str,
        pos: SourcePos,
    ) {
        self.add(Diagnostic {
            kind,
            code,
            message,
            template: template.to_string(),
            line: pos.line,
            column: pos.column,
        });
    }

    /// Check if any errors were collected (warnings don't count).
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Error)
    }

    /// Get a reference to the collected diagnostics.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Check whether a diagnostic with the given code was collected.
    pub fn contains_code(&self, code: &str) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }

    /// Consume the collector, returning diagnostics in source order.
    pub fn into_diagnostics(mut self) -> Vec<Diagnostic> {
        self.diagnostics
            .sort_by(|a, b| (&a.template, a.line, a.column).cmp(&(&b.template, b.line, b.column)));
        self.diagnostics
    }

    /// Check if the collector is empty.
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_and_sort() {
        let mut diags = DiagnosticCollector::new();
        diags.warn_at("b", "second", "t.vm", SourcePos::new(3, 1));
        diags.error_at("a", "first", "t.vm", SourcePos::new(1, 5));
        assert!(diags.has_errors());
        assert!(diags.contains_code("b"));

        let sorted = diags.into_diagnostics();
        assert_eq!(sorted[0].message, "first");
        assert_eq!(sorted[1].kind, DiagnosticKind::Warning);
    }

    #[test]
    fn test_display() {
        let diag = Diagnostic {
            kind: DiagnosticKind::Warning,
            code: "invalid-reference",
            message: "$foo is null".to_string(),
            template: "page.vm".to_string(),
            line: 2,
            column: 7,
        };
        assert_eq!(
            diag.to_string(),
            "warning[invalid-reference]: $foo is null at page.vm[line 2, column 7]"
        );
    }
}
