//! Diagnostics collected during conversion
//!
//! Nothing in the lowering is fatal. Every construct that had to be dropped,
//! truncated or ignored leaves a diagnostic here explaining the elision.

use serde::{Deserialize, Serialize};

use crate::models::Rational;

/// Severity level for diagnostics
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Info,
}

/// What kind of problem was found
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Explicit barline inside a note
    BarlineConflict,
    /// More alternative endings than repeat iterations
    ExcessEndings,
    /// `[` without `]` or the reverse
    DanglingBeam,
    /// Slur left open at the end of a voice, or closed without opening
    DanglingSlur,
    /// Node kind, command, context or property without a handler
    NotImplemented,
    /// Nothing was produced at all
    EmptyScore,
    /// A part without a single note or rest
    EmptyPart,
    /// Lyrics whose voice never appeared, or with more syllables than notes
    UnmatchedLyrics,
}

/// A single diagnostic.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub kind: DiagnosticKind,
    /// Human-readable message
    pub message: String,
    /// Absolute musical time the problem was found at, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Rational>,
}

impl Diagnostic {
    pub fn new(severity: DiagnosticSeverity, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            position: None,
        }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, kind, message)
    }

    pub fn at(mut self, position: Rational) -> Self {
        self.position = Some(position);
        self
    }
}

/// Ordered collection of diagnostics.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Diagnostics {
    pub entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Record a diagnostic and forward it to the log.
    pub fn add(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            DiagnosticSeverity::Error | DiagnosticSeverity::Warning => {
                log::warn!("{:?}: {}", diagnostic.kind, diagnostic.message)
            }
            DiagnosticSeverity::Info => log::info!("{:?}: {}", diagnostic.kind, diagnostic.message),
        }
        self.entries.push(diagnostic);
    }

    pub fn warn(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.add(Diagnostic::warning(kind, message));
    }

    /// "not implemented" for an unhandled construct, reported once per name.
    pub fn not_implemented(&mut self, what: &str) {
        let message = format!("{} is not implemented", what);
        let seen = self
            .entries
            .iter()
            .any(|d| d.kind == DiagnosticKind::NotImplemented && d.message == message);
        if !seen {
            self.warn(DiagnosticKind::NotImplemented, message);
        }
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_implemented_reported_once() {
        let mut diags = Diagnostics::new();
        diags.not_implemented("\\markup");
        diags.not_implemented("\\markup");
        diags.not_implemented("FiguredBass context");
        assert_eq!(diags.count(DiagnosticKind::NotImplemented), 2);
    }

    #[test]
    fn test_position() {
        let d = Diagnostic::warning(DiagnosticKind::BarlineConflict, "x").at(Rational::new(1, 4));
        assert_eq!(d.position, Some(Rational::new(1, 4)));
        assert_eq!(d.severity, DiagnosticSeverity::Warning);
    }
}
