use crate::span::Span;

/// A compiler diagnostic (error or warning).
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Which failure class this is. Warnings carry no kind.
    pub kind: Option<ErrorKind>,
    pub message: String,
    /// Codegen-stage diagnostics have no span: the AST is positionless.
    pub span: Option<Span>,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Every fatal failure class the pipeline can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    UnresolvedSymbol,
    DuplicateDefinition,
    UnknownType,
    ArityMismatch,
    UnknownCallee,
    UnsupportedOperator,
    Verifier,
    Toolchain,
}

impl Diagnostic {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind: Some(kind),
            message: message.into(),
            span: None,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind: None,
            message: message.into(),
            span: None,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };

        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };

        let offset = self.span.map(|s| s.start as usize).unwrap_or(0);
        let mut report = Report::build(kind, filename, offset).with_message(&self.message);

        if let Some(span) = self.span {
            report = report.with_label(
                Label::new((filename, span.start as usize..span.end as usize))
                    .with_message(&self.message)
                    .with_color(color),
            );
        }

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        report
            .finish()
            .eprint((filename, Source::from(source)))
            .ok();
    }
}

/// Render a list of diagnostics.
pub fn render_diagnostics(diagnostics: &[Diagnostic], filename: &str, source: &str) {
    for diag in diagnostics {
        diag.render(filename, source);
    }
}

/// True if any diagnostic in the list is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(Diagnostic::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let d = Diagnostic::error(ErrorKind::UnknownType, "unknown type: 'i33'")
            .with_span(Span::new(10, 13));
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.kind, Some(ErrorKind::UnknownType));
        assert_eq!(d.message, "unknown type: 'i33'");
        assert_eq!(d.span, Some(Span::new(10, 13)));
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_warning_has_no_kind() {
        let d = Diagnostic::warning("variable 'a' shadows an existing binding");
        assert_eq!(d.severity, Severity::Warning);
        assert!(d.kind.is_none());
        assert!(!d.is_error());
    }

    #[test]
    fn test_chained_builders() {
        let d = Diagnostic::error(ErrorKind::UnresolvedSymbol, "could not find symbol: 'x'")
            .with_note("symbol table is empty")
            .with_help("declare the variable before using it");
        assert_eq!(d.notes.len(), 1);
        assert!(d.help.is_some());
    }

    #[test]
    fn test_has_errors() {
        let diags = vec![
            Diagnostic::warning("w"),
            Diagnostic::error(ErrorKind::Parse, "e"),
        ];
        assert!(has_errors(&diags));
        assert!(!has_errors(&diags[..1]));
    }

    #[test]
    fn test_render_does_not_panic() {
        let source = "i32 main() {\n  return x;\n}\n";
        let d = Diagnostic::error(ErrorKind::UnresolvedSymbol, "could not find symbol: 'x'")
            .with_span(Span::new(22, 23))
            .with_note("symbol table is empty");
        d.render("test.mklr", source);
    }

    #[test]
    fn test_render_spanless_does_not_panic() {
        let d = Diagnostic::error(ErrorKind::Verifier, "block 'main' has no terminator");
        d.render("test.mklr", "i32 main() { }");
    }
}
