use crate::span::Span;

/// A compiler error tied to a source location. Every diagnostic is fatal:
/// compilation of the file stops at the first one.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(message: String, span: Span) -> Self {
        Self {
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::{Color, Label, Report, ReportKind, Source};

        let mut report = Report::build(ReportKind::Error, filename, self.span.start as usize)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, self.span.start as usize..self.span.end as usize))
                    .with_message(&self.message)
                    .with_color(Color::Red),
            );

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        report
            .finish()
            .eprint((filename, Source::from(source)))
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let span = Span::new(10, 15);
        let d = Diagnostic::error("expected ';'".to_string(), span);
        assert_eq!(d.message, "expected ';'");
        assert_eq!(d.span.start, 10);
        assert_eq!(d.span.end, 15);
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_with_note_and_help() {
        let d = Diagnostic::error("undeclared variable 'x'".to_string(), Span::dummy())
            .with_note("in class 'Main'".to_string())
            .with_help("declare it with 'var int x;'".to_string());
        assert_eq!(d.notes.len(), 1);
        assert_eq!(d.help.as_deref(), Some("declare it with 'var int x;'"));
    }

    #[test]
    fn test_render_does_not_panic() {
        let source = "class Main {\n    function void main() {\n}\n";
        let d = Diagnostic::error("expected '}'".to_string(), Span::new(38, 39))
            .with_help("every '{' needs a matching '}'".to_string());
        d.render("Main.jack", source);
    }
}
