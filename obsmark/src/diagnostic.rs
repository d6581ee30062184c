use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic as Report, Label, Severity};

/// A finding about a marker in the source, with its byte span.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub span: Range<usize>,
    pub file_id: usize,
    pub severity: Severity,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn warning(message: impl Into<String>, span: Range<usize>, file_id: usize) -> Self {
        Diagnostic {
            message: message.into(),
            span,
            file_id,
            severity: Severity::Warning,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }

    /// Convert to a codespan-reporting diagnostic for display.
    pub fn to_report(&self) -> Report<usize> {
        Report::new(self.severity)
            .with_message(&self.message)
            .with_labels(vec![Label::primary(self.file_id, self.span.clone())])
            .with_notes(self.notes.clone())
    }
}
