use vela_core::Location;

use crate::diagnostic::{Diagnostic, Severity};

use super::visitor::{Trace, TracingContext, VisitorContext};
use super::PassContext;

pub mod aa_dump;
pub mod dataflow;
pub mod definite_init;
pub mod inst_count;

/// Visitor context of diagnostic passes: collects diagnostics along with the IR path they were
/// raised at.
#[derive(Default)]
pub struct DiagnosticAgent<'a> {
    trace: Trace<'a>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> DiagnosticAgent<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_diagnostic(
        &mut self,
        severity: Severity,
        location: Option<Location>,
        message: impl Into<String>,
    ) {
        let diagnostic = Diagnostic::new(severity, location, message);
        log::trace!("{} at {}", diagnostic.severity, self.trace.path());
        self.diagnostics.push(diagnostic);
    }

    pub fn error(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.add_diagnostic(Severity::Error, location, message);
    }

    pub fn warning(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.add_diagnostic(Severity::Warning, location, message);
    }

    /// Hands the collected diagnostics to the session's engine, in the order they were raised.
    pub fn flush(self, ctx: &mut PassContext) {
        for diagnostic in self.diagnostics {
            ctx.diagnostics.emit(diagnostic);
        }
    }
}

impl<'a> TracingContext<'a> for DiagnosticAgent<'a> {
    fn push_context(&mut self, context: VisitorContext<'a>) {
        self.trace.push_context(context);
    }

    fn pop_context(&mut self) {
        self.trace.pop_context();
    }
}
