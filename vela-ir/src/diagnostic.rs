use std::cell::RefCell;
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::rc::Rc;

use vela_core::Location;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    pub fn name(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            "note" => Some(Severity::Note),
            _ => None,
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Option<Location>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, location: Option<Location>, message: impl Into<String>) -> Self {
        Self {
            severity,
            location,
            message: message.into(),
        }
    }
}

#[cfg(feature = "colorful-diagnostic")]
macro_rules! ansi {
    ($color:ident, $x:expr) => {
        ::nu_ansi_term::Color::$color.paint($x)
    };
}

#[cfg(not(feature = "colorful-diagnostic"))]
macro_rules! ansi {
    ($color:ident, $x:expr) => {
        $x
    };
}

/// Renders `file:L:C: [severity] message`.
pub fn fmt_diagnostic<W: std::fmt::Write>(
    f: &mut W,
    file: &str,
    diagnostic: &Diagnostic,
) -> std::fmt::Result {
    match diagnostic.location {
        Some(loc) => write!(f, "{file}:{loc}: ")?,
        None => write!(f, "{file}: ")?,
    }
    match diagnostic.severity {
        Severity::Note => write!(f, "{} ", ansi!(Green, "[note]"))?,
        Severity::Warning => write!(f, "{} ", ansi!(Yellow, "[warning]"))?,
        Severity::Error => write!(f, "{} ", ansi!(Red, "[error]"))?,
    }
    write!(f, "{}", diagnostic.message)
}

/// Receives every diagnostic emitted through a [`DiagnosticEngine`].
pub trait DiagnosticConsumer {
    fn handle(&mut self, diagnostic: &Diagnostic);
}

/// Writes diagnostics to stderr as they arrive.
pub struct PrintingConsumer {
    file: String,
}

impl PrintingConsumer {
    pub fn new(file: impl Into<String>) -> Self {
        Self { file: file.into() }
    }
}

impl DiagnosticConsumer for PrintingConsumer {
    fn handle(&mut self, diagnostic: &Diagnostic) {
        let mut line = String::new();
        if fmt_diagnostic(&mut line, &self.file, diagnostic).is_ok() {
            let _ = writeln!(std::io::stderr(), "{line}");
        }
    }
}

/// Shared view of the diagnostics collected by a [`BufferingConsumer`].
#[derive(Clone, Default)]
pub struct DiagnosticBuffer(Rc<RefCell<Vec<Diagnostic>>>);

impl DiagnosticBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.0.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Holds diagnostics back instead of printing them.
pub struct BufferingConsumer {
    buffer: DiagnosticBuffer,
}

impl BufferingConsumer {
    pub fn new(buffer: DiagnosticBuffer) -> Self {
        Self { buffer }
    }
}

impl DiagnosticConsumer for BufferingConsumer {
    fn handle(&mut self, diagnostic: &Diagnostic) {
        self.buffer.0.borrow_mut().push(diagnostic.clone());
    }
}

pub struct DiagnosticEngine {
    consumer: Box<dyn DiagnosticConsumer>,
    error_count: usize,
}

impl DiagnosticEngine {
    pub fn new(consumer: Box<dyn DiagnosticConsumer>) -> Self {
        Self {
            consumer,
            error_count: 0,
        }
    }

    pub fn emit(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            self.error_count += 1;
        }
        log::trace!("diagnostic: {:?}", diagnostic);
        self.consumer.handle(&diagnostic);
    }

    pub fn error(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.emit(Diagnostic::new(Severity::Error, location, message));
    }

    pub fn warning(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.emit(Diagnostic::new(Severity::Warning, location, message));
    }

    pub fn note(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.emit(Diagnostic::new(Severity::Note, location, message));
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn had_error(&self) -> bool {
        self.error_count > 0
    }

    pub fn set_consumer(&mut self, consumer: Box<dyn DiagnosticConsumer>) {
        self.consumer = consumer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffering_engine_counts_errors() {
        let buffer = DiagnosticBuffer::new();
        let mut engine = DiagnosticEngine::new(Box::new(BufferingConsumer::new(buffer.clone())));
        engine.warning(None, "careful");
        assert!(!engine.had_error());
        engine.error(Some(Location::new(3, 1)), "broken");
        engine.note(None, "see here");
        assert_eq!(engine.error_count(), 1);
        assert_eq!(buffer.len(), 3);
        let collected = buffer.take();
        assert_eq!(collected[1].severity, Severity::Error);
        assert_eq!(collected[1].location, Some(Location::new(3, 1)));
        assert!(buffer.is_empty());
    }

    #[cfg(not(feature = "colorful-diagnostic"))]
    #[test]
    fn test_plain_rendering() {
        let mut out = String::new();
        let diagnostic = Diagnostic::new(Severity::Warning, Some(Location::new(4, 2)), "odd");
        fmt_diagnostic(&mut out, "main.vir", &diagnostic).unwrap();
        assert_eq!(out, "main.vir:4:2: [warning] odd");
    }
}
