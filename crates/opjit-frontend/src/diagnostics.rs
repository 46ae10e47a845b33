//! Diagnostics produced while compiling one unit.

use std::fmt;
use std::path::{Path, PathBuf};

use opjit_core::DiagnosticsFlag;
use tracing::{info, warn};

use crate::lexer::{LineIndex, Location, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Note => write!(f, "note"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// One message about the unit, optionally pinned to a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: Option<PathBuf>,
    pub location: Option<Location>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            file: None,
            location: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn note(message: impl Into<String>) -> Self {
        Self::new(Severity::Note, message)
    }

    pub fn in_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// `file:line:col: error: message`, dropping whatever parts are unknown.
impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:", file.display())?;
            if let Some(location) = &self.location {
                write!(f, "{location}:")?;
            }
            write!(f, " ")?;
        }
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// Collects diagnostics for one compiler instance and echoes them to the log.
///
/// Errors are always logged; notes and warnings only in verbose mode.
#[derive(Debug)]
pub struct DiagnosticsEngine {
    verbose: DiagnosticsFlag,
    file: Option<PathBuf>,
    lines: Option<LineIndex>,
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticsEngine {
    pub fn new(verbose: DiagnosticsFlag) -> Self {
        Self {
            verbose,
            file: None,
            lines: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbose.enabled()
    }

    /// Sets the unit later spans refer to.
    pub fn set_source(&mut self, file: &Path, text: &str) {
        self.file = Some(file.to_path_buf());
        self.lines = Some(LineIndex::new(text));
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_error() {
            warn!(event = "diagnostic", "{diagnostic}");
        } else if self.verbose() {
            info!(event = "diagnostic", "{diagnostic}");
        }
        self.diagnostics.push(diagnostic);
    }

    /// Reports an error at `span` in the current unit.
    pub fn error_at(&mut self, span: Span, message: impl Into<String>) {
        let mut diagnostic = Diagnostic::error(message);
        if let Some(file) = &self.file {
            diagnostic = diagnostic.in_file(file.clone());
        }
        if let Some(lines) = &self.lines {
            diagnostic = diagnostic.at(lines.location(span.start));
        }
        self.report(diagnostic);
    }

    /// Reports a note only when verbose mode is on.
    pub fn note(&mut self, message: impl Into<String>) {
        if self.verbose() {
            self.report(Diagnostic::note(message));
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}
