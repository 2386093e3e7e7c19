use crate::Location;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Category of a compile-time failure.
///
/// All categories except [InternalError](DiagnosticKind::InternalError) are
/// recoverable: the compiler records the diagnostic and keeps checking the
/// remaining program so one run surfaces as many problems as possible.
pub enum DiagnosticKind {
    SyntaxError,
    UnresolvedId,
    AmbiguousOverload,
    TypeMismatch,
    InvalidCoercion,
    InvalidAttribute,
    GrammarAmbiguity,
    UnreachableAlternative,
    FixpointDivergence,
    InternalError,
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DiagnosticKind::SyntaxError => "syntax error",
            DiagnosticKind::UnresolvedId => "unresolved ID",
            DiagnosticKind::AmbiguousOverload => "ambiguous overload",
            DiagnosticKind::TypeMismatch => "type mismatch",
            DiagnosticKind::InvalidCoercion => "invalid coercion",
            DiagnosticKind::InvalidAttribute => "invalid attribute",
            DiagnosticKind::GrammarAmbiguity => "grammar ambiguity",
            DiagnosticKind::UnreachableAlternative => "unreachable alternative",
            DiagnosticKind::FixpointDivergence => "fixpoint divergence",
            DiagnosticKind::InternalError => "internal error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone)]
/// One recorded compile-time problem with its source location and optional
/// surrounding context (the declaration or item being processed).
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: Option<Location>,
    pub context: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: String, location: Option<Location>) -> Self {
        Self {
            kind,
            message,
            location,
            context: None,
        }
    }

    pub fn with_context(mut self, context: String) -> Self {
        self.context = Some(context);
        self
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "[{}] {}: {}", loc, self.kind, self.message)?,
            None => write!(f, "{}: {}", self.kind, self.message)?,
        }
        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
/// Accumulator for diagnostics produced across all compilation passes.
///
/// Passes keep running after recording errors; the driver checks
/// [has_errors](DiagnosticSink::has_errors) once a full pass is complete and
/// only then aborts the compilation.
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
        }
    }

    pub fn error(&mut self, kind: DiagnosticKind, message: String, location: Option<Location>) {
        self.report(Diagnostic::new(kind, message, location));
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.kind == DiagnosticKind::InternalError {
            panic!("{}", diagnostic);
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    pub fn contains(&self, kind: DiagnosticKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }
}

impl Display for DiagnosticSink {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for d in &self.diagnostics {
            writeln!(f, "{}", d)?;
        }
        Ok(())
    }
}

/// Abort on a programmer bug. Data-driven failures never take this path.
macro_rules! internal_error {
    ($($arg:tt)*) => {
        panic!("internal error: {}", format!($($arg)*))
    };
}

pub(crate) use internal_error;
