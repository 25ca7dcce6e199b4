use super::{Error, ErrorKind};
use crate::region::Location;

/// How serious a [`Diagnostic`] is.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Severity {
    /// Compilation continues and the diagnostic is kept on the template.
    Warning,
    /// Compilation stops.
    Error,
}

/// A soft problem found while compiling a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    severity: Severity,
    message: String,
    location: Location,
}

impl Diagnostic {
    /// Create a new warning [`Diagnostic`].
    pub fn warning<T>(message: T, location: Location) -> Self
    where
        T: Into<String>,
    {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            location,
        }
    }

    /// Return the [`Severity`].
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Return the message text.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Return the [`Location`] of the offending tag.
    pub fn location(&self) -> &Location {
        &self.location
    }
}

/// Decides what happens to a [`Diagnostic`].
///
/// The default `Policy` keeps warnings on the compiled template. A strict
/// `Policy` turns every warning into a fatal error.
///
/// # Examples
///
/// ```
/// use ul4::{Engine, Policy};
///
/// let engine = Engine::default().with_policy(Policy::strict());
/// assert!(engine.compile("<?whitespace tidy?>").is_err());
///
/// let lenient = Engine::default();
/// let template = lenient.compile("<?whitespace tidy?>").unwrap();
/// assert_eq!(template.diagnostics().len(), 1);
/// ```
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct Policy {
    escalate: bool,
}

impl Policy {
    /// Create a [`Policy`] that escalates warnings to errors.
    pub fn strict() -> Self {
        Self { escalate: true }
    }

    /// Return true if warnings are escalated.
    pub fn is_strict(&self) -> bool {
        self.escalate
    }

    /// Return the effective [`Severity`] of the given [`Diagnostic`].
    pub fn severity(&self, diagnostic: &Diagnostic) -> Severity {
        if self.escalate {
            Severity::Error
        } else {
            diagnostic.severity
        }
    }

    /// Admit the [`Diagnostic`], returning it back when it is only a warning.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the `Diagnostic` is an error under this
    /// `Policy`.
    pub fn admit(&self, diagnostic: Diagnostic) -> Result<Diagnostic, Error> {
        match self.severity(&diagnostic) {
            Severity::Warning => Ok(diagnostic),
            Severity::Error => Err(Error::build(diagnostic.message)
                .with_kind(ErrorKind::Syntax)
                .with_help("warnings are treated as errors")
                .with_location(diagnostic.location)),
        }
    }
}
