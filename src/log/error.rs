use super::{Pointer, RED, RESET};
use crate::{log::Visual, region::Location, region::Region};
use std::fmt::{Debug, Display, Formatter, Result};

/// The category of an [`Error`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorKind {
    /// Malformed template source, reported while compiling.
    Syntax,
    /// A required parameter received no value.
    MissingArgument,
    /// More positional arguments than parameters, with no catch-all.
    TooManyArguments,
    /// The same parameter was bound twice.
    DuplicateArgument,
    /// A keyword argument names no parameter, with no catch-all.
    UnsupportedArgument,
    /// An operation was applied to a value of the wrong type.
    Type,
    /// Division or modulo by zero.
    ZeroDivision,
    /// An index outside of a sequence.
    IndexOutOfRange,
    /// Two values without an ordering were compared.
    Unorderable,
    /// An undefined value was used where a real value is needed.
    Undefined,
    /// A value of the right type with an unusable content.
    Value,
    /// Template calls nested deeper than the configured limit.
    Recursion,
    /// The host asked for rendering to stop.
    Cancelled,
    /// Writing output failed.
    Write,
    /// Object serialization failed.
    Codec,
    /// Raised by host code, such as a native function.
    Other,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let name = match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::MissingArgument => "missing argument",
            ErrorKind::TooManyArguments => "too many arguments",
            ErrorKind::DuplicateArgument => "duplicate argument",
            ErrorKind::UnsupportedArgument => "unsupported argument",
            ErrorKind::Type => "type error",
            ErrorKind::ZeroDivision => "zero division",
            ErrorKind::IndexOutOfRange => "index out of range",
            ErrorKind::Unorderable => "unorderable types",
            ErrorKind::Undefined => "undefined value",
            ErrorKind::Value => "value error",
            ErrorKind::Recursion => "recursion limit",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Write => "write failure",
            ErrorKind::Codec => "codec error",
            ErrorKind::Other => "error",
        };

        write!(f, "{name}")
    }
}

/// A failure raised while compiling, rendering or decoding.
///
/// Errors raised while rendering carry the [`Location`] of the tag that
/// failed. When an error leaves a nested template call, it is wrapped in a
/// new `Error` pointing at the call site, and the original becomes its
/// context. [`Error::chain`] walks from the outermost call site down to the
/// original failure.
///
/// # Examples
///
/// An [`Error`] that underlines the offending token:
///
/// ```
/// use ul4::{Error, ErrorKind, Region};
///
/// let error = Error::build("unexpected token")
///     .with_kind(ErrorKind::Syntax)
///     .with_pointer("<?print 1 +?>", Region::new(10..11))
///     .with_name("page")
///     .with_help("expected an expression after `+`");
///
/// assert_eq!(error.kind(), ErrorKind::Syntax);
/// ```
///
/// The alternate form, `{:#}`, prints:
///
/// ```text
/// error: unexpected token
///  --> page:1:11
///   |
/// 1 | <?print 1 +?>
///   |           ^
///   = help: expected an expression after `+`
/// ```
pub struct Error {
    /// The category of the [`Error`].
    kind: ErrorKind,
    /// Short summary of what went wrong.
    reason: String,
    /// Picture of the offending source.
    visual: Option<Box<dyn Visual>>,
    /// Hint shown under the picture.
    help: Option<String>,
    /// Name of the template the source belongs to.
    name: Option<String>,
    /// The tag that was executing when the [`Error`] was raised.
    location: Option<Location>,
    /// The [`Error`] this one wraps, raised inside a nested call.
    context: Option<Box<Error>>,
}

impl Error {
    /// Start an [`Error`] of kind [`ErrorKind::Other`] with the given reason.
    pub fn build<T>(reason: T) -> Self
    where
        T: Into<String>,
    {
        Error {
            kind: ErrorKind::Other,
            reason: reason.into(),
            visual: None,
            help: None,
            name: None,
            location: None,
            context: None,
        }
    }

    /// Set the [`ErrorKind`].
    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;

        self
    }

    /// Replace the reason.
    pub fn with_reason<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.reason = text.into();

        self
    }

    /// Name the [`Template`][`crate::Template`] that failed.
    pub fn with_name<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.name = Some(text.into());

        self
    }

    /// Attach any [`Visual`].
    pub fn with_visual(mut self, visual: impl Visual + 'static) -> Self {
        self.visual = Some(Box::new(visual));

        self
    }

    /// Attach a [`Pointer`] underlining the [`Region`] of the source.
    pub fn with_pointer<T>(mut self, source: &str, region: T) -> Self
    where
        T: Into<Region>,
    {
        self.visual = Some(Box::new(Pointer::new(source, region.into())));

        self
    }

    /// Attach a hint.
    pub fn with_help<T>(mut self, text: T) -> Self
    where
        T: Into<String>,
    {
        self.help = Some(text.into());

        self
    }

    /// Set the [`Location`], replacing any visual with a [`Pointer`] at that
    /// location.
    pub fn with_location(mut self, location: Location) -> Self {
        self.visual = Some(Box::new(Pointer::at(&location)));
        if let Some(name) = location.name() {
            self.name = Some(name.to_string());
        }
        self.location = Some(location);

        self
    }

    /// Attach the given [`Location`].
    ///
    /// An `Error` without a location simply receives it. An `Error` that
    /// already has one was raised inside a nested call, so it becomes the
    /// context of a new `Error` located at the call site.
    pub fn located(self, location: &Location) -> Self {
        if self.location.is_none() {
            return self.with_location(location.clone());
        }

        Error::build(self.reason.clone())
            .with_kind(self.kind)
            .with_location(location.clone())
            .with_context(self)
    }

    /// Set the context, which is the [`Error`] that caused this one.
    pub fn with_context(mut self, context: Error) -> Self {
        self.context = Some(Box::new(context));

        self
    }

    /// Return the [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Return the reason text.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Return the help text, if any.
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// Return the template name, if known.
    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the [`Location`] of the failing tag, if known.
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// Return the wrapped [`Error`] raised inside a nested call, if any.
    pub fn context(&self) -> Option<&Error> {
        self.context.as_deref()
    }

    /// Return an iterator over this [`Error`] and every context below it,
    /// outermost first.
    pub fn chain(&self) -> Chain<'_> {
        Chain { next: Some(self) }
    }

    /// Return the innermost [`Error`] of the chain.
    pub fn root(&self) -> &Error {
        let mut error = self;
        while let Some(context) = error.context() {
            error = context;
        }

        error
    }
}

/// Iterator over an [`Error`] and its contexts.
pub struct Chain<'error> {
    next: Option<&'error Error>,
}

impl<'error> Iterator for Chain<'error> {
    type Item = &'error Error;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = current.context();

        Some(current)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        if !f.alternate() {
            writeln!(f, "{self:#}")?;
        }
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("reason", &self.reason)
            .field("name", &self.name)
            .field("visual", &self.visual)
            .field("help", &self.help)
            .field("context", &self.context)
            .finish()
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let header = format!("{RED}error{RESET}");
        write!(f, "{header}: {}", self.reason)?;

        if f.alternate() {
            for error in self.chain() {
                if let Some(visual) = &error.visual {
                    visual.display(f, error.name.as_deref(), error.help.as_deref())?;
                }
            }
        }

        Ok(())
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.reason == other.reason
            && self.help == other.help
            && self.name == other.name
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_located_sets_then_wraps() {
        let source: Arc<str> = "<?render inner()?>".into();
        let outer = Location::new(Some("outer".into()), source.clone(), Region::new(0..18));
        let inner = Location::new(Some("inner".into()), source, Region::new(2..8));

        let error = Error::build("division by zero")
            .with_kind(ErrorKind::ZeroDivision)
            .located(&inner)
            .located(&outer);

        let names: Vec<_> = error.chain().map(|e| e.get_name()).collect();
        assert_eq!(names, vec![Some("outer"), Some("inner")]);
        assert_eq!(error.kind(), ErrorKind::ZeroDivision);
        assert_eq!(error.root().location().map(|l| l.region()), Some(Region::new(2..8)));
    }

    #[test]
    fn test_display_alternate_shows_every_location() {
        let source: Arc<str> = "<?print x?>".into();
        let location = Location::new(Some("page".into()), source, Region::new(0..11));
        let error = Error::build("boom").located(&location).located(&location);

        let text = format!("{error:#}");
        assert_eq!(text.matches("--> page:1:1").count(), 2);
    }
}
