mod pointer;

pub use pointer::Pointer;

use std::fmt::{Debug, Formatter, Result};

/// Describes a picture of where an [`Error`][`super::Error`] happened.
pub trait Visual: Debug + Send + Sync {
    /// Write the picture, labelled with the template name and followed by
    /// the help text, if any.
    fn display(
        &self,
        formatter: &mut Formatter<'_>,
        template: Option<&str>,
        help: Option<&str>,
    ) -> Result;
}
