use crate::compile::Whitespace;
use morel::Syntax;

/// Markers that identify tags within text.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Marker {
    /// Beginning of a tag, `<?` by default.
    BeginTag = 0,
    /// End of a tag, `?>` by default.
    EndTag = 1,
}

impl From<usize> for Marker {
    fn from(value: usize) -> Self {
        match value {
            0 => Self::BeginTag,
            1 => Self::EndTag,
            _ => unreachable!(),
        }
    }
}

impl From<Marker> for usize {
    fn from(k: Marker) -> Self {
        k as usize
    }
}

/// Provides methods to build a `Syntax`, and holds the compile options that
/// come with it.
///
/// # Example
///
/// ```
/// use ul4::{Builder, Whitespace};
///
/// let builder = Builder::new()
///     .with_tag("{%", "%}")
///     .with_whitespace(Whitespace::Smart);
/// let syntax = builder.to_syntax();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Builder {
    tag: (String, String),
    whitespace: Whitespace,
}

impl Builder {
    /// Create a new [`Builder`].
    ///
    /// The `Builder` has default markers:
    ///
    /// ```text
    /// Tags: <?print name?>
    /// ```
    ///
    /// Templates that carry no `<?whitespace?>` tag keep their whitespace.
    #[inline]
    pub fn new() -> Self {
        Self {
            tag: ("<?".to_string(), "?>".to_string()),
            whitespace: Whitespace::Keep,
        }
    }

    /// Set the tag markers.
    ///
    /// # Examples
    ///
    /// ```
    /// use ul4::Builder;
    ///
    /// let mut builder = Builder::new();
    /// builder.set_tag("{%", "%}");
    /// ```
    #[inline]
    pub fn set_tag(&mut self, begin: &str, end: &str) {
        self.tag = (begin.to_string(), end.to_string());
    }

    /// Set the tag markers.
    ///
    /// Returns the [`Builder`], so additional methods may be chained.
    #[inline]
    pub fn with_tag(mut self, begin: &str, end: &str) -> Self {
        self.set_tag(begin, end);

        self
    }

    /// Set the whitespace mode used by templates without a `<?whitespace?>`
    /// tag.
    #[inline]
    pub fn set_whitespace(&mut self, whitespace: Whitespace) {
        self.whitespace = whitespace;
    }

    /// Set the default whitespace mode.
    ///
    /// Returns the Builder, so additional methods may be chained.
    #[inline]
    pub fn with_whitespace(mut self, whitespace: Whitespace) -> Self {
        self.set_whitespace(whitespace);

        self
    }

    /// Return the beginning and ending tag markers.
    pub fn tag(&self) -> (&str, &str) {
        (&self.tag.0, &self.tag.1)
    }

    /// Return the default whitespace mode.
    pub fn whitespace(&self) -> Whitespace {
        self.whitespace
    }

    /// Return a Syntax instance from the markers in this [`Builder`].
    pub fn to_syntax(&self) -> Syntax {
        let (begin, end) = &self.tag;

        Syntax::new(vec![
            (Marker::BeginTag.into(), begin.clone()),
            (Marker::EndTag.into(), end.clone()),
        ])
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
