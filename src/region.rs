use std::{
    fmt::{Display, Formatter, Result},
    ops::{Index, Range},
    sync::Arc,
};

/// Represents an area within source text.
#[derive(Debug, Default, PartialEq, Eq, Hash, Copy, Clone)]
pub struct Region {
    /// The beginning of the range, inclusive.
    pub begin: usize,
    /// The ending of the range, exclusive.
    pub end: usize,
}

impl Region {
    /// Create a new Region from the given range.
    pub fn new(position: Range<usize>) -> Self {
        Self {
            begin: position.start,
            end: position.end,
        }
    }

    /// Return the smallest [`Region`] covering both regions.
    pub fn combine(self, other: Self) -> Self {
        Self {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }

    /// Return true if the [`Region`] covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.begin >= self.end
    }
}

impl Index<Region> for str {
    type Output = str;

    fn index(&self, region: Region) -> &Self::Output {
        let Region { begin, end } = region;

        &self[begin..end]
    }
}

impl From<Range<usize>> for Region {
    fn from(value: Range<usize>) -> Self {
        Self {
            begin: value.start,
            end: value.end,
        }
    }
}

/// Points at a [`Region`] inside a named piece of template source.
///
/// Line and column numbers are derived from the source on request and are
/// one based, so they can be shown to a reader as they are.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    name: Option<Arc<str>>,
    source: Arc<str>,
    region: Region,
}

impl Location {
    /// Create a new [`Location`].
    pub fn new(name: Option<Arc<str>>, source: Arc<str>, region: Region) -> Self {
        Self {
            name,
            source,
            region,
        }
    }

    /// Return the name of the template the [`Location`] points into.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Return the full source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Return the [`Region`] being pointed at.
    pub fn region(&self) -> Region {
        self.region
    }

    /// Return the line the [`Region`] begins on.
    pub fn line(&self) -> usize {
        let begin = self.region.begin.min(self.source.len());

        self.source[..begin].matches('\n').count() + 1
    }

    /// Return the column the [`Region`] begins at, counted in characters.
    pub fn column(&self) -> usize {
        let begin = self.region.begin.min(self.source.len());
        let start = self.source[..begin].rfind('\n').map_or(0, |n| n + 1);

        self.source[start..begin].chars().count() + 1
    }

    /// Return the source text covered by the [`Region`].
    pub fn snippet(&self) -> &str {
        self.source.get(self.region.begin..self.region.end).unwrap_or("")
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "{}:{}:{}",
            self.name().unwrap_or("?"),
            self.line(),
            self.column()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_tags() {
        let source = "<?if x?>yes<?end if?>";
        let block = Region::new(0..8).combine(Region::new(11..21));

        assert_eq!(block, Region::new(0..21));
        assert_eq!(&source[block], source);
        assert_eq!(&source[Region::from(8..11)], "yes");
        assert!(Region::new(8..8).is_empty());
        assert!(!block.is_empty());
    }

    #[test]
    fn test_location_line_and_column() {
        let source: Arc<str> = "first\nsecond <?print x?>\n".into();
        let location = Location::new(Some("page".into()), source, Region::new(13..25));

        assert_eq!(location.line(), 2);
        assert_eq!(location.column(), 8);
        assert_eq!(location.snippet(), "<?print x?>\n");
        assert_eq!(location.to_string(), "page:2:8");
    }
}
