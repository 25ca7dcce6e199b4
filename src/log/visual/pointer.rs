use super::Visual;
use crate::{
    log::{RESET, YELLOW},
    region::{Location, Region},
};
use std::fmt::{Formatter, Result};
use unicode_width::UnicodeWidthStr;

/// Underlines a [`Region`] on the source line where it begins.
#[derive(Debug, PartialEq)]
pub struct Pointer {
    /// One based line number.
    line: usize,
    /// One based column, counted in display cells.
    column: usize,
    /// Cells to underline, never less than one.
    width: usize,
    text: String,
}

impl Pointer {
    /// Create a new [`Pointer`] at the [`Region`] of the source.
    ///
    /// A region spanning several lines is underlined to the end of its
    /// first line.
    pub fn new(source: &str, region: Region) -> Self {
        let begin = floor_boundary(source, region.begin);
        let line_begin = source[..begin].rfind('\n').map_or(0, |n| n + 1);
        let line_end = source[begin..].find('\n').map_or(source.len(), |n| begin + n);
        let end = floor_boundary(source, region.end.clamp(begin, line_end));

        Self {
            line: source[..begin].matches('\n').count() + 1,
            column: source[line_begin..begin].width() + 1,
            width: source[begin..end].width().max(1),
            text: source[line_begin..line_end].trim_end_matches('\r').to_string(),
        }
    }

    /// Create a new [`Pointer`] at the given [`Location`].
    pub fn at(location: &Location) -> Self {
        Self::new(location.source(), location.region())
    }
}

/// Move the offset back onto a character boundary within the source.
fn floor_boundary(source: &str, offset: usize) -> usize {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }

    offset
}

impl Visual for Pointer {
    fn display(
        &self,
        formatter: &mut Formatter<'_>,
        template: Option<&str>,
        help: Option<&str>,
    ) -> Result {
        let number = self.line.to_string();
        let gutter = " ".repeat(number.len());
        let shift = " ".repeat(self.column - 1);
        let underline = "^".repeat(self.width);

        writeln!(formatter)?;
        writeln!(
            formatter,
            "{gutter}--> {}:{}:{}",
            template.unwrap_or("?"),
            self.line,
            self.column
        )?;
        writeln!(formatter, "{gutter} |")?;
        writeln!(formatter, "{number} | {}", self.text)?;
        writeln!(formatter, "{gutter} | {shift}{YELLOW}{underline}{RESET}")?;
        if let Some(help) = help {
            writeln!(formatter, "{gutter} = help: {help}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_second_line() {
        let pointer = Pointer::new("<?print a?>\n<?print b +?>", Region::new(22..23));

        assert_eq!(
            pointer,
            Pointer {
                line: 2,
                column: 11,
                width: 1,
                text: "<?print b +?>".to_string(),
            }
        );
    }

    #[test]
    fn test_pointer_stops_at_line_end() {
        let pointer = Pointer::new("<?print\n x?>", Region::new(0..12));

        assert_eq!(pointer.width, 7);
        assert_eq!(pointer.text, "<?print");
    }

    #[test]
    fn test_pointer_empty_source() {
        let pointer = Pointer::new("", Region::new(0..0));

        assert_eq!(pointer.text, "");
        assert_eq!(pointer.width, 1);
        assert_eq!(pointer.column, 1);
    }

    #[test]
    fn test_pointer_wide_characters() {
        let pointer = Pointer::new("日本<?print x?>", Region::new(6..17));

        assert_eq!(pointer.column, 5);
    }
}
