use crate::{
    compile::Marker,
    log::{Error, ErrorKind, UNCLOSED_TAG},
    region::Region,
};
use morel::Finder;
use std::fmt::Display;

/// The keyword that opens a tag, as in `<?print x?>`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TagKind {
    Print,
    PrintX,
    Code,
    If,
    Elif,
    Else,
    End,
    For,
    While,
    Def,
    Ul4,
    Whitespace,
    Doc,
    Note,
    Ignore,
    Return,
    Break,
    Continue,
    Render,
    RenderX,
    RenderBlock,
    RenderBlocks,
}

impl TagKind {
    /// Return the [`TagKind`] for the given keyword, if it names one.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let kind = match keyword {
            "print" => TagKind::Print,
            "printx" => TagKind::PrintX,
            "code" => TagKind::Code,
            "if" => TagKind::If,
            "elif" => TagKind::Elif,
            "else" => TagKind::Else,
            "end" => TagKind::End,
            "for" => TagKind::For,
            "while" => TagKind::While,
            "def" => TagKind::Def,
            "ul4" => TagKind::Ul4,
            "whitespace" => TagKind::Whitespace,
            "doc" => TagKind::Doc,
            "note" => TagKind::Note,
            "ignore" => TagKind::Ignore,
            "return" => TagKind::Return,
            "break" => TagKind::Break,
            "continue" => TagKind::Continue,
            "render" => TagKind::Render,
            "renderx" => TagKind::RenderX,
            "renderblock" => TagKind::RenderBlock,
            "renderblocks" => TagKind::RenderBlocks,
            _ => return None,
        };

        Some(kind)
    }

    /// Return the keyword that opens this kind of tag.
    pub fn keyword(&self) -> &'static str {
        match self {
            TagKind::Print => "print",
            TagKind::PrintX => "printx",
            TagKind::Code => "code",
            TagKind::If => "if",
            TagKind::Elif => "elif",
            TagKind::Else => "else",
            TagKind::End => "end",
            TagKind::For => "for",
            TagKind::While => "while",
            TagKind::Def => "def",
            TagKind::Ul4 => "ul4",
            TagKind::Whitespace => "whitespace",
            TagKind::Doc => "doc",
            TagKind::Note => "note",
            TagKind::Ignore => "ignore",
            TagKind::Return => "return",
            TagKind::Break => "break",
            TagKind::Continue => "continue",
            TagKind::Render => "render",
            TagKind::RenderX => "renderx",
            TagKind::RenderBlock => "renderblock",
            TagKind::RenderBlocks => "renderblocks",
        }
    }

    /// Return true for tags that produce output where they stand.
    ///
    /// Every other tag counts as control flow for smart whitespace handling.
    pub fn is_output(&self) -> bool {
        matches!(
            self,
            TagKind::Print | TagKind::PrintX | TagKind::Render | TagKind::RenderX
        )
    }

    /// Return true for tags that render another template.
    pub fn is_render(&self) -> bool {
        matches!(
            self,
            TagKind::Render | TagKind::RenderX | TagKind::RenderBlock | TagKind::RenderBlocks
        )
    }
}

impl Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.keyword())
    }
}

/// A tag found in the source.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Tag {
    /// The keyword of the tag.
    pub kind: TagKind,
    /// The whole tag, delimiters included.
    pub region: Region,
    /// The payload after the keyword, with surrounding whitespace removed.
    pub code: Region,
}

/// A piece of the source: literal text, or a tag.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Span {
    Text(Region),
    Tag(Tag),
}

/// Splits source text into [`Span`] instances.
///
/// Anything between delimiters that does not start with a known keyword is
/// left in the text, so processing instructions like `<?xml ...?>` pass
/// through unchanged. A stray end delimiter is text as well.
pub struct Scanner<'source> {
    /// Reference to the source text.
    source: &'source str,
    /// Compiled [`Finder`] instance used to search for markers
    /// in the source text.
    finder: &'source Finder,
}

impl<'source> Scanner<'source> {
    /// Create a new [`Scanner`] from the given source and [`Finder`].
    #[inline]
    pub fn new(source: &'source str, finder: &'source Finder) -> Self {
        Self { source, finder }
    }

    /// Return every [`Span`] in source order.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when a tag with a known keyword is never closed.
    pub fn scan(&self) -> Result<Vec<Span>, Error> {
        let mut spans = vec![];
        let mut text_begin = 0;
        let mut from = 0;

        while let Some((id, begin, end)) = self.finder.next(self.source, from) {
            from = end;
            if Marker::from(id) != Marker::BeginTag {
                continue;
            }

            let (kind, keyword_end) = match self.read_keyword(end) {
                Some(keyword) => keyword,
                None => continue,
            };
            let (close_begin, close_end) = match self.find_close(keyword_end) {
                Some(close) => close,
                None => {
                    return Err(Error::build(UNCLOSED_TAG)
                        .with_kind(ErrorKind::Syntax)
                        .with_pointer(self.source, begin..keyword_end)
                        .with_help(format!("the `{kind}` tag is never closed")))
                }
            };

            if text_begin < begin {
                spans.push(Span::Text((text_begin..begin).into()));
            }
            spans.push(Span::Tag(Tag {
                kind,
                region: (begin..close_end).into(),
                code: self.trim(keyword_end, close_begin),
            }));
            text_begin = close_end;
            from = close_end;
        }

        if text_begin < self.source.len() {
            spans.push(Span::Text((text_begin..self.source.len()).into()));
        }

        Ok(spans)
    }

    /// Read the keyword that follows a begin marker, returning its kind and
    /// the offset just past it.
    fn read_keyword(&self, from: usize) -> Option<(TagKind, usize)> {
        let rest = &self.source[from..];
        let skipped = rest.len() - rest.trim_start().len();
        let begin = from + skipped;
        let length = self.source[begin..]
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(self.source.len() - begin);
        let end = begin + length;

        TagKind::from_keyword(&self.source[begin..end]).map(|kind| (kind, end))
    }

    /// Find the end marker closing a tag.
    fn find_close(&self, mut from: usize) -> Option<(usize, usize)> {
        while let Some((id, begin, end)) = self.finder.next(self.source, from) {
            if Marker::from(id) == Marker::EndTag {
                return Some((begin, end));
            }
            from = end;
        }

        None
    }

    /// Return a [`Region`] over the given range with whitespace removed from
    /// both ends.
    fn trim(&self, begin: usize, end: usize) -> Region {
        let text = &self.source[begin..end];
        let leading = text.len() - text.trim_start().len();
        let trailing = text.len() - text.trim_end().len();

        if leading == text.len() {
            return (end..end).into();
        }

        (begin + leading..end - trailing).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Builder;

    fn scan(source: &str) -> Result<Vec<Span>, Error> {
        let finder = Finder::new(Builder::new().to_syntax());
        Scanner::new(source, &finder).scan()
    }

    #[test]
    fn test_scan_text_and_tags() {
        let spans = scan("a<?print x ?>b<?end if?>").unwrap();

        assert_eq!(
            spans,
            vec![
                Span::Text(Region::new(0..1)),
                Span::Tag(Tag {
                    kind: TagKind::Print,
                    region: Region::new(1..13),
                    code: Region::new(9..10),
                }),
                Span::Text(Region::new(13..14)),
                Span::Tag(Tag {
                    kind: TagKind::End,
                    region: Region::new(14..24),
                    code: Region::new(20..22),
                }),
            ]
        );
    }

    #[test]
    fn test_scan_unknown_keyword_is_text() {
        let spans = scan("<?xml version='1.0'?><?print 1?>").unwrap();

        assert_eq!(spans[0], Span::Text(Region::new(0..21)));
        assert!(matches!(spans[1], Span::Tag(Tag { kind: TagKind::Print, .. })));
    }

    #[test]
    fn test_scan_stray_end_marker_is_text() {
        let spans = scan("a ?> b").unwrap();

        assert_eq!(spans, vec![Span::Text(Region::new(0..6))]);
    }

    #[test]
    fn test_scan_empty_payload() {
        let spans = scan("<?else?>").unwrap();
        let Span::Tag(tag) = spans[0] else {
            unreachable!()
        };

        assert_eq!(tag.kind, TagKind::Else);
        assert!(tag.code.is_empty());
    }

    #[test]
    fn test_scan_unclosed() {
        let error = scan("text <?print x").unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Syntax);
        assert_eq!(error.reason(), UNCLOSED_TAG);
    }

    #[test]
    fn test_scan_keyword_needs_boundary() {
        let spans = scan("<?printer?>").unwrap();

        assert_eq!(spans, vec![Span::Text(Region::new(0..11))]);
    }

    #[test]
    fn test_scan_underscore_continues_keyword() {
        let spans = scan("<?print_x?><?end_if?>").unwrap();

        assert_eq!(spans, vec![Span::Text(Region::new(0..21))]);
    }
}
