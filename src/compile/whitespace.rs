use crate::{
    compile::{Span, Tag, TagKind},
    log::{Error, ErrorKind},
    region::Region,
};
use std::{fmt::Display, str::FromStr};

/// How a template treats the whitespace around its tags.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Whitespace {
    /// Leave all text as written.
    #[default]
    Keep,
    /// Remove indentation and line ends everywhere.
    Strip,
    /// Remove the indentation and line end of lines holding only control
    /// tags, and the indentation added by blocks.
    Smart,
}

impl FromStr for Whitespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(Whitespace::Keep),
            "strip" => Ok(Whitespace::Strip),
            "smart" => Ok(Whitespace::Smart),
            _ => Err(Error::build(format!("unknown whitespace mode `{s}`"))
                .with_kind(ErrorKind::Value)
                .with_help("expected one of `keep`, `strip`, `smart`")),
        }
    }
}

impl Display for Whitespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Whitespace::Keep => write!(f, "keep"),
            Whitespace::Strip => write!(f, "strip"),
            Whitespace::Smart => write!(f, "smart"),
        }
    }
}

/// A span after whitespace handling.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    /// Text to output, with the region it came from.
    Text(String, Region),
    /// A tag, with the indentation to write in front of the output of a
    /// render tag that stood alone on its line.
    Tag(Tag, Option<String>),
}

/// Return the mode chosen by the `<?whitespace?>` tags among the spans, and
/// the regions of any tag naming an unknown mode.
///
/// The last valid tag wins. Without one, the default stays in effect.
pub fn detect(source: &str, spans: &[Span], default: Whitespace) -> (Whitespace, Vec<Region>) {
    let mut whitespace = default;
    let mut unknown = vec![];
    for span in spans {
        if let Span::Tag(tag) = span {
            if tag.kind != TagKind::Whitespace {
                continue;
            }
            match source[tag.code].parse() {
                Ok(mode) => whitespace = mode,
                Err(_) => unknown.push(tag.region),
            }
        }
    }

    (whitespace, unknown)
}

/// Apply the whitespace mode to the spans.
pub fn normalize(source: &str, spans: &[Span], whitespace: Whitespace) -> Vec<Piece> {
    let mut output = Output::default();
    match whitespace {
        Whitespace::Keep => {
            for span in spans {
                match span {
                    Span::Text(region) => output.text(&source[*region], *region),
                    Span::Tag(tag) => output.tag(*tag, None),
                }
            }
        }
        Whitespace::Strip => {
            for part in split(source, spans) {
                match part {
                    Part::Text(region) => output.text(&source[region], region),
                    Part::Tag(tag) => output.tag(tag, None),
                    Part::Indent(_) | Part::LineEnd(_) => (),
                }
            }
        }
        Whitespace::Smart => Smart::new(source).run(split(source, spans), &mut output),
    }

    output.pieces
}

/// A span cut at line boundaries.
#[derive(Debug, Clone, Copy)]
enum Part {
    /// Spaces and tabs at the start of a line.
    Indent(Region),
    Text(Region),
    /// `\n`, `\r\n` or `\r`.
    LineEnd(Region),
    Tag(Tag),
}

/// Split text spans into indentation, text and line ends.
fn split(source: &str, spans: &[Span]) -> Vec<Part> {
    let mut parts = vec![];
    for span in spans {
        let region = match span {
            Span::Tag(tag) => {
                parts.push(Part::Tag(*tag));
                continue;
            }
            Span::Text(region) => *region,
        };

        let bytes = source.as_bytes();
        let mut line_start = region.begin == 0 || matches!(bytes[region.begin - 1], b'\n' | b'\r');
        let mut position = region.begin;
        while position < region.end {
            if line_start {
                let indent = bytes[position..region.end]
                    .iter()
                    .take_while(|b| matches!(b, b' ' | b'\t'))
                    .count();
                if indent > 0 {
                    parts.push(Part::Indent((position..position + indent).into()));
                    position += indent;
                }
                line_start = false;
                continue;
            }

            let length = bytes[position..region.end]
                .iter()
                .take_while(|b| !matches!(b, b'\n' | b'\r'))
                .count();
            if length > 0 {
                parts.push(Part::Text((position..position + length).into()));
                position += length;
                continue;
            }

            let end = match &bytes[position..region.end] {
                [b'\r', b'\n', ..] => position + 2,
                _ => position + 1,
            };
            parts.push(Part::LineEnd((position..end).into()));
            position = end;
            line_start = true;
        }
    }

    parts
}

/// Collects [`Piece`] instances, merging neighboring text.
#[derive(Default)]
struct Output {
    pieces: Vec<Piece>,
}

impl Output {
    fn text(&mut self, text: &str, region: Region) {
        if text.is_empty() {
            return;
        }
        if let Some(Piece::Text(previous, previous_region)) = self.pieces.last_mut() {
            previous.push_str(text);
            *previous_region = previous_region.combine(region);
            return;
        }

        self.pieces.push(Piece::Text(text.to_string(), region));
    }

    fn tag(&mut self, tag: Tag, indent: Option<String>) {
        self.pieces.push(Piece::Tag(tag, indent));
    }
}

/// An open block, tracked to remove the indentation it adds to its content.
struct Frame {
    /// Indentation of the line holding the opening tag.
    tag_indent: String,
    /// Indentation of the first indented line of the content.
    body_indent: Option<String>,
    /// What the opening tag line is indented by after handling.
    output_prefix: String,
}

/// State of smart whitespace handling.
struct Smart<'source> {
    source: &'source str,
    frames: Vec<Frame>,
    /// Depth of nested ignore blocks, whose tags do not open blocks.
    ignore: usize,
}

impl<'source> Smart<'source> {
    fn new(source: &'source str) -> Self {
        Self {
            source,
            frames: vec![],
            ignore: 0,
        }
    }

    fn run(mut self, parts: Vec<Part>, output: &mut Output) {
        let mut line = vec![];
        for part in parts {
            let ends_line = matches!(part, Part::LineEnd(_));
            line.push(part);
            if ends_line {
                self.line(&line, output);
                line.clear();
            }
        }
        if !line.is_empty() {
            self.line(&line, output);
        }
    }

    /// Handle one physical line.
    fn line(&mut self, line: &[Part], output: &mut Output) {
        let source = self.source;
        let indent = match line.first() {
            Some(Part::Indent(region)) => &source[*region],
            _ => "",
        };
        let tags: Vec<Tag> = line
            .iter()
            .filter_map(|part| match part {
                Part::Tag(tag) => Some(*tag),
                _ => None,
            })
            .collect();
        let has_text = line.iter().any(|part| matches!(part, Part::Text(_)));
        let recognized = !(indent.contains(' ') && indent.contains('\t'));

        let bare = recognized && !has_text && !tags.is_empty();
        let is_control = bare && tags.iter().all(|tag| !tag.kind.is_output());
        let is_render = bare && tags.len() == 1 && tags[0].kind.is_render();

        if !tags.is_empty() || has_text {
            self.claim_body(indent);
        }
        let mapped = self.map(indent);

        if is_control || is_render {
            let reuse = if is_render { Some(mapped) } else { None };
            for tag in tags {
                self.track(tag);
                output.tag(tag, reuse.clone().filter(|_| tag.kind.is_render()));
            }
            return;
        }

        for part in line {
            match *part {
                Part::Indent(region) if recognized => output.text(&mapped, region),
                Part::Indent(region) | Part::Text(region) | Part::LineEnd(region) => {
                    output.text(&source[region], region)
                }
                Part::Tag(tag) => {
                    self.track(tag);
                    output.tag(tag, None);
                }
            }
        }
    }

    /// Record the indentation of the first indented line inside the
    /// innermost block.
    fn claim_body(&mut self, indent: &str) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.body_indent.is_none()
                && indent.len() > frame.tag_indent.len()
                && indent.starts_with(frame.tag_indent.as_str())
            {
                frame.body_indent = Some(indent.to_string());
            }
        }
    }

    /// Return the indentation a line gets once the innermost block's extra
    /// indentation is removed.
    fn map(&self, indent: &str) -> String {
        let frame = match self.frames.last() {
            Some(frame) => frame,
            None => return indent.to_string(),
        };

        match &frame.body_indent {
            Some(body) if indent.starts_with(body.as_str()) => {
                format!("{}{}", frame.output_prefix, &indent[body.len()..])
            }
            _ => indent.to_string(),
        }
    }

    /// Open or close blocks as tags are seen.
    fn track(&mut self, tag: Tag) {
        let source = self.source;
        let code = &source[tag.code];
        if self.ignore > 0 {
            match tag.kind {
                TagKind::Ignore => self.ignore += 1,
                TagKind::End if matches!(code, "" | "ignore") => self.ignore -= 1,
                _ => (),
            }
            return;
        }

        match tag.kind {
            TagKind::Ignore => self.ignore = 1,
            TagKind::End => {
                self.frames.pop();
            }
            TagKind::If
            | TagKind::For
            | TagKind::While
            | TagKind::Def
            | TagKind::RenderBlock
            | TagKind::RenderBlocks => {
                let tag_indent = self.indent_of(tag);
                let output_prefix = self.map(&tag_indent);
                self.frames.push(Frame {
                    tag_indent,
                    body_indent: None,
                    output_prefix,
                });
            }
            _ => (),
        }
    }

    /// Return the indentation of the line a tag starts on.
    fn indent_of(&self, tag: Tag) -> String {
        let line_start = self.source[..tag.region.begin]
            .rfind(['\n', '\r'])
            .map_or(0, |i| i + 1);

        self.source[line_start..tag.region.begin]
            .chars()
            .take_while(|c| matches!(c, ' ' | '\t'))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{Builder, Scanner};
    use morel::Finder;

    fn normalized(source: &str, whitespace: Whitespace) -> Vec<Piece> {
        let finder = Finder::new(Builder::new().to_syntax());
        let spans = Scanner::new(source, &finder).scan().unwrap();

        normalize(source, &spans, whitespace)
    }

    /// Return the text the pieces would output, ignoring tags.
    fn text(source: &str, whitespace: Whitespace) -> String {
        normalized(source, whitespace)
            .into_iter()
            .filter_map(|piece| match piece {
                Piece::Text(text, _) => Some(text),
                Piece::Tag(..) => None,
            })
            .collect()
    }

    #[test]
    fn test_keep() {
        let source = "a\n  <?if x?>\n b<?end if?>\n";

        assert_eq!(text(source, Whitespace::Keep), "a\n  \n b\n");
    }

    #[test]
    fn test_strip() {
        assert_eq!(text("g\t\n\t u \n  r\n\t\tk", Whitespace::Strip), "g\tu rk");
    }

    #[test]
    fn test_smart_control_lines() {
        assert_eq!(
            text("<?if True?>\nTrue\n<?end if?>\n", Whitespace::Smart),
            "True\n"
        );
        assert_eq!(
            text("x<?if True?>\nTrue\n<?end if?>\n", Whitespace::Smart),
            "x\nTrue\n"
        );
    }

    #[test]
    fn test_smart_output_line_kept() {
        assert_eq!(
            text("  <?print x?>\n", Whitespace::Smart),
            "  \n"
        );
    }

    #[test]
    fn test_smart_dedent() {
        let source = "<?for x in y?>\n\t<?if x?>\n\t\tx\n\t<?end if?>\n<?end for?>\n";

        assert_eq!(text(source, Whitespace::Smart), "x\n");
    }

    #[test]
    fn test_smart_dedent_keeps_outer_indent() {
        let source = "\t<?for x in y?>\n\t\tx\n\t<?end for?>\n";

        assert_eq!(text(source, Whitespace::Smart), "\tx\n");
    }

    #[test]
    fn test_smart_render_indent() {
        let pieces = normalized("a\n\t<?render x()?>\nb", Whitespace::Smart);

        assert_eq!(pieces.len(), 3);
        assert!(matches!(&pieces[1], Piece::Tag(_, Some(indent)) if indent == "\t"));
        assert!(matches!(&pieces[2], Piece::Text(text, _) if text == "b"));
    }

    #[test]
    fn test_smart_mixed_indent_not_stripped() {
        let source = " \t<?if x?>\nx\n<?end if?>\n";

        assert_eq!(text(source, Whitespace::Smart), " \t\nx\n");
    }

    #[test]
    fn test_detect() {
        let source = "<?whitespace smart?><?whitespace bogus?>";
        let finder = Finder::new(Builder::new().to_syntax());
        let spans = Scanner::new(source, &finder).scan().unwrap();
        let (whitespace, unknown) = detect(source, &spans, Whitespace::Keep);

        assert_eq!(whitespace, Whitespace::Smart);
        assert_eq!(unknown, vec![Region::new(20..40)]);
    }
}
