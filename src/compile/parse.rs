//! Template parser.
//!
//! Scans the source into tags and text, applies whitespace handling, and
//! builds the Abstract Syntax Tree from the result. Tag payloads are parsed
//! by the expression parser.
pub mod tree;

mod block;
mod expr;

use crate::{
    compile::{
        parse::{
            expr::{ExpressionParser, Statement},
            tree::{ChangeVar, Node, Output, Render, SetVar, SignatureTree, Text},
        },
        whitespace::{self, Piece},
        Builder, Scanner, Tag, TagKind, Template, Whitespace,
    },
    log::{Diagnostic, Error, ErrorKind, Policy, EXPRESSION_REQUIRED, STATEMENT_REQUIRED},
    region::{Location, Region},
};
use morel::Finder;
use std::sync::Arc;

/// The name and signature declared by a `<?ul4?>` tag.
type Declaration = (Option<String>, Option<SignatureTree>);

/// What the tags of one template body say about that template.
#[derive(Default)]
struct Frame {
    /// The latest `<?doc?>`.
    doc: Option<String>,
    /// The latest `<?ul4?>` declaration.
    declaration: Option<Declaration>,
}

pub struct Parser<'source> {
    /// Reference to the source text.
    source: &'source str,
    /// Shared handle to the same source, kept by every [`Template`].
    shared: Arc<str>,
    /// Name given by the host, if any.
    name: Option<Arc<str>>,
    /// Markers and default whitespace mode.
    builder: &'source Builder,
    /// Decides whether soft problems stop compilation.
    policy: Policy,
    /// The spans left after whitespace handling.
    pieces: Vec<Piece>,
    /// Index of the next piece.
    position: usize,
    /// The whitespace mode in effect.
    whitespace: Whitespace,
    /// One frame per template being parsed, innermost last.
    frames: Vec<Frame>,
    /// Warnings admitted by the policy.
    diagnostics: Vec<Diagnostic>,
}

impl<'source> Parser<'source> {
    /// Create a new [`Parser`] over the given source.
    #[inline]
    pub fn new(
        source: &'source Arc<str>,
        name: Option<&str>,
        builder: &'source Builder,
        policy: Policy,
    ) -> Self {
        Self {
            source,
            shared: Arc::clone(source),
            name: name.map(Arc::from),
            builder,
            policy,
            pieces: vec![],
            position: 0,
            whitespace: builder.whitespace(),
            frames: vec![],
            diagnostics: vec![],
        }
    }

    /// Compile the template.
    ///
    /// The returned [`Template`] has its signature parsed but its defaults
    /// not yet evaluated.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when the source contains invalid syntax, or when
    /// the policy escalates a warning.
    pub fn compile(mut self) -> Result<Template, Error> {
        let name = self.name.clone();
        self.compile_inner().map_err(|error| match name {
            Some(name) if error.get_name().is_none() => error.with_name(name.to_string()),
            _ => error,
        })
    }

    fn compile_inner(&mut self) -> Result<Template, Error> {
        let finder = Finder::new(self.builder.to_syntax());
        let spans = Scanner::new(self.source, &finder).scan()?;

        let (mode, unknown) = whitespace::detect(self.source, &spans, self.builder.whitespace());
        for region in unknown {
            let message = format!(
                "unknown whitespace mode `{}`, expected `keep`, `strip` or `smart`",
                self.source[region].trim_matches(|c: char| !c.is_alphanumeric())
            );
            self.warn(message, region)?;
        }
        self.whitespace = mode;
        self.pieces = whitespace::normalize(self.source, &spans, mode);

        self.frames.push(Frame::default());
        let (content, close) = self.parse_body(false)?;
        if let Some(close) = close {
            return Err(self.error_block(close, "there is no open block here"));
        }
        let Frame { doc, declaration } = self.frames.pop().unwrap_or_default();

        let (declared, signature) = declaration.unwrap_or_default();
        let name = declared.map(Arc::from).or_else(|| self.name.clone());

        Ok(Template {
            name,
            source: Arc::clone(&self.shared),
            region: (0..self.source.len()).into(),
            whitespace: self.whitespace,
            doc,
            signature,
            bound: None,
            content,
            delimiters: self.delimiters(),
            diagnostics: std::mem::take(&mut self.diagnostics),
        })
    }

    /// Parse nodes until a tag that ends the current body, or the end of
    /// input.
    ///
    /// Returns the nodes and the `elif`, `else` or `end` tag that stopped the
    /// body, which the caller checks.
    fn parse_body(&mut self, in_loop: bool) -> Result<(Vec<Node>, Option<Tag>), Error> {
        let mut nodes = vec![];
        while let Some(piece) = self.next_piece() {
            let (tag, indent) = match piece {
                Piece::Text(text, region) => {
                    nodes.push(Node::Text(Text { text, region }));
                    continue;
                }
                Piece::Tag(tag, indent) => (tag, indent),
            };

            let node = match tag.kind {
                TagKind::Print => Node::Print(self.parse_output(tag)?),
                TagKind::PrintX => Node::PrintX(self.parse_output(tag)?),
                TagKind::Return => Node::Return(self.parse_output(tag)?),
                TagKind::Code => self.parse_code(tag)?,
                TagKind::Break | TagKind::Continue if !in_loop => {
                    return Err(self.error_block(tag, "this is only allowed inside a loop"));
                }
                TagKind::Break => Node::Break(tag.region),
                TagKind::Continue => Node::Continue(tag.region),
                TagKind::Render | TagKind::RenderX => Node::Render(Render {
                    call: self.expression(tag, EXPRESSION_REQUIRED)?.parse_call()?,
                    escape: tag.kind == TagKind::RenderX,
                    indent,
                    region: tag.region,
                }),
                TagKind::If => self.parse_if(tag, in_loop)?,
                TagKind::For => self.parse_for(tag)?,
                TagKind::While => self.parse_while(tag)?,
                TagKind::Def => self.parse_def(tag)?,
                TagKind::RenderBlock => self.parse_renderblock(tag, indent)?,
                TagKind::RenderBlocks => self.parse_renderblocks(tag, indent)?,
                TagKind::Ignore => {
                    self.skip_ignored(tag)?;
                    continue;
                }
                TagKind::Ul4 => {
                    self.parse_declaration(tag)?;
                    continue;
                }
                TagKind::Doc => {
                    let doc = self.source[tag.code].to_string();
                    if let Some(frame) = self.frames.last_mut() {
                        frame.doc = Some(doc);
                    }
                    continue;
                }
                TagKind::Note | TagKind::Whitespace => continue,
                TagKind::Elif | TagKind::Else | TagKind::End => return Ok((nodes, Some(tag))),
            };
            nodes.push(node);
        }

        Ok((nodes, None))
    }

    /// Parse a tag holding one required expression.
    fn parse_output(&self, tag: Tag) -> Result<Output, Error> {
        Ok(Output {
            expression: self
                .expression(tag, EXPRESSION_REQUIRED)?
                .parse_only_expression()?,
            region: tag.region,
        })
    }

    /// Parse a `<?code?>` tag.
    fn parse_code(&self, tag: Tag) -> Result<Node, Error> {
        let region = tag.region;
        let node = match self.expression(tag, STATEMENT_REQUIRED)?.parse_statement()? {
            Statement::Expression(expression) => Node::Expression(Output { expression, region }),
            Statement::SetVar(target, value) => Node::SetVar(SetVar {
                target,
                value,
                region,
            }),
            Statement::ChangeVar(operator, target, value) => Node::ChangeVar(ChangeVar {
                operator,
                target,
                value,
                region,
            }),
        };

        Ok(node)
    }

    /// Parse a `<?ul4?>` tag, which names the innermost template and
    /// declares its signature.
    fn parse_declaration(&mut self, tag: Tag) -> Result<(), Error> {
        if self.frames.last().is_some_and(|frame| frame.declaration.is_some()) {
            self.warn("repeated `<?ul4?>` tag, the last one wins", tag.region)?;
        }

        let declaration = if tag.code.is_empty() {
            (None, None)
        } else {
            let (name, signature) = ExpressionParser::new(self.source, tag.code)?.parse_definition()?;
            (Some(name), signature)
        };
        if let Some(frame) = self.frames.last_mut() {
            frame.declaration = Some(declaration);
        }

        Ok(())
    }

    /// Return an [`ExpressionParser`] over the payload of the tag.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] with the given reason if the payload is empty.
    fn expression(&self, tag: Tag, reason: &str) -> Result<ExpressionParser<'source>, Error> {
        if tag.code.is_empty() {
            return Err(Error::build(reason)
                .with_kind(ErrorKind::Syntax)
                .with_pointer(self.source, tag.region)
                .with_help(format!("the `{}` tag needs a payload", tag.kind)));
        }

        ExpressionParser::new(self.source, tag.code)
    }

    /// Record a warning, or fail if the policy escalates it.
    fn warn<T>(&mut self, message: T, region: Region) -> Result<(), Error>
    where
        T: Into<String>,
    {
        let location = Location::new(self.name.clone(), Arc::clone(&self.shared), region);
        let diagnostic = self.policy.admit(Diagnostic::warning(message, location))?;
        tracing::debug!(message = diagnostic.message(), "template warning");
        self.diagnostics.push(diagnostic);

        Ok(())
    }

    fn next_piece(&mut self) -> Option<Piece> {
        let piece = self.pieces.get(self.position).cloned();
        if piece.is_some() {
            self.position += 1;
        }

        piece
    }

    fn delimiters(&self) -> (String, String) {
        let (begin, end) = self.builder.tag();

        (begin.to_string(), end.to_string())
    }
}

/// Parse a signature given without its name and parentheses, as carried by
/// serialized templates.
pub(crate) fn parse_signature(text: &str) -> Result<SignatureTree, Error> {
    let source = format!("f({text})");
    let (_, signature) =
        ExpressionParser::new(&source, (0..source.len()).into())?.parse_definition()?;

    Ok(signature.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{UNCLOSED_BLOCK, UNEXPECTED_BLOCK};

    fn compile(source: &str) -> Result<Template, Error> {
        let source: Arc<str> = source.into();
        let builder = Builder::new();
        Parser::new(&source, Some("test"), &builder, Policy::default()).compile()
    }

    fn kinds(nodes: &[Node]) -> Vec<&'static str> {
        nodes.iter().map(Node::kind).collect()
    }

    #[test]
    fn test_parse_content() {
        let template = compile("a<?print x?><?code y = 1?><?code y += 2?><?printx y?>").unwrap();

        assert_eq!(
            kinds(template.content()),
            vec!["text", "print", "setvar", "addvar", "printx"]
        );
    }

    #[test]
    fn test_parse_blocks() {
        let template = compile(
            "<?if a?>1<?elif b?>2<?else?>3<?end if?>\
            <?for x in y?><?break?><?end for?>\
            <?while z?><?continue?><?end?>",
        )
        .unwrap();

        assert_eq!(kinds(template.content()), vec!["if", "for", "while"]);
        let Node::If(block) = &template.content()[0] else {
            unreachable!()
        };
        assert_eq!(block.branches.len(), 2);
        assert!(block.otherwise.is_some());
    }

    #[test]
    fn test_parse_def() {
        let template = compile("<?def f(x, y=2)?><?doc inner?><?return x?><?end def?>").unwrap();
        let Node::Def(def) = &template.content()[0] else {
            unreachable!()
        };

        assert_eq!(def.template.name(), Some("f"));
        assert_eq!(def.template.doc(), Some("inner"));
        assert_eq!(def.template.signature_text(), Some("x, y=2"));
        assert_eq!(template.doc(), None);
    }

    #[test]
    fn test_parse_declaration() {
        let template = compile("<?ul4 page(title)?><?doc first?><?doc second?>").unwrap();

        assert_eq!(template.name(), Some("page"));
        assert_eq!(template.signature_text(), Some("title"));
        assert_eq!(template.doc(), Some("second"));
    }

    #[test]
    fn test_parse_declaration_in_def() {
        let template =
            compile("<?ul4 page(title)?><?def f(x)?><?ul4 g(y, z)?><?end def?>").unwrap();
        let Node::Def(def) = &template.content()[0] else {
            unreachable!()
        };

        assert_eq!(template.name(), Some("page"));
        assert_eq!(template.signature_text(), Some("title"));
        assert_eq!(def.template.name(), Some("g"));
        assert_eq!(def.template.signature_text(), Some("y, z"));
        assert!(template.diagnostics().is_empty());
    }

    #[test]
    fn test_parse_ignore_and_note() {
        let template =
            compile("a<?ignore?><?print (?><?ignore?>x<?end ignore?><?end?>b<?note hi?>").unwrap();

        assert_eq!(kinds(template.content()), vec!["text", "text"]);
    }

    #[test]
    fn test_parse_mismatched_end() {
        let error = compile("<?for x in y?><?end if?>").unwrap_err();

        assert_eq!(error.reason(), UNEXPECTED_BLOCK);
        assert_eq!(error.get_name(), Some("test"));
    }

    #[test]
    fn test_parse_else_after_else() {
        let error = compile("<?if a?><?else?><?else?><?end if?>").unwrap_err();

        assert_eq!(error.reason(), UNEXPECTED_BLOCK);
    }

    #[test]
    fn test_parse_unclosed_block() {
        let error = compile("<?if a?>").unwrap_err();

        assert_eq!(error.reason(), UNCLOSED_BLOCK);
    }

    #[test]
    fn test_parse_required_payload() {
        for source in ["<?print?>", "<?if?><?end if?>", "<?for?><?end for?>", "<?return?>"] {
            assert_eq!(compile(source).unwrap_err().reason(), EXPRESSION_REQUIRED);
        }
        assert_eq!(compile("<?code?>").unwrap_err().reason(), STATEMENT_REQUIRED);
    }

    #[test]
    fn test_parse_break_outside_loop() {
        assert!(compile("<?break?>").is_err());
        assert!(compile("<?for x in y?><?def f?><?break?><?end def?><?end for?>").is_err());
        assert!(compile("<?for x in y?><?if x?><?break?><?end if?><?end for?>").is_ok());
    }

    #[test]
    fn test_parse_render_needs_call() {
        assert!(compile("<?render x?>").is_err());
        assert!(compile("<?render x(1)?>").is_ok());
    }

    #[test]
    fn test_parse_warnings() {
        let template = compile("<?whitespace tidy?><?ul4 a?><?ul4 b?>").unwrap();

        assert_eq!(template.diagnostics().len(), 2);
        assert_eq!(template.name(), Some("b"));

        let source: Arc<str> = "<?ul4 a?><?ul4 b?>".into();
        let builder = Builder::new();
        let result = Parser::new(&source, None, &builder, Policy::strict()).compile();
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_bare_signature() {
        let signature = parse_signature("a, b=[], *c").unwrap();

        assert_eq!(signature.parameters.len(), 2);
        assert_eq!(signature.rest.as_deref(), Some("c"));
        assert_eq!(signature.text, "a, b=[], *c");
    }
}
