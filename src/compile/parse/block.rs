use crate::{
    compile::{
        parse::{
            tree::{Branch, Def, For, If, Node, RenderBlock, RenderBlocks, SignatureTree, While},
            Frame, Parser,
        },
        Tag, TagKind, Template,
    },
    log::{Error, ErrorKind, EXPRESSION_REQUIRED, UNCLOSED_BLOCK, UNEXPECTED_BLOCK},
};
use std::sync::Arc;

impl<'source> Parser<'source> {
    /// Parse an `if` block with its `elif` and `else` branches.
    pub(super) fn parse_if(&mut self, open: Tag, in_loop: bool) -> Result<Node, Error> {
        let condition = self
            .expression(open, EXPRESSION_REQUIRED)?
            .parse_only_expression()?;
        let mut pending = Some((condition, open.region));
        let mut branches = vec![];

        loop {
            let (body, close) = self.parse_body(in_loop)?;
            let close = self.closing(close, open)?;

            match (close.kind, pending.take()) {
                (TagKind::Elif, Some((condition, tag))) => {
                    branches.push(Branch {
                        condition,
                        body,
                        tag,
                    });
                    let condition = self
                        .expression(close, EXPRESSION_REQUIRED)?
                        .parse_only_expression()?;
                    pending = Some((condition, close.region));
                }
                (TagKind::Else, Some((condition, tag))) => {
                    branches.push(Branch {
                        condition,
                        body,
                        tag,
                    });
                }
                (TagKind::End, pending) => {
                    self.check_end(close, TagKind::If)?;
                    let otherwise = match pending {
                        Some((condition, tag)) => {
                            branches.push(Branch {
                                condition,
                                body,
                                tag,
                            });
                            None
                        }
                        None => Some(body),
                    };

                    return Ok(Node::If(If {
                        branches,
                        otherwise,
                        region: open.region.combine(close.region),
                    }));
                }
                _ => {
                    return Err(self.error_block(
                        close,
                        format!("`{}` is not allowed after `else`", close.kind),
                    ))
                }
            }
        }
    }

    /// Parse a `for` block.
    pub(super) fn parse_for(&mut self, open: Tag) -> Result<Node, Error> {
        let (target, iterable) = self.expression(open, EXPRESSION_REQUIRED)?.parse_for()?;
        let (body, close) = self.parse_body(true)?;
        let close = self.closing(close, open)?;
        self.check_end(close, TagKind::For)?;

        Ok(Node::For(For {
            target,
            iterable,
            body,
            tag: open.region,
            region: open.region.combine(close.region),
        }))
    }

    /// Parse a `while` block.
    pub(super) fn parse_while(&mut self, open: Tag) -> Result<Node, Error> {
        let condition = self
            .expression(open, EXPRESSION_REQUIRED)?
            .parse_only_expression()?;
        let (body, close) = self.parse_body(true)?;
        let close = self.closing(close, open)?;
        self.check_end(close, TagKind::While)?;

        Ok(Node::While(While {
            condition,
            body,
            tag: open.region,
            region: open.region.combine(close.region),
        }))
    }

    /// Parse a `def` block into a local template.
    pub(super) fn parse_def(&mut self, open: Tag) -> Result<Node, Error> {
        let (name, signature) = self
            .expression(open, EXPRESSION_REQUIRED)?
            .parse_definition()?;
        let (template, close) = self.parse_template(open, Some(name), signature)?;

        Ok(Node::Def(Def {
            template,
            tag: open.region,
            region: open.region.combine(close.region),
        }))
    }

    /// Parse a `renderblock` block, whose content becomes a template.
    pub(super) fn parse_renderblock(
        &mut self,
        open: Tag,
        indent: Option<String>,
    ) -> Result<Node, Error> {
        let call = self.expression(open, EXPRESSION_REQUIRED)?.parse_call()?;
        let (content, close) = self.parse_template(open, Some("content".to_string()), None)?;

        Ok(Node::RenderBlock(RenderBlock {
            call,
            content,
            indent,
            tag: open.region,
            region: open.region.combine(close.region),
        }))
    }

    /// Parse a `renderblocks` block.
    pub(super) fn parse_renderblocks(
        &mut self,
        open: Tag,
        indent: Option<String>,
    ) -> Result<Node, Error> {
        let call = self.expression(open, EXPRESSION_REQUIRED)?.parse_call()?;
        let (body, close) = self.parse_body(false)?;
        let close = self.closing(close, open)?;
        self.check_end(close, TagKind::RenderBlocks)?;

        Ok(Node::RenderBlocks(RenderBlocks {
            call,
            body,
            indent,
            tag: open.region,
            region: open.region.combine(close.region),
        }))
    }

    /// Skip everything up to the `end` closing an `ignore` block.
    ///
    /// Ignore blocks nest, and no tag inside is parsed.
    pub(super) fn skip_ignored(&mut self, open: Tag) -> Result<(), Error> {
        let mut depth = 1;
        while let Some(piece) = self.next_piece() {
            let tag = match piece {
                super::Piece::Tag(tag, _) => tag,
                super::Piece::Text(..) => continue,
            };
            match tag.kind {
                TagKind::Ignore => depth += 1,
                TagKind::End if matches!(&self.source[tag.code], "" | "ignore") => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => (),
            }
        }

        Err(self.error_unclosed(open))
    }

    /// Parse the body of a local template up to its `end` tag.
    fn parse_template(
        &mut self,
        open: Tag,
        name: Option<String>,
        signature: Option<SignatureTree>,
    ) -> Result<(Arc<Template>, Tag), Error> {
        self.frames.push(Frame::default());
        let (content, close) = self.parse_body(false)?;
        let Frame { doc, declaration } = self.frames.pop().unwrap_or_default();
        let close = self.closing(close, open)?;
        self.check_end(close, open.kind)?;
        let (name, signature) = match declaration {
            Some((declared, declared_signature)) => (declared.or(name), declared_signature),
            None => (name, signature),
        };

        let template = Template {
            name: name.map(Arc::from),
            source: Arc::clone(&self.shared),
            region: (open.region.end..close.region.begin).into(),
            whitespace: self.whitespace,
            doc,
            signature,
            bound: None,
            content,
            delimiters: self.delimiters(),
            diagnostics: vec![],
        };

        Ok((Arc::new(template), close))
    }

    /// Return the closing tag, failing when the block was never closed.
    fn closing(&self, close: Option<Tag>, open: Tag) -> Result<Tag, Error> {
        close.ok_or_else(|| self.error_unclosed(open))
    }

    /// Check that the tag is an `end` for the given kind of block, either
    /// bare or naming the block.
    fn check_end(&self, close: Tag, kind: TagKind) -> Result<(), Error> {
        if close.kind != TagKind::End {
            return Err(self.error_block(
                close,
                format!("expected the end of the `{kind}` block, found `{}`", close.kind),
            ));
        }

        let named = &self.source[close.code];
        if !named.is_empty() && named != kind.keyword() {
            return Err(self.error_block(
                close,
                format!("expected `end {kind}`, found `end {named}`"),
            ));
        }

        Ok(())
    }

    pub(super) fn error_block<T>(&self, tag: Tag, help: T) -> Error
    where
        T: Into<String>,
    {
        Error::build(UNEXPECTED_BLOCK)
            .with_kind(ErrorKind::Syntax)
            .with_pointer(self.source, tag.region)
            .with_help(help)
    }

    fn error_unclosed(&self, open: Tag) -> Error {
        Error::build(UNCLOSED_BLOCK)
            .with_kind(ErrorKind::Syntax)
            .with_pointer(self.source, open.region)
            .with_help(format!(
                "did you close the `{kind}` block with `<?end {kind}?>`?",
                kind = open.kind
            ))
    }
}
