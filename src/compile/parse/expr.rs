use crate::{
    compile::{
        token::Token,
        tree::{
            Attr, Binary, Call, CallArgument, Comprehension, Conditional, Const, Container,
            DictComprehension, DictItem, Expression, Item, Lvalue, ParameterTree, SignatureTree,
            Slice, Unary, Var,
        },
        Keyword, Lexer, Operator,
    },
    log::{error_eof, expected, Error, ErrorKind, INVALID_SYNTAX, UNEXPECTED_TOKEN},
    region::Region,
    value::Value,
};

const FOR: Token = Token::Keyword(Keyword::For);
const IN: Token = Token::Keyword(Keyword::In);
const IF: Token = Token::Keyword(Keyword::If);

/// The statement held by a `<?code?>` tag.
#[derive(Debug)]
pub enum Statement {
    Expression(Expression),
    SetVar(Lvalue, Expression),
    ChangeVar(Operator, Lvalue, Expression),
}

/// Parses the payload of a single tag.
///
/// The payload is tokenized up front, so the parser may rewind, which
/// `<?code?>` needs to tell assignments from expressions.
pub struct ExpressionParser<'source> {
    /// Reference to the source text.
    source: &'source str,
    /// Every token in the payload.
    tokens: Vec<(Token, Region)>,
    /// Index of the next token.
    position: usize,
    /// Where the payload ends, used to point at a missing token.
    end: usize,
}

impl<'source> ExpressionParser<'source> {
    /// Create a new [`ExpressionParser`] over the given [`Region`] of the
    /// source.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the payload cannot be tokenized.
    pub fn new(source: &'source str, region: Region) -> Result<Self, Error> {
        Ok(Self {
            source,
            tokens: Lexer::new(source, region).tokenize()?,
            position: 0,
            end: region.end,
        })
    }

    /// Parse the payload as a single expression.
    pub fn parse_only_expression(mut self) -> Result<Expression, Error> {
        let expression = self.parse_expression()?;
        self.finish()?;

        Ok(expression)
    }

    /// Parse the payload of a `<?code?>` tag.
    ///
    /// An assignment is tried first; when the payload does not start with a
    /// target followed by `=` or an augmented operator, it is parsed again as
    /// an expression.
    pub fn parse_statement(mut self) -> Result<Statement, Error> {
        if let Ok(target) = self.parse_target_list() {
            match self.peek().cloned() {
                Some(Token::Assign) => {
                    self.next();
                    let value = self.parse_expression()?;
                    self.finish()?;

                    return Ok(Statement::SetVar(target, value));
                }
                Some(Token::Augmented(operator)) => {
                    if let Lvalue::Unpack(_, region) = target {
                        return Err(self.error_syntax(
                            region,
                            "augmented assignment needs a single target",
                        ));
                    }
                    self.next();
                    let value = self.parse_expression()?;
                    self.finish()?;

                    return Ok(Statement::ChangeVar(operator, target, value));
                }
                _ => (),
            }
        }

        self.position = 0;
        let expression = self.parse_expression()?;
        self.finish()?;

        Ok(Statement::Expression(expression))
    }

    /// Parse the payload of a `<?for?>` tag.
    pub fn parse_for(mut self) -> Result<(Lvalue, Expression), Error> {
        let target = self.parse_target_list()?;
        self.next_must(&IN, "`in`")?;
        let iterable = self.parse_expression()?;
        self.finish()?;

        Ok((target, iterable))
    }

    /// Parse the payload of a render tag, which must be a call.
    pub fn parse_call(mut self) -> Result<Call, Error> {
        let expression = self.parse_expression()?;
        self.finish()?;

        match expression {
            Expression::Call(call) => Ok(*call),
            other => Err(self.error_syntax(
                other.region(),
                format!("render tags need a call, found `{}`", other.kind()),
            )),
        }
    }

    /// Parse the payload of a `<?def?>` or `<?ul4?>` tag: a name, optionally
    /// followed by a signature.
    pub fn parse_definition(mut self) -> Result<(String, Option<SignatureTree>), Error> {
        let (name, _) = self.parse_identifier()?;
        let signature = match self.next_if(&Token::LeftParen) {
            Some(open) => Some(self.parse_signature(open)?),
            None => None,
        };
        self.finish()?;

        Ok((name, signature))
    }

    /// Parse a conditional expression, the loosest binding form.
    fn parse_expression(&mut self) -> Result<Expression, Error> {
        let value = self.parse_or()?;
        if self.next_if(&IF).is_none() {
            return Ok(value);
        }

        let condition = self.parse_or()?;
        self.next_must(&Token::Keyword(Keyword::Else), "`else`")?;
        let otherwise = self.parse_expression()?;
        let region = value.region().combine(otherwise.region());

        Ok(Expression::If(Box::new(Conditional {
            value,
            condition,
            otherwise,
            region,
        })))
    }

    fn parse_or(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_and()?;
        while self.next_if(&Token::Keyword(Keyword::Or)).is_some() {
            let right = self.parse_and()?;
            left = join(left, right, Expression::Or);
        }

        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_not()?;
        while self.next_if(&Token::Keyword(Keyword::And)).is_some() {
            let right = self.parse_not()?;
            left = join(left, right, Expression::And);
        }

        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, Error> {
        match self.next_if(&Token::Keyword(Keyword::Not)) {
            Some(region) => {
                let operand = self.parse_not()?;
                let region = region.combine(operand.region());

                Ok(Expression::Not(Box::new(Unary { operand, region })))
            }
            None => self.parse_comparison(),
        }
    }

    /// Parse comparisons, which chain as independent binary nodes.
    fn parse_comparison(&mut self) -> Result<Expression, Error> {
        let mut left = self.parse_bitor()?;
        loop {
            let variant: fn(Box<Binary>) -> Expression = match self.peek().cloned() {
                Some(Token::Operator(operator)) => match operator {
                    Operator::Equal => Expression::Eq,
                    Operator::NotEqual => Expression::Ne,
                    Operator::Lesser => Expression::Lt,
                    Operator::LesserOrEqual => Expression::Le,
                    Operator::Greater => Expression::Gt,
                    Operator::GreaterOrEqual => Expression::Ge,
                    _ => return Ok(left),
                },
                Some(Token::Keyword(Keyword::In)) => Expression::Contains,
                Some(Token::Keyword(Keyword::Not)) if self.peek_at(1) == Some(&IN) => {
                    self.next();
                    Expression::NotContains
                }
                Some(Token::Keyword(Keyword::Is)) => {
                    if self.peek_at(1) == Some(&Token::Keyword(Keyword::Not)) {
                        self.next();
                        Expression::IsNot
                    } else {
                        Expression::Is
                    }
                }
                _ => return Ok(left),
            };
            self.next();

            let right = self.parse_bitor()?;
            left = join(left, right, variant);
        }
    }

    fn parse_bitor(&mut self) -> Result<Expression, Error> {
        self.parse_binary(&[Operator::BitOr], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> Result<Expression, Error> {
        self.parse_binary(&[Operator::BitXor], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> Result<Expression, Error> {
        self.parse_binary(&[Operator::BitAnd], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> Result<Expression, Error> {
        self.parse_binary(
            &[Operator::ShiftLeft, Operator::ShiftRight],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expression, Error> {
        self.parse_binary(
            &[Operator::Add, Operator::Subtract],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, Error> {
        self.parse_binary(
            &[
                Operator::Multiply,
                Operator::TrueDivide,
                Operator::FloorDivide,
                Operator::Modulo,
            ],
            Self::parse_unary,
        )
    }

    /// Parse a left associative chain of the given operators.
    fn parse_binary(
        &mut self,
        operators: &[Operator],
        operand: fn(&mut Self) -> Result<Expression, Error>,
    ) -> Result<Expression, Error> {
        let mut left = operand(self)?;
        while let Some(Token::Operator(operator)) = self.peek().cloned() {
            if !operators.contains(&operator) {
                break;
            }
            self.next();
            let right = operand(self)?;
            left = Expression::binary(operator, left, right);
        }

        Ok(left)
    }

    /// Parse unary `-` and `~`.
    ///
    /// Negated number literals are folded into constants.
    fn parse_unary(&mut self) -> Result<Expression, Error> {
        let negate = match self.peek() {
            Some(Token::Operator(Operator::Subtract)) => true,
            Some(Token::Operator(Operator::BitNot)) => false,
            _ => return self.parse_postfix(),
        };
        let begin = self.next().map(|(_, region)| region).unwrap_or_default();
        let operand = self.parse_unary()?;
        let region = begin.combine(operand.region());

        if !negate {
            return Ok(Expression::BitNot(Box::new(Unary { operand, region })));
        }
        if let Expression::Const(Const { value, .. }) = &operand {
            let folded = match value {
                Value::Int(int) => int.checked_neg().map(Value::Int),
                Value::Float(float) => Some(Value::Float(-float)),
                _ => None,
            };
            if let Some(value) = folded {
                return Ok(Expression::Const(Const { value, region }));
            }
        }

        Ok(Expression::Neg(Box::new(Unary { operand, region })))
    }

    /// Parse attribute access, calls and subscripts.
    fn parse_postfix(&mut self) -> Result<Expression, Error> {
        let mut expression = self.parse_atom()?;
        loop {
            let begin = expression.region();
            expression = match self.peek() {
                Some(Token::Period) => {
                    self.next();
                    let (name, region) = self.parse_identifier()?;

                    Expression::Attr(Box::new(Attr {
                        object: expression,
                        name,
                        region: begin.combine(region),
                    }))
                }
                Some(Token::LeftParen) => {
                    self.next();
                    let (arguments, close) = self.parse_arguments()?;

                    Expression::Call(Box::new(Call {
                        callee: expression,
                        arguments,
                        region: begin.combine(close),
                    }))
                }
                Some(Token::LeftBracket) => {
                    self.next();
                    self.parse_subscript(expression)?
                }
                _ => return Ok(expression),
            };
        }
    }

    /// Parse the inside of `[...]` following an expression.
    fn parse_subscript(&mut self, object: Expression) -> Result<Expression, Error> {
        if self.next_if(&Token::Colon).is_some() {
            return self.parse_slice(object, None);
        }

        let index = self.parse_expression()?;
        if self.next_if(&Token::Colon).is_some() {
            return self.parse_slice(object, Some(index));
        }
        let close = self.next_must(&Token::RightBracket, "`]`")?;
        let region = object.region().combine(close);

        Ok(Expression::Item(Box::new(Binary {
            left: object,
            right: index,
            region,
        })))
    }

    /// Parse the rest of a slice, after the colon.
    fn parse_slice(
        &mut self,
        object: Expression,
        start: Option<Expression>,
    ) -> Result<Expression, Error> {
        let stop = if self.next_is(&Token::RightBracket) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let close = self.next_must(&Token::RightBracket, "`]`")?;
        let region = object.region().combine(close);

        Ok(Expression::Slice(Box::new(Slice {
            object,
            start,
            stop,
            region,
        })))
    }

    /// Parse a literal, a name, or a bracketed form.
    fn parse_atom(&mut self) -> Result<Expression, Error> {
        let (token, region) = match self.next() {
            Some(next) => next,
            None => return Err(self.error_eof("an expression")),
        };

        let value = match token {
            Token::Identifier => {
                return Ok(Expression::Var(Var {
                    name: self.source[region].to_string(),
                    region,
                }))
            }
            Token::Keyword(Keyword::None) => Value::None,
            Token::Keyword(Keyword::True) => Value::Bool(true),
            Token::Keyword(Keyword::False) => Value::Bool(false),
            Token::Int(int) => Value::Int(int),
            Token::Float(float) => Value::Float(float),
            Token::String(string) => Value::from(string),
            Token::Date(date) => Value::Date(date),
            Token::DateTime(datetime) => Value::DateTime(datetime),
            Token::Color(color) => Value::Color(color),
            Token::LeftParen => return self.parse_parenthesized(region),
            Token::LeftBracket => return self.parse_list(region),
            Token::LeftBrace => return self.parse_brace(region),
            Token::EmptySet => {
                return Ok(Expression::Set(Container {
                    items: vec![],
                    region,
                }))
            }
            other => return Err(self.error_unexpected(&other, region, "an expression")),
        };

        Ok(Expression::Const(Const { value, region }))
    }

    /// Parse `(expression)` or a generator expression.
    fn parse_parenthesized(&mut self, open: Region) -> Result<Expression, Error> {
        let expression = self.parse_expression()?;
        if !self.next_is(&FOR) {
            self.next_must(&Token::RightParen, "`)`")?;

            return Ok(expression);
        }

        let (target, iterable, condition) = self.parse_comprehension()?;
        let close = self.next_must(&Token::RightParen, "`)`")?;

        Ok(Expression::GenExpr(Box::new(Comprehension {
            item: expression,
            target,
            iterable,
            condition,
            region: open.combine(close),
        })))
    }

    /// Parse a list literal or list comprehension.
    fn parse_list(&mut self, open: Region) -> Result<Expression, Error> {
        if let Some(close) = self.next_if(&Token::RightBracket) {
            return Ok(Expression::List(Container {
                items: vec![],
                region: open.combine(close),
            }));
        }

        let first = match self.parse_item()? {
            Item::Value(item) if self.next_is(&FOR) => {
                let (target, iterable, condition) = self.parse_comprehension()?;
                let close = self.next_must(&Token::RightBracket, "`]`")?;

                return Ok(Expression::ListComp(Box::new(Comprehension {
                    item,
                    target,
                    iterable,
                    condition,
                    region: open.combine(close),
                })));
            }
            first => first,
        };
        let (items, close) =
            self.parse_sequence(first, &Token::RightBracket, "`]`", Self::parse_item)?;

        Ok(Expression::List(Container {
            items,
            region: open.combine(close),
        }))
    }

    /// Parse a set or dict literal, or a set or dict comprehension.
    fn parse_brace(&mut self, open: Region) -> Result<Expression, Error> {
        if let Some(close) = self.next_if(&Token::RightBrace) {
            return Ok(Expression::Dict(Container {
                items: vec![],
                region: open.combine(close),
            }));
        }

        if self.next_is(&Token::DoubleStar) {
            let first = self.parse_dict_item()?;
            return self.finish_dict(open, first);
        }
        if self.next_is(&Token::Operator(Operator::Multiply)) {
            let first = self.parse_item()?;
            return self.finish_set(open, first);
        }

        let first = self.parse_expression()?;
        if self.next_if(&Token::Colon).is_some() {
            let value = self.parse_expression()?;
            if !self.next_is(&FOR) {
                return self.finish_dict(open, DictItem::Pair(first, value));
            }

            let (target, iterable, condition) = self.parse_comprehension()?;
            let close = self.next_must(&Token::RightBrace, "`}`")?;

            return Ok(Expression::DictComp(Box::new(DictComprehension {
                key: first,
                value,
                target,
                iterable,
                condition,
                region: open.combine(close),
            })));
        }

        if !self.next_is(&FOR) {
            return self.finish_set(open, Item::Value(first));
        }

        let (target, iterable, condition) = self.parse_comprehension()?;
        let close = self.next_must(&Token::RightBrace, "`}`")?;

        Ok(Expression::SetComp(Box::new(Comprehension {
            item: first,
            target,
            iterable,
            condition,
            region: open.combine(close),
        })))
    }

    fn finish_dict(&mut self, open: Region, first: DictItem) -> Result<Expression, Error> {
        let (items, close) =
            self.parse_sequence(first, &Token::RightBrace, "`}`", Self::parse_dict_item)?;

        Ok(Expression::Dict(Container {
            items,
            region: open.combine(close),
        }))
    }

    fn finish_set(&mut self, open: Region, first: Item) -> Result<Expression, Error> {
        let (items, close) =
            self.parse_sequence(first, &Token::RightBrace, "`}`", Self::parse_item)?;

        Ok(Expression::Set(Container {
            items,
            region: open.combine(close),
        }))
    }

    /// Parse the comma separated items following the first one, up to and
    /// including the closing token. A trailing comma is allowed.
    fn parse_sequence<T>(
        &mut self,
        first: T,
        close: &Token,
        what: &str,
        item: fn(&mut Self) -> Result<T, Error>,
    ) -> Result<(Vec<T>, Region), Error> {
        let mut items = vec![first];
        loop {
            if let Some(region) = self.next_if(close) {
                return Ok((items, region));
            }
            self.next_must(&Token::Comma, &format!("`,` or {what}"))?;
            if let Some(region) = self.next_if(close) {
                return Ok((items, region));
            }
            items.push(item(self)?);
        }
    }

    /// Parse a list or set item, which may be unpacked with `*`.
    fn parse_item(&mut self) -> Result<Item, Error> {
        if self.next_if(&Token::Operator(Operator::Multiply)).is_some() {
            return Ok(Item::Unpack(self.parse_expression()?));
        }

        Ok(Item::Value(self.parse_expression()?))
    }

    /// Parse a dict item, which may be unpacked with `**`.
    fn parse_dict_item(&mut self) -> Result<DictItem, Error> {
        if self.next_if(&Token::DoubleStar).is_some() {
            return Ok(DictItem::Unpack(self.parse_expression()?));
        }

        let key = self.parse_expression()?;
        self.next_must(&Token::Colon, "`:`")?;
        let value = self.parse_expression()?;

        Ok(DictItem::Pair(key, value))
    }

    /// Parse `for target in iterable [if condition]`.
    fn parse_comprehension(
        &mut self,
    ) -> Result<(Lvalue, Expression, Option<Expression>), Error> {
        self.next_must(&FOR, "`for`")?;
        let target = self.parse_target_list()?;
        self.next_must(&IN, "`in`")?;
        let iterable = self.parse_or()?;
        let condition = match self.next_if(&IF) {
            Some(_) => Some(self.parse_or()?),
            None => None,
        };

        Ok((target, iterable, condition))
    }

    /// Parse call arguments after the opening parenthesis, returning them
    /// with the region of the closing parenthesis.
    fn parse_arguments(&mut self) -> Result<(Vec<CallArgument>, Region), Error> {
        let mut arguments = vec![];
        loop {
            if let Some(close) = self.next_if(&Token::RightParen) {
                return Ok((arguments, close));
            }

            let argument = match self.peek() {
                Some(Token::Operator(Operator::Multiply)) => {
                    self.next();
                    CallArgument::Unpack(self.parse_expression()?)
                }
                Some(Token::DoubleStar) => {
                    self.next();
                    CallArgument::UnpackMap(self.parse_expression()?)
                }
                Some(Token::Identifier) if self.peek_at(1) == Some(&Token::Assign) => {
                    let (name, _) = self.parse_identifier()?;
                    self.next();
                    CallArgument::Keyword(name, self.parse_expression()?)
                }
                _ => {
                    let item = self.parse_expression()?;
                    if self.next_is(&FOR) {
                        return self.parse_sole_generator(item, arguments.is_empty());
                    }
                    CallArgument::Positional(item)
                }
            };
            arguments.push(argument);

            if !self.next_is(&Token::RightParen) {
                self.next_must(&Token::Comma, "`,` or `)`")?;
            }
        }
    }

    /// Parse a generator expression without parentheses, which is only
    /// allowed as the sole argument of a call.
    fn parse_sole_generator(
        &mut self,
        item: Expression,
        first: bool,
    ) -> Result<(Vec<CallArgument>, Region), Error> {
        let begin = item.region();
        let (target, iterable, condition) = self.parse_comprehension()?;
        let region = begin.combine(self.previous_region());
        if !first || !self.next_is(&Token::RightParen) {
            return Err(self.error_syntax(
                region,
                "a generator expression must be parenthesized unless it is the sole argument",
            ));
        }
        let close = self.next_must(&Token::RightParen, "`)`")?;
        let generator = Expression::GenExpr(Box::new(Comprehension {
            item,
            target,
            iterable,
            condition,
            region,
        }));

        Ok((vec![CallArgument::Positional(generator)], close))
    }

    /// Parse a signature after the opening parenthesis.
    ///
    /// Plain parameters come first, then parameters with defaults, then
    /// `*rest` and `**kwrest`.
    fn parse_signature(&mut self, open: Region) -> Result<SignatureTree, Error> {
        let mut signature = SignatureTree::default();
        let mut names: Vec<String> = vec![];
        loop {
            if let Some(close) = self.next_if(&Token::RightParen) {
                signature.region = (open.end..close.begin).into();
                signature.text = self.source[signature.region].to_string();
                return Ok(signature);
            }

            let star = match self.peek() {
                Some(Token::Operator(Operator::Multiply)) => 1,
                Some(Token::DoubleStar) => 2,
                _ => 0,
            };
            if star > 0 {
                self.next();
            }
            let (name, region) = self.parse_identifier()?;
            if names.contains(&name) {
                return Err(self.error_syntax(region, format!("duplicate parameter `{name}`")));
            }
            names.push(name.clone());

            match star {
                1 if signature.rest.is_none() && signature.kwrest.is_none() => {
                    signature.rest = Some(name);
                }
                2 if signature.kwrest.is_none() => signature.kwrest = Some(name),
                0 if signature.rest.is_none() && signature.kwrest.is_none() => {
                    let default = match self.next_if(&Token::Assign) {
                        Some(_) => Some(self.parse_expression()?),
                        None => None,
                    };
                    let follows_default = signature
                        .parameters
                        .last()
                        .is_some_and(|last| last.default.is_some());
                    if default.is_none() && follows_default {
                        return Err(self.error_syntax(
                            region,
                            format!("parameter `{name}` without default follows a parameter with default"),
                        ));
                    }
                    signature.parameters.push(ParameterTree { name, default });
                }
                _ => {
                    return Err(self.error_syntax(
                        region,
                        format!("parameter `{name}` is out of order"),
                    ))
                }
            }

            if !self.next_is(&Token::RightParen) {
                self.next_must(&Token::Comma, "`,` or `)`")?;
            }
        }
    }

    /// Parse one or more comma separated assignment targets.
    ///
    /// A single target stays as it is; anything followed by a comma becomes
    /// [`Lvalue::Unpack`].
    fn parse_target_list(&mut self) -> Result<Lvalue, Error> {
        let first = self.parse_target()?;
        if !self.next_is(&Token::Comma) {
            return Ok(first);
        }

        let begin = first.region();
        let mut targets = vec![first];
        while self.next_if(&Token::Comma).is_some() {
            if !matches!(self.peek(), Some(Token::Identifier | Token::LeftParen)) {
                break;
            }
            targets.push(self.parse_target()?);
        }
        let region = begin.combine(self.previous_region());

        Ok(Lvalue::Unpack(targets, region))
    }

    /// Parse a single assignment target, which may be a parenthesized
    /// target list.
    fn parse_target(&mut self) -> Result<Lvalue, Error> {
        if let Some(open) = self.next_if(&Token::LeftParen) {
            let inner = self.parse_target_list()?;
            let close = self.next_must(&Token::RightParen, "`)`")?;

            return Ok(match inner {
                Lvalue::Unpack(targets, _) => Lvalue::Unpack(targets, open.combine(close)),
                other => other,
            });
        }

        match self.parse_postfix()? {
            Expression::Var(var) => Ok(Lvalue::Var(var)),
            Expression::Attr(attr) => Ok(Lvalue::Attr(attr)),
            Expression::Item(item) => Ok(Lvalue::Item(item)),
            other => Err(self.error_syntax(
                other.region(),
                format!("cannot assign to `{}`", other.kind()),
            )),
        }
    }

    /// Consume an identifier, returning its text and [`Region`].
    fn parse_identifier(&mut self) -> Result<(String, Region), Error> {
        match self.next() {
            Some((Token::Identifier, region)) => Ok((self.source[region].to_string(), region)),
            Some((token, region)) => Err(self.error_unexpected(&token, region, "an identifier")),
            None => Err(self.error_eof("an identifier")),
        }
    }

    /// Return an [`Error`] if any token is left.
    fn finish(&self) -> Result<(), Error> {
        match self.tokens.get(self.position) {
            Some((token, region)) => Err(self.error_unexpected(token, *region, "end of tag")),
            None => Ok(()),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens
            .get(self.position + offset)
            .map(|(token, _)| token)
    }

    fn next(&mut self) -> Option<(Token, Region)> {
        let next = self.tokens.get(self.position).cloned();
        if next.is_some() {
            self.position += 1;
        }

        next
    }

    fn next_is(&self, expect: &Token) -> bool {
        self.peek() == Some(expect)
    }

    /// Consume the next token if it is the expected one.
    fn next_if(&mut self, expect: &Token) -> Option<Region> {
        if self.next_is(expect) {
            return self.next().map(|(_, region)| region);
        }

        None
    }

    /// Consume the expected token, or fail.
    fn next_must(&mut self, expect: &Token, what: &str) -> Result<Region, Error> {
        match self.next() {
            Some((token, region)) if token == *expect => Ok(region),
            Some((token, region)) => Err(self.error_unexpected(&token, region, what)),
            None => Err(self.error_eof(what)),
        }
    }

    /// Return the [`Region`] of the last consumed token.
    fn previous_region(&self) -> Region {
        self.position
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|(_, region)| *region)
            .unwrap_or_default()
    }

    fn error_unexpected(&self, token: &Token, region: Region, what: &str) -> Error {
        Error::build(UNEXPECTED_TOKEN)
            .with_kind(ErrorKind::Syntax)
            .with_pointer(self.source, region)
            .with_help(expected(what, token))
    }

    fn error_eof(&self, what: &str) -> Error {
        error_eof(self.source, self.end).with_help(format!("expected {what}"))
    }

    fn error_syntax<T>(&self, region: Region, help: T) -> Error
    where
        T: Into<String>,
    {
        Error::build(INVALID_SYNTAX)
            .with_kind(ErrorKind::Syntax)
            .with_pointer(self.source, region)
            .with_help(help)
    }
}

/// Join two expressions with the given binary variant.
fn join(left: Expression, right: Expression, variant: fn(Box<Binary>) -> Expression) -> Expression {
    let region = left.region().combine(right.region());

    variant(Box::new(Binary {
        left,
        right,
        region,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Expression {
        ExpressionParser::new(source, (0..source.len()).into())
            .and_then(|parser| parser.parse_only_expression())
            .unwrap()
    }

    fn statement(source: &str) -> Statement {
        ExpressionParser::new(source, (0..source.len()).into())
            .and_then(|parser| parser.parse_statement())
            .unwrap()
    }

    #[test]
    fn test_precedence() {
        let Expression::Or(or) = parse("a or b and not c == d + e * -f") else {
            unreachable!()
        };
        let Expression::And(and) = &or.right else {
            unreachable!()
        };
        let Expression::Not(not) = &and.right else {
            unreachable!()
        };
        let Expression::Eq(eq) = &not.operand else {
            unreachable!()
        };
        let Expression::Add(add) = &eq.right else {
            unreachable!()
        };

        assert_eq!(add.right.kind(), "mul");
    }

    #[test]
    fn test_conditional_is_right_associative() {
        let Expression::If(conditional) = parse("a if b else c if d else e") else {
            unreachable!()
        };

        assert_eq!(conditional.value.kind(), "var");
        assert_eq!(conditional.otherwise.kind(), "if");
    }

    #[test]
    fn test_comparisons_do_not_chain() {
        let Expression::Lt(lt) = parse("a < b < c") else {
            unreachable!()
        };

        assert_eq!(lt.left.kind(), "lt");
    }

    #[test]
    fn test_not_in_and_is_not() {
        assert_eq!(parse("a not in b").kind(), "notcontains");
        assert_eq!(parse("a is not None").kind(), "isnot");
        assert_eq!(parse("a in b").kind(), "contains");
    }

    #[test]
    fn test_negative_literal_folds() {
        let Expression::Const(constant) = parse("-42") else {
            unreachable!()
        };

        assert_eq!(constant.value, Value::Int(-42));
        assert_eq!(parse("-x").kind(), "neg");
    }

    #[test]
    fn test_containers() {
        assert_eq!(parse("[]").kind(), "list");
        assert_eq!(parse("[1, *x,]").kind(), "list");
        assert_eq!(parse("{}").kind(), "dict");
        assert_eq!(parse("{/}").kind(), "set");
        assert_eq!(parse("{1, 2}").kind(), "set");
        assert_eq!(parse("{'a': 1, **x}").kind(), "dict");
        assert_eq!(parse("[x for x in y if x]").kind(), "listcomp");
        assert_eq!(parse("{x for x in y}").kind(), "setcomp");
        assert_eq!(parse("{k: v for (k, v) in y}").kind(), "dictcomp");
        assert_eq!(parse("(x for x in y)").kind(), "genexpr");
    }

    #[test]
    fn test_postfix() {
        assert_eq!(parse("a.b").kind(), "attr");
        assert_eq!(parse("a[1]").kind(), "item");
        assert_eq!(parse("a[1:]").kind(), "slice");
        assert_eq!(parse("a[:]").kind(), "slice");
        assert_eq!(parse("a.b(1)[2]").kind(), "item");
    }

    #[test]
    fn test_call_arguments() {
        let Expression::Call(call) = parse("f(1, x=2, *a, **b,)") else {
            unreachable!()
        };

        assert!(matches!(call.arguments[0], CallArgument::Positional(_)));
        assert!(matches!(&call.arguments[1], CallArgument::Keyword(name, _) if name == "x"));
        assert!(matches!(call.arguments[2], CallArgument::Unpack(_)));
        assert!(matches!(call.arguments[3], CallArgument::UnpackMap(_)));
    }

    #[test]
    fn test_sole_argument_generator() {
        let Expression::Call(call) = parse("sum(x for x in y)") else {
            unreachable!()
        };
        let CallArgument::Positional(argument) = &call.arguments[0] else {
            unreachable!()
        };

        assert_eq!(argument.kind(), "genexpr");
    }

    #[test]
    fn test_generator_needs_parentheses_among_arguments() {
        for source in ["f(x for x in y, 2)", "f(1, x for x in y)", "f(a=x for x in y)"] {
            assert!(ExpressionParser::new(source, (0..source.len()).into())
                .and_then(|parser| parser.parse_only_expression())
                .is_err());
        }

        let Expression::Call(call) = parse("f((x for x in y), 2)") else {
            unreachable!()
        };
        assert_eq!(call.arguments.len(), 2);
    }

    #[test]
    fn test_statements() {
        assert!(matches!(statement("x = 1"), Statement::SetVar(Lvalue::Var(_), _)));
        assert!(matches!(
            statement("x.y += 1"),
            Statement::ChangeVar(Operator::Add, Lvalue::Attr(_), _)
        ));
        assert!(matches!(statement("f(x)"), Statement::Expression(_)));
        assert!(matches!(statement("x == 1"), Statement::Expression(_)));
    }

    #[test]
    fn test_nested_targets() {
        let Statement::SetVar(Lvalue::Unpack(targets, _), _) = statement("((a, b), (c,), d) = x")
        else {
            unreachable!()
        };

        assert_eq!(targets.len(), 3);
        assert!(matches!(&targets[0], Lvalue::Unpack(inner, _) if inner.len() == 2));
        assert!(matches!(&targets[1], Lvalue::Unpack(inner, _) if inner.len() == 1));
        assert!(matches!(targets[2], Lvalue::Var(_)));
    }

    #[test]
    fn test_signature() {
        let source = "f(a, b=1, *args, **kwargs)";
        let (name, signature) = ExpressionParser::new(source, (0..source.len()).into())
            .and_then(|parser| parser.parse_definition())
            .unwrap();
        let signature = signature.unwrap();

        assert_eq!(name, "f");
        assert_eq!(signature.parameters.len(), 2);
        assert_eq!(signature.rest.as_deref(), Some("args"));
        assert_eq!(signature.kwrest.as_deref(), Some("kwargs"));
        assert_eq!(&source[signature.region], "a, b=1, *args, **kwargs");
    }

    #[test]
    fn test_signature_errors() {
        for source in ["f(a=1, b)", "f(a, a)", "f(**k, *a)", "f(*a, b)"] {
            let result = ExpressionParser::new(source, (0..source.len()).into())
                .and_then(|parser| parser.parse_definition());

            assert!(result.is_err(), "{source}");
        }
    }

    #[test]
    fn test_trailing_tokens() {
        let source = "a b";
        let error = ExpressionParser::new(source, (0..3).into())
            .and_then(|parser| parser.parse_only_expression())
            .unwrap_err();

        assert_eq!(error.reason(), UNEXPECTED_TOKEN);
    }
}
