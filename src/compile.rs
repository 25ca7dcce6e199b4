mod lex;
mod parse;
mod scan;
mod syntax;
mod template;
mod whitespace;

pub use crate::compile::{
    lex::{token, Lexer},
    parse::{tree, Parser},
    scan::{Scanner, Span, Tag, TagKind},
    syntax::{Builder, Marker},
    template::Template,
    whitespace::Whitespace,
};

pub(crate) use crate::compile::parse::parse_signature;

use crate::{engine::Engine, log::Error};
use std::fmt::Display;

/// Compile a [`Template`] from the given text.
///
/// Provides a shortcut to quickly compile a `Template` without creating
/// an `Engine`.
///
/// # Examples
///
/// ```
/// use ul4::compile;
///
/// let template = compile("<?print name?>");
/// assert!(template.is_ok())
/// ```
pub fn compile(text: &str) -> Result<Template, Error> {
    Engine::shared().compile(text)
}

/// Keywords recognized by the Lexer and Parser inside tags.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Keyword {
    /// The `None` constant.
    None,
    /// The `True` constant.
    True,
    /// The `False` constant.
    False,
    /// Boolean conjunction.
    And,
    /// Boolean disjunction.
    Or,
    /// Boolean negation, also part of `not in`.
    Not,
    /// Containment test, also separates loop variables from the container.
    In,
    /// Identity test.
    Is,
    /// Conditional expressions and comprehension filters.
    If,
    /// The alternative of a conditional expression.
    Else,
    /// Comprehensions.
    For,
}

impl Keyword {
    /// Return the [`Keyword`] spelled by the given identifier, if any.
    pub fn from_name(name: &str) -> Option<Self> {
        let keyword = match name {
            "None" => Keyword::None,
            "True" => Keyword::True,
            "False" => Keyword::False,
            "and" => Keyword::And,
            "or" => Keyword::Or,
            "not" => Keyword::Not,
            "in" => Keyword::In,
            "is" => Keyword::Is,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "for" => Keyword::For,
            _ => return None,
        };

        Some(keyword)
    }
}

impl Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Keyword::None => write!(f, "None"),
            Keyword::True => write!(f, "True"),
            Keyword::False => write!(f, "False"),
            Keyword::And => write!(f, "and"),
            Keyword::Or => write!(f, "or"),
            Keyword::Not => write!(f, "not"),
            Keyword::In => write!(f, "in"),
            Keyword::Is => write!(f, "is"),
            Keyword::If => write!(f, "if"),
            Keyword::Else => write!(f, "else"),
            Keyword::For => write!(f, "for"),
        }
    }
}

/// Operators recognized by the Lexer and Parser.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Operator {
    /// +
    Add,
    /// -
    Subtract,
    /// *
    Multiply,
    /// /
    TrueDivide,
    /// //
    FloorDivide,
    /// %
    Modulo,
    /// <<
    ShiftLeft,
    /// >>
    ShiftRight,
    /// &
    BitAnd,
    /// ^
    BitXor,
    /// |
    BitOr,
    /// ~
    BitNot,
    /// ==
    Equal,
    /// !=
    NotEqual,
    /// <
    Lesser,
    /// <=
    LesserOrEqual,
    /// >
    Greater,
    /// >=
    GreaterOrEqual,
}

impl Operator {
    /// Return true if the operator may be combined with `=` for augmented
    /// assignment.
    pub fn is_augmentable(&self) -> bool {
        !matches!(
            self,
            Operator::BitNot
                | Operator::Equal
                | Operator::NotEqual
                | Operator::Lesser
                | Operator::LesserOrEqual
                | Operator::Greater
                | Operator::GreaterOrEqual
        )
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Add => write!(f, "+"),
            Operator::Subtract => write!(f, "-"),
            Operator::Multiply => write!(f, "*"),
            Operator::TrueDivide => write!(f, "/"),
            Operator::FloorDivide => write!(f, "//"),
            Operator::Modulo => write!(f, "%"),
            Operator::ShiftLeft => write!(f, "<<"),
            Operator::ShiftRight => write!(f, ">>"),
            Operator::BitAnd => write!(f, "&"),
            Operator::BitXor => write!(f, "^"),
            Operator::BitOr => write!(f, "|"),
            Operator::BitNot => write!(f, "~"),
            Operator::Equal => write!(f, "=="),
            Operator::NotEqual => write!(f, "!="),
            Operator::Lesser => write!(f, "<"),
            Operator::LesserOrEqual => write!(f, "<="),
            Operator::Greater => write!(f, ">"),
            Operator::GreaterOrEqual => write!(f, ">="),
        }
    }
}
