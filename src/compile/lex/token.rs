use crate::{
    compile::{Keyword, Operator},
    value::Color,
};
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt::Display;

/// Types emitted by the Lexer.
///
/// An abstraction over the text inside a tag to make construction of Tree
/// types easier. Literal tokens carry their parsed value.
#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    /// Identifier (unquoted name) within a tag.
    Identifier,
    /// A recognized keyword such as `and` or `None`.
    Keyword(Keyword),
    /// An integer literal.
    Int(i64),
    /// A float literal.
    Float(f64),
    /// A string literal, escapes already resolved.
    String(String),
    /// A date literal like `@(2000-01-01)`.
    Date(NaiveDate),
    /// A datetime literal like `@(2000-01-01T12:00)`.
    DateTime(NaiveDateTime),
    /// A colour literal like `#fff`.
    Color(Color),
    /// Describes an action taken on values.
    Operator(Operator),
    /// An operator followed by `=`, like `+=`.
    Augmented(Operator),
    /// **
    DoubleStar,
    /// =
    Assign,
    /// .
    Period,
    /// ,
    Comma,
    /// :
    Colon,
    /// (
    LeftParen,
    /// )
    RightParen,
    /// [
    LeftBracket,
    /// ]
    RightBracket,
    /// {
    LeftBrace,
    /// }
    RightBrace,
    /// {/}
    EmptySet,
}

impl Token {
    /// Return the [`Token`] spelled by the given symbol text, if any.
    pub(crate) fn from_symbol(text: &str) -> Option<Self> {
        let token = match text {
            "{/}" => Token::EmptySet,
            "//=" => Token::Augmented(Operator::FloorDivide),
            "<<=" => Token::Augmented(Operator::ShiftLeft),
            ">>=" => Token::Augmented(Operator::ShiftRight),
            "**" => Token::DoubleStar,
            "//" => Token::Operator(Operator::FloorDivide),
            "<<" => Token::Operator(Operator::ShiftLeft),
            ">>" => Token::Operator(Operator::ShiftRight),
            "==" => Token::Operator(Operator::Equal),
            "!=" => Token::Operator(Operator::NotEqual),
            "<=" => Token::Operator(Operator::LesserOrEqual),
            ">=" => Token::Operator(Operator::GreaterOrEqual),
            "+=" => Token::Augmented(Operator::Add),
            "-=" => Token::Augmented(Operator::Subtract),
            "*=" => Token::Augmented(Operator::Multiply),
            "/=" => Token::Augmented(Operator::TrueDivide),
            "%=" => Token::Augmented(Operator::Modulo),
            "&=" => Token::Augmented(Operator::BitAnd),
            "|=" => Token::Augmented(Operator::BitOr),
            "^=" => Token::Augmented(Operator::BitXor),
            "+" => Token::Operator(Operator::Add),
            "-" => Token::Operator(Operator::Subtract),
            "*" => Token::Operator(Operator::Multiply),
            "/" => Token::Operator(Operator::TrueDivide),
            "%" => Token::Operator(Operator::Modulo),
            "&" => Token::Operator(Operator::BitAnd),
            "|" => Token::Operator(Operator::BitOr),
            "^" => Token::Operator(Operator::BitXor),
            "~" => Token::Operator(Operator::BitNot),
            "<" => Token::Operator(Operator::Lesser),
            ">" => Token::Operator(Operator::Greater),
            "=" => Token::Assign,
            "." => Token::Period,
            "," => Token::Comma,
            ":" => Token::Colon,
            "(" => Token::LeftParen,
            ")" => Token::RightParen,
            "[" => Token::LeftBracket,
            "]" => Token::RightBracket,
            "{" => Token::LeftBrace,
            "}" => Token::RightBrace,
            _ => return None,
        };

        Some(token)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Identifier => write!(f, "identifier"),
            Token::Keyword(keyword) => write!(f, "keyword `{keyword}`"),
            Token::Int(_) => write!(f, "integer"),
            Token::Float(_) => write!(f, "float"),
            Token::String(_) => write!(f, "string"),
            Token::Date(_) => write!(f, "date"),
            Token::DateTime(_) => write!(f, "datetime"),
            Token::Color(_) => write!(f, "color"),
            Token::Operator(operator) => write!(f, "operator `{operator}`"),
            Token::Augmented(operator) => write!(f, "operator `{operator}=`"),
            Token::DoubleStar => write!(f, "`**`"),
            Token::Assign => write!(f, "assign (=)"),
            Token::Period => write!(f, "period (.)"),
            Token::Comma => write!(f, "comma (,)"),
            Token::Colon => write!(f, "colon (:)"),
            Token::LeftParen => write!(f, "`(`"),
            Token::RightParen => write!(f, "`)`"),
            Token::LeftBracket => write!(f, "`[`"),
            Token::RightBracket => write!(f, "`]`"),
            Token::LeftBrace => write!(f, "`{{`"),
            Token::RightBrace => write!(f, "`}}`"),
            Token::EmptySet => write!(f, "empty set (`{{/}}`)"),
        }
    }
}
