use super::{Error, ErrorKind};
use std::fmt::Display;

pub const UNEXPECTED_TOKEN: &str = "unexpected token";
pub const UNEXPECTED_BLOCK: &str = "unexpected block";
pub const UNEXPECTED_EOF: &str = "unexpected eof";
pub const UNCLOSED_TAG: &str = "unclosed tag";
pub const UNCLOSED_BLOCK: &str = "unclosed block";
pub const INVALID_SYNTAX: &str = "invalid syntax";
pub const INVALID_LITERAL: &str = "invalid literal";
pub const EXPRESSION_REQUIRED: &str = "expression required";
pub const STATEMENT_REQUIRED: &str = "statement required";
pub const INCOMPATIBLE_TYPES: &str = "incompatible types";

/// Most items, or bytes of a string, that a single operation may produce.
pub const LENGTH_LIMIT: usize = 1 << 24;

/// Return an [`Error`] explaining that the end of a tag was not expected.
pub fn error_eof(source: &str, at: usize) -> Error {
    Error::build(UNEXPECTED_EOF)
        .with_kind(ErrorKind::Syntax)
        .with_pointer(source, at..at)
        .with_help("expected additional tokens, did you close all brackets and strings?")
}

/// Return an [`Error`] explaining that the write operation failed.
///
/// This is likely caused by a failure during a `write!` macro operation.
pub fn error_write() -> Error {
    Error::build("write failure")
        .with_kind(ErrorKind::Write)
        .with_help("failed to write result of render to the output")
}

/// Return an [`Error`] describing a missing template.
pub fn error_missing_template(name: &str) -> Error {
    Error::build("missing template").with_help(format!(
        "template `{}` not found in engine, add it with `.add_template`",
        name
    ))
}

/// Return an [`Error`] describing an operator applied to unsupported operands.
pub fn error_operands<T>(operator: T, left: &str, right: &str) -> Error
where
    T: Display,
{
    Error::build(INCOMPATIBLE_TYPES)
        .with_kind(ErrorKind::Type)
        .with_help(format!(
            "operator `{operator}` is not supported between `{left}` and `{right}`"
        ))
}

/// Return an [`Error`] describing a unary operator applied to an unsupported
/// operand.
pub fn error_operand<T>(operator: T, operand: &str) -> Error
where
    T: Display,
{
    Error::build(INCOMPATIBLE_TYPES)
        .with_kind(ErrorKind::Type)
        .with_help(format!("operator `{operator}` is not supported for `{operand}`"))
}

/// Return an [`Error`] describing a type mismatch.
pub fn error_type<T>(reason: T) -> Error
where
    T: Into<String>,
{
    Error::build(reason).with_kind(ErrorKind::Type)
}

/// Return an [`Error`] describing a string or list that would exceed
/// [`LENGTH_LIMIT`].
pub fn error_too_large(what: &str) -> Error {
    Error::build(format!("{what} is too large"))
        .with_kind(ErrorKind::Value)
        .with_help(format!("the result may hold at most {LENGTH_LIMIT} items"))
}

/// Return an [`Error`] describing a division by zero.
pub fn error_zero_division() -> Error {
    Error::build("division by zero").with_kind(ErrorKind::ZeroDivision)
}

/// Return an [`Error`] describing an undefined value used in an operation
/// that needs a real one.
pub fn error_undefined(name: &str) -> Error {
    Error::build(format!("`{name}` is undefined"))
        .with_kind(ErrorKind::Undefined)
        .with_help("check the name, or guard the use with `isdefined`")
}

/// Return a string describing an unexpected token.
pub fn expected<T>(what: &str, received: T) -> String
where
    T: Display,
{
    format!("expected {what}, found {received}")
}
