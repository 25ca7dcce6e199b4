pub mod token;

use crate::{
    compile::{token::Token, Keyword},
    log::{Error, ErrorKind, INVALID_LITERAL, INVALID_SYNTAX, UNEXPECTED_TOKEN},
    region::Region,
    value::Color,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// Provides methods to read the payload of a tag as [`Token`] instances.
///
/// Every [`Region`] returned is absolute, meaning it indexes the whole
/// template source rather than the payload.
pub struct Lexer<'source> {
    /// Reference to the source text.
    source: &'source str,
    /// Position within source.
    cursor: usize,
    /// The end of the payload, exclusive.
    end: usize,
}

impl<'source> Lexer<'source> {
    /// Create a new [`Lexer`] over the given [`Region`] of the source.
    #[inline]
    pub fn new(source: &'source str, region: Region) -> Self {
        Self {
            source,
            cursor: region.begin,
            end: region.end,
        }
    }

    /// Read every remaining [`Token`] in the payload.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when an unexpected character or a malformed
    /// literal is found.
    pub fn tokenize(mut self) -> Result<Vec<(Token, Region)>, Error> {
        let mut tokens = vec![];
        while let Some(next) = self.next()? {
            tokens.push(next);
        }

        Ok(tokens)
    }

    /// Return the next [`Token`] and [`Region`], skipping whitespace.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] when an unexpected character or a malformed
    /// literal is found.
    pub fn next(&mut self) -> Result<Option<(Token, Region)>, Error> {
        let rest = &self.source[self.cursor..self.end];
        self.cursor += rest.len() - rest.trim_start().len();

        let from = self.cursor;
        let char = match self.source[from..self.end].chars().next() {
            Some(char) => char,
            None => return Ok(None),
        };

        let next = match char {
            '\'' | '"' => self.lex_string(from, char)?,
            '@' => self.lex_date(from)?,
            '#' => self.lex_color(from)?,
            c if c.is_ascii_digit() => self.lex_number(from)?,
            '.' if self.peek_char(from + 1).is_some_and(|c| c.is_ascii_digit()) => {
                self.lex_number(from)?
            }
            c if is_ident_start(c) => self.lex_ident_or_keyword(from),
            _ => match self.lex_symbol(from) {
                Some(next) => next,
                None => {
                    return Err(Error::build(UNEXPECTED_TOKEN)
                        .with_kind(ErrorKind::Syntax)
                        .with_pointer(self.source, from..from + char.len_utf8())
                        .with_help(format!("`{char}` is not valid here")))
                }
            },
        };

        Ok(Some(next))
    }

    /// Return the character at the given offset, if it lies in the payload.
    fn peek_char(&self, at: usize) -> Option<char> {
        self.source.get(at..self.end)?.chars().next()
    }

    /// Advance past a symbol, preferring the longest one that matches.
    fn lex_symbol(&mut self, from: usize) -> Option<(Token, Region)> {
        for length in [3, 2, 1] {
            let to = from + length;
            if to > self.end {
                continue;
            }
            if let Some(token) = self.source.get(from..to).and_then(Token::from_symbol) {
                self.cursor = to;

                return Some((token, (from..to).into()));
            }
        }

        None
    }

    /// Return a [`Token::Identifier`] or [`Token::Keyword`].
    fn lex_ident_or_keyword(&mut self, from: usize) -> (Token, Region) {
        let to = self.source[from..self.end]
            .char_indices()
            .find(|(_, c)| !is_ident_continue(*c))
            .map_or(self.end, |(i, _)| from + i);
        self.cursor = to;

        let token = match Keyword::from_name(&self.source[from..to]) {
            Some(keyword) => Token::Keyword(keyword),
            None => Token::Identifier,
        };

        (token, (from..to).into())
    }

    /// Return a [`Token::Int`] or [`Token::Float`].
    ///
    /// Integers may carry a `0x`, `0o` or `0b` prefix. Floats need a
    /// fraction or an exponent.
    fn lex_number(&mut self, from: usize) -> Result<(Token, Region), Error> {
        let text = &self.source[from..self.end];
        let bytes = text.as_bytes();

        let radix = match bytes {
            [b'0', b'x' | b'X', ..] => Some(16),
            [b'0', b'o' | b'O', ..] => Some(8),
            [b'0', b'b' | b'B', ..] => Some(2),
            _ => None,
        };
        if let Some(radix) = radix {
            let length = 2 + count(&bytes[2..], |b| b.is_ascii_alphanumeric() || b == b'_');
            let digits = text[2..length].replace('_', "");
            self.cursor = from + length;

            return i64::from_str_radix(&digits, radix)
                .map(|int| (Token::Int(int), (from..from + length).into()))
                .map_err(|_| self.error_literal(from..from + length, "integer literal"));
        }

        let mut length = count(bytes, |b| b.is_ascii_digit());
        let mut is_float = false;
        if bytes.get(length) == Some(&b'.') && bytes.get(length + 1).is_some_and(u8::is_ascii_digit)
        {
            is_float = true;
            length += 1 + count(&bytes[length + 1..], |b| b.is_ascii_digit());
        }
        if matches!(bytes.get(length), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(bytes.get(length + 1), Some(b'+' | b'-')));
            let digits = count(&bytes[length + 1 + sign..], |b| b.is_ascii_digit());
            if digits > 0 {
                is_float = true;
                length += 1 + sign + digits;
            }
        }

        let region: Region = (from..from + length).into();
        self.cursor = region.end;
        let literal = &text[..length];

        if is_float {
            literal
                .parse::<f64>()
                .map(|float| (Token::Float(float), region))
                .map_err(|_| self.error_literal(region, "float literal"))
        } else {
            literal
                .parse::<i64>()
                .map(|int| (Token::Int(int), region))
                .map_err(|_| self.error_literal(region, "integer literal"))
        }
    }

    /// Return a [`Token::String`] with escapes resolved.
    ///
    /// Strings are delimited by single or double quotes, or by three of
    /// either, in which case they may span lines.
    fn lex_string(&mut self, from: usize, quote: char) -> Result<(Token, Region), Error> {
        let triple = quote.to_string().repeat(3);
        let delimiter = if self.source[from..self.end].starts_with(&triple) {
            triple.as_str()
        } else {
            &triple[..1]
        };
        let multiline = delimiter.len() == 3;

        let mut position = from + delimiter.len();
        let mut value = String::new();
        loop {
            let rest = &self.source[position..self.end];
            if rest.starts_with(delimiter) {
                position += delimiter.len();
                break;
            }

            let mut chars = rest.chars();
            match chars.next() {
                None => {
                    return Err(Error::build(INVALID_SYNTAX)
                        .with_kind(ErrorKind::Syntax)
                        .with_pointer(self.source, from..position)
                        .with_help(format!(
                            "this might be an undelimited string, try closing it with `{delimiter}`"
                        )))
                }
                Some('\n') if !multiline => {
                    return Err(Error::build(INVALID_SYNTAX)
                        .with_kind(ErrorKind::Syntax)
                        .with_pointer(self.source, from..position)
                        .with_help("line breaks are only allowed in triple quoted strings"))
                }
                Some('\\') => {
                    position += 1 + self.lex_escape(position, &mut value)?;
                }
                Some(char) => {
                    value.push(char);
                    position += char.len_utf8();
                }
            }
        }
        self.cursor = position;

        Ok((Token::String(value), (from..position).into()))
    }

    /// Resolve the escape sequence following the backslash at the given
    /// offset, returning the number of bytes it spans after the backslash.
    fn lex_escape(&self, backslash: usize, value: &mut String) -> Result<usize, Error> {
        let char = match self.peek_char(backslash + 1) {
            Some(char) => char,
            None => return Ok(0),
        };

        let simple = match char {
            '\\' => Some('\\'),
            '\'' => Some('\''),
            '"' => Some('"'),
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            'a' => Some('\x07'),
            'b' => Some('\x08'),
            'f' => Some('\x0c'),
            'v' => Some('\x0b'),
            '0' => Some('\0'),
            _ => None,
        };
        if let Some(simple) = simple {
            value.push(simple);
            return Ok(1);
        }

        let digits = match char {
            'x' => 2,
            'u' => 4,
            'U' => 8,
            _ => {
                // Unknown escapes are kept as written.
                value.push('\\');
                return Ok(0);
            }
        };
        let begin = backslash + 2;
        let code = self
            .source
            .get(begin..begin + digits)
            .filter(|_| begin + digits <= self.end)
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);

        match code {
            Some(code) => {
                value.push(code);
                Ok(1 + digits)
            }
            None => Err(self.error_literal(
                backslash..(begin + digits).min(self.end),
                "escape sequence",
            )),
        }
    }

    /// Return a [`Token::Date`] or [`Token::DateTime`] from a literal like
    /// `@(2000-02-29T12:34:56.5)`.
    fn lex_date(&mut self, from: usize) -> Result<(Token, Region), Error> {
        let rest = &self.source[from..self.end];
        let close = match rest.find(')') {
            Some(close) if rest.starts_with("@(") => close,
            _ => {
                return Err(Error::build(INVALID_SYNTAX)
                    .with_kind(ErrorKind::Syntax)
                    .with_pointer(self.source, from..from + 1)
                    .with_help("date literals look like `@(2000-01-01)`"))
            }
        };
        let region: Region = (from..from + close + 1).into();
        self.cursor = region.end;

        parse_date(&rest[2..close])
            .map(|token| (token, region))
            .ok_or_else(|| self.error_literal(region, "date literal"))
    }

    /// Return a [`Token::Color`] from a literal like `#fff` or `#ff000080`.
    fn lex_color(&mut self, from: usize) -> Result<(Token, Region), Error> {
        let digits = count(&self.source.as_bytes()[from + 1..self.end], |b| {
            b.is_ascii_hexdigit()
        });
        let region: Region = (from..from + 1 + digits).into();
        self.cursor = region.end;

        Color::from_hex(&self.source[from + 1..region.end])
            .map(|color| (Token::Color(color), region))
            .ok_or_else(|| self.error_literal(region, "color literal"))
    }

    /// Return an [`Error`] describing a malformed literal.
    fn error_literal<T>(&self, region: T, what: &str) -> Error
    where
        T: Into<Region>,
    {
        Error::build(INVALID_LITERAL)
            .with_kind(ErrorKind::Syntax)
            .with_pointer(self.source, region)
            .with_help(format!("this is not a valid {what}"))
    }
}

/// Count the leading bytes matching the predicate.
fn count(bytes: &[u8], predicate: impl Fn(u8) -> bool) -> usize {
    bytes.iter().take_while(|b| predicate(**b)).count()
}

/// Parse the inside of a date literal.
///
/// The time part may stop after the hour, minute or second, and seconds may
/// carry up to six fractional digits.
fn parse_date(text: &str) -> Option<Token> {
    let (date, time) = match text.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (text, None),
    };

    let mut parts = date.splitn(3, '-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let time = match time {
        None => return Some(Token::Date(date)),
        Some(time) => time,
    };
    if time.is_empty() {
        return Some(Token::DateTime(date.and_time(NaiveTime::MIN)));
    }

    let (clock, fraction) = match time.split_once('.') {
        Some((clock, fraction)) => (clock, fraction),
        None => (time, ""),
    };
    let mut fields = [0u32; 3];
    for (i, field) in clock.split(':').enumerate() {
        *fields.get_mut(i)? = field.parse().ok()?;
    }
    if fraction.len() > 6 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let microsecond = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<6}").parse().ok()?
    };

    let [hour, minute, second] = fields;
    let time = NaiveTime::from_hms_micro_opt(hour, minute, second, microsecond)?;

    Some(Token::DateTime(NaiveDateTime::new(date, time)))
}

/// Return true if the given character is a recognized beginning identifier,
/// meaning '_' or an `xid_start`.
fn is_ident_start(c: char) -> bool {
    c == '_' || unicode_ident::is_xid_start(c)
}

/// Return true if the given character is a recognized continue identifier,
/// meaning an `xid_continue`.
fn is_ident_continue(c: char) -> bool {
    unicode_ident::is_xid_continue(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::Operator;

    fn tokens(source: &str) -> Vec<Token> {
        Lexer::new(source, (0..source.len()).into())
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|(token, _)| token)
            .collect()
    }

    #[test]
    fn test_lex_expression() {
        assert_eq!(
            tokens("x.y+=[1, 2.5]"),
            vec![
                Token::Identifier,
                Token::Period,
                Token::Identifier,
                Token::Augmented(Operator::Add),
                Token::LeftBracket,
                Token::Int(1),
                Token::Comma,
                Token::Float(2.5),
                Token::RightBracket,
            ]
        );
    }

    #[test]
    fn test_lex_regions_are_absolute() {
        let source = "<?print  ab ?>";
        let lexed = Lexer::new(source, (9..11).into()).tokenize().unwrap();

        assert_eq!(lexed, vec![(Token::Identifier, Region::new(9..11))]);
    }

    #[test]
    fn test_lex_longest_symbol() {
        assert_eq!(
            tokens("a//=b**c<<d {/}"),
            vec![
                Token::Identifier,
                Token::Augmented(Operator::FloorDivide),
                Token::Identifier,
                Token::DoubleStar,
                Token::Identifier,
                Token::Operator(Operator::ShiftLeft),
                Token::Identifier,
                Token::EmptySet,
            ]
        );
    }

    #[test]
    fn test_lex_keywords() {
        assert_eq!(
            tokens("not x in None"),
            vec![
                Token::Keyword(Keyword::Not),
                Token::Identifier,
                Token::Keyword(Keyword::In),
                Token::Keyword(Keyword::None),
            ]
        );
    }

    #[test]
    fn test_lex_numbers() {
        assert_eq!(
            tokens("0x1f 0o17 0b101 42 1e3 .5"),
            vec![
                Token::Int(31),
                Token::Int(15),
                Token::Int(5),
                Token::Int(42),
                Token::Float(1000.0),
                Token::Float(0.5),
            ]
        );
    }

    #[test]
    fn test_lex_strings() {
        assert_eq!(
            tokens(r#"'a\'b' "\x41é\n" '''x'y'''"#),
            vec![
                Token::String("a'b".to_string()),
                Token::String("A\u{e9}\n".to_string()),
                Token::String("x'y".to_string()),
            ]
        );
    }

    #[test]
    fn test_lex_unterminated_string() {
        let source = "'abc";
        let error = Lexer::new(source, (0..4).into()).tokenize().unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Syntax);
        assert_eq!(error.reason(), INVALID_SYNTAX);
    }

    #[test]
    fn test_lex_dates_and_colors() {
        let date = NaiveDate::from_ymd_opt(2000, 2, 29).unwrap();

        assert_eq!(
            tokens("@(2000-02-29) @(2000-02-29T12:34:56.5) #f80"),
            vec![
                Token::Date(date),
                Token::DateTime(date.and_hms_micro_opt(12, 34, 56, 500_000).unwrap()),
                Token::Color(Color::new(0xff, 0x88, 0x00, 0xff)),
            ]
        );
    }

    #[test]
    fn test_lex_invalid_date() {
        let source = "@(2000-02-30)";
        let error = Lexer::new(source, (0..source.len()).into())
            .tokenize()
            .unwrap_err();

        assert_eq!(error.reason(), INVALID_LITERAL);
    }

    #[test]
    fn test_lex_unexpected_character() {
        let source = "a ? b";
        let error = Lexer::new(source, (0..source.len()).into())
            .tokenize()
            .unwrap_err();

        assert_eq!(error.reason(), UNEXPECTED_TOKEN);
    }
}
