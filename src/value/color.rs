use std::fmt::{Display, Formatter, Result};

/// An RGBA colour with one byte per channel.
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Create a new [`Color`].
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse the hex digits of a colour literal, without the leading `#`.
    ///
    /// Accepts the `rgb`, `rgba`, `rrggbb` and `rrggbbaa` forms.
    pub fn from_hex(digits: &str) -> Option<Self> {
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let short = |index: usize| {
            u8::from_str_radix(&digits[index..index + 1], 16)
                .ok()
                .map(|n| n * 17)
        };
        let long = |index: usize| u8::from_str_radix(&digits[index..index + 2], 16).ok();

        match digits.len() {
            3 => Some(Self::new(short(0)?, short(1)?, short(2)?, 255)),
            4 => Some(Self::new(short(0)?, short(1)?, short(2)?, short(3)?)),
            6 => Some(Self::new(long(0)?, long(2)?, long(4)?, 255)),
            8 => Some(Self::new(long(0)?, long(2)?, long(4)?, long(6)?)),
            _ => None,
        }
    }
}

impl Display for Color {
    /// Opaque colours print as `#rrggbb`, others as `#rrggbbaa`.
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 255 {
            write!(f, "{:02x}", self.a)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex_forms() {
        assert_eq!(Color::from_hex("fff"), Some(Color::new(255, 255, 255, 255)));
        assert_eq!(Color::from_hex("1234"), Some(Color::new(17, 34, 51, 68)));
        assert_eq!(Color::from_hex("0a0b0c"), Some(Color::new(10, 11, 12, 255)));
        assert_eq!(Color::from_hex("0a0b0c0d"), Some(Color::new(10, 11, 12, 13)));
        assert_eq!(Color::from_hex("12345"), None);
        assert_eq!(Color::from_hex("ggg"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Color::new(255, 0, 0, 255).to_string(), "#ff0000");
        assert_eq!(Color::new(255, 0, 0, 128).to_string(), "#ff000080");
    }
}
